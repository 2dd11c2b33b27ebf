//! Image decoding for key icons.

use std::path::Path;

use deck_sync_core::{Colour, DeckError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::consts::PIXEL_BUFFER_LEN;
use crate::INFO;

/// Open an image file and convert it into a raw key buffer
pub fn load_key_image(
    path: impl AsRef<Path>,
    background: Colour,
    nearest: bool,
) -> Result<Vec<u8>> {
    let image = image::open(path.as_ref()).map_err(|e| match e {
        image::ImageError::IoError(e) => DeckError::Io(e),
        e => DeckError::InvalidMedia(e.to_string()),
    })?;
    Ok(encode_key_image(&image, background, nearest))
}

/// Resize an image to fill a key, mixing transparency against the background
/// colour, and flatten it into a 72x72 RGB buffer
pub fn encode_key_image(image: &DynamicImage, background: Colour, nearest: bool) -> Vec<u8> {
    let size = INFO.icon_size;
    let filter = if nearest {
        FilterType::Nearest
    } else {
        FilterType::Gaussian
    };

    let resized = if image.dimensions() == (size, size) {
        image.to_rgba8()
    } else {
        image.resize_to_fill(size, size, filter).to_rgba8()
    };

    let [br, bg, bb] = background.to_rgb();
    let buf = resized
        .pixels()
        .flat_map(|p| {
            let [r, g, b, a] = p.0;

            // Mix alpha values against the background
            let a = a as f64 / 255.0;
            let ba = 1. - a;
            [
                ((br as f64 * ba) + (r as f64 * a)) as u8,
                ((bg as f64 * ba) + (g as f64 * a)) as u8,
                ((bb as f64 * ba) + (b as f64 * a)) as u8,
            ]
        })
        .collect::<Vec<_>>();
    debug_assert_eq!(buf.len(), PIXEL_BUFFER_LEN);
    buf
}
