//! Pixel codec for key images.
//!
//! Source buffers are row-major RGB. The device expects each row mirrored
//! horizontally with channels in BGR order, split across two pages.

use deck_sync_core::{Colour, DeckError, Result};

use crate::consts::{ICON_SIZE, PAGE_1_BYTES, PAGE_2_BYTES, PIXEL_BUFFER_LEN};

const ROW_BYTES: usize = ICON_SIZE * 3;

/// Encode a 72x72 RGB buffer into the page 1 and page 2 payloads
pub fn encode_image(pixels: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if pixels.len() != PIXEL_BUFFER_LEN {
        return Err(DeckError::PixelBufferSizeMismatch {
            expected: PIXEL_BUFFER_LEN,
            actual: pixels.len(),
        });
    }

    let mut stream = Vec::with_capacity(PIXEL_BUFFER_LEN);
    for row in pixels.chunks_exact(ROW_BYTES) {
        stream.extend(
            row.chunks_exact(3)
                .rev()
                .flat_map(|rgb| [rgb[2], rgb[1], rgb[0]]),
        );
    }

    let page_2 = stream.split_off(PAGE_1_BYTES);
    debug_assert_eq!(page_2.len(), PAGE_2_BYTES);
    Ok((stream, page_2))
}

/// Tile a single colour across both page payloads
pub fn encode_colour(colour: Colour) -> (Vec<u8>, Vec<u8>) {
    let bgr = colour.to_bgr();
    let tile = |len: usize| bgr.iter().copied().cycle().take(len).collect::<Vec<_>>();
    (tile(PAGE_1_BYTES), tile(PAGE_2_BYTES))
}

/// Inverse of [`encode_image`], recovering the original RGB buffer from both payloads
pub fn decode_image(page_1: &[u8], page_2: &[u8]) -> Result<Vec<u8>> {
    if page_1.len() + page_2.len() != PIXEL_BUFFER_LEN {
        return Err(DeckError::PixelBufferSizeMismatch {
            expected: PIXEL_BUFFER_LEN,
            actual: page_1.len() + page_2.len(),
        });
    }

    let stream = page_1.iter().chain(page_2).copied().collect::<Vec<_>>();
    let mut pixels = Vec::with_capacity(PIXEL_BUFFER_LEN);
    for row in stream.chunks_exact(ROW_BYTES) {
        pixels.extend(
            row.chunks_exact(3)
                .rev()
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]]),
        );
    }
    Ok(pixels)
}
