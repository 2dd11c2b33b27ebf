//! Wire packet construction.
//!
//! Every image update is sent as two fixed size output reports. The first page
//! carries an embedded BMP header describing a 72x72 24-bit uncompressed image,
//! the second carries the remaining pixels.

use crate::consts::{BRIGHTNESS_REPORT_LEN, PAGE_1_BYTES, PAGE_2_BYTES, PAGE_PACKET_SIZE};

/// Length of the page 1 header, including the BMP sub-header
pub const PAGE_1_HEADER_LEN: usize = 70;

/// Length of the page 2 header, including zero fill
pub const PAGE_2_HEADER_LEN: usize = 16;

/// Byte offset of the 1-indexed key number in both page headers
const KEY_OFFSET: usize = 5;

#[rustfmt::skip]
const PAGE_1_HEADER: [u8; PAGE_1_HEADER_LEN] = [
    // report id, command, page 1, reserved, not last page, key
    0x02, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // "BM", file size 15606, reserved, pixel data offset 54
    0x42, 0x4d, 0xf6, 0x3c, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x36, 0x00, 0x00, 0x00,
    // info header size 40, width 72, height 72, 1 plane, 24 bpp
    0x28, 0x00, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00,
    0x48, 0x00, 0x00, 0x00, 0x01, 0x00, 0x18, 0x00,
    // no compression, image size 15552, 3780 ppm both axes, no palette
    0x00, 0x00, 0x00, 0x00, 0xc0, 0x3c, 0x00, 0x00,
    0xc4, 0x0e, 0x00, 0x00, 0xc4, 0x0e, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[rustfmt::skip]
const PAGE_2_HEADER: [u8; 6] = [
    // report id, command, page 2, reserved, last page, key
    0x02, 0x01, 0x02, 0x00, 0x01, 0x01,
];

const BRIGHTNESS_HEADER: [u8; 5] = [0x05, 0x55, 0xaa, 0xd1, 0x01];

fn page(header: &[u8], header_len: usize, key: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; PAGE_PACKET_SIZE];
    buf[..header.len()].copy_from_slice(header);
    // out of range keys wrap to 0, which the device ignores
    buf[KEY_OFFSET] = key.wrapping_add(1);
    buf[header_len..header_len + payload.len()].copy_from_slice(payload);
    buf
}

/// Construct the first image page for a 0-indexed key.
///
/// The payload must be exactly [`PAGE_1_BYTES`] long.
pub fn page_1(key: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(payload.len(), PAGE_1_BYTES);
    page(&PAGE_1_HEADER, PAGE_1_HEADER_LEN, key, payload)
}

/// Construct the second image page for a 0-indexed key.
///
/// The payload must be exactly [`PAGE_2_BYTES`] long.
pub fn page_2(key: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(payload.len(), PAGE_2_BYTES);
    page(&PAGE_2_HEADER, PAGE_2_HEADER_LEN, key, payload)
}

/// Construct the brightness feature report, clamping to 0-100 percent
pub fn brightness(percentage: i32) -> [u8; BRIGHTNESS_REPORT_LEN] {
    let mut buf = [0u8; BRIGHTNESS_REPORT_LEN];
    buf[..BRIGHTNESS_HEADER.len()].copy_from_slice(&BRIGHTNESS_HEADER);
    buf[BRIGHTNESS_HEADER.len()] = percentage.clamp(0, 100) as u8;
    buf
}
