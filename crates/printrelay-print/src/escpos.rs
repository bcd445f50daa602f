// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS raster encoding for thermal receipt printers.
//
// Turns a decoded bitmap into the byte stream a thermal printer expects on
// its raw port: reset, one or more `GS v 0` raster blocks, feed, partial cut.
// Pure functions only: no I/O and no state.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

/// `ESC @` — initialise printer.
pub const CMD_RESET: [u8; 2] = [0x1B, 0x40];

/// `GS v 0 m` with m = 0 (normal density). Followed by xL xH yL yH.
pub const CMD_RASTER: [u8; 4] = [0x1D, 0x76, 0x30, 0x00];

/// `ESC d 3` — feed three lines.
pub const CMD_FEED: [u8; 3] = [0x1B, 0x64, 0x03];

/// `GS V A 0` — partial cut.
pub const CMD_PARTIAL_CUT: [u8; 4] = [0x1D, 0x56, 0x41, 0x00];

/// Largest row count a single raster header can describe.
const MAX_BLOCK_ROWS: u32 = u16::MAX as u32;

/// A packed 1-bit raster: `row_bytes * height` bytes, MSB = leftmost pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub row_bytes: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Raster {
    /// Width in dots actually encoded (always a multiple of 8).
    pub fn width(&self) -> u32 {
        self.row_bytes * 8
    }
}

/// Scale `img` to `target_width` with nearest-neighbour sampling, keeping the
/// aspect ratio. Returns the input untouched when it already has that width.
pub fn resize_to_width(img: &DynamicImage, target_width: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w == target_width || w == 0 || target_width == 0 {
        return img.clone();
    }
    let scale = target_width as f64 / w as f64;
    let new_height = ((h as f64 * scale) as u32).max(1);
    debug!(from_w = w, from_h = h, to_w = target_width, to_h = new_height, "resizing bitmap");
    img.resize_exact(target_width, new_height, FilterType::Nearest)
}

/// Convert a bitmap to a packed monochrome raster.
///
/// Luminance is the plain average of R, G and B; a pixel prints (bit set)
/// when that average is below 128. Widths that are not a multiple of 8 are
/// truncated to the next lower multiple, dropping the rightmost columns.
pub fn rasterize(img: &DynamicImage) -> Raster {
    let rgb = img.to_rgb8();
    let (w, height) = rgb.dimensions();
    let row_bytes = w / 8;
    let width = row_bytes * 8;

    let mut data = vec![0u8; (row_bytes * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let luma = (r as u16 + g as u16 + b as u16) / 3;
            if luma < 128 {
                let idx = (y * row_bytes + x / 8) as usize;
                data[idx] |= 0x80 >> (x % 8);
            }
        }
    }

    Raster {
        row_bytes,
        height,
        data,
    }
}

/// Append `GS v 0` blocks for `raster`, splitting rows that do not fit a
/// single 16-bit height field.
pub fn write_raster(out: &mut Vec<u8>, raster: &Raster) {
    let stride = raster.row_bytes as usize;
    let mut row = 0u32;
    while row < raster.height {
        let rows = (raster.height - row).min(MAX_BLOCK_ROWS);
        out.extend_from_slice(&CMD_RASTER);
        out.extend_from_slice(&(raster.row_bytes as u16).to_le_bytes());
        out.extend_from_slice(&(rows as u16).to_le_bytes());
        let start = row as usize * stride;
        let end = start + rows as usize * stride;
        out.extend_from_slice(&raster.data[start..end]);
        row += rows;
    }
}

/// Build the full job for one receipt: reset, raster, feed, partial cut.
pub fn encode_receipt(img: &DynamicImage, target_width: u32) -> Vec<u8> {
    let scaled = resize_to_width(img, target_width);
    let raster = rasterize(&scaled);

    let mut out = Vec::with_capacity(raster.data.len() + 32);
    out.extend_from_slice(&CMD_RESET);
    write_raster(&mut out, &raster);
    out.extend_from_slice(&CMD_FEED);
    out.extend_from_slice(&CMD_PARTIAL_CUT);

    debug!(
        width = raster.width(),
        height = raster.height,
        bytes = out.len(),
        "ESC/POS receipt encoded"
    );
    out
}
