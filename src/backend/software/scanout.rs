// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Display scanout
//!
//! Reads the displayed VRAM sub-rectangle and repacks it into the CPU-side
//! frame format the host requested. Handles 24bpp decoding (three-byte
//! pixels packed across 16-bit cells) and interlaced output, where only the
//! active field's rows are written and the other field persists from the
//! previous present.

use super::FrameBuffer;
use crate::queue::record::{DisplayFlags, UpdateDisplayPayload};
use crate::settings::FramePixelFormat;
use crate::vram::{Vram, VRAM_WIDTH};

/// Bytes per VRAM row
const VRAM_ROW_BYTES: usize = VRAM_WIDTH * 2;

#[inline(always)]
fn expand5(v: u16) -> u8 {
    (((v & 0x1F) << 3) | ((v & 0x1F) >> 2)) as u8
}

/// Write one pixel into a frame row
#[inline(always)]
fn write_pixel(out: &mut [u8], index: usize, format: FramePixelFormat, raw: u16, r: u8, g: u8, b: u8) {
    match format {
        FramePixelFormat::Rgba5551 => {
            out[index * 2..index * 2 + 2].copy_from_slice(&raw.to_le_bytes());
        }
        FramePixelFormat::Rgb565 => {
            let r5 = (r >> 3) as u16;
            let g6 = (g >> 2) as u16;
            let b5 = (b >> 3) as u16;
            let packed = (r5 << 11) | (g6 << 5) | b5;
            out[index * 2..index * 2 + 2].copy_from_slice(&packed.to_le_bytes());
        }
        FramePixelFormat::Rgba8 => {
            out[index * 4] = r;
            out[index * 4 + 1] = g;
            out[index * 4 + 2] = b;
            out[index * 4 + 3] = 0xFF;
        }
        FramePixelFormat::Bgra8 => {
            out[index * 4] = b;
            out[index * 4 + 1] = g;
            out[index * 4 + 2] = r;
            out[index * 4 + 3] = 0xFF;
        }
    }
}

/// Render the display rectangle into the persistent frame buffer
pub(super) fn render_display(
    frame: &mut FrameBuffer,
    vram: &Vram,
    p: &UpdateDisplayPayload,
    format: FramePixelFormat,
) {
    let flags = p.display_flags();
    let width = (p.width as u32).max(1);
    let height = (p.height as u32).max(1);

    frame.configure(width, height, format);
    frame.aspect = if p.aspect > 0.0 { p.aspect } else { 4.0 / 3.0 };
    frame.interlaced = flags.contains(DisplayFlags::INTERLACED);

    if flags.contains(DisplayFlags::DISABLED) {
        frame.pixels.fill(0);
        return;
    }

    let bpp = format.bytes_per_pixel();
    let row_bytes = width as usize * bpp;

    let (row_start, row_step) = if flags.contains(DisplayFlags::INTERLACED) {
        (p.field, 2u32)
    } else {
        (0, 1u32)
    };

    let mut out_row = row_start;
    while out_row < height {
        let vram_y = p.y as u32 + out_row;
        let out =
            &mut frame.pixels[out_row as usize * row_bytes..(out_row as usize + 1) * row_bytes];

        if flags.contains(DisplayFlags::FORMAT_24BIT) {
            // 24-bit pixels packed across the 16-bit cells of this row.
            let row = &vram.pixels()[((vram_y & 0x1FF) as usize) * VRAM_WIDTH..][..VRAM_WIDTH];
            let row: &[u8] = bytemuck::cast_slice(row);
            let base = (p.x as usize) * 2;
            for col in 0..width as usize {
                let offset = base + col * 3;
                let r = row[offset % VRAM_ROW_BYTES];
                let g = row[(offset + 1) % VRAM_ROW_BYTES];
                let b = row[(offset + 2) % VRAM_ROW_BYTES];
                let raw = ((b as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (r as u16 >> 3);
                write_pixel(out, col, format, raw, r, g, b);
            }
        } else {
            for col in 0..width {
                let raw = vram.get_pixel(p.x as u32 + col, vram_y);
                let r = expand5(raw);
                let g = expand5(raw >> 5);
                let b = expand5(raw >> 10);
                write_pixel(out, col as usize, format, raw, r, g, b);
            }
        }

        out_row += row_step;
    }
}
