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

//! Line rasterization
//!
//! Fixed-point DDA over the major axis: positions carry 32 fractional bits,
//! shaded colors 12. One pixel is emitted per major-axis step; clipping and
//! interlace skipping happen per pixel, and the blend/mask path is shared
//! with triangles through `shade_pixel`.

use super::raster::shade_pixel;
use super::DrawState;
use crate::gpu::primitives::DrawingArea;
use crate::queue::record::LineVertex;
use crate::vram::{Vram, MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH};

/// Fractional bits of the position accumulators
const XY_FRACT_BITS: u32 = 32;

/// Fractional bits of the color accumulators
const RGB_FRACT_BITS: u32 = 12;

#[inline(always)]
fn line_divide(delta: i32, dk: i32) -> i64 {
    let mut delta = (delta as i64) << XY_FRACT_BITS;
    if delta < 0 {
        delta -= dk as i64 - 1;
    }
    if delta > 0 {
        delta += dk as i64 - 1;
    }
    delta / dk as i64
}

/// Rasterize one line segment
pub(super) fn draw_line(
    state: &DrawState,
    vram: &mut Vram,
    area: &DrawingArea,
    p0: &LineVertex,
    p1: &LineVertex,
) {
    let i_dx = (p1.x - p0.x).abs();
    let i_dy = (p1.y - p0.y).abs();
    let k = i_dx.max(i_dy);
    if i_dx >= MAX_PRIMITIVE_WIDTH || i_dy >= MAX_PRIMITIVE_HEIGHT {
        return;
    }

    let (p0, p1) = if p0.x >= p1.x && k > 0 { (p1, p0) } else { (p0, p1) };

    let (dx_dk, dy_dk, dr_dk, dg_dk, db_dk) = if k == 0 {
        (0i64, 0i64, 0i32, 0i32, 0i32)
    } else {
        let dr = ((p1.r() as i32 - p0.r() as i32) << RGB_FRACT_BITS) / k;
        let dg = ((p1.g() as i32 - p0.g() as i32) << RGB_FRACT_BITS) / k;
        let db = ((p1.b() as i32 - p0.b() as i32) << RGB_FRACT_BITS) / k;
        (
            line_divide(p1.x - p0.x, k),
            line_divide(p1.y - p0.y, k),
            dr,
            dg,
            db,
        )
    };

    let mut cur_x = ((p0.x as i64) << XY_FRACT_BITS) | (1i64 << (XY_FRACT_BITS - 1));
    let mut cur_y = ((p0.y as i64) << XY_FRACT_BITS) | (1i64 << (XY_FRACT_BITS - 1));

    cur_x -= 1024;
    if dy_dk < 0 {
        cur_y -= 1024;
    }

    let mut cur_r = ((p0.r() as u32) << RGB_FRACT_BITS) | (1 << (RGB_FRACT_BITS - 1));
    let mut cur_g = ((p0.g() as u32) << RGB_FRACT_BITS) | (1 << (RGB_FRACT_BITS - 1));
    let mut cur_b = ((p0.b() as u32) << RGB_FRACT_BITS) | (1 << (RGB_FRACT_BITS - 1));

    for _ in 0..=k {
        // The 2047 mask stands in for sign extension; wrapped coordinates
        // fall outside the drawing area and are rejected there.
        let x = ((cur_x >> XY_FRACT_BITS) & 2047) as i32;
        let y = ((cur_y >> XY_FRACT_BITS) & 2047) as i32;

        if !state.params.skip_interlaced_line(y)
            && x >= area.left as i32
            && x <= area.right as i32
            && y >= area.top as i32
            && y <= area.bottom as i32
        {
            let (r, g, b) = if state.shading {
                (
                    (cur_r >> RGB_FRACT_BITS) as u8,
                    (cur_g >> RGB_FRACT_BITS) as u8,
                    (cur_b >> RGB_FRACT_BITS) as u8,
                )
            } else {
                (p0.r(), p0.g(), p0.b())
            };
            shade_pixel(state, vram, x as u32, y as u32, r, g, b, 0, 0);
        }

        cur_x += dx_dk;
        cur_y += dy_dk;
        if state.shading {
            cur_r = cur_r.wrapping_add(dr_dk as u32);
            cur_g = cur_g.wrapping_add(dg_dk as u32);
            cur_b = cur_b.wrapping_add(db_dk as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::primitives::{TextureMode, TextureWindow, TransparencyMode};
    use crate::queue::record::CommandParams;

    fn line_state(shading: bool) -> DrawState {
        DrawState {
            shading,
            texture: false,
            raw_texture: false,
            transparency: false,
            dithering: false,
            transparency_mode: TransparencyMode::HalfBackgroundPlusHalfForeground,
            texture_mode: TextureMode::Palette4,
            texpage_x: 0,
            texpage_y: 0,
            clut_x: 0,
            clut_y: 0,
            window: TextureWindow::default(),
            params: CommandParams::empty(),
            mask_and: 0,
            mask_or: 0,
        }
    }

    fn vert(x: i32, y: i32, color: u32) -> LineVertex {
        LineVertex { x, y, color }
    }

    #[test]
    fn test_horizontal_line() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        draw_line(
            &line_state(false),
            &mut vram,
            &area,
            &vert(10, 10, 0x0000FF),
            &vert(20, 10, 0x0000FF),
        );
        for x in 10..=20 {
            assert_eq!(vram.get_pixel(x, 10), 0x001F, "x={}", x);
        }
        assert_eq!(vram.get_pixel(9, 10), 0);
        assert_eq!(vram.get_pixel(21, 10), 0);
    }

    #[test]
    fn test_diagonal_line_endpoints() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        draw_line(
            &line_state(false),
            &mut vram,
            &area,
            &vert(0, 0, 0xFFFFFF),
            &vert(40, 40, 0xFFFFFF),
        );
        assert_ne!(vram.get_pixel(0, 0), 0);
        assert_ne!(vram.get_pixel(40, 40), 0);
        assert_ne!(vram.get_pixel(20, 20), 0);
    }

    #[test]
    fn test_line_clipped_to_drawing_area() {
        let mut vram = Vram::new();
        let area = DrawingArea { left: 20, top: 0, right: 100, bottom: 511 };
        draw_line(
            &line_state(false),
            &mut vram,
            &area,
            &vert(0, 50, 0xFFFFFF),
            &vert(200, 50, 0xFFFFFF),
        );
        assert_eq!(vram.get_pixel(10, 50), 0);
        assert_ne!(vram.get_pixel(50, 50), 0);
        assert_eq!(vram.get_pixel(150, 50), 0);
    }

    #[test]
    fn test_shaded_line_interpolates() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        // Black to pure red over 32 pixels.
        draw_line(
            &line_state(true),
            &mut vram,
            &area,
            &vert(0, 0, 0x000000),
            &vert(31, 0, 0x0000FF),
        );
        let start = vram.get_pixel(0, 0) & 0x1F;
        let mid = vram.get_pixel(16, 0) & 0x1F;
        let end = vram.get_pixel(31, 0) & 0x1F;
        assert!(start < mid && mid < end, "{} {} {}", start, mid, end);
        assert_eq!(end, 31);
    }

    #[test]
    fn test_single_point_line() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        draw_line(
            &line_state(false),
            &mut vram,
            &area,
            &vert(5, 5, 0x00FF00),
            &vert(5, 5, 0x00FF00),
        );
        assert_eq!(vram.get_pixel(5, 5), 0x03E0);
    }

    #[test]
    fn test_oversized_line_culled() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        draw_line(
            &line_state(false),
            &mut vram,
            &area,
            &vert(-1000, 0, 0xFFFFFF),
            &vert(1000, 0, 0xFFFFFF),
        );
        assert!(vram.pixels().iter().all(|&p| p == 0));
    }
}
