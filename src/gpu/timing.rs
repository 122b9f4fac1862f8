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

//! Command cycle costs
//!
//! The parser accumulates GPU ticks per accepted command and hands them to
//! the CPU scheduler through [`crate::Gpu::consume_ticks`]. The model:
//! fixed per-primitive setup costs, plus per-pixel costs scaled by the
//! texturing/shading/blending flags. Not required for pixel correctness.

/// Polygon setup cost indexed by `[quad][shaded][textured]`
const POLYGON_SETUP_TICKS: [[[u32; 2]; 2]; 2] =
    [[[46, 226], [334, 496]], [[82, 262], [370, 532]]];

/// Rectangle and polyline setup cost
pub const RECTANGLE_SETUP_TICKS: u32 = 16;

/// Setup ticks for a polygon command
pub fn polygon_setup_ticks(quad: bool, shaded: bool, textured: bool) -> u32 {
    POLYGON_SETUP_TICKS[usize::from(quad)][usize::from(shaded)][usize::from(textured)]
}

/// Fill ticks: fills run 8 pixels per clock plus per-row overhead
pub fn fill_ticks(width: u32, height: u32) -> u32 {
    46 + (width / 8 + 9) * height
}

/// CPU→VRAM transfer ticks
pub fn vram_write_ticks(width: u32, height: u32) -> u32 {
    46 + (width / 8 + 9) * height
}

/// VRAM→VRAM copy ticks: two pixels per clock
pub fn vram_copy_ticks(width: u32, height: u32) -> u32 {
    46 + (width * height) / 2
}

/// Per-pixel cost multiplier from the draw flags
fn pixel_cost(shaded: bool, textured: bool, transparent: bool) -> u32 {
    1 + u32::from(shaded) + u32::from(textured) + u32::from(transparent)
}

/// Fill ticks for one triangle from its vertex positions
///
/// The pixel count is approximated by half the parallelogram area of the
/// edge vectors.
#[allow(clippy::too_many_arguments)]
pub fn triangle_fill_ticks(
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    shaded: bool,
    textured: bool,
    transparent: bool,
) -> u32 {
    let cross = ((x1 - x0) as i64 * (y2 - y0) as i64 - (x2 - x0) as i64 * (y1 - y0) as i64).abs();
    let pixels = (cross / 2) as u32;
    pixels * pixel_cost(shaded, textured, transparent)
}

/// Fill ticks for a clipped rectangle
pub fn rectangle_fill_ticks(width: u32, height: u32, textured: bool, transparent: bool) -> u32 {
    width * height * pixel_cost(false, textured, transparent)
}

/// Fill ticks for a clipped line
pub fn line_fill_ticks(width: u32, height: u32, shaded: bool, transparent: bool) -> u32 {
    width.max(height) * pixel_cost(shaded, false, transparent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_setup_table() {
        assert_eq!(polygon_setup_ticks(false, false, false), 46);
        assert_eq!(polygon_setup_ticks(false, false, true), 226);
        assert_eq!(polygon_setup_ticks(false, true, false), 334);
        assert_eq!(polygon_setup_ticks(false, true, true), 496);
        assert_eq!(polygon_setup_ticks(true, false, false), 82);
        assert_eq!(polygon_setup_ticks(true, false, true), 262);
        assert_eq!(polygon_setup_ticks(true, true, false), 370);
        assert_eq!(polygon_setup_ticks(true, true, true), 532);
    }

    #[test]
    fn test_fill_ticks_formula() {
        // 16x4 fill: 46 + (2 + 9) * 4
        assert_eq!(fill_ticks(16, 4), 46 + 11 * 4);
    }

    #[test]
    fn test_triangle_ticks_scale_with_flags() {
        let flat = triangle_fill_ticks(0, 0, 64, 0, 0, 64, false, false, false);
        let shaded = triangle_fill_ticks(0, 0, 64, 0, 0, 64, true, false, false);
        let full = triangle_fill_ticks(0, 0, 64, 0, 0, 64, true, true, true);
        assert_eq!(flat, 2048);
        assert_eq!(shaded, 2 * flat);
        assert_eq!(full, 4 * flat);
    }
}
