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

//! Triangle rasterization and per-pixel shading
//!
//! Scanline rasterizer with fixed-point edge walking. Edge X coordinates use
//! 32 fractional bits; interpolated attributes use 12 fractional bits plus 12
//! padding bits in wrapping 32-bit registers, with deltas computed once per
//! triangle from the signed edge determinant. Vertices are ordered
//! top-to-bottom (then left-to-right) to pick a core vertex from which both
//! triangle halves are walked.
//!
//! Pixel semantics (texture window, CLUT fetch, modulation, ordered dither,
//! the four semi-transparency modes and the mask bit) live in [`shade_pixel`]
//! and are shared with the sprite and line paths.

use super::DrawState;
use crate::gpu::primitives::{DrawingArea, TextureMode, TransparencyMode};
use crate::queue::record::PolygonVertex;
use crate::vram::{Vram, MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH};

/// Fractional bits of interpolated attributes
const COORD_FBS: u32 = 12;

/// Extra padding bits keeping attribute error out of the integer part
const COORD_POST_PADDING: u32 = 12;

/// The hardware's 4×4 ordered dither matrix
const DITHER_MATRIX: [[i32; 4]; 4] = [
    [-4, 0, -3, 1],
    [2, -2, 3, -1],
    [-3, 1, -4, 0],
    [3, -1, 2, -2],
];

/// Input range of the dither lookup (modulated channels reach 494)
const DITHER_LUT_SIZE: usize = 512;

type DitherLut = [[[u8; DITHER_LUT_SIZE]; 4]; 4];

const fn compute_dither_lut() -> DitherLut {
    let mut lut = [[[0u8; DITHER_LUT_SIZE]; 4]; 4];
    let mut y = 0;
    while y < 4 {
        let mut x = 0;
        while x < 4 {
            let mut value = 0;
            while value < DITHER_LUT_SIZE {
                let dithered = (value as i32 + DITHER_MATRIX[y][x]) >> 3;
                lut[y][x][value] = if dithered < 0 {
                    0
                } else if dithered > 31 {
                    31
                } else {
                    dithered as u8
                };
                value += 1;
            }
            x += 1;
        }
        y += 1;
    }
    lut
}

/// 256-entry (plus modulation headroom) clamped 8→5 bit reduction per matrix cell
static DITHER_LUT: DitherLut = compute_dither_lut();

#[inline(always)]
fn dither_lookup(dithering: bool, x: u32, y: u32, value: u16) -> u16 {
    // Cell (3, 2) carries a zero bias, so disabled lookups reduce without it.
    let dy = if dithering { (y & 3) as usize } else { 2 };
    let dx = if dithering { (x & 3) as usize } else { 3 };
    DITHER_LUT[dy][dx][(value as usize).min(DITHER_LUT_SIZE - 1)] as u16
}

/// Blend `fg` over `bg` with the given mode
///
/// Efficient 15bpp pixel math: the three 5-bit channels are processed in
/// parallel inside one word, with the 0x0421/0x8421 masks isolating one bit
/// per channel for the carry corrections.
#[inline(always)]
pub(super) fn blend_transparent(mode: TransparencyMode, bg: u16, fg: u16) -> u16 {
    let mut bg_bits = bg as u32;
    let mut fg_bits = fg as u32;
    match mode {
        TransparencyMode::HalfBackgroundPlusHalfForeground => {
            bg_bits |= 0x8000;
            (((fg_bits + bg_bits) - ((fg_bits ^ bg_bits) & 0x0421)) >> 1) as u16
        }
        TransparencyMode::BackgroundPlusForeground => {
            bg_bits &= !0x8000;
            let sum = fg_bits + bg_bits;
            let carry = sum.wrapping_sub((fg_bits ^ bg_bits) & 0x8421) & 0x8420;
            (sum.wrapping_sub(carry) | carry.wrapping_sub(carry >> 5)) as u16
        }
        TransparencyMode::BackgroundMinusForeground => {
            bg_bits |= 0x8000;
            fg_bits &= !0x8000;
            let diff = bg_bits.wrapping_sub(fg_bits).wrapping_add(0x0010_8420);
            let borrow = diff.wrapping_sub((bg_bits ^ fg_bits) & 0x0010_8420) & 0x0010_8420;
            (diff.wrapping_sub(borrow) & borrow.wrapping_sub(borrow >> 5)) as u16
        }
        TransparencyMode::BackgroundPlusQuarterForeground => {
            bg_bits &= !0x8000;
            fg_bits = ((fg_bits >> 2) & 0x1CE7) | 0x8000;
            let sum = fg_bits + bg_bits;
            let carry = sum.wrapping_sub((fg_bits ^ bg_bits) & 0x8421) & 0x8420;
            (sum.wrapping_sub(carry) | carry.wrapping_sub(carry >> 5)) as u16
        }
    }
}

/// Fetch a texel through the texture window, page and (for paletted modes) CLUT
#[inline(always)]
fn fetch_texel(state: &DrawState, vram: &Vram, u: u8, v: u8) -> u16 {
    let (u, v) = state.window.apply(u, v);
    match state.texture_mode {
        TextureMode::Palette4 => {
            let word = vram.get_pixel(state.texpage_x + (u as u32 / 4), state.texpage_y + v as u32);
            let index = (word >> ((u % 4) * 4)) & 0x0F;
            vram.get_pixel(state.clut_x + index as u32, state.clut_y)
        }
        TextureMode::Palette8 => {
            let word = vram.get_pixel(state.texpage_x + (u as u32 / 2), state.texpage_y + v as u32);
            let index = (word >> ((u % 2) * 8)) & 0xFF;
            vram.get_pixel(state.clut_x + index as u32, state.clut_y)
        }
        TextureMode::Direct16 | TextureMode::Reserved => {
            vram.get_pixel(state.texpage_x + u as u32, state.texpage_y + v as u32)
        }
    }
}

/// Shade and write one pixel
///
/// The complete hardware pixel path: texel fetch (a 0x0000 texel draws
/// nothing), modulation or raw passthrough, dither reduction to 5 bits per
/// channel, semi-transparent blending gated on the texel mask bit, and the
/// destination mask check/set.
#[inline(always)]
pub(super) fn shade_pixel(
    state: &DrawState,
    vram: &mut Vram,
    x: u32,
    y: u32,
    color_r: u8,
    color_g: u8,
    color_b: u8,
    texcoord_x: u8,
    texcoord_y: u8,
) {
    let mut color: u16;

    if state.texture {
        let texture_color = fetch_texel(state, vram, texcoord_x, texcoord_y);
        if texture_color == 0 {
            return;
        }

        if state.raw_texture {
            color = texture_color;
        } else {
            let tex_r = (texture_color & 0x1F) as u16;
            let tex_g = ((texture_color >> 5) & 0x1F) as u16;
            let tex_b = ((texture_color >> 10) & 0x1F) as u16;

            color = dither_lookup(state.dithering, x, y, (tex_r * color_r as u16) >> 4)
                | (dither_lookup(state.dithering, x, y, (tex_g * color_g as u16) >> 4) << 5)
                | (dither_lookup(state.dithering, x, y, (tex_b * color_b as u16) >> 4) << 10)
                | (texture_color & 0x8000);
        }
    } else {
        // Non-textured transparent polygons don't set bit 15, but are
        // treated as transparent while blending.
        color = dither_lookup(state.dithering, x, y, color_r as u16)
            | (dither_lookup(state.dithering, x, y, color_g as u16) << 5)
            | (dither_lookup(state.dithering, x, y, color_b as u16) << 10)
            | if state.transparency { 0x8000 } else { 0 };
    }

    let bg_color = vram.get_pixel(x, y);
    if state.transparency && (color & 0x8000 != 0 || !state.texture) {
        color = blend_transparent(state.transparency_mode, bg_color, color);
        if !state.texture {
            color &= !0x8000;
        }
    }

    if bg_color & state.mask_and != 0 {
        return;
    }
    vram.set_pixel(x, y, color | state.mask_or);
}

/// Per-axis attribute deltas in 24-bit wrapping fixed point
#[derive(Default, Clone, Copy)]
struct AttrDeltas {
    dr_dx: u32,
    dr_dy: u32,
    dg_dx: u32,
    dg_dy: u32,
    db_dx: u32,
    db_dy: u32,
    du_dx: u32,
    du_dy: u32,
    dv_dx: u32,
    dv_dy: u32,
}

/// Attribute accumulator group
#[derive(Default, Clone, Copy)]
struct AttrGroup {
    r: u32,
    g: u32,
    b: u32,
    u: u32,
    v: u32,
}

#[inline(always)]
fn make_poly_xfp(x: i32) -> i64 {
    ((x as i64) << 32) + ((1i64 << 32) - (1 << 11))
}

#[inline(always)]
fn make_poly_xfp_step(dx: i32, dy: i32) -> i64 {
    let mut dx_ex = (dx as i64) << 32;
    if dx_ex < 0 {
        dx_ex -= dy as i64 - 1;
    }
    if dx_ex > 0 {
        dx_ex += dy as i64 - 1;
    }
    dx_ex / dy as i64
}

#[inline(always)]
fn poly_xfp_int(xfp: i64) -> i32 {
    (xfp >> 32) as i32
}

/// Sign-extend an interpolated coordinate back to 11 bits
#[inline(always)]
fn truncate_coord(v: i32) -> i32 {
    (v << 21) >> 21
}

fn calc_attr_deltas(
    state: &DrawState,
    a: &PolygonVertex,
    b: &PolygonVertex,
    c: &PolygonVertex,
) -> Option<AttrDeltas> {
    // Signed double area of the triangle via the edge determinant.
    let calcis = |fa: i32, fb: i32, fc: i32, ya: i32, yb: i32, yc: i32| -> i64 {
        (((fb - fa) * (yc - yb)) - ((fc - fb) * (yb - ya))) as i64
    };

    let denom = calcis(a.x, b.x, c.x, a.y, b.y, c.y);
    if denom == 0 {
        return None;
    }

    let scale = |delta: i64| -> u32 {
        (((delta << COORD_FBS) / denom) as u32).wrapping_shl(COORD_POST_PADDING)
    };

    let mut idl = AttrDeltas::default();
    if state.shading {
        idl.dr_dx = scale(calcis(a.r() as i32, b.r() as i32, c.r() as i32, a.y, b.y, c.y));
        idl.dr_dy = scale(calcis(a.x, b.x, c.x, a.r() as i32, b.r() as i32, c.r() as i32));
        idl.dg_dx = scale(calcis(a.g() as i32, b.g() as i32, c.g() as i32, a.y, b.y, c.y));
        idl.dg_dy = scale(calcis(a.x, b.x, c.x, a.g() as i32, b.g() as i32, c.g() as i32));
        idl.db_dx = scale(calcis(a.b() as i32, b.b() as i32, c.b() as i32, a.y, b.y, c.y));
        idl.db_dy = scale(calcis(a.x, b.x, c.x, a.b() as i32, b.b() as i32, c.b() as i32));
    }
    if state.texture {
        idl.du_dx = scale(calcis(a.u() as i32, b.u() as i32, c.u() as i32, a.y, b.y, c.y));
        idl.du_dy = scale(calcis(a.x, b.x, c.x, a.u() as i32, b.u() as i32, c.u() as i32));
        idl.dv_dx = scale(calcis(a.v() as i32, b.v() as i32, c.v() as i32, a.y, b.y, c.y));
        idl.dv_dy = scale(calcis(a.x, b.x, c.x, a.v() as i32, b.v() as i32, c.v() as i32));
    }
    Some(idl)
}

#[inline(always)]
fn add_deltas_dx(state: &DrawState, ig: &mut AttrGroup, idl: &AttrDeltas, count: u32) {
    if state.shading {
        ig.r = ig.r.wrapping_add(idl.dr_dx.wrapping_mul(count));
        ig.g = ig.g.wrapping_add(idl.dg_dx.wrapping_mul(count));
        ig.b = ig.b.wrapping_add(idl.db_dx.wrapping_mul(count));
    }
    if state.texture {
        ig.u = ig.u.wrapping_add(idl.du_dx.wrapping_mul(count));
        ig.v = ig.v.wrapping_add(idl.dv_dx.wrapping_mul(count));
    }
}

#[inline(always)]
fn add_deltas_dy(state: &DrawState, ig: &mut AttrGroup, idl: &AttrDeltas, count: u32) {
    if state.shading {
        ig.r = ig.r.wrapping_add(idl.dr_dy.wrapping_mul(count));
        ig.g = ig.g.wrapping_add(idl.dg_dy.wrapping_mul(count));
        ig.b = ig.b.wrapping_add(idl.db_dy.wrapping_mul(count));
    }
    if state.texture {
        ig.u = ig.u.wrapping_add(idl.du_dy.wrapping_mul(count));
        ig.v = ig.v.wrapping_add(idl.dv_dy.wrapping_mul(count));
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_span(
    state: &DrawState,
    vram: &mut Vram,
    area: &DrawingArea,
    y: i32,
    x_start: i32,
    x_bound: i32,
    mut ig: AttrGroup,
    idl: &AttrDeltas,
) {
    if state.params.skip_interlaced_line(y) {
        return;
    }

    let x_ig_adjust = x_start;
    let mut w = x_bound - x_start;
    let mut x = truncate_coord(x_start);

    if x < area.left as i32 {
        let delta = area.left as i32 - x;
        x += delta;
        w -= delta;
        add_deltas_dx(state, &mut ig, idl, (x_ig_adjust + delta) as u32);
    } else {
        add_deltas_dx(state, &mut ig, idl, x_ig_adjust as u32);
    }

    if x + w > area.right as i32 + 1 {
        w = area.right as i32 + 1 - x;
    }
    if w <= 0 {
        return;
    }

    add_deltas_dy(state, &mut ig, idl, y as u32);

    let shift = COORD_FBS + COORD_POST_PADDING;
    loop {
        let r = (ig.r >> shift) as u8;
        let g = (ig.g >> shift) as u8;
        let b = (ig.b >> shift) as u8;
        let u = (ig.u >> shift) as u8;
        let v = (ig.v >> shift) as u8;

        shade_pixel(state, vram, x as u32, y as u32, r, g, b, u, v);

        x += 1;
        add_deltas_dx(state, &mut ig, idl, 1);
        w -= 1;
        if w <= 0 {
            break;
        }
    }
}

/// One half of a triangle, walked a scanline at a time
struct TriangleHalf {
    x_coord: [i64; 2],
    x_step: [i64; 2],
    y_coord: i32,
    y_bound: i32,
    dec_mode: bool,
}

/// Rasterize one triangle
///
/// The vertex order on entry matches the GP0 stream; ordering, core-vertex
/// selection and the two-half walk happen here. Oversized triangles are
/// culled as the hardware does.
pub(super) fn draw_triangle(
    state: &DrawState,
    vram: &mut Vram,
    area: &DrawingArea,
    v0: &PolygonVertex,
    v1: &PolygonVertex,
    v2: &PolygonVertex,
) {
    let (mut v0, mut v1, mut v2) = (v0, v1, v2);

    // Pick the leftmost (then earliest-submitted) vertex as the attribute
    // origin; the bitmask tracks it through the Y sorts below.
    let mut cvtemp: u32 = if v1.x <= v0.x {
        if v2.x <= v1.x {
            1 << 2
        } else {
            1 << 1
        }
    } else if v2.x < v0.x {
        1 << 2
    } else {
        1 << 0
    };

    if v2.y < v1.y {
        std::mem::swap(&mut v2, &mut v1);
        cvtemp = ((cvtemp >> 1) & 0x2) | ((cvtemp << 1) & 0x4) | (cvtemp & 0x1);
    }
    if v1.y < v0.y {
        std::mem::swap(&mut v1, &mut v0);
        cvtemp = ((cvtemp >> 1) & 0x1) | ((cvtemp << 1) & 0x2) | (cvtemp & 0x4);
    }
    if v2.y < v1.y {
        std::mem::swap(&mut v2, &mut v1);
        cvtemp = ((cvtemp >> 1) & 0x2) | ((cvtemp << 1) & 0x4) | (cvtemp & 0x1);
    }
    let core_vertex = (cvtemp >> 1) as usize;

    if v0.y == v2.y {
        return;
    }

    if (v2.x - v0.x).abs() >= MAX_PRIMITIVE_WIDTH
        || (v2.x - v1.x).abs() >= MAX_PRIMITIVE_WIDTH
        || (v1.x - v0.x).abs() >= MAX_PRIMITIVE_WIDTH
        || (v2.y - v0.y) >= MAX_PRIMITIVE_HEIGHT
    {
        return;
    }

    let base_coord = make_poly_xfp(v0.x);
    let base_step = make_poly_xfp_step(v2.x - v0.x, v2.y - v0.y);

    let (bound_coord_us, right_facing) = if v1.y == v0.y {
        (0, v1.x > v0.x)
    } else {
        let step = make_poly_xfp_step(v1.x - v0.x, v1.y - v0.y);
        (step, step > base_step)
    };
    let bound_coord_ls = if v2.y == v1.y {
        0
    } else {
        make_poly_xfp_step(v2.x - v1.x, v2.y - v1.y)
    };

    let idl = match calc_attr_deltas(state, v0, v1, v2) {
        Some(idl) => idl,
        None => return,
    };

    let vertices = [v0, v1, v2];

    let mut ig = AttrGroup::default();
    let half = 1u32 << (COORD_FBS - 1);
    if state.texture {
        ig.u = (((vertices[core_vertex].u() as u32) << COORD_FBS) + half) << COORD_POST_PADDING;
        ig.v = (((vertices[core_vertex].v() as u32) << COORD_FBS) + half) << COORD_POST_PADDING;
    }
    ig.r = (((vertices[core_vertex].r() as u32) << COORD_FBS) + half) << COORD_POST_PADDING;
    ig.g = (((vertices[core_vertex].g() as u32) << COORD_FBS) + half) << COORD_POST_PADDING;
    ig.b = (((vertices[core_vertex].b() as u32) << COORD_FBS) + half) << COORD_POST_PADDING;

    add_deltas_dx(state, &mut ig, &idl, (vertices[core_vertex].x as u32).wrapping_neg());
    add_deltas_dy(state, &mut ig, &idl, (vertices[core_vertex].y as u32).wrapping_neg());

    let (vo, vp) = match core_vertex {
        0 => (0usize, 0usize),
        2 => (1, 3),
        _ => (1, 0),
    };

    let right = usize::from(right_facing);
    let upper = TriangleHalf {
        y_coord: vertices[vo].y,
        y_bound: vertices[1 ^ vo].y,
        x_coord: {
            let mut xc = [0i64; 2];
            xc[right] = make_poly_xfp(vertices[vo].x);
            xc[1 - right] = base_coord + (vertices[vo].y - vertices[0].y) as i64 * base_step;
            xc
        },
        x_step: {
            let mut xs = [0i64; 2];
            xs[right] = bound_coord_us;
            xs[1 - right] = base_step;
            xs
        },
        dec_mode: vo != 0,
    };
    let lower = TriangleHalf {
        y_coord: vertices[1 ^ vp].y,
        y_bound: vertices[2 ^ vp].y,
        x_coord: {
            let mut xc = [0i64; 2];
            xc[right] = make_poly_xfp(vertices[1 ^ vp].x);
            xc[1 - right] = base_coord + (vertices[1 ^ vp].y - vertices[0].y) as i64 * base_step;
            xc
        },
        x_step: {
            let mut xs = [0i64; 2];
            xs[right] = bound_coord_ls;
            xs[1 - right] = base_step;
            xs
        },
        dec_mode: vp != 0,
    };

    let halves = if vo != 0 { [lower, upper] } else { [upper, lower] };
    for tp in halves {
        let mut yi = tp.y_coord;
        let yb = tp.y_bound;
        let mut lc = tp.x_coord[0];
        let ls = tp.x_step[0];
        let mut rc = tp.x_coord[1];
        let rs = tp.x_step[1];

        if tp.dec_mode {
            while yi > yb {
                yi -= 1;
                lc -= ls;
                rc -= rs;

                let y = truncate_coord(yi);
                if y < area.top as i32 {
                    break;
                }
                if y > area.bottom as i32 {
                    continue;
                }
                draw_span(state, vram, area, yi, poly_xfp_int(lc), poly_xfp_int(rc), ig, &idl);
            }
        } else {
            while yi < yb {
                let y = truncate_coord(yi);
                if y > area.bottom as i32 {
                    break;
                }
                if y >= area.top as i32 {
                    draw_span(state, vram, area, yi, poly_xfp_int(lc), poly_xfp_int(rc), ig, &idl);
                }
                yi += 1;
                lc += ls;
                rc += rs;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::record::CommandParams;
    use crate::gpu::primitives::TextureWindow;

    fn flat_state() -> DrawState {
        DrawState {
            shading: false,
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

    fn vert(x: i32, y: i32, color: u32) -> PolygonVertex {
        PolygonVertex { x, y, color, texcoord: 0 }
    }

    #[test]
    fn test_right_triangle_coverage() {
        // The classic "x + y <= 63" right triangle with a blue color.
        let mut vram = Vram::new();
        let area = DrawingArea { left: 0, top: 0, right: 63, bottom: 63 };
        let state = flat_state();
        let color = 0x00FF0000; // blue in BGR word order

        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(0, 0, color),
            &vert(63, 0, color),
            &vert(0, 63, color),
        );

        // Pixels well inside the triangle are blue, pixels past the
        // hypotenuse are untouched.
        assert_eq!(vram.get_pixel(0, 0), 0x7C00);
        assert_eq!(vram.get_pixel(30, 20), 0x7C00);
        assert_eq!(vram.get_pixel(62, 40), 0x0000);
        assert_eq!(vram.get_pixel(63, 63), 0x0000);
    }

    #[test]
    fn test_degenerate_triangle_draws_nothing() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let state = flat_state();
        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(10, 10, 0xFFFFFF),
            &vert(20, 10, 0xFFFFFF),
            &vert(15, 10, 0xFFFFFF),
        );
        assert!(vram.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_oversized_triangle_culled() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let state = flat_state();
        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(-1024, 0, 0xFFFFFF),
            &vert(1023, 0, 0xFFFFFF),
            &vert(0, 100, 0xFFFFFF),
        );
        assert!(vram.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_drawing_area_confinement() {
        let mut vram = Vram::new();
        let area = DrawingArea { left: 10, top: 10, right: 20, bottom: 20 };
        let state = flat_state();
        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(0, 0, 0xFFFFFF),
            &vert(40, 0, 0xFFFFFF),
            &vert(0, 40, 0xFFFFFF),
        );
        for y in 0..64u32 {
            for x in 0..64u32 {
                let inside = (10..=20).contains(&x) && (10..=20).contains(&y);
                if !inside {
                    assert_eq!(vram.get_pixel(x, y), 0, "pixel ({}, {})", x, y);
                }
            }
        }
        assert_ne!(vram.get_pixel(10, 10), 0);
    }

    #[test]
    fn test_mask_check_rejects_writes() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let mut state = flat_state();
        state.mask_and = 0x8000;

        for y in 0..8 {
            for x in 0..8 {
                vram.set_pixel(x, y, 0x8000);
            }
        }
        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(0, 0, 0xFFFFFF),
            &vert(8, 0, 0xFFFFFF),
            &vert(0, 8, 0xFFFFFF),
        );
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(vram.get_pixel(x, y), 0x8000);
            }
        }
    }

    #[test]
    fn test_set_mask_while_drawing() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let mut state = flat_state();
        state.mask_or = 0x8000;

        draw_triangle(
            &state,
            &mut vram,
            &area,
            &vert(0, 0, 0x0000FF),
            &vert(16, 0, 0x0000FF),
            &vert(0, 16, 0x0000FF),
        );
        assert_eq!(vram.get_pixel(1, 1), 0x801F);
    }

    #[test]
    fn test_half_average_blend() {
        // White background, near-black foreground, mode ½B+½F.
        let blended = blend_transparent(
            TransparencyMode::HalfBackgroundPlusHalfForeground,
            0x7FFF,
            0x8421,
        );
        // Each channel: (31 + 1) / 2 = 16.
        assert_eq!(blended & 0x1F, 16);
        assert_eq!((blended >> 5) & 0x1F, 16);
        assert_eq!((blended >> 10) & 0x1F, 16);
    }

    #[test]
    fn test_additive_blend_saturates() {
        let blended =
            blend_transparent(TransparencyMode::BackgroundPlusForeground, 0x7FFF, 0x7FFF);
        assert_eq!(blended & 0x7FFF, 0x7FFF);
    }

    #[test]
    fn test_subtractive_blend_saturates_to_zero() {
        let blended =
            blend_transparent(TransparencyMode::BackgroundMinusForeground, 0x0000, 0x7FFF);
        assert_eq!(blended & 0x7FFF, 0x0000);
    }

    #[test]
    fn test_quarter_blend() {
        // bg = 0, fg = white: each channel becomes 31 / 4 = 7.
        let blended = blend_transparent(
            TransparencyMode::BackgroundPlusQuarterForeground,
            0x0000,
            0x7FFF,
        );
        assert_eq!(blended & 0x1F, 7);
        assert_eq!((blended >> 5) & 0x1F, 7);
        assert_eq!((blended >> 10) & 0x1F, 7);
    }

    #[test]
    fn test_dither_lut_identity_cell() {
        // Cell (2, 3) has bias 0: plain >> 3 reduction.
        for value in 0..256u16 {
            assert_eq!(dither_lookup(false, 0, 0, value), value >> 3);
        }
    }

    #[test]
    fn test_dither_bias_extremes() {
        // Matrix cell (0, 0) carries −4: 4 reduces to 0, clamped.
        assert_eq!(dither_lookup(true, 0, 0, 4), 0);
        // Matrix cell (0, 3) carries +1.
        assert_eq!(dither_lookup(true, 3, 0, 254), 31);
    }
}
