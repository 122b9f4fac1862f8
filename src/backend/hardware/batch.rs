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

//! Draw batching
//!
//! Draw records become runs of [`HwVertex`] appended to one vertex stream;
//! a batch is flushed whenever the texture page, transparency mode, dither,
//! mask settings, texture window or scissor changes, or when the next draw
//! samples a dirty texture page.
//!
//! Vertices carry a per-primitive `uv_limits` rectangle computed from the
//! texcoord bounding box: at scale > 1, filtered sampling would otherwise
//! leak across texture page boundaries, so the fragment shader clamps to it.

use bytemuck::{Pod, Zeroable};

use crate::gpu::primitives::{DrawModeReg, RenderCommand};
use crate::queue::record::{
    CommandParams, DrawHeaderPayload, LineVertex, PolygonVertex, PrecisePolygonVertex,
    SpritePayload,
};
use crate::settings::GpuSettings;

/// One vertex as the device sees it
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct HwVertex {
    /// X in native VRAM coordinates
    pub x: f32,
    /// Y in native VRAM coordinates
    pub y: f32,
    /// Normalized depth for mask emulation
    pub z: f32,
    /// Homogeneous W (PGXP; 1.0 otherwise)
    pub w: f32,
    /// RGBA8 color (alpha unused)
    pub rgba8: u32,
    /// Draw mode register bits for the fragment shader
    pub texpage: u32,
    /// Packed u/v (low 16 bits) in texels
    pub uv: u32,
    /// Packed (min_u, min_v, max_u, max_v) clamp rectangle
    pub uv_limits: u32,
}

/// Push-constant block shared by the draw pipelines
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BatchUniforms {
    /// Texture window AND/OR masks, one byte per component
    pub texture_window: u32,
    /// Palette base X in pixels
    pub clut_x: u32,
    /// Palette base Y in pixels
    pub clut_y: u32,
    /// 1 when the displayed field must be skipped
    pub interlace_enable: u32,
    /// LSB of the displayed scanline
    pub interlace_field: u32,
    /// Force the mask bit on written pixels
    pub set_mask_bit: u32,
    /// Resolution scale factor
    pub resolution_scale: u32,
    /// Padding to a 16-byte multiple
    pub _pad: u32,
}

/// Render state a batch is homogeneous over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Draw mode register bits (texture page, mode, dither)
    pub draw_mode: u16,
    /// Palette register bits
    pub palette: u16,
    /// Resolved texture window bytes
    pub window: u32,
    /// Textured draw
    pub textured: bool,
    /// Raw (unmodulated) texturing
    pub raw_texture: bool,
    /// Semi-transparency active
    pub transparency: bool,
    /// Dithering active
    pub dither: bool,
    /// Mask check active (depth test)
    pub check_mask: bool,
    /// Mask set active
    pub set_mask: bool,
    /// Interlaced rendering active
    pub interlaced: bool,
    /// Displayed field LSB
    pub active_line_lsb: u32,
}

impl BatchConfig {
    /// Derive the batch state from a draw record head
    pub fn from_head(head: &DrawHeaderPayload, settings: &GpuSettings) -> Self {
        let rc = RenderCommand(head.rc);
        let draw_mode = DrawModeReg(head.draw_mode as u16);
        let params = CommandParams::from_bits_truncate(head.params);
        let dither = !settings.true_color
            && draw_mode.dither_enable()
            && rc.shading_enable()
            && !rc.raw_texture_enable();
        Self {
            draw_mode: head.draw_mode as u16,
            palette: head.palette as u16,
            window: u32::from_le_bytes([
                head.window.and_x,
                head.window.and_y,
                head.window.or_x,
                head.window.or_y,
            ]),
            textured: rc.texture_enable(),
            raw_texture: rc.texture_enable() && rc.raw_texture_enable(),
            transparency: rc.transparency_enable(),
            dither,
            check_mask: params.contains(CommandParams::CHECK_MASK_BEFORE_DRAW),
            set_mask: params.contains(CommandParams::SET_MASK_WHILE_DRAWING),
            interlaced: params.contains(CommandParams::INTERLACED_RENDERING),
            active_line_lsb: params.active_line_lsb(),
        }
    }
}

/// The accumulating vertex batch
pub struct DrawBatch {
    vertices: Vec<HwVertex>,
    config: Option<BatchConfig>,
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl DrawBatch {
    /// Create an empty batch
    pub fn new(_scale: u32) -> Self {
        Self {
            vertices: Vec::with_capacity(4096),
            config: None,
            min_x: i32::MAX,
            min_y: i32::MAX,
            max_x: i32::MIN,
            max_y: i32::MIN,
        }
    }

    /// Whether no vertices are queued
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// State of the queued vertices
    pub fn config(&self) -> BatchConfig {
        self.config.clone().expect("empty batch has no config")
    }

    /// Whether a draw with `config` can join the current batch
    pub fn is_compatible(&self, config: &BatchConfig) -> bool {
        match &self.config {
            None => true,
            Some(current) => current == config,
        }
    }

    /// Adopt the configuration for the next run of vertices
    pub fn begin(&mut self, config: BatchConfig, _depth: f32) {
        debug_assert!(self.is_compatible(&config));
        if self.config.is_none() {
            self.config = Some(config);
        }
    }

    /// Append vertices, growing the native-space bounds
    pub fn extend(&mut self, verts: Vec<HwVertex>) {
        for v in &verts {
            self.min_x = self.min_x.min(v.x.floor() as i32);
            self.min_y = self.min_y.min(v.y.floor() as i32);
            self.max_x = self.max_x.max(v.x.ceil() as i32);
            self.max_y = self.max_y.max(v.y.ceil() as i32);
        }
        self.vertices.extend(verts);
    }

    /// Native-space bounding box of the queued vertices
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Take the vertex run, leaving the batch empty
    pub fn take_vertices(&mut self) -> Vec<HwVertex> {
        let verts = std::mem::take(&mut self.vertices);
        self.config = None;
        self.min_x = i32::MAX;
        self.min_y = i32::MAX;
        self.max_x = i32::MIN;
        self.max_y = i32::MIN;
        verts
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.take_vertices();
    }

    /// Push constants for the queued batch
    pub fn uniforms(&self, config: &BatchConfig) -> BatchUniforms {
        let palette = crate::gpu::primitives::TexturePaletteReg(config.palette);
        BatchUniforms {
            texture_window: config.window,
            clut_x: palette.x_base(),
            clut_y: palette.y_base(),
            interlace_enable: u32::from(config.interlaced),
            interlace_field: config.active_line_lsb,
            set_mask_bit: u32::from(config.set_mask),
            resolution_scale: 1, // overwritten with the real scale on flush
            _pad: 0,
        }
    }
}

/// Packed texcoord clamp rectangle from a primitive's UV bounding box
fn uv_limits(texcoords: &[(u8, u8)]) -> u32 {
    let mut min_u = 0xFFu32;
    let mut min_v = 0xFFu32;
    let mut max_u = 0u32;
    let mut max_v = 0u32;
    for &(u, v) in texcoords {
        min_u = min_u.min(u as u32);
        min_v = min_v.min(v as u32);
        max_u = max_u.max(u as u32);
        max_v = max_v.max(v as u32);
    }
    // Pull the upper edge in by one texel so filtering cannot sample the
    // neighbouring primitive's texels.
    if max_u > min_u {
        max_u -= 1;
    }
    if max_v > min_v {
        max_v -= 1;
    }
    min_u | (min_v << 8) | (max_u << 16) | (max_v << 24)
}

/// Build vertices for an integer-position polygon
pub fn polygon_vertices(
    head: &DrawHeaderPayload,
    verts: &[PolygonVertex],
    depth: f32,
) -> Vec<HwVertex> {
    let texcoords: Vec<(u8, u8)> = verts.iter().map(|v| (v.u(), v.v())).collect();
    let limits = uv_limits(&texcoords);

    let build = |v: &PolygonVertex| HwVertex {
        x: v.x as f32,
        y: v.y as f32,
        z: depth,
        w: 1.0,
        rgba8: v.color,
        texpage: head.draw_mode,
        uv: v.texcoord & 0xFFFF,
        uv_limits: limits,
    };

    let mut out = Vec::with_capacity(6);
    out.push(build(&verts[0]));
    out.push(build(&verts[1]));
    out.push(build(&verts[2]));
    if verts.len() == 4 {
        out.push(build(&verts[2]));
        out.push(build(&verts[1]));
        out.push(build(&verts[3]));
    }
    out
}

/// Build vertices for a PGXP polygon
///
/// Uses the sub-pixel float positions; `w` feeds perspective-correct
/// interpolation and, when `pgxp_depth` is set, the depth buffer.
pub fn precise_polygon_vertices(
    head: &DrawHeaderPayload,
    verts: &[PrecisePolygonVertex],
    depth: f32,
    pgxp_depth: bool,
) -> Vec<HwVertex> {
    let texcoords: Vec<(u8, u8)> = verts
        .iter()
        .map(|v| ((v.texcoord & 0xFF) as u8, ((v.texcoord >> 8) & 0xFF) as u8))
        .collect();
    let limits = uv_limits(&texcoords);

    let build = |v: &PrecisePolygonVertex| HwVertex {
        x: v.x,
        y: v.y,
        z: if pgxp_depth { (1.0 / v.w.max(1e-6)).min(1.0) } else { depth },
        w: v.w,
        rgba8: v.color,
        texpage: head.draw_mode,
        uv: v.texcoord & 0xFFFF,
        uv_limits: limits,
    };

    let mut out = Vec::with_capacity(6);
    out.push(build(&verts[0]));
    out.push(build(&verts[1]));
    out.push(build(&verts[2]));
    if verts.len() == 4 {
        out.push(build(&verts[2]));
        out.push(build(&verts[1]));
        out.push(build(&verts[3]));
    }
    out
}

/// Build the two-triangle quad for a rectangle
///
/// At scale > 1, nearest sampling of an axis-aligned quad whose U decreases
/// with X (or V with Y) lands one texel off; the affected coordinates are
/// nudged by one. Quads with differing vertex w values are 3D and must not
/// be rewritten, which cannot happen here because rectangles are always
/// affine.
pub fn sprite_vertices(
    head: &DrawHeaderPayload,
    sprite: &SpritePayload,
    depth: f32,
    scale: u32,
) -> Vec<HwVertex> {
    let draw_mode = DrawModeReg(head.draw_mode as u16);
    let flip_x = draw_mode.texture_x_flip();
    let flip_y = draw_mode.texture_y_flip();
    let mut u0 = (sprite.texcoord & 0xFF) as u32;
    let mut v0 = ((sprite.texcoord >> 8) & 0xFF) as u32;

    // dU/dX < 0 with dU/dY == 0 (mirrored sampling): shift by one so nearest
    // sampling at scale > 1 lands on the texel the hardware would hit. Same
    // for V.
    if scale > 1 {
        if flip_x {
            u0 += 1;
        }
        if flip_y {
            v0 += 1;
        }
    }

    let (min_u, max_u) = if flip_x {
        (u0.saturating_sub(sprite.width - 1), u0)
    } else {
        (u0, (u0 + sprite.width - 1).min(0xFF))
    };
    let (min_v, max_v) = if flip_y {
        (v0.saturating_sub(sprite.height - 1), v0)
    } else {
        (v0, (v0 + sprite.height - 1).min(0xFF))
    };
    let limits = uv_limits(&[(min_u as u8, min_v as u8), (max_u as u8, max_v as u8)]);

    let x0 = sprite.x as f32;
    let y0 = sprite.y as f32;
    let x1 = (sprite.x + sprite.width as i32) as f32;
    let y1 = (sprite.y + sprite.height as i32) as f32;

    let build = |x: f32, y: f32, u: u32, v: u32| HwVertex {
        x,
        y,
        z: depth,
        w: 1.0,
        rgba8: sprite.color,
        texpage: head.draw_mode,
        uv: (u & 0xFF) | ((v & 0xFF) << 8),
        uv_limits: limits,
    };

    let u_end = if flip_x { u0.wrapping_sub(sprite.width) } else { u0 + sprite.width };
    let v_end = if flip_y { v0.wrapping_sub(sprite.height) } else { v0 + sprite.height };
    vec![
        build(x0, y0, u0, v0),
        build(x1, y0, u_end, v0),
        build(x0, y1, u0, v_end),
        build(x0, y1, u0, v_end),
        build(x1, y0, u_end, v0),
        build(x1, y1, u_end, v_end),
    ]
}

/// Expand line segments into screen-facing quads one native pixel wide
pub fn line_vertices(
    head: &DrawHeaderPayload,
    verts: &[LineVertex],
    depth: f32,
    _scale: u32,
) -> Vec<HwVertex> {
    let mut out = Vec::with_capacity((verts.len().saturating_sub(1)) * 6);
    for pair in verts.windows(2) {
        let (p0, p1) = (&pair[0], &pair[1]);
        let dx = (p1.x - p0.x) as f32;
        let dy = (p1.y - p0.y) as f32;
        let len = (dx * dx + dy * dy).sqrt();
        // Perpendicular half-extent; degenerate segments become a pixel.
        let (nx, ny) = if len > 0.0 {
            (-dy / len * 0.5, dx / len * 0.5)
        } else {
            (0.5, 0.0)
        };

        let build = |x: f32, y: f32, color: u32| HwVertex {
            x,
            y,
            z: depth,
            w: 1.0,
            rgba8: color,
            texpage: head.draw_mode,
            uv: 0,
            uv_limits: 0,
        };

        let a0 = build(p0.x as f32 + 0.5 - nx, p0.y as f32 + 0.5 - ny, p0.color);
        let a1 = build(p0.x as f32 + 0.5 + nx, p0.y as f32 + 0.5 + ny, p0.color);
        let b0 = build(p1.x as f32 + 0.5 - nx, p1.y as f32 + 0.5 - ny, p1.color);
        let b1 = build(p1.x as f32 + 0.5 + nx, p1.y as f32 + 0.5 + ny, p1.color);
        out.extend_from_slice(&[a0, a1, b0, b0, a1, b1]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::primitives::TextureWindow;

    fn head(rc: u32) -> DrawHeaderPayload {
        DrawHeaderPayload {
            rc,
            draw_mode: 0,
            palette: 0,
            window: TextureWindow::default(),
            params: 0,
            num_vertices: 0,
        }
    }

    #[test]
    fn test_uv_limits_shrink() {
        let limits = uv_limits(&[(0, 0), (63, 31)]);
        assert_eq!(limits & 0xFF, 0);
        assert_eq!((limits >> 8) & 0xFF, 0);
        assert_eq!((limits >> 16) & 0xFF, 62);
        assert_eq!((limits >> 24) & 0xFF, 30);

        // Degenerate box keeps its single texel.
        let limits = uv_limits(&[(5, 7), (5, 7)]);
        assert_eq!((limits >> 16) & 0xFF, 5);
        assert_eq!((limits >> 24) & 0xFF, 7);
    }

    #[test]
    fn test_quad_becomes_six_vertices() {
        let verts = [
            PolygonVertex { x: 0, y: 0, color: 0, texcoord: 0 },
            PolygonVertex { x: 10, y: 0, color: 0, texcoord: 0 },
            PolygonVertex { x: 0, y: 10, color: 0, texcoord: 0 },
            PolygonVertex { x: 10, y: 10, color: 0, texcoord: 0 },
        ];
        let hw = polygon_vertices(&head(0x2800_0000), &verts, 0.5);
        assert_eq!(hw.len(), 6);
        // Second triangle is (v2, v1, v3).
        assert_eq!((hw[3].x, hw[3].y), (0.0, 10.0));
        assert_eq!((hw[4].x, hw[4].y), (10.0, 0.0));
        assert_eq!((hw[5].x, hw[5].y), (10.0, 10.0));
    }

    #[test]
    fn test_batch_flush_resets_bounds() {
        let mut batch = DrawBatch::new(1);
        assert!(batch.is_empty());

        let config = BatchConfig::from_head(&head(0x2000_0000), &GpuSettings::default());
        batch.begin(config, 0.5);
        batch.extend(vec![HwVertex {
            x: 5.0,
            y: 6.0,
            z: 0.5,
            w: 1.0,
            rgba8: 0,
            texpage: 0,
            uv: 0,
            uv_limits: 0,
        }]);
        assert_eq!(batch.bounds(), (5, 6, 5, 6));

        let verts = batch.take_vertices();
        assert_eq!(verts.len(), 1);
        assert!(batch.is_empty());
        assert!(batch.is_compatible(&BatchConfig::from_head(
            &head(0x2600_0000),
            &GpuSettings::default()
        )));
    }

    #[test]
    fn test_config_separates_transparency() {
        let settings = GpuSettings::default();
        let opaque = BatchConfig::from_head(&head(0x2000_0000), &settings);
        let transparent = BatchConfig::from_head(&head(0x2200_0000), &settings);
        assert_ne!(opaque, transparent);
    }
}
