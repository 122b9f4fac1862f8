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

//! Software rasterizer backend
//!
//! The reference backend: reproduces hardware pixel semantics exactly in the
//! shadow VRAM. It also remains the authority for GPUREAD readback while the
//! hardware backend is active, which is why transfers always go through the
//! shadow first.
//!
//! The polygon and line rasterization follows the Mednafen-lineage
//! fixed-point algorithms; see `raster.rs` and `line.rs`.

mod line;
mod raster;
mod scanout;
mod sprite;

use crate::backend::{BackendContext, GpuBackend, PresentedFrame};
use crate::device::GpuDevice;
use crate::gpu::primitives::{
    DrawModeReg, DrawingArea, RenderCommand, TextureMode, TexturePaletteReg, TextureWindow,
    TransparencyMode,
};
use crate::queue::record::{
    CommandParams, CopyVramPayload, DrawHeaderPayload, FillVramPayload, LineVertex, PolygonVertex,
    PrecisePolygonVertex, ReadVramPayload, SpritePayload, UpdateDisplayPayload, UpdateVramPayload,
};
use crate::settings::{FramePixelFormat, GpuSettings};
use crate::vram::Vram;

/// Per-draw state resolved once from the record head
///
/// The rasterizer inner loops branch on these flags; resolving the register
/// fields up front keeps the per-pixel path to table lookups and masks.
pub(crate) struct DrawState {
    /// Gouraud shading active
    pub shading: bool,
    /// Texture mapping active
    pub texture: bool,
    /// Use the texel unmodulated
    pub raw_texture: bool,
    /// Semi-transparency active
    pub transparency: bool,
    /// Ordered dither active
    pub dithering: bool,
    /// Blend mode for semi-transparent pixels
    pub transparency_mode: TransparencyMode,
    /// Texel color mode
    pub texture_mode: TextureMode,
    /// Texture page base X in pixels
    pub texpage_x: u32,
    /// Texture page base Y in pixels
    pub texpage_y: u32,
    /// CLUT base X in pixels
    pub clut_x: u32,
    /// CLUT base Y in pixels
    pub clut_y: u32,
    /// Resolved texture window
    pub window: TextureWindow,
    /// Mask/interlace snapshot
    pub params: CommandParams,
    /// Destination reject mask (0x8000 when mask-checking)
    pub mask_and: u16,
    /// Written-pixel OR mask (0x8000 when mask-setting)
    pub mask_or: u16,
}

impl DrawState {
    fn from_head(head: &DrawHeaderPayload, shading: bool, texture: bool, dithering: bool) -> Self {
        let rc = RenderCommand(head.rc);
        let draw_mode = DrawModeReg(head.draw_mode as u16);
        let palette = TexturePaletteReg(head.palette as u16);
        let params = CommandParams::from_bits_truncate(head.params);
        Self {
            shading,
            texture,
            raw_texture: texture && rc.raw_texture_enable(),
            transparency: rc.transparency_enable(),
            dithering,
            transparency_mode: draw_mode.transparency_mode(),
            texture_mode: draw_mode.texture_mode(),
            texpage_x: draw_mode.texture_page_base_x(),
            texpage_y: draw_mode.texture_page_base_y(),
            clut_x: palette.x_base(),
            clut_y: palette.y_base(),
            window: head.window,
            params,
            mask_and: params.mask_and(),
            mask_or: params.mask_or(),
        }
    }

    /// State for a polygon record
    pub fn for_polygon(head: &DrawHeaderPayload) -> Self {
        let rc = RenderCommand(head.rc);
        let draw_mode = DrawModeReg(head.draw_mode as u16);
        let dithering =
            draw_mode.dither_enable() && rc.shading_enable() && !rc.raw_texture_enable();
        Self::from_head(head, rc.shading_enable(), rc.texture_enable(), dithering)
    }

    /// State for a rectangle record (no shading, never dithered)
    pub fn for_sprite(head: &DrawHeaderPayload) -> Self {
        let rc = RenderCommand(head.rc);
        Self::from_head(head, false, rc.texture_enable(), false)
    }

    /// State for a line record (no texturing)
    pub fn for_line(head: &DrawHeaderPayload) -> Self {
        let rc = RenderCommand(head.rc);
        let draw_mode = DrawModeReg(head.draw_mode as u16);
        let dithering = draw_mode.dither_enable() && rc.shading_enable();
        Self::from_head(head, rc.shading_enable(), false, dithering)
    }
}

/// Accumulated scanout image
///
/// Interlaced frames write one field at a time, so the image persists across
/// presents and re-presenting without new draws returns identical pixels.
pub(crate) struct FrameBuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FramePixelFormat,
    /// Packed pixel data
    pub pixels: Vec<u8>,
    /// Aspect ratio of the last update
    pub aspect: f32,
    /// Interlaced scanout active
    pub interlaced: bool,
}

impl FrameBuffer {
    fn new(format: FramePixelFormat) -> Self {
        Self {
            width: 0,
            height: 0,
            format,
            pixels: Vec::new(),
            aspect: 4.0 / 3.0,
            interlaced: false,
        }
    }

    /// Resize and clear when the geometry or format changes
    pub fn configure(&mut self, width: u32, height: u32, format: FramePixelFormat) {
        if self.width != width || self.height != height || self.format != format {
            self.width = width;
            self.height = height;
            self.format = format;
            self.pixels.clear();
            self.pixels
                .resize(width as usize * height as usize * format.bytes_per_pixel(), 0);
        }
    }

    fn to_frame(&self) -> PresentedFrame {
        PresentedFrame {
            width: self.width,
            height: self.height,
            format: self.format,
            pixels: self.pixels.clone(),
            aspect: self.aspect,
            interlaced: self.interlaced,
        }
    }
}

/// The software rasterizer backend
pub struct SoftwareBackend {
    ctx: BackendContext,
    drawing_area: DrawingArea,
    frame: FrameBuffer,
    has_frame: bool,
}

impl SoftwareBackend {
    /// Create a software backend
    pub fn new(ctx: BackendContext) -> Self {
        let format = ctx.settings.frame_format;
        Self {
            ctx,
            drawing_area: DrawingArea::default(),
            frame: FrameBuffer::new(format),
            has_frame: false,
        }
    }
}

impl GpuBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn reset(&mut self, vram: &mut Vram, clear_vram: bool) {
        if clear_vram {
            vram.clear();
        }
        self.drawing_area = DrawingArea::default();
        self.has_frame = false;
    }

    fn drawing_area_changed(&mut self, area: DrawingArea) {
        self.drawing_area = area;
    }

    fn fill_vram(&mut self, vram: &mut Vram, p: &FillVramPayload) {
        vram.fill(
            p.x as u32,
            p.y as u32,
            p.width as u32,
            p.height as u32,
            p.color,
            CommandParams::from_bits_truncate(p.params),
        );
    }

    fn update_vram(&mut self, vram: &mut Vram, p: &UpdateVramPayload, data: &[u16]) {
        vram.update(
            p.x as u32,
            p.y as u32,
            p.width as u32,
            p.height as u32,
            data,
            CommandParams::from_bits_truncate(p.params),
        );
    }

    fn copy_vram(&mut self, vram: &mut Vram, p: &CopyVramPayload) {
        vram.copy(
            p.src_x as u32,
            p.src_y as u32,
            p.dst_x as u32,
            p.dst_y as u32,
            p.width as u32,
            p.height as u32,
            CommandParams::from_bits_truncate(p.params),
        );
    }

    fn read_vram(&mut self, _vram: &mut Vram, _p: &ReadVramPayload) {
        // The shadow is the render target; it is already bit-exact.
    }

    fn draw_polygon(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, verts: &[PolygonVertex]) {
        let state = DrawState::for_polygon(head);
        raster::draw_triangle(&state, vram, &self.drawing_area, &verts[0], &verts[1], &verts[2]);
        if verts.len() == 4 {
            raster::draw_triangle(&state, vram, &self.drawing_area, &verts[2], &verts[1], &verts[3]);
        }
    }

    fn draw_precise_polygon(
        &mut self,
        vram: &mut Vram,
        head: &DrawHeaderPayload,
        verts: &[PrecisePolygonVertex],
    ) {
        // PGXP data is ignored by design; rasterize the native positions.
        let native: Vec<PolygonVertex> = verts.iter().map(|v| v.to_native()).collect();
        self.draw_polygon(vram, head, &native);
    }

    fn draw_sprite(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, sprite: &SpritePayload) {
        let state = DrawState::for_sprite(head);
        sprite::draw_sprite(&state, vram, &self.drawing_area, sprite);
    }

    fn draw_line(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, verts: &[LineVertex]) {
        let state = DrawState::for_line(head);
        for pair in verts.windows(2) {
            line::draw_line(&state, vram, &self.drawing_area, &pair[0], &pair[1]);
        }
    }

    fn flush(&mut self) {}

    fn update_display(&mut self, vram: &Vram, p: &UpdateDisplayPayload) -> Option<PresentedFrame> {
        let format = self.ctx.settings.frame_format;
        scanout::render_display(&mut self.frame, vram, p, format);
        self.has_frame = true;
        if p.display_flags().contains(crate::queue::record::DisplayFlags::PRESENT) {
            Some(self.frame.to_frame())
        } else {
            None
        }
    }

    fn clear_display(&mut self) {
        self.frame.pixels.fill(0);
        self.has_frame = false;
    }

    fn present_current_frame(&mut self, _vram: &Vram) -> Option<PresentedFrame> {
        if self.has_frame {
            Some(self.frame.to_frame())
        } else {
            None
        }
    }

    fn update_settings(&mut self, _old: &GpuSettings, new: &GpuSettings) {
        self.ctx.settings = new.clone();
    }

    fn update_vsync(&mut self, _vsync: bool) {}

    fn take_device(&mut self) -> Option<Box<dyn GpuDevice>> {
        None
    }
}
