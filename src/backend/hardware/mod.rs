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

//! Hardware rasterizer backend
//!
//! Renders into a VRAM-sized render target scaled by an integer factor,
//! through the [`crate::device::GpuDevice`] abstraction. Matches the
//! software backend visually rather than bit-exactly: transfers keep the
//! shadow VRAM authoritative, and `read_vram` mirrors drawn regions back
//! into the shadow before the parser reads them.
//!
//! Key mechanisms:
//! - draw batching with flushes on render-state changes (`batch.rs`)
//! - lazily compiled pipeline variants with an on-disk cache (`pipeline.rs`)
//! - mask-bit emulation through a monotonically decreasing depth counter
//! - texture-page dirty tracking with lazy `vram_rt` → `vram_read` resolves
//! - box/adaptive downsampling for upscaled output (`downsample.rs`)

mod batch;
mod downsample;
mod pipeline;
mod shadergen;
mod transfer;

use crate::backend::{BackendContext, GpuBackend, PresentedFrame};
use crate::device::shader_cache::ShaderCache;
use crate::device::{
    GpuDevice, SamplerDesc, SamplerFilter, SamplerHandle, TextureDesc, TextureFormat,
    TextureHandle, TextureType,
};
use crate::error::GpuError;
use crate::gpu::primitives::{DrawModeReg, DrawingArea, RenderCommand, TextureMode, TexturePaletteReg};
use crate::queue::record::{
    CommandParams, CopyVramPayload, DrawHeaderPayload, FillVramPayload, LineVertex, PolygonVertex,
    PrecisePolygonVertex, ReadVramPayload, SpritePayload, UpdateDisplayPayload, UpdateVramPayload,
};
use crate::settings::{GpuSettings, MessageSeverity};
use crate::vram::{Vram, VRAM_HEIGHT, VRAM_WIDTH};

use batch::{BatchConfig, DrawBatch};
use downsample::Downsampler;
use pipeline::PipelineCache;

/// Depth value assigned to mask-set pixels
const MASKED_DEPTH: u16 = u16::MAX;

/// An inclusive-exclusive dirty rectangle in native VRAM coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirtyRect {
    /// Left edge (inclusive)
    pub x0: u32,
    /// Top edge (inclusive)
    pub y0: u32,
    /// Right edge (exclusive)
    pub x1: u32,
    /// Bottom edge (exclusive)
    pub y1: u32,
}

impl DirtyRect {
    /// Empty marker rectangle
    pub const EMPTY: DirtyRect = DirtyRect { x0: u32::MAX, y0: u32::MAX, x1: 0, y1: 0 };

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Grow to include another rectangle
    pub fn include(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        self.x0 = self.x0.min(x0);
        self.y0 = self.y0.min(y0);
        self.x1 = self.x1.max(x1.min(VRAM_WIDTH as u32));
        self.y1 = self.y1.max(y1.min(VRAM_HEIGHT as u32));
    }

    /// Whether two rectangles overlap
    pub fn intersects(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        !self.is_empty() && self.x0 < x1 && x0 < self.x1 && self.y0 < y1 && y0 < self.y1
    }
}

/// The hardware backend
pub struct HardwareBackend {
    ctx: BackendContext,
    device: Option<Box<dyn GpuDevice>>,

    /// Integer upscale factor
    scale: u32,
    /// MSAA samples on the VRAM render target
    msaa: u32,

    /// Scaled VRAM color target
    vram_rt: TextureHandle,
    /// Mask-bit depth target
    vram_depth: TextureHandle,
    /// Single-sampled sampling copy of `vram_rt`
    vram_read: TextureHandle,
    /// Native-resolution staging texture for CPU→VRAM uploads
    upload_tex: TextureHandle,

    /// Point and linear samplers
    sampler_nearest: SamplerHandle,
    sampler_linear: SamplerHandle,

    pipelines: PipelineCache,
    batch: DrawBatch,
    downsampler: Downsampler,

    /// Area of `vram_rt` drawn since the last `vram_read` refresh
    dirty_drawn: DirtyRect,
    /// Area of `vram_rt` written by transfers since the last refresh
    dirty_written: DirtyRect,
    /// Drawn area not yet mirrored back into the shadow VRAM
    shadow_stale: DirtyRect,

    /// CPU-mapped readback staging (created on first use)
    vram_readback: TextureHandle,
    /// Size of `vram_readback`
    readback_size: (u32, u32),

    /// Monotonically decreasing per-primitive depth (mask emulation)
    current_depth: u16,

    drawing_area: DrawingArea,
    last_display: Option<UpdateDisplayPayload>,
}

impl HardwareBackend {
    /// Create the backend on a device
    ///
    /// Returns the context and error on failure so the caller can fall back
    /// to the software backend.
    pub fn new(
        ctx: BackendContext,
        mut device: Box<dyn GpuDevice>,
    ) -> std::result::Result<Self, (BackendContext, GpuError)> {
        let scale = ctx.settings.resolution_scale.max(1);
        let msaa = ctx.settings.msaa_samples.max(1);
        let width = VRAM_WIDTH as u32 * scale;
        let height = VRAM_HEIGHT as u32 * scale;

        let create = |device: &mut Box<dyn GpuDevice>,
                      ty: TextureType,
                      format: TextureFormat,
                      samples: u32|
         -> std::result::Result<TextureHandle, GpuError> {
            device.create_texture(&TextureDesc {
                width,
                height,
                mip_levels: 1,
                samples,
                ty,
                format,
            })
        };

        let resources = (|| {
            let vram_rt = create(&mut device, TextureType::RenderTarget, TextureFormat::Rgba8, msaa)?;
            let vram_depth = create(&mut device, TextureType::DepthStencil, TextureFormat::D16, msaa)?;
            let vram_read = create(&mut device, TextureType::Texture, TextureFormat::Rgba8, 1)?;
            let upload_tex = device.create_texture(&TextureDesc::flat(
                VRAM_WIDTH as u32,
                VRAM_HEIGHT as u32,
                TextureType::Dynamic,
                TextureFormat::R16U,
            ))?;
            let sampler_nearest =
                device.create_sampler(&SamplerDesc { filter: SamplerFilter::Nearest })?;
            let sampler_linear =
                device.create_sampler(&SamplerDesc { filter: SamplerFilter::Linear })?;
            Ok::<_, GpuError>((vram_rt, vram_depth, vram_read, upload_tex, sampler_nearest, sampler_linear))
        })();

        let (vram_rt, vram_depth, vram_read, upload_tex, sampler_nearest, sampler_linear) =
            match resources {
                Ok(r) => r,
                Err(e) => return Err((ctx, e)),
            };

        let shader_cache = ctx
            .settings
            .shader_cache_path
            .as_deref()
            .and_then(|dir| match ShaderCache::open(dir) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("shader cache unavailable: {}", e);
                    None
                }
            });

        let features = device.features();
        log::info!(
            "hardware backend on '{}': scale {}, msaa {}, features {:?}",
            device.name(),
            scale,
            msaa,
            features
        );

        let mut backend = Self {
            pipelines: PipelineCache::new(shader_cache, features, ctx.settings.clone(), msaa),
            batch: DrawBatch::new(scale),
            downsampler: Downsampler::new(ctx.settings.downsample_mode, scale),
            ctx,
            device: Some(device),
            scale,
            msaa,
            vram_rt,
            vram_depth,
            vram_read,
            upload_tex,
            sampler_nearest,
            sampler_linear,
            dirty_drawn: DirtyRect::EMPTY,
            dirty_written: DirtyRect::EMPTY,
            shadow_stale: DirtyRect::EMPTY,
            vram_readback: TextureHandle::INVALID,
            readback_size: (0, 0),
            current_depth: MASKED_DEPTH - 1,
            drawing_area: DrawingArea::default(),
            last_display: None,
        };
        backend.clear_targets();
        Ok(backend)
    }

    fn dev(&mut self) -> &mut dyn GpuDevice {
        self.device.as_mut().expect("device already taken").as_mut()
    }

    fn clear_targets(&mut self) {
        let (rt, depth) = (self.vram_rt, self.vram_depth);
        let device = self.dev();
        device.clear_render_target(rt, [0.0; 4]);
        device.clear_depth(depth, 0.0);
        self.current_depth = MASKED_DEPTH - 1;
        self.dirty_drawn = DirtyRect::EMPTY;
        self.dirty_written = DirtyRect::EMPTY;
        self.shadow_stale = DirtyRect::EMPTY;
    }

    /// Next primitive depth in normalized [0, 1]
    fn pop_depth(&mut self, params: CommandParams) -> f32 {
        if self.current_depth == 0 {
            self.reset_depth_buffer();
        }
        let depth = self.current_depth as f32 / MASKED_DEPTH as f32;
        if params.contains(CommandParams::SET_MASK_WHILE_DRAWING) {
            // Subsequent draws must sort above the pixels this one masks.
            self.current_depth -= 1;
        }
        depth
    }

    /// Rebuild the depth buffer from the color target's mask bits once the
    /// counter saturates
    fn reset_depth_buffer(&mut self) {
        log::debug!("depth counter saturated, rebuilding depth from mask bits");
        self.flush_batch();
        self.sync_vram_read_full();

        let key = pipeline::PipelineKey::depth_reset();
        if let Some(pipe) = self.pipelines.get(self.device.as_mut().unwrap().as_mut(), key) {
            let (rt, depth_rt, read, sampler, scale) = (
                self.vram_rt,
                self.vram_depth,
                self.vram_read,
                self.sampler_nearest,
                self.scale,
            );
            let device = self.dev();
            device.set_render_targets(&[rt], Some(depth_rt));
            device.set_pipeline(pipe);
            device.set_viewport(0, 0, VRAM_WIDTH as u32 * scale, VRAM_HEIGHT as u32 * scale);
            device.set_scissor(0, 0, VRAM_WIDTH as u32 * scale, VRAM_HEIGHT as u32 * scale);
            device.bind_texture(0, read);
            device.bind_sampler(0, sampler);
            device.draw(3, 0);
        }
        self.current_depth = MASKED_DEPTH - 1;
    }

    /// Refresh the whole `vram_read` copy
    fn sync_vram_read_full(&mut self) {
        self.dirty_drawn.include(0, 0, VRAM_WIDTH as u32, VRAM_HEIGHT as u32);
        self.update_vram_read_cache();
    }

    /// Resolve dirty regions of `vram_rt` into `vram_read`
    fn update_vram_read_cache(&mut self) {
        let mut rect = self.dirty_drawn;
        if !self.dirty_written.is_empty() {
            rect.include(
                self.dirty_written.x0,
                self.dirty_written.y0,
                self.dirty_written.x1,
                self.dirty_written.y1,
            );
        }
        if rect.is_empty() {
            return;
        }

        let scale = self.scale;
        let (x0, y0) = (rect.x0 * scale, rect.y0 * scale);
        let (w, h) = ((rect.x1 - rect.x0) * scale, (rect.y1 - rect.y0) * scale);
        let (rt, read, msaa) = (self.vram_rt, self.vram_read, self.msaa);
        let device = self.dev();
        if msaa > 1 {
            device.resolve_texture_region(read, x0, y0, rt, x0, y0, w, h);
        } else {
            device.copy_texture_region(read, x0, y0, rt, x0, y0, w, h);
        }
        self.dirty_drawn = DirtyRect::EMPTY;
        self.dirty_written = DirtyRect::EMPTY;
    }

    /// Flush the pending batch if the texture page or CLUT of the next draw
    /// overlaps a dirty region, then refresh the sampling copy
    fn check_texture_page_dirty(&mut self, head: &DrawHeaderPayload) {
        let rc = RenderCommand(head.rc);
        if !rc.texture_enable() {
            return;
        }
        let draw_mode = DrawModeReg(head.draw_mode as u16);
        let (px, py, pw, ph) = draw_mode.texture_page_rect();
        let mut dirty = self.dirty_drawn.intersects(px, py, px + pw, py + ph)
            || self.dirty_written.intersects(px, py, px + pw, py + ph);

        if !dirty && draw_mode.texture_mode() != TextureMode::Direct16 {
            let palette = TexturePaletteReg(head.palette as u16);
            let (cx, cy, cw, ch) = palette.rect(draw_mode.texture_mode());
            dirty = self.dirty_drawn.intersects(cx, cy, cx + cw, cy + ch)
                || self.dirty_written.intersects(cx, cy, cx + cw, cy + ch);
        }

        if dirty {
            self.flush_batch();
            self.update_vram_read_cache();
        }
    }

    /// Record a drawn region for dirty tracking
    fn add_drawn_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let x0 = x0.clamp(self.drawing_area.left as i32, self.drawing_area.right as i32 + 1);
        let x1 = x1.clamp(self.drawing_area.left as i32, self.drawing_area.right as i32 + 1);
        let y0 = y0.clamp(self.drawing_area.top as i32, self.drawing_area.bottom as i32 + 1);
        let y1 = y1.clamp(self.drawing_area.top as i32, self.drawing_area.bottom as i32 + 1);
        if x0 < x1 && y0 < y1 {
            self.dirty_drawn.include(x0 as u32, y0 as u32, x1 as u32, y1 as u32);
            self.shadow_stale.include(x0 as u32, y0 as u32, x1 as u32, y1 as u32);
        }
    }

    /// Flush queued vertices as one or two draw calls
    fn flush_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let config = self.batch.config();
        let (bx0, by0, bx1, by1) = self.batch.bounds();
        let verts = self.batch.take_vertices();

        let scale = self.scale;
        let area = self.drawing_area;
        let vram_read = self.vram_read;
        let sampler = self.sampler_nearest;
        let (rt, depth_rt) = (self.vram_rt, self.vram_depth);

        let passes = self.pipelines.passes_for(config.clone());
        let device = self.device.as_mut().expect("device already taken");

        let data: &[u8] = bytemuck::cast_slice(&verts);
        let base = device.upload_vertices(data, std::mem::size_of::<batch::HwVertex>());

        device.set_render_targets(&[rt], Some(depth_rt));
        device.set_viewport(
            0,
            0,
            VRAM_WIDTH as u32 * scale,
            VRAM_HEIGHT as u32 * scale,
        );
        device.set_scissor(
            (area.left * scale) as i32,
            (area.top * scale) as i32,
            (area.right + 1 - area.left) * scale,
            (area.bottom + 1 - area.top) * scale,
        );
        device.bind_texture(0, vram_read);
        device.bind_sampler(0, sampler);

        let mut uniforms = self.batch.uniforms(&config);
        uniforms.resolution_scale = scale;
        device.push_uniforms(bytemuck::bytes_of(&uniforms));

        let mut drew = false;
        for key in passes {
            match self.pipelines.get(device.as_mut(), key) {
                Some(pipe) => {
                    device.set_pipeline(pipe);
                    device.draw(verts.len() as u32, base);
                    drew = true;
                }
                None => {
                    self.ctx.report(
                        MessageSeverity::Error,
                        "pipeline compilation failed, dropping batch",
                    );
                }
            }
        }

        if drew {
            self.add_drawn_rect(bx0, by0, bx1, by1);
        }
    }

    /// Ingest a draw's vertices, flushing first when state changes
    fn queue_draw(&mut self, head: &DrawHeaderPayload, verts: Vec<batch::HwVertex>, depth: f32) {
        let config = BatchConfig::from_head(head, self.pipelines.settings());
        if !self.batch.is_compatible(&config) {
            self.flush_batch();
        }
        self.batch.begin(config, depth);
        self.batch.extend(verts);
    }
}

impl GpuBackend for HardwareBackend {
    fn name(&self) -> &'static str {
        "hardware"
    }

    fn reset(&mut self, vram: &mut Vram, clear_vram: bool) {
        self.batch.clear();
        if clear_vram {
            vram.clear();
        }
        self.clear_targets();
        self.drawing_area = DrawingArea::default();
        self.last_display = None;
    }

    fn drawing_area_changed(&mut self, area: DrawingArea) {
        if area != self.drawing_area {
            self.flush_batch();
            self.drawing_area = area;
        }
    }

    fn fill_vram(&mut self, vram: &mut Vram, p: &FillVramPayload) {
        self.flush_batch();
        vram.fill(
            p.x as u32,
            p.y as u32,
            p.width as u32,
            p.height as u32,
            p.color,
            CommandParams::from_bits_truncate(p.params),
        );
        transfer::fill_vram_on_device(self, p);
    }

    fn update_vram(&mut self, vram: &mut Vram, p: &UpdateVramPayload, data: &[u16]) {
        self.flush_batch();
        vram.update(
            p.x as u32,
            p.y as u32,
            p.width as u32,
            p.height as u32,
            data,
            CommandParams::from_bits_truncate(p.params),
        );
        transfer::update_vram_on_device(self, p, data);
    }

    fn copy_vram(&mut self, vram: &mut Vram, p: &CopyVramPayload) {
        self.flush_batch();
        vram.copy(
            p.src_x as u32,
            p.src_y as u32,
            p.dst_x as u32,
            p.dst_y as u32,
            p.width as u32,
            p.height as u32,
            CommandParams::from_bits_truncate(p.params),
        );
        transfer::copy_vram_on_device(self, p);
    }

    fn read_vram(&mut self, vram: &mut Vram, p: &ReadVramPayload) {
        self.flush_batch();
        transfer::read_vram_from_device(self, vram, p);
    }

    fn draw_polygon(&mut self, _vram: &mut Vram, head: &DrawHeaderPayload, verts: &[PolygonVertex]) {
        self.check_texture_page_dirty(head);
        let params = CommandParams::from_bits_truncate(head.params);
        let depth = self.pop_depth(params);
        let hw_verts = batch::polygon_vertices(head, verts, depth);
        self.queue_draw(head, hw_verts, depth);
    }

    fn draw_precise_polygon(
        &mut self,
        _vram: &mut Vram,
        head: &DrawHeaderPayload,
        verts: &[PrecisePolygonVertex],
    ) {
        self.check_texture_page_dirty(head);
        let params = CommandParams::from_bits_truncate(head.params);
        let depth = self.pop_depth(params);
        let pgxp_depth = self.pipelines.settings().pgxp_depth_buffer;
        let hw_verts = batch::precise_polygon_vertices(head, verts, depth, pgxp_depth);
        self.queue_draw(head, hw_verts, depth);
    }

    fn draw_sprite(&mut self, _vram: &mut Vram, head: &DrawHeaderPayload, sprite: &SpritePayload) {
        self.check_texture_page_dirty(head);
        let params = CommandParams::from_bits_truncate(head.params);
        let depth = self.pop_depth(params);
        let hw_verts = batch::sprite_vertices(head, sprite, depth, self.scale);
        self.queue_draw(head, hw_verts, depth);
    }

    fn draw_line(&mut self, _vram: &mut Vram, head: &DrawHeaderPayload, verts: &[LineVertex]) {
        let params = CommandParams::from_bits_truncate(head.params);
        let depth = self.pop_depth(params);
        let hw_verts = batch::line_vertices(head, verts, depth, self.scale);
        // Lines never sample textures, but still flush on state changes.
        self.queue_draw(head, hw_verts, depth);
    }

    fn flush(&mut self) {
        self.flush_batch();
    }

    fn update_display(&mut self, vram: &Vram, p: &UpdateDisplayPayload) -> Option<PresentedFrame> {
        self.flush_batch();
        self.last_display = Some(*p);
        if p.display_flags().contains(crate::queue::record::DisplayFlags::PRESENT) {
            self.present_current_frame(vram)
        } else {
            None
        }
    }

    fn clear_display(&mut self) {
        self.last_display = None;
    }

    fn present_current_frame(&mut self, _vram: &Vram) -> Option<PresentedFrame> {
        let display = self.last_display?;
        self.flush_batch();
        self.update_vram_read_cache();

        match self.dev().begin_present() {
            Ok(()) => {}
            Err(GpuError::DeviceLost) => {
                self.ctx.report(MessageSeverity::Error, "device lost during present");
                return None;
            }
            Err(e) => {
                self.ctx.report(MessageSeverity::Error, &format!("present failed: {}", e));
                return None;
            }
        }

        let frame = downsample::present_display(self, &display);
        self.dev().end_present();
        Some(frame)
    }

    fn update_settings(&mut self, old: &GpuSettings, new: &GpuSettings) {
        debug_assert!(!old.requires_backend_recreate(new));
        self.flush_batch();
        if old.texture_filter != new.texture_filter
            || old.downsample_mode != new.downsample_mode
        {
            self.downsampler = Downsampler::new(new.downsample_mode, self.scale);
        }
        self.pipelines.update_settings(new.clone());
        self.ctx.settings = new.clone();
        if old.vsync != new.vsync {
            self.dev().set_vsync(new.vsync);
        }
        if old.max_displayed_fps != new.max_displayed_fps {
            let fps = new.max_displayed_fps;
            self.dev().set_max_displayed_fps(fps);
        }
    }

    fn update_vsync(&mut self, vsync: bool) {
        self.dev().set_vsync(vsync);
    }

    fn take_device(&mut self) -> Option<Box<dyn GpuDevice>> {
        self.flush_batch();
        let handles = [self.vram_rt, self.vram_depth, self.vram_read, self.upload_tex];
        if let Some(device) = self.device.as_mut() {
            for handle in handles {
                device.destroy_texture(handle);
            }
        }
        self.device.take()
    }
}

impl Drop for HardwareBackend {
    fn drop(&mut self) {
        if self.device.is_some() {
            let _ = self.take_device();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_rect_union_and_intersect() {
        let mut rect = DirtyRect::EMPTY;
        assert!(rect.is_empty());

        rect.include(10, 10, 20, 20);
        rect.include(15, 5, 30, 12);
        assert_eq!(rect, DirtyRect { x0: 10, y0: 5, x1: 30, y1: 20 });

        assert!(rect.intersects(0, 0, 11, 6));
        assert!(!rect.intersects(30, 20, 40, 30));
        assert!(!DirtyRect::EMPTY.intersects(0, 0, 1024, 512));
    }
}
