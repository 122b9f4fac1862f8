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

//! Rasterizer backends
//!
//! Both backends expose the same capability set through [`GpuBackend`]: one
//! method per draw/transfer record plus display and settings entry points.
//! Dispatch happens at command-record granularity, so the dynamic call is
//! irrelevant for performance.

pub mod hardware;
pub mod software;

use crate::device::GpuDevice;
use crate::gpu::primitives::DrawingArea;
use crate::queue::record::{
    CopyVramPayload, DrawHeaderPayload, FillVramPayload, LineVertex, PolygonVertex,
    PrecisePolygonVertex, ReadVramPayload, SpritePayload, UpdateDisplayPayload, UpdateVramPayload,
};
use crate::settings::{BackendKind, FramePixelFormat, GpuSettings, MessageSink, TextureReplacementHook};
use crate::vram::Vram;

/// A frame handed to the host presenter callback
///
/// The software backend fills `pixels`; the hardware backend presents into
/// its swap chain and reports geometry only (`pixels` stays empty).
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of `pixels`
    pub format: FramePixelFormat,
    /// Frame data, `width * height` pixels, or empty for device presents
    pub pixels: Vec<u8>,
    /// Display aspect ratio requested by the emulated software
    pub aspect: f32,
    /// Whether this frame was produced by interlaced scanout
    pub interlaced: bool,
}

impl PresentedFrame {
    /// A black frame of the given size
    pub fn black(width: u32, height: u32, format: FramePixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: vec![0; width as usize * height as usize * format.bytes_per_pixel()],
            aspect: 4.0 / 3.0,
            interlaced: false,
        }
    }
}

/// The capability set shared by the software and hardware backends
///
/// Methods take the shadow VRAM explicitly; the worker owns the lock for the
/// duration of one record dispatch. The software backend treats the shadow
/// as its render target, the hardware backend keeps it in sync for transfers
/// and mirrors drawn regions back on [`GpuBackend::read_vram`].
pub trait GpuBackend: Send {
    /// Backend name for log messages
    fn name(&self) -> &'static str;

    /// Reset backend state, optionally clearing VRAM
    fn reset(&mut self, vram: &mut Vram, clear_vram: bool);

    /// The drawing area changed; scissor state is invalid
    fn drawing_area_changed(&mut self, area: DrawingArea);

    /// 16bpp rectangle fill
    fn fill_vram(&mut self, vram: &mut Vram, p: &FillVramPayload);

    /// CPU→VRAM blit
    fn update_vram(&mut self, vram: &mut Vram, p: &UpdateVramPayload, data: &[u16]);

    /// VRAM→VRAM blit
    fn copy_vram(&mut self, vram: &mut Vram, p: &CopyVramPayload);

    /// Make the shadow VRAM region bit-exact before the parser reads it
    fn read_vram(&mut self, vram: &mut Vram, p: &ReadVramPayload);

    /// Triangle or quad with integer vertices
    fn draw_polygon(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, verts: &[PolygonVertex]);

    /// Triangle or quad with PGXP sub-pixel positions
    fn draw_precise_polygon(
        &mut self,
        vram: &mut Vram,
        head: &DrawHeaderPayload,
        verts: &[PrecisePolygonVertex],
    );

    /// Axis-aligned rectangle
    fn draw_sprite(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, sprite: &SpritePayload);

    /// Line strip
    fn draw_line(&mut self, vram: &mut Vram, head: &DrawHeaderPayload, verts: &[LineVertex]);

    /// Flush any batched work (hardware backend)
    fn flush(&mut self);

    /// Apply a display change, producing a frame when presentation was requested
    fn update_display(&mut self, vram: &Vram, p: &UpdateDisplayPayload) -> Option<PresentedFrame>;

    /// Clear the displayed image
    fn clear_display(&mut self);

    /// Re-present the last frame without new draws
    fn present_current_frame(&mut self, vram: &Vram) -> Option<PresentedFrame>;

    /// Apply a settings change that does not require recreation
    fn update_settings(&mut self, old: &GpuSettings, new: &GpuSettings);

    /// Change swap-chain vsync
    fn update_vsync(&mut self, vsync: bool);

    /// Surrender the GPU device so a replacement backend can reuse it
    fn take_device(&mut self) -> Option<Box<dyn GpuDevice>>;
}

/// Construction parameters shared by both backends
pub struct BackendContext {
    /// Authoritative settings copy
    pub settings: GpuSettings,
    /// Host message sink
    pub sink: Option<MessageSink>,
    /// Texture replacement hook (hardware backend only)
    pub texture_replacement: Option<TextureReplacementHook>,
}

impl BackendContext {
    /// Report a message to the host sink, falling back to the log facade
    pub fn report(&self, severity: crate::settings::MessageSeverity, message: &str) {
        if let Some(sink) = &self.sink {
            sink(severity, message);
        }
        match severity {
            crate::settings::MessageSeverity::Info => log::info!("{}", message),
            crate::settings::MessageSeverity::Warning => log::warn!("{}", message),
            crate::settings::MessageSeverity::Error => log::error!("{}", message),
        }
    }
}

/// Create a backend of the requested kind
///
/// A hardware request falls back to software when no device can be created;
/// the failure is reported through the sink first.
pub fn create_backend(
    kind: BackendKind,
    ctx: BackendContext,
    device: Option<Box<dyn GpuDevice>>,
) -> Box<dyn GpuBackend> {
    match kind {
        BackendKind::Software => Box::new(software::SoftwareBackend::new(ctx)),
        BackendKind::Hardware => match device {
            Some(device) => match hardware::HardwareBackend::new(ctx, device) {
                Ok(backend) => Box::new(backend),
                Err((ctx, err)) => {
                    ctx.report(
                        crate::settings::MessageSeverity::Error,
                        &format!("hardware backend unavailable, using software: {}", err),
                    );
                    Box::new(software::SoftwareBackend::new(ctx))
                }
            },
            None => {
                ctx.report(
                    crate::settings::MessageSeverity::Error,
                    "hardware backend requested without a device, using software",
                );
                Box::new(software::SoftwareBackend::new(ctx))
            }
        },
    }
}
