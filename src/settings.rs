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

//! GPU pipeline settings
//!
//! [`GpuSettings`] is owned by the worker thread during a frame; the emulation
//! thread changes it only through [`crate::Gpu::update_settings`], which
//! marshals the new value across the queue so the worker observes it at a
//! record boundary.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which rasterizer backend executes draw records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Scanline software rasterizer with exact hardware pixel semantics
    Software,
    /// Upscaling backend targeting the [`crate::device::GpuDevice`] abstraction
    Hardware,
}

/// Texture sampling filter used by the hardware backend at scale > 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    /// Point sampling (matches native hardware)
    Nearest,
    /// Bilinear with UV clamping to the primitive's texture rectangle
    Bilinear,
    /// JINC2 windowed-sinc reconstruction
    Jinc2,
    /// xBR pattern-matching upscaler
    XBr,
}

impl TextureFilter {
    /// Blended filters need dual-source blending or framebuffer fetch to
    /// composite the filtered alpha correctly.
    pub fn needs_dual_source(self) -> bool {
        !matches!(self, TextureFilter::Nearest)
    }
}

/// Filter applied when scaling the final image to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayFilter {
    /// Point sampling
    Nearest,
    /// Smooth bilinear
    Bilinear,
    /// Bilinear with a sub-pixel sharpening bias derived from the integer scale
    BilinearSharp,
    /// Point sampling constrained to integer scale factors
    NearestInteger,
}

/// Anti-aliasing reduction applied when the render scale is above 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleMode {
    /// Present the upscaled image as-is
    Disabled,
    /// Single-pass S×S box average to native resolution
    Box,
    /// Mip-chain weighted composite that preserves high-detail regions
    Adaptive,
}

/// CPU-side pixel formats produced by display scanout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramePixelFormat {
    /// 16-bit, 5-5-5-1 (native VRAM layout with mask in the high bit)
    Rgba5551,
    /// 16-bit, 5-6-5
    Rgb565,
    /// 32-bit RGBA
    Rgba8,
    /// 32-bit BGRA
    Bgra8,
}

impl FramePixelFormat {
    /// Bytes per output pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FramePixelFormat::Rgba5551 | FramePixelFormat::Rgb565 => 2,
            FramePixelFormat::Rgba8 | FramePixelFormat::Bgra8 => 4,
        }
    }
}

/// Severity of a message delivered through the host sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    /// Informational
    Info,
    /// Recoverable problem; rendering continues
    Warning,
    /// Serious problem; the sender may also request an emulator halt
    Error,
}

/// Host message sink
///
/// All human-readable backend output funnels through one callback. Fatal
/// conditions additionally raise the halt request flag carried alongside the
/// sink by the worker.
pub type MessageSink = Arc<dyn Fn(MessageSeverity, &str) + Send + Sync>;

/// Texture replacement hook
///
/// Given a CPU→VRAM write rectangle and its 16bpp content, the host may
/// return an RGBA8 image to substitute for the upload (hardware backend
/// only). Returning `None` keeps the original pixels.
pub type TextureReplacementHook =
    Arc<dyn Fn(u32, u32, u32, u32, &[u16]) -> Option<ReplacementImage> + Send + Sync>;

/// RGBA8 image returned by a [`TextureReplacementHook`]
#[derive(Debug, Clone)]
pub struct ReplacementImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 data, `width * height * 4` bytes
    pub rgba: Vec<u8>,
}

/// GPU pipeline settings
///
/// A value of this type is copied through the command queue whenever it
/// changes; the worker thread holds the authoritative copy while rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSettings {
    /// Active rasterizer backend
    pub backend: BackendKind,

    /// Integer resolution scale for the hardware backend (1 = native)
    pub resolution_scale: u32,

    /// MSAA sample count for the hardware VRAM render target (1 = off)
    pub msaa_samples: u32,

    /// Render at 8 bits per channel instead of emulating 5-bit quantization
    pub true_color: bool,

    /// Consume PGXP sub-pixel vertex data when present
    pub pgxp_enable: bool,

    /// Use PGXP w values for per-primitive depth ordering
    pub pgxp_depth_buffer: bool,

    /// Texture sampling filter (hardware backend)
    pub texture_filter: TextureFilter,

    /// Window scaling filter
    pub display_filter: DisplayFilter,

    /// Downsampling mode for scale > 1
    pub downsample_mode: DownsampleMode,

    /// Scanout pixel format requested from the software backend
    pub frame_format: FramePixelFormat,

    /// Frames the producer may queue before blocking (backpressure cap)
    pub max_queued_frames: u32,

    /// Synchronize presents to the display refresh
    pub vsync: bool,

    /// Present throttle while idle-presenting, frames per second (0 = uncapped)
    pub max_displayed_fps: f32,

    /// Keep re-presenting the last frame while no commands arrive
    ///
    /// With this set the worker never blocks on an empty queue: it re-presents
    /// the current frame at `max_displayed_fps` and polls for records between
    /// presents. Hosts enable it while emulation is paused or a menu is shown
    /// over the last frame.
    pub run_idle: bool,

    /// Directory for the on-disk shader cache (`None` disables persistence)
    pub shader_cache_path: Option<PathBuf>,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Software,
            resolution_scale: 1,
            msaa_samples: 1,
            true_color: false,
            pgxp_enable: false,
            pgxp_depth_buffer: false,
            texture_filter: TextureFilter::Nearest,
            display_filter: DisplayFilter::Nearest,
            downsample_mode: DownsampleMode::Disabled,
            frame_format: FramePixelFormat::Rgba8,
            max_queued_frames: 2,
            vsync: true,
            max_displayed_fps: 60.0,
            run_idle: false,
            shader_cache_path: None,
        }
    }
}

impl GpuSettings {
    /// Whether a settings change requires tearing down and recreating the
    /// active backend rather than updating it in place.
    pub fn requires_backend_recreate(&self, new: &GpuSettings) -> bool {
        self.backend != new.backend
            || self.resolution_scale != new.resolution_scale
            || self.msaa_samples != new.msaa_samples
            || self.true_color != new.true_color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = GpuSettings::default();
        assert_eq!(settings.backend, BackendKind::Software);
        assert_eq!(settings.resolution_scale, 1);
        assert_eq!(settings.max_queued_frames, 2);
    }

    #[test]
    fn test_backend_recreate_detection() {
        let old = GpuSettings::default();

        let mut new = old.clone();
        new.vsync = false;
        assert!(!old.requires_backend_recreate(&new));

        let mut new = old.clone();
        new.resolution_scale = 4;
        assert!(old.requires_backend_recreate(&new));

        let mut new = old.clone();
        new.backend = BackendKind::Hardware;
        assert!(old.requires_backend_recreate(&new));
    }

    #[test]
    fn test_frame_format_sizes() {
        assert_eq!(FramePixelFormat::Rgba5551.bytes_per_pixel(), 2);
        assert_eq!(FramePixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(FramePixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(FramePixelFormat::Bgra8.bytes_per_pixel(), 4);
    }
}
