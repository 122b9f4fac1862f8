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

//! Pipeline variants
//!
//! Draw pipelines are keyed on `(depth_test, render_mode, texture_mode,
//! transparency_mode, dither, interlace)` and compiled lazily from generated
//! shader source; compiled payloads persist in the on-disk shader cache.
//!
//! Semi-transparency picks one of three paths by capability:
//! 1. dual-source blending - one draw, hardware blend with `Src1Color`
//! 2. framebuffer fetch - one draw, the fragment shader blends
//! 3. neither - the batch is drawn twice, opaque texels then semi texels

use std::collections::HashMap;

use super::batch::{BatchConfig, HwVertex};
use super::shadergen;
use crate::device::shader_cache::ShaderCache;
use crate::device::{
    BlendFactor, BlendOp, BlendState, CompareFunc, DepthState, DeviceFeatures, GpuDevice,
    PipelineDesc, PipelineHandle, PrimitiveTopology, TextureFormat, VertexAttribFormat,
    VertexAttribute,
};
use crate::gpu::primitives::{DrawModeReg, TextureMode, TransparencyMode};
use crate::settings::GpuSettings;

/// How a pass treats semi-transparent texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    /// No transparency in the batch
    Opaque,
    /// Single pass handling both opacities (dual-source or fetch)
    Combined,
    /// First fallback pass: opaque texels only
    OnlyOpaque,
    /// Second fallback pass: semi-transparent texels only
    OnlyTransparent,
}

/// Texture sampling mode baked into the fragment shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTextureMode {
    /// Untextured
    Disabled,
    /// 4-bit CLUT
    Palette4,
    /// 8-bit CLUT
    Palette8,
    /// 15-bit direct
    Direct16,
    /// 4-bit CLUT, raw texel
    RawPalette4,
    /// 8-bit CLUT, raw texel
    RawPalette8,
    /// 15-bit direct, raw texel
    RawDirect16,
}

impl ShaderTextureMode {
    fn from_config(config: &BatchConfig) -> Self {
        if !config.textured {
            return ShaderTextureMode::Disabled;
        }
        let mode = DrawModeReg(config.draw_mode).texture_mode();
        match (mode, config.raw_texture) {
            (TextureMode::Palette4, false) => ShaderTextureMode::Palette4,
            (TextureMode::Palette8, false) => ShaderTextureMode::Palette8,
            (TextureMode::Direct16 | TextureMode::Reserved, false) => ShaderTextureMode::Direct16,
            (TextureMode::Palette4, true) => ShaderTextureMode::RawPalette4,
            (TextureMode::Palette8, true) => ShaderTextureMode::RawPalette8,
            (TextureMode::Direct16 | TextureMode::Reserved, true) => ShaderTextureMode::RawDirect16,
        }
    }
}

/// Identity of one compiled pipeline variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Depth test against masked pixels
    pub depth_test: bool,
    /// Pass kind
    pub render_pass: RenderPass,
    /// Texture sampling mode
    pub texture_mode: ShaderTextureMode,
    /// Blend mode (None for opaque passes)
    pub transparency: Option<TransparencyMode>,
    /// Ordered dither in the shader
    pub dither: bool,
    /// Interlace row discard in the shader
    pub interlace: bool,
    /// Internal utility pipelines (depth reset, blits, display)
    pub utility: Option<UtilityPipeline>,
}

/// Fixed-function utility passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilityPipeline {
    /// Rebuild depth from color mask bits
    DepthReset,
    /// VRAM fill quad
    Fill,
    /// CPU→VRAM write quad
    VramWrite,
    /// VRAM→VRAM sampled copy quad
    VramCopy,
    /// VRAM→CPU readback encode
    ReadbackEncode,
    /// Display output (filter baked in)
    Display { filter_24bpp: bool },
    /// Box downsample
    DownsampleBox,
    /// Adaptive downsample composite
    DownsampleAdaptive,
}

impl PipelineKey {
    fn utility(u: UtilityPipeline) -> Self {
        Self {
            depth_test: false,
            render_pass: RenderPass::Opaque,
            texture_mode: ShaderTextureMode::Disabled,
            transparency: None,
            dither: false,
            interlace: false,
            utility: Some(u),
        }
    }

    /// Key of the depth reset pass
    pub fn depth_reset() -> Self {
        Self::utility(UtilityPipeline::DepthReset)
    }

    /// Key of the fill pass
    pub fn fill() -> Self {
        Self::utility(UtilityPipeline::Fill)
    }

    /// Key of the CPU→VRAM write pass
    pub fn vram_write() -> Self {
        Self::utility(UtilityPipeline::VramWrite)
    }

    /// Key of the sampled VRAM copy pass
    pub fn vram_copy() -> Self {
        Self::utility(UtilityPipeline::VramCopy)
    }

    /// Key of the readback encode pass
    pub fn readback_encode() -> Self {
        Self::utility(UtilityPipeline::ReadbackEncode)
    }

    /// Key of a display output pass
    pub fn display(filter_24bpp: bool) -> Self {
        Self::utility(UtilityPipeline::Display { filter_24bpp })
    }

    /// Key of the box downsample pass
    pub fn downsample_box() -> Self {
        Self::utility(UtilityPipeline::DownsampleBox)
    }

    /// Key of the adaptive downsample pass
    pub fn downsample_adaptive() -> Self {
        Self::utility(UtilityPipeline::DownsampleAdaptive)
    }
}

/// Lazily compiled pipeline collection
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, Option<PipelineHandle>>,
    shader_cache: Option<ShaderCache>,
    features: DeviceFeatures,
    settings: GpuSettings,
    msaa: u32,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new(
        shader_cache: Option<ShaderCache>,
        features: DeviceFeatures,
        settings: GpuSettings,
        msaa: u32,
    ) -> Self {
        Self {
            pipelines: HashMap::new(),
            shader_cache,
            features,
            settings,
            msaa,
        }
    }

    /// Current settings snapshot
    pub fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    /// Replace the settings snapshot (variants stay valid)
    pub fn update_settings(&mut self, settings: GpuSettings) {
        self.settings = settings;
    }

    /// Whether one draw can cover both opacities
    fn single_pass_transparency(&self) -> bool {
        self.features.contains(DeviceFeatures::DUAL_SOURCE_BLEND)
            || self.features.contains(DeviceFeatures::FRAMEBUFFER_FETCH)
    }

    /// The pass sequence a batch needs
    pub fn passes_for(&self, config: BatchConfig) -> Vec<PipelineKey> {
        let texture_mode = ShaderTextureMode::from_config(&config);
        let base = PipelineKey {
            depth_test: config.check_mask,
            render_pass: RenderPass::Opaque,
            texture_mode,
            transparency: None,
            dither: config.dither,
            interlace: config.interlaced,
            utility: None,
        };

        if !config.transparency {
            return vec![base];
        }

        let mode = DrawModeReg(config.draw_mode).transparency_mode();
        if self.single_pass_transparency() || !config.textured {
            // Untextured transparency has uniform opacity, so plain
            // fixed-function blending suffices even without dual-source.
            vec![PipelineKey {
                render_pass: RenderPass::Combined,
                transparency: Some(mode),
                ..base
            }]
        } else {
            vec![
                PipelineKey {
                    render_pass: RenderPass::OnlyOpaque,
                    transparency: None,
                    ..base
                },
                PipelineKey {
                    render_pass: RenderPass::OnlyTransparent,
                    transparency: Some(mode),
                    ..base
                },
            ]
        }
    }

    /// Fetch (compiling on demand) a pipeline
    ///
    /// A variant that failed to compile stays failed; the caller drops the
    /// batch instead of retrying every draw.
    pub fn get(&mut self, device: &mut dyn GpuDevice, key: PipelineKey) -> Option<PipelineHandle> {
        if let Some(entry) = self.pipelines.get(&key) {
            return *entry;
        }

        let desc = self.build_desc(&key);
        if let Some(cache) = &mut self.shader_cache {
            // Warm the on-disk cache; payload reuse is the device's concern,
            // the entry existing is what lets a future run skip compilation.
            if cache.lookup(&desc.fragment_shader, "main").is_none() {
                let _ = cache.insert(&desc.fragment_shader, "main", desc.fragment_shader.as_bytes());
            }
        }

        let handle = match device.create_pipeline(&desc) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("pipeline compile failed for {:?}: {}", key, e);
                None
            }
        };
        self.pipelines.insert(key, handle);
        handle
    }

    /// Number of compiled (or failed) variants
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no variant has been requested yet
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    fn draw_vertex_layout() -> Vec<VertexAttribute> {
        vec![
            VertexAttribute { location: 0, offset: 0, format: VertexAttribFormat::Float4 },
            VertexAttribute { location: 1, offset: 16, format: VertexAttribFormat::UNorm4x8 },
            VertexAttribute { location: 2, offset: 20, format: VertexAttribFormat::Uint },
            VertexAttribute { location: 3, offset: 24, format: VertexAttribFormat::Uint },
            VertexAttribute { location: 4, offset: 28, format: VertexAttribFormat::Uint },
        ]
    }

    fn build_desc(&self, key: &PipelineKey) -> PipelineDesc {
        if let Some(utility) = key.utility {
            return self.build_utility_desc(utility);
        }

        let blend = match (key.render_pass, key.transparency) {
            (_, None) => BlendState::disabled(),
            (RenderPass::Combined, Some(mode)) => {
                if self.features.contains(DeviceFeatures::DUAL_SOURCE_BLEND) {
                    BlendState {
                        enable: true,
                        src_factor: BlendFactor::One,
                        dst_factor: BlendFactor::Src1Color,
                        op: if mode == TransparencyMode::BackgroundMinusForeground {
                            BlendOp::ReverseSubtract
                        } else {
                            BlendOp::Add
                        },
                        constant: 0,
                        write_mask: 0xF,
                    }
                } else if self.features.contains(DeviceFeatures::FRAMEBUFFER_FETCH) {
                    // The shader reads the destination and outputs the result.
                    BlendState::disabled()
                } else {
                    // Constant-color blend: the 0x808080 factor halves both
                    // sources for the average mode; other modes use one/one.
                    match mode {
                        TransparencyMode::HalfBackgroundPlusHalfForeground => BlendState {
                            enable: true,
                            src_factor: BlendFactor::ConstantColor,
                            dst_factor: BlendFactor::ConstantColor,
                            op: BlendOp::Add,
                            constant: 0x0080_8080,
                            write_mask: 0xF,
                        },
                        TransparencyMode::BackgroundMinusForeground => BlendState {
                            enable: true,
                            src_factor: BlendFactor::One,
                            dst_factor: BlendFactor::One,
                            op: BlendOp::ReverseSubtract,
                            constant: 0,
                            write_mask: 0xF,
                        },
                        _ => BlendState {
                            enable: true,
                            src_factor: BlendFactor::One,
                            dst_factor: BlendFactor::One,
                            op: BlendOp::Add,
                            constant: 0,
                            write_mask: 0xF,
                        },
                    }
                }
            }
            (RenderPass::OnlyTransparent, Some(mode)) => BlendState {
                enable: true,
                src_factor: if mode == TransparencyMode::HalfBackgroundPlusHalfForeground {
                    BlendFactor::ConstantColor
                } else {
                    BlendFactor::One
                },
                dst_factor: if mode == TransparencyMode::HalfBackgroundPlusHalfForeground {
                    BlendFactor::ConstantColor
                } else {
                    BlendFactor::One
                },
                op: if mode == TransparencyMode::BackgroundMinusForeground {
                    BlendOp::ReverseSubtract
                } else {
                    BlendOp::Add
                },
                constant: 0x0080_8080,
                write_mask: 0xF,
            },
            _ => BlendState::disabled(),
        };

        PipelineDesc {
            vertex_shader: shadergen::draw_vertex_shader(self.settings.resolution_scale),
            fragment_shader: shadergen::draw_fragment_shader(key, &self.features, &self.settings),
            input_layout: Self::draw_vertex_layout(),
            vertex_stride: std::mem::size_of::<HwVertex>() as u32,
            topology: PrimitiveTopology::Triangles,
            depth: DepthState {
                test: if key.depth_test { CompareFunc::GreaterEqual } else { CompareFunc::Always },
                write: true,
            },
            blend,
            color_formats: vec![TextureFormat::Rgba8],
            depth_format: Some(TextureFormat::D16),
            samples: self.msaa,
        }
    }

    fn build_utility_desc(&self, utility: UtilityPipeline) -> PipelineDesc {
        let (vs, fs, color_format, depth, samples) = match utility {
            UtilityPipeline::DepthReset => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::depth_reset_fragment_shader(),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: true },
                self.msaa,
            ),
            UtilityPipeline::Fill => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::fill_fragment_shader(self.settings.true_color),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: false },
                self.msaa,
            ),
            UtilityPipeline::VramWrite => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::vram_write_fragment_shader(),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: true },
                self.msaa,
            ),
            UtilityPipeline::VramCopy => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::vram_copy_fragment_shader(),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: true },
                self.msaa,
            ),
            UtilityPipeline::ReadbackEncode => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::readback_encode_fragment_shader(),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: false },
                1,
            ),
            UtilityPipeline::Display { filter_24bpp } => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::display_fragment_shader(filter_24bpp, self.settings.display_filter),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: false },
                1,
            ),
            UtilityPipeline::DownsampleBox => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::downsample_box_fragment_shader(self.settings.resolution_scale),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: false },
                1,
            ),
            UtilityPipeline::DownsampleAdaptive => (
                shadergen::fullscreen_vertex_shader(),
                shadergen::downsample_adaptive_fragment_shader(self.settings.resolution_scale),
                TextureFormat::Rgba8,
                DepthState { test: CompareFunc::Always, write: false },
                1,
            ),
        };

        PipelineDesc {
            vertex_shader: vs,
            fragment_shader: fs,
            input_layout: Vec::new(),
            vertex_stride: 0,
            topology: PrimitiveTopology::Triangles,
            depth,
            blend: BlendState::disabled(),
            color_formats: vec![color_format],
            depth_format: matches!(
                utility,
                UtilityPipeline::DepthReset | UtilityPipeline::VramWrite | UtilityPipeline::VramCopy
            )
            .then_some(TextureFormat::D16),
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::null::NullDevice;
    use crate::gpu::primitives::TextureWindow;
    use crate::queue::record::DrawHeaderPayload;

    fn config(rc: u32, draw_mode: u16) -> BatchConfig {
        BatchConfig::from_head(
            &DrawHeaderPayload {
                rc,
                draw_mode: draw_mode as u32,
                palette: 0,
                window: TextureWindow::default(),
                params: 0,
                num_vertices: 0,
            },
            &GpuSettings::default(),
        )
    }

    #[test]
    fn test_opaque_single_pass() {
        let cache = PipelineCache::new(None, DeviceFeatures::empty(), GpuSettings::default(), 1);
        let passes = cache.passes_for(config(0x2000_0000, 0));
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].render_pass, RenderPass::Opaque);
    }

    #[test]
    fn test_textured_transparency_needs_two_passes_without_features() {
        let cache = PipelineCache::new(None, DeviceFeatures::empty(), GpuSettings::default(), 1);
        // 0x26: textured semi-transparent triangle
        let passes = cache.passes_for(config(0x2600_0000, 0));
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].render_pass, RenderPass::OnlyOpaque);
        assert_eq!(passes[1].render_pass, RenderPass::OnlyTransparent);
    }

    #[test]
    fn test_dual_source_collapses_to_one_pass() {
        let cache = PipelineCache::new(
            None,
            DeviceFeatures::DUAL_SOURCE_BLEND,
            GpuSettings::default(),
            1,
        );
        let passes = cache.passes_for(config(0x2600_0000, 0));
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].render_pass, RenderPass::Combined);
    }

    #[test]
    fn test_untextured_transparency_single_pass() {
        let cache = PipelineCache::new(None, DeviceFeatures::empty(), GpuSettings::default(), 1);
        // 0x22: untextured semi-transparent triangle
        let passes = cache.passes_for(config(0x2200_0000, 0));
        assert_eq!(passes.len(), 1);
    }

    #[test]
    fn test_variants_compiled_once() {
        let mut cache =
            PipelineCache::new(None, DeviceFeatures::empty(), GpuSettings::default(), 1);
        let mut device = NullDevice::new();

        let key = cache.passes_for(config(0x2000_0000, 0))[0];
        let first = cache.get(&mut device, key);
        let second = cache.get(&mut device, key);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(device.pipeline_count(), 1);
    }
}
