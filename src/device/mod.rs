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

//! GPU device abstraction
//!
//! The hardware backend speaks only this vocabulary; concrete
//! D3D/Vulkan/Metal/GL devices live out of tree and implement [`GpuDevice`].
//! The crate ships [`null::NullDevice`], a headless implementation backed by
//! CPU memory, which keeps the hardware backend's bookkeeping testable.
//!
//! Handles are plain integers: the device owns the actual objects and the
//! backend never borrows into device storage.

pub mod null;
pub mod shader_cache;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Optional device capabilities probed by the hardware backend
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFeatures: u32 {
        /// Fragment shaders may output a second blend source
        const DUAL_SOURCE_BLEND = 1 << 0;
        /// Fragment shaders may read the current framebuffer value
        const FRAMEBUFFER_FETCH = 1 << 1;
        /// Geometry shader stage available
        const GEOMETRY_SHADERS = 1 << 2;
        /// Attributes may interpolate without perspective correction
        const NOPERSPECTIVE_INTERPOLATION = 1 << 3;
        /// Texel buffers available for large uploads
        const TEXTURE_BUFFERS = 1 << 4;
        /// Texel buffers are emulated through SSBOs
        const TEXTURE_BUFFERS_AS_SSBO = 1 << 5;
        /// Sub-rectangle MSAA resolves supported
        const PARTIAL_MSAA_RESOLVE = 1 << 6;
    }
}

/// Texture binding classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// Sampled texture, immutable contents
    Texture,
    /// Color render target (also samplable)
    RenderTarget,
    /// Depth-stencil target
    DepthStencil,
    /// CPU-updated streaming texture
    Dynamic,
    /// Read-write storage image
    RwTexture,
}

/// Texture formats understood by the abstraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 8-bit BGRA
    Bgra8,
    /// 5-6-5 RGB
    Rgb565,
    /// 5-5-5-1 RGBA
    Rgba5551,
    /// Single 8-bit channel
    R8,
    /// Single 16-bit unsigned integer channel
    R16U,
    /// 16-bit depth
    D16,
}

impl TextureFormat {
    /// Bytes per texel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 | TextureFormat::Bgra8 => 4,
            TextureFormat::Rgb565
            | TextureFormat::Rgba5551
            | TextureFormat::R16U
            | TextureFormat::D16 => 2,
            TextureFormat::R8 => 1,
        }
    }
}

/// Opaque texture handle (0 is never a valid handle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// The invalid handle
    pub const INVALID: TextureHandle = TextureHandle(0);

    /// Whether the handle refers to a live texture
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Opaque pipeline handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u32);

/// Opaque sampler handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u32);

/// Texture creation parameters
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// MSAA sample count
    pub samples: u32,
    /// Binding class
    pub ty: TextureType,
    /// Texel format
    pub format: TextureFormat,
}

impl TextureDesc {
    /// Single-sampled one-mip descriptor
    pub fn flat(width: u32, height: u32, ty: TextureType, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            samples: 1,
            ty,
            format,
        }
    }
}

/// Primitive topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Independent triangles
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Independent lines
    Lines,
}

/// Depth comparison functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    /// Depth test disabled
    Always,
    /// Pass when incoming depth is greater or equal
    GreaterEqual,
    /// Pass when incoming depth is less or equal
    LessEqual,
}

/// Blend factors (the subset the backend emits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Second fragment-shader output color
    Src1Color,
    /// 1 − second fragment-shader output color
    OneMinusSrc1Color,
    /// Constant blend color
    ConstantColor,
}

/// Blend equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src*sf + dst*df
    Add,
    /// dst*df − src*sf
    ReverseSubtract,
}

/// Per-target blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Blending enabled
    pub enable: bool,
    /// Source factor
    pub src_factor: BlendFactor,
    /// Destination factor
    pub dst_factor: BlendFactor,
    /// Blend equation
    pub op: BlendOp,
    /// Constant color for [`BlendFactor::ConstantColor`] (RGBA8)
    pub constant: u32,
    /// RGBA channel write mask
    pub write_mask: u8,
}

impl BlendState {
    /// Blending off, all channels written
    pub fn disabled() -> Self {
        Self {
            enable: false,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            op: BlendOp::Add,
            constant: 0,
            write_mask: 0xF,
        }
    }
}

/// Depth-stencil state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Comparison against the depth buffer
    pub test: CompareFunc,
    /// Write incoming depth on pass
    pub write: bool,
}

/// Vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribFormat {
    /// Four 32-bit floats
    Float4,
    /// Two 32-bit floats
    Float2,
    /// Four unsigned bytes normalized to [0, 1]
    UNorm4x8,
    /// One 32-bit unsigned integer
    Uint,
    /// Two 16-bit unsigned integers
    Uint16x2,
}

/// One vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location
    pub location: u32,
    /// Byte offset within the vertex
    pub offset: u32,
    /// Data format
    pub format: VertexAttribFormat,
}

/// Pipeline creation parameters
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    /// Vertex shader source
    pub vertex_shader: String,
    /// Fragment shader source
    pub fragment_shader: String,
    /// Vertex layout (empty for fullscreen passes)
    pub input_layout: Vec<VertexAttribute>,
    /// Bytes per vertex
    pub vertex_stride: u32,
    /// Primitive topology
    pub topology: PrimitiveTopology,
    /// Depth-stencil state
    pub depth: DepthState,
    /// Blend state for target 0
    pub blend: BlendState,
    /// Color target formats
    pub color_formats: Vec<TextureFormat>,
    /// Depth target format
    pub depth_format: Option<TextureFormat>,
    /// MSAA sample count
    pub samples: u32,
}

/// Sampler filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    /// Point sampling
    Nearest,
    /// Linear interpolation
    Linear,
}

/// Sampler creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    /// Minification/magnification filter
    pub filter: SamplerFilter,
}

/// The capability set consumed by the hardware backend
///
/// All methods are called from the GPU worker thread only. Implementations
/// own every GPU object; the backend tracks handles.
pub trait GpuDevice: Send {
    /// Device name for diagnostics
    fn name(&self) -> &str;

    /// Optional capabilities
    fn features(&self) -> DeviceFeatures;

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;

    /// Destroy a texture; the handle becomes invalid
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Upload a sub-rectangle of texel data (tightly packed rows)
    fn upload_texture(
        &mut self,
        handle: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Download a sub-rectangle into CPU memory (tightly packed rows)
    fn download_texture(
        &self,
        handle: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut [u8],
    ) -> Result<()>;

    /// Copy a region between same-format textures
    #[allow(clippy::too_many_arguments)]
    fn copy_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    );

    /// Resolve a multisampled region into a single-sampled texture
    #[allow(clippy::too_many_arguments)]
    fn resolve_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    );

    /// Clear a color target
    fn clear_render_target(&mut self, handle: TextureHandle, rgba: [f32; 4]);

    /// Clear a depth target
    fn clear_depth(&mut self, handle: TextureHandle, depth: f32);

    /// Compile a pipeline
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle>;

    /// Create a sampler
    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    /// Bind render targets; an empty color list binds the swap chain
    fn set_render_targets(&mut self, color: &[TextureHandle], depth: Option<TextureHandle>);

    /// Bind a pipeline
    fn set_pipeline(&mut self, pipeline: PipelineHandle);

    /// Set the viewport
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Set the scissor rectangle
    fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Bind a sampled texture
    fn bind_texture(&mut self, slot: u32, handle: TextureHandle);

    /// Bind a sampler
    fn bind_sampler(&mut self, slot: u32, handle: SamplerHandle);

    /// Push a small uniform block (at most 128 bytes)
    fn push_uniforms(&mut self, data: &[u8]);

    /// Upload a vertex stream, returning the base vertex index
    fn upload_vertices(&mut self, data: &[u8], vertex_stride: usize) -> u32;

    /// Draw a vertex range with the current state
    fn draw(&mut self, vertex_count: u32, base_vertex: u32);

    /// Begin a present; may report device loss
    fn begin_present(&mut self) -> Result<()>;

    /// Finish the present and submit
    fn end_present(&mut self);

    /// Change vsync
    fn set_vsync(&mut self, enabled: bool);

    /// Throttle idle presents to this rate (0 = uncapped)
    fn set_max_displayed_fps(&mut self, fps: f32);

    /// Current swap chain dimensions
    fn swap_chain_size(&self) -> (u32, u32);
}
