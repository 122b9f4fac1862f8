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

//! Headless GPU device
//!
//! Backs every texture with CPU memory so uploads, downloads and copies move
//! real bytes; draws and presents are no-ops. This keeps the hardware
//! backend's resource and transfer bookkeeping testable without a graphics
//! API, and serves as the default device when the host supplies none.

use std::collections::HashMap;

use super::{
    DeviceFeatures, GpuDevice, PipelineDesc, PipelineHandle, SamplerDesc, SamplerHandle,
    TextureDesc, TextureHandle,
};
use crate::error::Result;

struct NullTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl NullTexture {
    fn row_bytes(&self) -> usize {
        self.desc.width as usize * self.desc.format.bytes_per_pixel()
    }
}

/// CPU-backed device with no-op draws
pub struct NullDevice {
    features: DeviceFeatures,
    textures: HashMap<u32, NullTexture>,
    next_handle: u32,
    pipelines: u32,
    samplers: u32,
    vsync: bool,
    swap_chain: (u32, u32),
    pub(crate) draw_calls: u64,
}

impl NullDevice {
    /// Create a device with no optional features
    pub fn new() -> Self {
        Self::with_features(DeviceFeatures::empty())
    }

    /// Create a device claiming the given features (for tests)
    pub fn with_features(features: DeviceFeatures) -> Self {
        Self {
            features,
            textures: HashMap::new(),
            next_handle: 1,
            pipelines: 0,
            samplers: 0,
            vsync: true,
            swap_chain: (640, 480),
            draw_calls: 0,
        }
    }

    /// Number of live textures (for leak assertions in tests)
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of pipelines compiled so far
    pub fn pipeline_count(&self) -> u32 {
        self.pipelines
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for NullDevice {
    fn name(&self) -> &str {
        "null"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        let bytes =
            desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        let handle = self.next_handle;
        self.next_handle += 1;
        self.textures.insert(
            handle,
            NullTexture {
                desc: desc.clone(),
                data: vec![0; bytes],
            },
        );
        Ok(TextureHandle(handle))
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle.0);
    }

    fn upload_texture(
        &mut self,
        handle: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        let tex = self.textures.get_mut(&handle.0).expect("invalid texture handle");
        let bpp = tex.desc.format.bytes_per_pixel();
        let row_bytes = tex.row_bytes();
        let src_row = width as usize * bpp;
        for row in 0..height as usize {
            let dst_off = (y as usize + row) * row_bytes + x as usize * bpp;
            tex.data[dst_off..dst_off + src_row]
                .copy_from_slice(&data[row * src_row..(row + 1) * src_row]);
        }
        Ok(())
    }

    fn download_texture(
        &self,
        handle: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut [u8],
    ) -> Result<()> {
        let tex = self.textures.get(&handle.0).expect("invalid texture handle");
        let bpp = tex.desc.format.bytes_per_pixel();
        let row_bytes = tex.row_bytes();
        let dst_row = width as usize * bpp;
        for row in 0..height as usize {
            let src_off = (y as usize + row) * row_bytes + x as usize * bpp;
            out[row * dst_row..(row + 1) * dst_row]
                .copy_from_slice(&tex.data[src_off..src_off + dst_row]);
        }
        Ok(())
    }

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
    ) {
        if dst == src {
            return;
        }
        let src_tex = match self.textures.get(&src.0) {
            Some(t) => t,
            None => return,
        };
        let bpp = src_tex.desc.format.bytes_per_pixel();
        let src_row_bytes = src_tex.row_bytes();
        let mut staged = Vec::with_capacity(height as usize * width as usize * bpp);
        for row in 0..height as usize {
            let off = (src_y as usize + row) * src_row_bytes + src_x as usize * bpp;
            staged.extend_from_slice(&src_tex.data[off..off + width as usize * bpp]);
        }

        if let Some(dst_tex) = self.textures.get_mut(&dst.0) {
            let dst_row_bytes = dst_tex.row_bytes();
            let line = width as usize * bpp;
            for row in 0..height as usize {
                let off = (dst_y as usize + row) * dst_row_bytes + dst_x as usize * bpp;
                dst_tex.data[off..off + line].copy_from_slice(&staged[row * line..(row + 1) * line]);
            }
        }
    }

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
    ) {
        self.copy_texture_region(dst, dst_x, dst_y, src, src_x, src_y, width, height);
    }

    fn clear_render_target(&mut self, handle: TextureHandle, _rgba: [f32; 4]) {
        if let Some(tex) = self.textures.get_mut(&handle.0) {
            tex.data.fill(0);
        }
    }

    fn clear_depth(&mut self, handle: TextureHandle, _depth: f32) {
        if let Some(tex) = self.textures.get_mut(&handle.0) {
            tex.data.fill(0);
        }
    }

    fn create_pipeline(&mut self, _desc: &PipelineDesc) -> Result<PipelineHandle> {
        self.pipelines += 1;
        Ok(PipelineHandle(self.pipelines))
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        self.samplers += 1;
        Ok(SamplerHandle(self.samplers))
    }

    fn set_render_targets(&mut self, _color: &[TextureHandle], _depth: Option<TextureHandle>) {}

    fn set_pipeline(&mut self, _pipeline: PipelineHandle) {}

    fn set_viewport(&mut self, _x: i32, _y: i32, _width: u32, _height: u32) {}

    fn set_scissor(&mut self, _x: i32, _y: i32, _width: u32, _height: u32) {}

    fn bind_texture(&mut self, _slot: u32, _handle: TextureHandle) {}

    fn bind_sampler(&mut self, _slot: u32, _handle: SamplerHandle) {}

    fn push_uniforms(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= 128);
    }

    fn upload_vertices(&mut self, _data: &[u8], _vertex_stride: usize) -> u32 {
        0
    }

    fn draw(&mut self, _vertex_count: u32, _base_vertex: u32) {
        self.draw_calls += 1;
    }

    fn begin_present(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_present(&mut self) {}

    fn set_vsync(&mut self, enabled: bool) {
        self.vsync = enabled;
    }

    fn set_max_displayed_fps(&mut self, _fps: f32) {}

    fn swap_chain_size(&self) -> (u32, u32) {
        self.swap_chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{TextureFormat, TextureType};

    #[test]
    fn test_upload_download_roundtrip() {
        let mut device = NullDevice::new();
        let tex = device
            .create_texture(&TextureDesc::flat(64, 64, TextureType::Texture, TextureFormat::R16U))
            .unwrap();

        let data: Vec<u8> = (0..32u8).collect();
        device.upload_texture(tex, 4, 4, 4, 4, &data).unwrap();

        let mut out = vec![0u8; 32];
        device.download_texture(tex, 4, 4, 4, 4, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_region_between_textures() {
        let mut device = NullDevice::new();
        let a = device
            .create_texture(&TextureDesc::flat(8, 8, TextureType::RenderTarget, TextureFormat::Rgba8))
            .unwrap();
        let b = device
            .create_texture(&TextureDesc::flat(8, 8, TextureType::Texture, TextureFormat::Rgba8))
            .unwrap();

        let data = vec![0xABu8; 4 * 4 * 4];
        device.upload_texture(a, 0, 0, 4, 4, &data).unwrap();
        device.copy_texture_region(b, 2, 2, a, 0, 0, 4, 4);

        let mut out = vec![0u8; 4 * 4 * 4];
        device.download_texture(b, 2, 2, 4, 4, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_texture_lifetime() {
        let mut device = NullDevice::new();
        let tex = device
            .create_texture(&TextureDesc::flat(4, 4, TextureType::Texture, TextureFormat::R8))
            .unwrap();
        assert_eq!(device.texture_count(), 1);
        device.destroy_texture(tex);
        assert_eq!(device.texture_count(), 0);
    }
}
