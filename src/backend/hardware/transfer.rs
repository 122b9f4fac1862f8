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

//! Transfers against the device-side VRAM
//!
//! Every transfer already went through the shadow VRAM (the authoritative
//! merge for mask semantics); these paths replay the operation on the scaled
//! render target. Fills and CPU→VRAM writes run as shader quads so interlace
//! and mask rules apply at scale; copies use a direct region copy when
//! nothing overlaps and no masking is active.
//!
//! `read_vram_from_device` closes the loop: regions that were *drawn* on the
//! device since the last mirror are encoded at half width, downloaded and
//! expanded back into the shadow so GPUREAD observes device output.

use bytemuck::{Pod, Zeroable};

use super::pipeline::PipelineKey;
use super::{DirtyRect, HardwareBackend};
use crate::device::{TextureDesc, TextureFormat, TextureType};
use crate::queue::record::{
    CommandParams, CopyVramPayload, FillVramPayload, ReadVramPayload, UpdateVramPayload,
};
use crate::settings::MessageSeverity;
use crate::vram::{Vram, VRAM_HEIGHT, VRAM_WIDTH};

/// Push constants of the fill pass
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct FillUniforms {
    color: [f32; 4],
    interlace_enable: u32,
    interlace_field: u32,
    resolution_scale: u32,
    _pad: u32,
}

/// Push constants of the write/copy passes
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RectUniforms {
    src_rect: [u32; 4],
    dst_rect: [u32; 4],
    set_mask_bit: u32,
    resolution_scale: u32,
    _pad: [u32; 2],
}

/// Replay a fill on the render target
pub(super) fn fill_vram_on_device(backend: &mut HardwareBackend, p: &FillVramPayload) {
    let params = CommandParams::from_bits_truncate(p.params);
    let key = PipelineKey::fill();
    let Some(pipe) = backend
        .pipelines
        .get(backend.device.as_mut().unwrap().as_mut(), key)
    else {
        backend
            .ctx
            .report(MessageSeverity::Error, "fill pipeline unavailable");
        return;
    };

    let scale = backend.scale;
    let uniforms = FillUniforms {
        color: [
            (p.color & 0xFF) as f32 / 255.0,
            ((p.color >> 8) & 0xFF) as f32 / 255.0,
            ((p.color >> 16) & 0xFF) as f32 / 255.0,
            0.0,
        ],
        interlace_enable: u32::from(params.contains(CommandParams::INTERLACED_RENDERING)),
        interlace_field: params.active_line_lsb(),
        resolution_scale: scale,
        _pad: 0,
    };

    let (rt, depth) = (backend.vram_rt, backend.vram_depth);
    let device = backend.device.as_mut().unwrap();
    device.set_render_targets(&[rt], Some(depth));
    device.set_pipeline(pipe);
    device.set_viewport(0, 0, VRAM_WIDTH as u32 * scale, VRAM_HEIGHT as u32 * scale);
    device.set_scissor(
        (p.x as u32 * scale) as i32,
        (p.y as u32 * scale) as i32,
        p.width as u32 * scale,
        p.height as u32 * scale,
    );
    device.push_uniforms(bytemuck::bytes_of(&uniforms));
    device.draw(3, 0);

    backend.dirty_written.include(
        p.x as u32,
        p.y as u32,
        p.x as u32 + p.width as u32,
        p.y as u32 + p.height as u32,
    );
}

/// Wrapped sub-rectangles of a transfer that may cross the VRAM edge
fn wrapped_subrects(x: u32, y: u32, width: u32, height: u32) -> Vec<(u32, u32, u32, u32, u32, u32)> {
    // (dst_x, dst_y, src_col, src_row, w, h)
    let mut out = Vec::with_capacity(4);
    let w0 = width.min(VRAM_WIDTH as u32 - x);
    let h0 = height.min(VRAM_HEIGHT as u32 - y);
    out.push((x, y, 0, 0, w0, h0));
    if w0 < width {
        out.push((0, y, w0, 0, width - w0, h0));
    }
    if h0 < height {
        out.push((x, 0, 0, h0, w0, height - h0));
        if w0 < width {
            out.push((0, 0, w0, h0, width - w0, height - h0));
        }
    }
    out
}

/// Replay a CPU→VRAM write on the render target
pub(super) fn update_vram_on_device(
    backend: &mut HardwareBackend,
    p: &UpdateVramPayload,
    data: &[u16],
) {
    let params = CommandParams::from_bits_truncate(p.params);
    let (x, y) = (p.x as u32, p.y as u32);
    let (width, height) = (p.width as u32, p.height as u32);

    // Texture replacement gets first refusal on the upload. A returned image
    // blits straight into the scaled target and replaces the shader path;
    // the shadow keeps the original pixels either way.
    if let Some(hook) = backend.ctx.texture_replacement.clone() {
        if let Some(image) = hook(x, y, width, height, data) {
            if replacement_blit(backend, x, y, &image) {
                backend.dirty_written.include(x, y, x + width, y + height);
                return;
            }
        }
    }

    // Stage the native pixels, splitting on wrap-around.
    for (dst_x, dst_y, src_col, src_row, w, h) in wrapped_subrects(x, y, width, height) {
        let mut rows: Vec<u16> = Vec::with_capacity((w * h) as usize);
        for row in 0..h {
            let start = ((src_row + row) * width + src_col) as usize;
            rows.extend_from_slice(&data[start..start + w as usize]);
        }
        let upload_tex = backend.upload_tex;
        let device = backend.device.as_mut().unwrap();
        if let Err(e) = device.upload_texture(upload_tex, dst_x, dst_y, w, h, bytemuck::cast_slice(&rows))
        {
            backend
                .ctx
                .report(MessageSeverity::Warning, &format!("VRAM upload failed: {}", e));
            return;
        }
    }

    let key = PipelineKey::vram_write();
    let Some(pipe) = backend
        .pipelines
        .get(backend.device.as_mut().unwrap().as_mut(), key)
    else {
        backend
            .ctx
            .report(MessageSeverity::Error, "VRAM write pipeline unavailable");
        return;
    };

    let scale = backend.scale;
    let uniforms = RectUniforms {
        src_rect: [x, y, width, height],
        dst_rect: [x, y, width, height],
        set_mask_bit: u32::from(params.contains(CommandParams::SET_MASK_WHILE_DRAWING)),
        resolution_scale: scale,
        _pad: [0; 2],
    };

    let (rt, depth, upload_tex, sampler) = (
        backend.vram_rt,
        backend.vram_depth,
        backend.upload_tex,
        backend.sampler_nearest,
    );
    let device = backend.device.as_mut().unwrap();
    device.set_render_targets(&[rt], Some(depth));
    device.set_pipeline(pipe);
    device.set_viewport(0, 0, VRAM_WIDTH as u32 * scale, VRAM_HEIGHT as u32 * scale);
    device.bind_texture(1, upload_tex);
    device.bind_sampler(1, sampler);
    device.push_uniforms(bytemuck::bytes_of(&uniforms));
    for (dst_x, dst_y, _, _, w, h) in wrapped_subrects(x, y, width, height) {
        let device = backend.device.as_mut().unwrap();
        device.set_scissor(
            (dst_x * scale) as i32,
            (dst_y * scale) as i32,
            w * scale,
            h * scale,
        );
        device.draw(3, 0);
        backend.dirty_written.include(dst_x, dst_y, dst_x + w, dst_y + h);
    }
}

/// Upload a replacement image and copy it into the scaled target
///
/// Returns false when the image does not cover the write rectangle at the
/// current scale, in which case the normal staging path runs.
fn replacement_blit(
    backend: &mut HardwareBackend,
    x: u32,
    y: u32,
    image: &crate::settings::ReplacementImage,
) -> bool {
    let scale = backend.scale;
    let device = backend.device.as_mut().unwrap();
    let temp = match device.create_texture(&TextureDesc::flat(
        image.width,
        image.height,
        TextureType::Dynamic,
        TextureFormat::Rgba8,
    )) {
        Ok(t) => t,
        Err(_) => return false,
    };
    if device
        .upload_texture(temp, 0, 0, image.width, image.height, &image.rgba)
        .is_err()
    {
        device.destroy_texture(temp);
        return false;
    }
    let rt = backend.vram_rt;
    let device = backend.device.as_mut().unwrap();
    device.copy_texture_region(rt, x * scale, y * scale, temp, 0, 0, image.width, image.height);
    device.destroy_texture(temp);
    log::debug!(
        "texture replacement blit at ({}, {}): {}x{}",
        x,
        y,
        image.width,
        image.height
    );
    true
}

/// Replay a VRAM→VRAM copy on the render target
pub(super) fn copy_vram_on_device(backend: &mut HardwareBackend, p: &CopyVramPayload) {
    let params = CommandParams::from_bits_truncate(p.params);
    let (src_x, src_y) = (p.src_x as u32, p.src_y as u32);
    let (dst_x, dst_y) = (p.dst_x as u32, p.dst_y as u32);
    let (width, height) = (p.width as u32, p.height as u32);
    let scale = backend.scale;

    let in_bounds = src_x + width <= VRAM_WIDTH as u32
        && dst_x + width <= VRAM_WIDTH as u32
        && src_y + height <= VRAM_HEIGHT as u32
        && dst_y + height <= VRAM_HEIGHT as u32;
    let overlaps = DirtyRect { x0: src_x, y0: src_y, x1: src_x + width, y1: src_y + height }
        .intersects(dst_x, dst_y, dst_x + width, dst_y + height);

    if in_bounds && !overlaps && !params.masking_enabled() && backend.msaa == 1 {
        let rt = backend.vram_rt;
        let device = backend.device.as_mut().unwrap();
        device.copy_texture_region(
            rt,
            dst_x * scale,
            dst_y * scale,
            rt,
            src_x * scale,
            src_y * scale,
            width * scale,
            height * scale,
        );
        backend.dirty_written.include(dst_x, dst_y, dst_x + width, dst_y + height);
        return;
    }

    // Sampled copy through the read cache, which also covers overlap and
    // mask-set cases (mask-check still relies on the depth buffer).
    backend.update_vram_read_cache();

    let key = PipelineKey::vram_copy();
    let Some(pipe) = backend
        .pipelines
        .get(backend.device.as_mut().unwrap().as_mut(), key)
    else {
        backend
            .ctx
            .report(MessageSeverity::Error, "VRAM copy pipeline unavailable");
        return;
    };

    let uniforms = RectUniforms {
        src_rect: [src_x, src_y, width, height],
        dst_rect: [dst_x, dst_y, width, height],
        set_mask_bit: u32::from(params.contains(CommandParams::SET_MASK_WHILE_DRAWING)),
        resolution_scale: scale,
        _pad: [0; 2],
    };

    let (rt, depth, read, sampler) = (
        backend.vram_rt,
        backend.vram_depth,
        backend.vram_read,
        backend.sampler_nearest,
    );
    let device = backend.device.as_mut().unwrap();
    device.set_render_targets(&[rt], Some(depth));
    device.set_pipeline(pipe);
    device.set_viewport(0, 0, VRAM_WIDTH as u32 * scale, VRAM_HEIGHT as u32 * scale);
    device.set_scissor(
        (dst_x * scale) as i32,
        (dst_y * scale) as i32,
        width * scale,
        height * scale,
    );
    device.bind_texture(0, read);
    device.bind_sampler(0, sampler);
    device.push_uniforms(bytemuck::bytes_of(&uniforms));
    device.draw(3, 0);

    backend.dirty_written.include(dst_x, dst_y, dst_x + width, dst_y + height);
}

/// Mirror device-drawn regions back into the shadow VRAM
pub(super) fn read_vram_from_device(
    backend: &mut HardwareBackend,
    vram: &mut Vram,
    p: &ReadVramPayload,
) {
    let (x, y) = (p.x as u32, p.y as u32);
    let (width, height) = (p.width as u32, p.height as u32);

    // Transfers keep the shadow exact; only drawn pixels need the device.
    if !backend.shadow_stale.intersects(x, y, x + width, y + height) {
        return;
    }
    let stale = backend.shadow_stale;
    let rx0 = x.max(stale.x0);
    let ry0 = y.max(stale.y0);
    let rx1 = (x + width).min(stale.x1);
    let ry1 = (y + height).min(stale.y1);
    let (rw, rh) = (rx1 - rx0, ry1 - ry0);

    backend.update_vram_read_cache();

    // Two 16bpp pixels per RGBA8 output pixel.
    let enc_w = rw.div_ceil(2);
    ensure_readback_texture(backend, enc_w, rh);

    let key = PipelineKey::readback_encode();
    let Some(pipe) = backend
        .pipelines
        .get(backend.device.as_mut().unwrap().as_mut(), key)
    else {
        backend
            .ctx
            .report(MessageSeverity::Error, "readback pipeline unavailable");
        return;
    };

    let scale = backend.scale;
    let uniforms = RectUniforms {
        src_rect: [rx0, ry0, rw, rh],
        dst_rect: [0, 0, enc_w, rh],
        set_mask_bit: 0,
        resolution_scale: scale,
        _pad: [0; 2],
    };

    let (readback, read, sampler) = (
        backend.vram_readback,
        backend.vram_read,
        backend.sampler_nearest,
    );
    let device = backend.device.as_mut().unwrap();
    device.set_render_targets(&[readback], None);
    device.set_pipeline(pipe);
    device.set_viewport(0, 0, enc_w, rh);
    device.set_scissor(0, 0, enc_w, rh);
    device.bind_texture(0, read);
    device.bind_sampler(0, sampler);
    device.push_uniforms(bytemuck::bytes_of(&uniforms));
    device.draw(3, 0);

    let mut bytes = vec![0u8; (enc_w * rh * 4) as usize];
    if let Err(e) = device.download_texture(readback, 0, 0, enc_w, rh, &mut bytes) {
        backend
            .ctx
            .report(MessageSeverity::Warning, &format!("VRAM readback failed: {}", e));
        return;
    }

    // Expand the packed rows into the shadow. The download buffer has no
    // alignment guarantee, so assemble each pixel from bytes.
    for row in 0..rh {
        for col in 0..rw {
            let idx = ((row * enc_w * 2 + col) * 2) as usize;
            let value = u16::from_le_bytes([bytes[idx], bytes[idx + 1]]);
            vram.set_pixel(rx0 + col, ry0 + row, value);
        }
    }

    // Only forget staleness the mirror fully covered.
    if rx0 <= stale.x0 && ry0 <= stale.y0 && rx1 >= stale.x1 && ry1 >= stale.y1 {
        backend.shadow_stale = DirtyRect::EMPTY;
    }
}

fn ensure_readback_texture(backend: &mut HardwareBackend, width: u32, height: u32) {
    if backend.vram_readback.is_valid()
        && backend.readback_size.0 >= width
        && backend.readback_size.1 >= height
    {
        return;
    }

    let w = width.max(backend.readback_size.0).max(256);
    let h = height.max(backend.readback_size.1).max(256);
    let old = backend.vram_readback;
    let device = backend.device.as_mut().unwrap();
    if old.is_valid() {
        device.destroy_texture(old);
    }
    match device.create_texture(&TextureDesc::flat(
        w,
        h,
        TextureType::RenderTarget,
        TextureFormat::Rgba8,
    )) {
        Ok(handle) => {
            backend.vram_readback = handle;
            backend.readback_size = (w, h);
        }
        Err(e) => {
            backend
                .ctx
                .report(MessageSeverity::Warning, &format!("readback allocation failed: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_subrects_in_bounds() {
        let rects = wrapped_subrects(100, 200, 50, 30);
        assert_eq!(rects, vec![(100, 200, 0, 0, 50, 30)]);
    }

    #[test]
    fn test_wrapped_subrects_horizontal_wrap() {
        let rects = wrapped_subrects(1000, 0, 100, 1);
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0], (1000, 0, 0, 0, 24, 1));
        assert_eq!(rects[1], (0, 0, 24, 0, 76, 1));
    }

    #[test]
    fn test_wrapped_subrects_both_axes() {
        let rects = wrapped_subrects(1020, 510, 8, 4);
        assert_eq!(rects.len(), 4);
        assert_eq!(rects[0], (1020, 510, 0, 0, 4, 2));
        assert_eq!(rects[1], (0, 510, 4, 0, 4, 2));
        assert_eq!(rects[2], (1020, 0, 0, 2, 4, 2));
        assert_eq!(rects[3], (0, 0, 4, 2, 4, 2));
    }
}
