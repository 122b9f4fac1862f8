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

//! VRAM transfer behaviour observed through the full pipeline

use super::{pos, test_gpu};

/// Feed a CPU→VRAM transfer of the given pixels
fn upload(gpu: &mut crate::gpu::Gpu, x: i16, y: i16, w: u16, h: u16, pixels: &[u16]) {
    gpu.gp0_write(0xA000_0000);
    gpu.gp0_write(pos(x, y));
    gpu.gp0_write((w as u32) | ((h as u32) << 16));
    for pair in pixels.chunks(2) {
        let lo = pair[0] as u32;
        let hi = if pair.len() > 1 { pair[1] as u32 } else { 0 };
        gpu.gp0_write(lo | (hi << 16));
    }
}

#[test]
fn test_upload_readback_roundtrip() {
    let mut gpu = test_gpu();
    let pixels: Vec<u16> = (0..64u16).map(|v| v * 3 + 1).collect();
    upload(&mut gpu, 10, 20, 8, 8, &pixels);
    assert_eq!(gpu.read_vram_rect(10, 20, 8, 8), pixels);
}

#[test]
fn test_gpuread_transfer() {
    let mut gpu = test_gpu();
    let pixels = [0x1234u16, 0x5678, 0x9ABC, 0xDEF0];
    upload(&mut gpu, 0, 0, 4, 1, &pixels);

    // VRAM→CPU of the same rectangle.
    gpu.gp0_write(0xC000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(4 | (1 << 16));

    // Readback ready bit while data is pending.
    assert_ne!(gpu.status() & (1 << 27), 0);

    assert_eq!(gpu.gpu_read(), 0x5678_1234);
    assert_eq!(gpu.gpu_read(), 0xDEF0_9ABC);

    // Drained; the ready bit falls.
    assert_eq!(gpu.status() & (1 << 27), 0);
}

#[test]
fn test_wraparound_write_lands_in_both_edges() {
    let mut gpu = test_gpu();
    let pixels: Vec<u16> = (0..100u16).map(|v| v + 1).collect();
    upload(&mut gpu, 1000, 0, 100, 1, &pixels);

    // Columns 1000..1023 take the first 24 pixels, 0..75 the rest.
    assert_eq!(gpu.read_vram_rect(1000, 0, 1, 1)[0], 1);
    assert_eq!(gpu.read_vram_rect(1023, 0, 1, 1)[0], 24);
    assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 25);
    assert_eq!(gpu.read_vram_rect(75, 0, 1, 1)[0], 100);
    assert_eq!(gpu.read_vram_rect(76, 0, 1, 1)[0], 0);
}

#[test]
fn test_zero_width_maps_to_full_span() {
    let mut gpu = test_gpu();
    // Width 0 decodes as 0x400; transfer one row of 1024 pixels.
    gpu.gp0_write(0xA000_0000);
    gpu.gp0_write(pos(0, 100));
    gpu.gp0_write(0 | (1 << 16));
    for i in 0..512u32 {
        gpu.gp0_write(i | (i << 16));
    }

    assert_eq!(gpu.read_vram_rect(1022, 100, 1, 1)[0], 511);
    assert_eq!(gpu.read_vram_rect(1023, 100, 1, 1)[0], 511);
    // The transfer is complete: the parser accepts commands again.
    assert_ne!(gpu.status() & (1 << 26), 0);
}

#[test]
fn test_overlapping_copy_right_to_left() {
    let mut gpu = test_gpu();
    let pixels: Vec<u16> = (0..8u16).collect();
    upload(&mut gpu, 0, 0, 8, 1, &pixels);

    // Copy (0,0) 8x1 to (1,0): overlapping, src left of dst.
    gpu.gp0_write(0x8000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(pos(1, 0));
    gpu.gp0_write(8 | (1 << 16));

    assert_eq!(
        gpu.read_vram_rect(0, 0, 9, 1),
        vec![0, 0, 1, 2, 3, 4, 5, 6, 7]
    );
}

#[test]
fn test_copy_respects_mask_check() {
    let mut gpu = test_gpu();
    upload(&mut gpu, 0, 0, 4, 1, &[0x1111, 0x2222, 0x3333, 0x4444]);
    // Destination pixel 1 carries the mask bit.
    upload(&mut gpu, 10, 0, 4, 1, &[0x0000, 0x8000, 0x0000, 0x0000]);

    gpu.gp0_write(0xE600_0002); // check mask before draw
    gpu.gp0_write(0x8000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(pos(10, 0));
    gpu.gp0_write(4 | (1 << 16));

    assert_eq!(
        gpu.read_vram_rect(10, 0, 4, 1),
        vec![0x1111, 0x8000, 0x3333, 0x4444]
    );
}

#[test]
fn test_update_with_set_mask_tags_pixels() {
    let mut gpu = test_gpu();
    gpu.gp0_write(0xE600_0001); // set mask while drawing
    upload(&mut gpu, 0, 0, 2, 1, &[0x0001, 0x0002]);
    assert_eq!(gpu.read_vram_rect(0, 0, 2, 1), vec![0x8001, 0x8002]);
}
