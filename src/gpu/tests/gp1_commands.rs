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

//! GP1 display control

use super::{pos, test_gpu};

#[test]
fn test_reset_clears_vram_and_state() {
    let mut gpu = test_gpu();
    gpu.gp0_write(0x2000_00FF);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(pos(31, 0));
    gpu.gp0_write(pos(0, 31));
    gpu.gp0_write(0xE100_000A);
    assert_ne!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0);

    gpu.gp1_write(0x0000_0000);

    assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0);
    assert_eq!(gpu.status() & 0xF, 0);
    assert_ne!(gpu.status() & (1 << 23), 0, "display disabled after reset");
}

#[test]
fn test_reset_command_buffer_discards_pending_words() {
    let mut gpu = test_gpu();
    // Two words of a four-word triangle, then a buffer reset.
    gpu.gp0_write(0x2000_00FF);
    gpu.gp0_write(pos(0, 0));
    gpu.gp1_write(0x0100_0000);

    // These two words would have completed the triangle; they must now be
    // interpreted as new commands (both NOPs here).
    gpu.gp0_write(0x0000_0000);
    gpu.gp0_write(0x0000_0000);
    assert!(gpu.read_vram_rect(0, 0, 8, 8).iter().all(|&p| p == 0));
}

#[test]
fn test_display_enable_bit() {
    let mut gpu = test_gpu();
    gpu.gp1_write(0x0300_0000); // enable (bit clear)
    assert_eq!(gpu.status() & (1 << 23), 0);
    gpu.gp1_write(0x0300_0001); // disable
    assert_ne!(gpu.status() & (1 << 23), 0);
}

#[test]
fn test_dma_direction_field() {
    let mut gpu = test_gpu();
    gpu.gp1_write(0x0400_0002);
    assert_eq!((gpu.status() >> 29) & 3, 2);
    // Direction 2 requests DMA while ready to receive.
    assert_ne!(gpu.status() & (1 << 25), 0);

    gpu.gp1_write(0x0400_0000);
    assert_eq!((gpu.status() >> 29) & 3, 0);
    assert_eq!(gpu.status() & (1 << 25), 0);
}

#[test]
fn test_display_mode_bits() {
    let mut gpu = test_gpu();
    // 320 wide, 240 lines, NTSC, 24bpp, interlace.
    gpu.gp1_write(0x0800_0000 | 1 | (1 << 4) | (1 << 5));
    let status = gpu.status();
    assert_eq!((status >> 17) & 3, 1);
    assert_ne!(status & (1 << 21), 0);
    assert_ne!(status & (1 << 22), 0);
}

#[test]
fn test_gpu_info_texture_window() {
    let mut gpu = test_gpu();
    gpu.gp0_write(0xE200_0000 | 0x155);
    gpu.gp1_write(0x1000_0002);
    assert_eq!(gpu.gpu_read(), 0x155);
}

#[test]
fn test_gpu_info_drawing_area_and_offset() {
    let mut gpu = test_gpu();
    gpu.gp0_write(0xE300_0000 | 16 | (32 << 10));
    gpu.gp0_write(0xE400_0000 | 255 | (199 << 10));
    gpu.gp0_write(0xE500_0000 | 5 | (10 << 11));

    gpu.gp1_write(0x1000_0003);
    assert_eq!(gpu.gpu_read(), 16 | (32 << 10));
    gpu.gp1_write(0x1000_0004);
    assert_eq!(gpu.gpu_read(), 255 | (199 << 10));
    gpu.gp1_write(0x1000_0005);
    assert_eq!(gpu.gpu_read(), 5 | (10 << 11));
}

#[test]
fn test_gp1_reset_aborts_vram_write_with_partial_rows() {
    let mut gpu = test_gpu();
    // 4x2 transfer, but only 3 of the 4 data words arrive.
    gpu.gp0_write(0xA000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(4 | (2 << 16));
    gpu.gp0_write(0x1111_2222);
    gpu.gp0_write(0x3333_4444);
    gpu.gp0_write(0x5555_6666);
    gpu.gp1_write(0x0100_0000);

    // One complete row, then a two-pixel partial row.
    assert_eq!(
        gpu.read_vram_rect(0, 0, 4, 1),
        vec![0x2222, 0x1111, 0x4444, 0x3333]
    );
    assert_eq!(gpu.read_vram_rect(0, 1, 4, 1), vec![0x6666, 0x5555, 0, 0]);
}
