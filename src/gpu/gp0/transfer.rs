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

//! GP0 VRAM transfer commands
//!
//! CPU→VRAM (0xA0), VRAM→CPU (0xC0) and VRAM→VRAM (0x80). Zero widths and
//! heights wrap to 0x400/0x200 (16-bit wrap-around of the decrement-test
//! counter). A CPU→VRAM transfer aborted early still lands its complete
//! rows, then one partial row.

use crate::gpu::timing;
use crate::gpu::{BlitterState, VramTransfer};
use crate::queue::record::{
    CopyVramPayload, ReadVramPayload, RecordBuffer, RecordTag, UpdateVramPayload,
};

use super::Gpu;

/// Decode a transfer size field: 0 maps to the full axis
fn transfer_size(size: u32, mask: u32) -> u32 {
    (size.wrapping_sub(1) & mask) + 1
}

impl Gpu {
    /// GP0(0xA0): begin a CPU→VRAM transfer
    pub(in crate::gpu) fn handle_vram_write_start(&mut self) -> bool {
        if self.fifo.len() < 3 {
            return false;
        }

        let _ = self.fifo.pop_front().unwrap();
        let coords = self.fifo.pop_front().unwrap();
        let size = self.fifo.pop_front().unwrap();

        let x = coords & 0x3FF;
        let y = (coords >> 16) & 0x1FF;
        let width = transfer_size(size & 0xFFFF, 0x3FF);
        let height = transfer_size(size >> 16, 0x1FF);

        let num_pixels = width * height;
        let num_words = num_pixels.div_ceil(2);

        log::debug!("CPU→VRAM transfer: ({}, {}) {}x{}", x, y, width, height);

        self.vram_transfer = VramTransfer { x, y, width, height };
        self.blit_buffer.clear();
        self.blit_remaining_words = num_words;
        self.blitter_state = BlitterState::WritingVram;
        self.pending_ticks += timing::vram_write_ticks(width, height);
        true
    }

    /// Consume raw data words of the transfer in flight
    pub(in crate::gpu) fn continue_vram_write(&mut self) -> bool {
        let mut progressed = false;
        while self.blit_remaining_words > 0 {
            match self.fifo.pop_front() {
                Some(word) => {
                    self.blit_buffer.push(word);
                    self.blit_remaining_words -= 1;
                    progressed = true;
                }
                None => return progressed,
            }
        }
        self.finish_vram_write();
        true
    }

    /// Emit the completed (or aborted) CPU→VRAM transfer
    ///
    /// An aborted transfer writes the complete rows it received, then one
    /// partial row, matching observed hardware behaviour.
    pub(in crate::gpu) fn finish_vram_write(&mut self) {
        let transfer = self.vram_transfer;
        let buffer = std::mem::take(&mut self.blit_buffer);
        self.blitter_state = BlitterState::Idle;

        let pixels: &[u16] = bytemuck::cast_slice(&buffer);

        if self.blit_remaining_words == 0 {
            self.push_vram_write(transfer.x, transfer.y, transfer.width, transfer.height, pixels);
        } else {
            let transferred_pixels = buffer.len() as u32 * 2;
            let full_rows = transferred_pixels / transfer.width;
            let last_row_width = transferred_pixels % transfer.width;
            log::warn!(
                "partial VRAM write: {} of {} rows, {} pixels on the last row",
                full_rows,
                transfer.height,
                last_row_width
            );

            if full_rows > 0 {
                self.push_vram_write(
                    transfer.x,
                    transfer.y,
                    transfer.width,
                    full_rows,
                    &pixels[..(transfer.width * full_rows) as usize],
                );
            }
            if last_row_width > 0 {
                let start = (transfer.width * full_rows) as usize;
                self.push_vram_write(
                    transfer.x,
                    transfer.y + full_rows,
                    last_row_width,
                    1,
                    &pixels[start..start + last_row_width as usize],
                );
            }
            self.blit_remaining_words = 0;
        }
    }

    fn push_vram_write(&mut self, x: u32, y: u32, width: u32, height: u32, pixels: &[u16]) {
        let mut buf = RecordBuffer::new(RecordTag::UpdateVram);
        buf.push_pod(&UpdateVramPayload {
            x: x as u16,
            y: y as u16,
            width: width as u16,
            height: height as u16,
            params: self.command_params().bits(),
        });
        buf.push_u16_slice(&pixels[..(width * height) as usize]);
        let words = buf.finish();
        self.push_record(words);
    }

    /// GP0(0xC0): begin a VRAM→CPU transfer
    ///
    /// Synchronous: the queue drains (and the hardware backend mirrors drawn
    /// regions into the shadow) before the read FIFO is filled.
    pub(in crate::gpu) fn handle_vram_read_start(&mut self) -> bool {
        if self.fifo.len() < 3 {
            return false;
        }

        let _ = self.fifo.pop_front().unwrap();
        let coords = self.fifo.pop_front().unwrap();
        let size = self.fifo.pop_front().unwrap();

        let x = coords & 0x3FF;
        let y = (coords >> 16) & 0x1FF;
        let width = transfer_size(size & 0xFFFF, 0x3FF);
        let height = transfer_size(size >> 16, 0x1FF);

        log::debug!("VRAM→CPU transfer: ({}, {}) {}x{}", x, y, width, height);

        let mut buf = RecordBuffer::new(RecordTag::ReadVram);
        buf.push_pod(&ReadVramPayload {
            x: x as u16,
            y: y as u16,
            width: width as u16,
            height: height as u16,
        });
        let words = buf.finish();
        self.push_record_sync(words);

        // Pack two pixels per GPUREAD word, row-major with wrap-around.
        let rect = self.lock_vram().read_rect(x, y, width, height);
        self.read_fifo.clear();
        for pair in rect.chunks(2) {
            let lo = pair[0] as u32;
            let hi = if pair.len() > 1 { pair[1] as u32 } else { 0 };
            self.read_fifo.push_back(lo | (hi << 16));
        }

        self.blitter_state = BlitterState::ReadingVram;
        true
    }

    /// GP0(0x80): VRAM→VRAM copy
    pub(in crate::gpu) fn handle_vram_copy(&mut self) -> bool {
        if self.fifo.len() < 4 {
            return false;
        }

        let _ = self.fifo.pop_front().unwrap();
        let src = self.fifo.pop_front().unwrap();
        let dst = self.fifo.pop_front().unwrap();
        let size = self.fifo.pop_front().unwrap();

        let src_x = src & 0x3FF;
        let src_y = (src >> 16) & 0x1FF;
        let dst_x = dst & 0x3FF;
        let dst_y = (dst >> 16) & 0x1FF;
        let width = transfer_size(size & 0xFFFF, 0x3FF);
        let height = transfer_size(size >> 16, 0x1FF);

        log::debug!(
            "VRAM→VRAM copy: ({}, {}) → ({}, {}) {}x{}",
            src_x,
            src_y,
            dst_x,
            dst_y,
            width,
            height
        );

        let mut buf = RecordBuffer::new(RecordTag::CopyVram);
        buf.push_pod(&CopyVramPayload {
            src_x: src_x as u16,
            src_y: src_y as u16,
            dst_x: dst_x as u16,
            dst_y: dst_y as u16,
            width: width as u16,
            height: height as u16,
            params: self.command_params().bits(),
        });
        let words = buf.finish();
        self.push_record(words);

        self.pending_ticks += timing::vram_copy_ticks(width, height);
        true
    }
}
