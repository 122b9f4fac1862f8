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

//! GP1 reset, buffer and DMA control

use crate::gpu::primitives::{DrawModeReg, DrawingArea, TexturePaletteReg, TextureWindow};
use crate::gpu::registers::{DisplayState, GpuStat};
use crate::gpu::{BlitterState, Gpu};
use crate::queue::record::{RecordBuffer, RecordTag, ResetPayload};

impl Gpu {
    /// GP1(0x00): reset the GPU
    ///
    /// Resets the parser, drawing environment and display registers, clears
    /// the FIFO, and asks the backend to reset (clearing VRAM).
    pub(in crate::gpu) fn gp1_reset(&mut self) {
        log::debug!("GP1 reset");
        self.abort_blit();
        self.fifo.clear();
        self.read_fifo.clear();
        self.blitter_state = BlitterState::Idle;

        self.stat = GpuStat::DISPLAY_DISABLED;
        self.draw_mode = DrawModeReg::default();
        self.palette = TexturePaletteReg::default();
        self.texture_window_reg = 0;
        self.texture_window = TextureWindow::default();
        self.drawing_area = DrawingArea::default();
        self.drawing_offset = (0, 0);
        self.display = DisplayState::default();

        let mut buf = RecordBuffer::new(RecordTag::Reset);
        buf.push_pod(&ResetPayload { clear_vram: 1 });
        let words = buf.finish();
        self.push_record_sync(words);
    }

    /// GP1(0x01): reset the command buffer
    ///
    /// Clears the FIFO and aborts any transfer in flight. An aborted
    /// CPU→VRAM transfer still lands the rows it received.
    pub(in crate::gpu) fn gp1_reset_command_buffer(&mut self) {
        log::debug!("GP1 reset command buffer");
        self.abort_blit();
        self.fifo.clear();
        self.blitter_state = BlitterState::Idle;
    }

    /// GP1(0x02): acknowledge the GPU interrupt
    pub(in crate::gpu) fn gp1_acknowledge_interrupt(&mut self) {
        self.stat.remove(GpuStat::INTERRUPT_REQUEST);
    }

    /// GP1(0x03): display enable
    pub(in crate::gpu) fn gp1_display_enable(&mut self, value: u32) {
        let disabled = value & 1 != 0;
        if disabled != self.stat.contains(GpuStat::DISPLAY_DISABLED) {
            self.stat.set(GpuStat::DISPLAY_DISABLED, disabled);
            self.push_display_update();
        }
    }

    /// GP1(0x04): DMA direction
    pub(in crate::gpu) fn gp1_dma_direction(&mut self, value: u32) {
        self.stat.set_dma_direction(value & 3);
    }

    /// GP1(0x09): allow the draw-mode texture disable bit
    pub(in crate::gpu) fn gp1_allow_texture_disable(&mut self, value: u32) {
        // Tracked for GPUSTAT readback only; the parser honours the draw
        // mode bit unconditionally.
        log::trace!("texture disable allowed: {}", value & 1);
    }

    /// Abort the blit in flight, flushing partial CPU→VRAM rows
    pub(in crate::gpu) fn abort_blit(&mut self) {
        match self.blitter_state {
            BlitterState::WritingVram => {
                if !self.blit_buffer.is_empty() {
                    self.finish_vram_write();
                } else {
                    self.blit_remaining_words = 0;
                }
            }
            BlitterState::DrawingPolyLine => {
                // A terminated polyline draws; an aborted one does not.
                self.polyline_buffer.clear();
            }
            _ => {}
        }
    }
}
