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

//! GP0(0xE1..0xE6) drawing environment writes
//!
//! These mutate parser state only and never emit draw records; the one
//! exception is the drawing area, whose changes invalidate backend scissor
//! state and therefore travel through the queue.

use crate::gpu::primitives::{truncate_vertex_coord, TextureWindow};
use crate::queue::record::{RecordBuffer, RecordTag, SetDrawingAreaPayload};

use super::Gpu;

impl Gpu {
    /// GP0(0xE1): draw mode register
    pub(in crate::gpu) fn gp0_draw_mode(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap();
        self.set_draw_mode((value & 0x3FFF) as u16);
        true
    }

    /// GP0(0xE2): texture window
    pub(in crate::gpu) fn gp0_texture_window(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap() & 0x000F_FFFF;
        if value != self.texture_window_reg {
            self.texture_window_reg = value;
            self.texture_window = TextureWindow::from_reg(value);
            log::trace!(
                "texture window: and=({:02X},{:02X}) or=({:02X},{:02X})",
                self.texture_window.and_x,
                self.texture_window.and_y,
                self.texture_window.or_x,
                self.texture_window.or_y
            );
        }
        true
    }

    /// GP0(0xE3): drawing area top-left
    pub(in crate::gpu) fn gp0_drawing_area_top_left(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap();
        let left = value & 0x3FF;
        let top = (value >> 10) & 0x3FF;
        if left != self.drawing_area.left || top != self.drawing_area.top {
            self.drawing_area.left = left;
            self.drawing_area.top = top;
            self.push_drawing_area();
        }
        true
    }

    /// GP0(0xE4): drawing area bottom-right
    pub(in crate::gpu) fn gp0_drawing_area_bottom_right(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap();
        let right = value & 0x3FF;
        let bottom = (value >> 10) & 0x3FF;
        if right != self.drawing_area.right || bottom != self.drawing_area.bottom {
            self.drawing_area.right = right;
            self.drawing_area.bottom = bottom;
            self.push_drawing_area();
        }
        true
    }

    /// GP0(0xE5): drawing offset, signed 11-bit per axis
    pub(in crate::gpu) fn gp0_drawing_offset(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap();
        let x = truncate_vertex_coord((value & 0x7FF) as i32);
        let y = truncate_vertex_coord(((value >> 11) & 0x7FF) as i32);
        self.drawing_offset = (x, y);
        true
    }

    /// GP0(0xE6): mask bit settings
    pub(in crate::gpu) fn gp0_mask_settings(&mut self) -> bool {
        let value = self.fifo.pop_front().unwrap();
        self.stat.set(
            crate::gpu::registers::GpuStat::SET_MASK_WHILE_DRAWING,
            value & 1 != 0,
        );
        self.stat.set(
            crate::gpu::registers::GpuStat::CHECK_MASK_BEFORE_DRAW,
            value & 2 != 0,
        );
        true
    }

    fn push_drawing_area(&mut self) {
        let mut buf = RecordBuffer::new(RecordTag::SetDrawingArea);
        buf.push_pod(&SetDrawingAreaPayload {
            left: self.drawing_area.left as u16,
            top: self.drawing_area.top as u16,
            right: self.drawing_area.right as u16,
            bottom: self.drawing_area.bottom as u16,
        });
        let words = buf.finish();
        self.push_record(words);
    }
}
