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

//! GP0(0x60..0x7F) rectangle commands
//!
//! Axis-aligned rectangles: one position word, an optional texcoord+palette
//! word, and a trailing size word for the variable-size forms. Rectangles
//! reuse the current draw mode (no texpage attribute) and are never
//! dithered.

use crate::gpu::primitives::{
    truncate_vertex_coord, RectangleSize, RenderCommand, TexturePaletteReg, VertexPosition,
};
use crate::gpu::timing;
use crate::queue::record::{DrawHeaderPayload, RecordBuffer, RecordTag, SpritePayload};
use crate::vram::{MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH};

use super::Gpu;

impl Gpu {
    /// GP0(0x60..0x7F): render a rectangle
    pub(in crate::gpu) fn handle_rectangle(&mut self) -> bool {
        let rc = RenderCommand(*self.fifo.front().unwrap());
        let variable = rc.rectangle_size() == RectangleSize::Variable;
        let total_words = 2 + usize::from(rc.texture_enable()) + usize::from(variable);
        if self.fifo.len() < total_words {
            return false;
        }

        self.pending_ticks += timing::RECTANGLE_SETUP_TICKS;

        self.fifo.pop_front();
        let pos = VertexPosition::from_u32(self.fifo.pop_front().unwrap());
        let x = truncate_vertex_coord(self.drawing_offset.0 + pos.x);
        let y = truncate_vertex_coord(self.drawing_offset.1 + pos.y);

        let texcoord = if rc.texture_enable() {
            let texcoord_and_palette = self.fifo.pop_front().unwrap();
            self.palette = TexturePaletteReg(
                ((texcoord_and_palette >> 16) as u16) & TexturePaletteReg::MASK,
            );
            texcoord_and_palette & 0xFFFF
        } else {
            0
        };

        let (width, height) = match rc.rectangle_size() {
            RectangleSize::R1x1 => (1, 1),
            RectangleSize::R8x8 => (8, 8),
            RectangleSize::R16x16 => (16, 16),
            RectangleSize::Variable => {
                let size = self.fifo.pop_front().unwrap();
                let width = size & 0x3FF;
                let height = (size >> 16) & 0x1FF;
                if width as i32 >= MAX_PRIMITIVE_WIDTH || height as i32 >= MAX_PRIMITIVE_HEIGHT {
                    log::trace!("culling too-large rectangle: {},{} {}x{}", x, y, width, height);
                    return true;
                }
                (width, height)
            }
        };
        if width == 0 || height == 0 {
            return true;
        }

        // Clip for the tick estimate; the backend clips for real.
        let clip_left = x.clamp(self.drawing_area.left as i32, self.drawing_area.right as i32);
        let clip_right =
            (x + width as i32).clamp(self.drawing_area.left as i32, self.drawing_area.right as i32)
                + 1;
        let clip_top = y.clamp(self.drawing_area.top as i32, self.drawing_area.bottom as i32);
        let clip_bottom =
            (y + height as i32).clamp(self.drawing_area.top as i32, self.drawing_area.bottom as i32)
                + 1;
        self.pending_ticks += timing::rectangle_fill_ticks(
            (clip_right - clip_left) as u32,
            (clip_bottom - clip_top) as u32,
            rc.texture_enable(),
            rc.transparency_enable(),
        );

        let head = DrawHeaderPayload {
            rc: rc.0,
            draw_mode: self.draw_mode.0 as u32,
            palette: self.palette.0 as u32,
            window: self.texture_window,
            params: self.command_params().bits(),
            num_vertices: 0,
        };
        let mut buf = RecordBuffer::new(RecordTag::DrawSprite);
        buf.push_pod(&head);
        buf.push_pod(&SpritePayload {
            x,
            y,
            width,
            height,
            texcoord,
            color: rc.color_for_first_vertex(),
        });
        let words = buf.finish();
        self.push_record(words);
        true
    }
}
