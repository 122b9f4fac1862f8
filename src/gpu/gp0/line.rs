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

//! GP0(0x40..0x5F) line commands
//!
//! Two-vertex lines complete in one step. Polylines switch the parser into
//! an accumulation state that ends when the first word of a vertex matches
//! `0x5000_5000` under the `0xF000_F000` mask; a polyline always consumes at
//! least two vertices before the terminator is honoured.

use crate::gpu::primitives::{RenderCommand, VertexPosition};
use crate::gpu::timing;
use crate::gpu::BlitterState;
use crate::queue::record::{DrawHeaderPayload, LineVertex, RecordBuffer, RecordTag};
use crate::vram::{MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH};

use super::Gpu;

/// Polyline terminator pattern
const TERMINATOR_MASK: u32 = 0xF000_F000;
const TERMINATOR_VALUE: u32 = 0x5000_5000;

impl Gpu {
    /// GP0(0x40/0x42/0x50/0x52): single line segment
    pub(in crate::gpu) fn handle_line(&mut self) -> bool {
        let rc = RenderCommand(*self.fifo.front().unwrap());
        let total_words = if rc.shading_enable() { 4 } else { 3 };
        if self.fifo.len() < total_words {
            return false;
        }

        self.pending_ticks += timing::RECTANGLE_SETUP_TICKS;
        self.fifo.pop_front();

        let color0 = rc.color_for_first_vertex();
        let pos0 = VertexPosition::from_u32(self.fifo.pop_front().unwrap());
        let color1 = if rc.shading_enable() {
            self.fifo.pop_front().unwrap() & 0x00FF_FFFF
        } else {
            color0
        };
        let pos1 = VertexPosition::from_u32(self.fifo.pop_front().unwrap());

        let vertices = [
            LineVertex {
                x: self.drawing_offset.0 + pos0.x,
                y: self.drawing_offset.1 + pos0.y,
                color: color0,
            },
            LineVertex {
                x: self.drawing_offset.0 + pos1.x,
                y: self.drawing_offset.1 + pos1.y,
                color: color1,
            },
        ];

        let dx = (vertices[1].x - vertices[0].x).abs();
        let dy = (vertices[1].y - vertices[0].y).abs();
        if dx >= MAX_PRIMITIVE_WIDTH || dy >= MAX_PRIMITIVE_HEIGHT {
            log::trace!("culling too-large line: {:?}", vertices);
            return true;
        }
        self.pending_ticks += timing::line_fill_ticks(
            dx as u32,
            dy as u32,
            rc.shading_enable(),
            rc.transparency_enable(),
        );

        self.emit_line_record(rc, &vertices);
        true
    }

    /// GP0(0x48..0x5F with the polyline bit): begin accumulating a polyline
    pub(in crate::gpu) fn handle_polyline_start(&mut self) -> bool {
        let rc = RenderCommand(self.fifo.pop_front().unwrap());
        self.render_command = rc;
        self.polyline_buffer.clear();
        self.blitter_state = BlitterState::DrawingPolyLine;
        self.pending_ticks += timing::RECTANGLE_SETUP_TICKS;
        log::trace!(
            "polyline start: {} {}",
            if rc.shading_enable() { "shaded" } else { "monochrome" },
            if rc.transparency_enable() { "semi-transparent" } else { "opaque" },
        );
        true
    }

    /// Feed buffered FIFO words into the polyline accumulator
    pub(in crate::gpu) fn continue_polyline(&mut self) -> bool {
        let shaded = self.render_command.shading_enable();
        let mut progressed = false;

        while let Some(&word) = self.fifo.front() {
            let len = self.polyline_buffer.len();
            // Vertex 0 takes one word (its color came with the command);
            // later vertices take one (flat) or two (shaded) words.
            let vertices_done = if shaded {
                if len == 0 { 0 } else { 1 + (len - 1) / 2 }
            } else {
                len
            };
            let starts_vertex = if shaded { len == 0 || (len - 1) % 2 == 0 } else { true };

            if vertices_done >= 2
                && starts_vertex
                && (word & TERMINATOR_MASK) == TERMINATOR_VALUE
            {
                self.fifo.pop_front();
                self.finish_polyline();
                return true;
            }

            self.polyline_buffer.push(word);
            self.fifo.pop_front();
            progressed = true;
        }
        progressed
    }

    /// Emit the accumulated polyline as one line-strip record
    pub(in crate::gpu) fn finish_polyline(&mut self) {
        self.blitter_state = BlitterState::Idle;

        let rc = self.render_command;
        let shaded = rc.shading_enable();
        let buffer = std::mem::take(&mut self.polyline_buffer);
        if buffer.is_empty() {
            return;
        }

        let mut vertices = Vec::with_capacity(2 + buffer.len() / 2);
        let pos0 = VertexPosition::from_u32(buffer[0]);
        vertices.push(LineVertex {
            x: self.drawing_offset.0 + pos0.x,
            y: self.drawing_offset.1 + pos0.y,
            color: rc.color_for_first_vertex(),
        });

        let mut i = 1;
        while i < buffer.len() {
            let (color, pos_word) = if shaded {
                if i + 1 >= buffer.len() {
                    break; // incomplete trailing vertex
                }
                let c = buffer[i] & 0x00FF_FFFF;
                let p = buffer[i + 1];
                i += 2;
                (c, p)
            } else {
                let p = buffer[i];
                i += 1;
                (rc.color_for_first_vertex(), p)
            };
            let pos = VertexPosition::from_u32(pos_word);
            vertices.push(LineVertex {
                x: self.drawing_offset.0 + pos.x,
                y: self.drawing_offset.1 + pos.y,
                color,
            });
        }

        if vertices.len() < 2 {
            return;
        }

        for pair in vertices.windows(2) {
            let dx = (pair[1].x - pair[0].x).unsigned_abs();
            let dy = (pair[1].y - pair[0].y).unsigned_abs();
            self.pending_ticks += timing::line_fill_ticks(
                dx,
                dy,
                rc.shading_enable(),
                rc.transparency_enable(),
            );
        }

        self.emit_line_record(rc, &vertices);
    }

    fn emit_line_record(&mut self, rc: RenderCommand, vertices: &[LineVertex]) {
        let head = DrawHeaderPayload {
            rc: rc.0,
            draw_mode: self.draw_mode.0 as u32,
            palette: 0,
            window: self.texture_window,
            params: self.command_params().bits(),
            num_vertices: vertices.len() as u32,
        };
        let mut buf = RecordBuffer::new(RecordTag::DrawLine);
        buf.push_pod(&head);
        buf.push_pod_slice(vertices);
        let words = buf.finish();
        self.push_record(words);
    }
}
