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

//! GP0(0x02) VRAM fill

use crate::gpu::timing;
use crate::queue::record::{FillVramPayload, RecordBuffer, RecordTag};

use super::Gpu;

impl Gpu {
    /// GP0(0x02): fill a rectangle with a solid color
    ///
    /// X snaps down to a multiple of 16, the width rounds up to one; fills
    /// ignore the drawing area and mask settings but honour interlace.
    pub(in crate::gpu) fn handle_fill_rectangle(&mut self) -> bool {
        if self.fifo.len() < 3 {
            return false;
        }

        let color = self.fifo.pop_front().unwrap() & 0x00FF_FFFF;
        let coords = self.fifo.pop_front().unwrap();
        let size = self.fifo.pop_front().unwrap();

        let x = coords & 0x3F0;
        let y = (coords >> 16) & 0x1FF;
        let width = ((size & 0x3FF) + 0xF) & !0xF;
        let height = (size >> 16) & 0x1FF;

        log::trace!("fill VRAM ({}, {}) {}x{} color 0x{:06X}", x, y, width, height, color);

        if width > 0 && height > 0 {
            let mut buf = RecordBuffer::new(RecordTag::FillVram);
            buf.push_pod(&FillVramPayload {
                x: x as u16,
                y: y as u16,
                width: width as u16,
                height: height as u16,
                color,
                params: self.command_params().bits(),
            });
            let words = buf.finish();
            self.push_record(words);
        }

        self.pending_ticks += timing::fill_ticks(width, height);
        true
    }
}
