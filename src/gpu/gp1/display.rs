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

//! GP1 display geometry and info queries

use crate::gpu::registers::GpuStat;
use crate::gpu::Gpu;

impl Gpu {
    /// GP1(0x05): display area start in VRAM
    pub(in crate::gpu) fn gp1_display_area_start(&mut self, value: u32) {
        let x = (value & 0x3FE) as u16;
        let y = ((value >> 10) & 0x1FF) as u16;
        if (x, y) != (self.display.start_x, self.display.start_y) {
            self.display.start_x = x;
            self.display.start_y = y;
            self.push_display_update();
        }
    }

    /// GP1(0x06): horizontal display range
    pub(in crate::gpu) fn gp1_horizontal_display_range(&mut self, value: u32) {
        let x1 = (value & 0xFFF) as u16;
        let x2 = ((value >> 12) & 0xFFF) as u16;
        if (x1, x2) != self.display.h_range {
            self.display.h_range = (x1, x2);
            self.push_display_update();
        }
    }

    /// GP1(0x07): vertical display range
    pub(in crate::gpu) fn gp1_vertical_display_range(&mut self, value: u32) {
        let y1 = (value & 0x3FF) as u16;
        let y2 = ((value >> 10) & 0x3FF) as u16;
        if (y1, y2) != self.display.v_range {
            self.display.v_range = (y1, y2);
            self.push_display_update();
        }
    }

    /// GP1(0x08): display mode
    pub(in crate::gpu) fn gp1_display_mode(&mut self, value: u32) {
        let mut stat = self.stat;
        stat.remove(
            GpuStat::HORIZONTAL_RES_1
                | GpuStat::HORIZONTAL_RES_2
                | GpuStat::VERTICAL_RES
                | GpuStat::VIDEO_MODE
                | GpuStat::DISPLAY_AREA_24BIT
                | GpuStat::VERTICAL_INTERLACE
                | GpuStat::REVERSE_FLAG,
        );
        let mut bits = stat.bits();
        bits |= (value & 3) << 17; // horizontal res 1
        bits |= ((value >> 2) & 1) << 19; // vertical res
        bits |= ((value >> 3) & 1) << 20; // video mode
        bits |= ((value >> 4) & 1) << 21; // 24bpp
        bits |= ((value >> 5) & 1) << 22; // vertical interlace
        bits |= ((value >> 6) & 1) << 16; // horizontal res 2
        bits |= ((value >> 7) & 1) << 14; // reverse flag
        let new_stat = GpuStat::from_bits_retain(bits);

        if new_stat != self.stat {
            self.stat = new_stat;
            self.push_display_update();
        }
    }

    /// GP1(0x10..0x1F): latch internal registers into GPUREAD
    pub(in crate::gpu) fn gp1_get_gpu_info(&mut self, value: u32) {
        let response = match value & 0x0F {
            0x02 => self.texture_window_reg,
            0x03 => (self.drawing_area.top << 10) | self.drawing_area.left,
            0x04 => (self.drawing_area.bottom << 10) | self.drawing_area.right,
            0x05 => {
                let x = (self.drawing_offset.0 as u32) & 0x7FF;
                let y = (self.drawing_offset.1 as u32) & 0x7FF;
                (y << 11) | x
            }
            // GPU type
            0x07 => 2,
            0x08 => 0,
            // Anything else leaves the latch unchanged.
            _ => return,
        };
        self.gpuread_latch = response;
    }
}
