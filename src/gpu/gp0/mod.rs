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

//! GP0 command handlers
//!
//! One file per command class, mirroring the hardware grouping: environment
//! writes, fills, polygons, lines, rectangles and VRAM transfers. Handlers
//! return `false` when the FIFO does not yet hold the full command.

mod drawing_mode;
mod fill;
mod line;
mod polygon;
mod rectangle;
mod transfer;

use super::registers::GpuStat;
use super::Gpu;

impl Gpu {
    /// GP0(0x1F): request the GPU interrupt
    ///
    /// Raises the IRQ line once; re-requesting while the line is already
    /// asserted is a no-op until the interrupt is acknowledged.
    pub(in crate::gpu) fn handle_interrupt_request(&mut self) -> bool {
        self.fifo.pop_front();
        if !self.stat.contains(GpuStat::INTERRUPT_REQUEST) {
            log::debug!("GPU IRQ requested");
            self.stat.insert(GpuStat::INTERRUPT_REQUEST);
        }
        true
    }
}
