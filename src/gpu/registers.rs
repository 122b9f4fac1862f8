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

//! GPU status and display registers
//!
//! GPUSTAT (0x1F801814) is modelled as bitflags over the hardware layout;
//! bits that mirror parser state (ready flags, interlace line) are composed
//! at read time by the front end.

use bitflags::bitflags;

bitflags! {
    /// GPUSTAT register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GpuStat: u32 {
        /// Texture page X base (N × 64)
        const TEXTURE_PAGE_X_BASE      = 0b0000_0000_0000_0000_0000_0000_0000_1111;
        /// Texture page Y base (0 or 256)
        const TEXTURE_PAGE_Y_BASE      = 0b0000_0000_0000_0000_0000_0000_0001_0000;
        /// Semi-transparency mode
        const SEMI_TRANSPARENCY        = 0b0000_0000_0000_0000_0000_0000_0110_0000;
        /// Texture page color mode
        const TEXTURE_PAGE_COLORS      = 0b0000_0000_0000_0000_0000_0001_1000_0000;
        /// Dither 24-bit to 15-bit
        const DITHER_ENABLED           = 0b0000_0000_0000_0000_0000_0010_0000_0000;
        /// Drawing to the displayed field allowed
        const DRAW_TO_DISPLAYED_FIELD  = 0b0000_0000_0000_0000_0000_0100_0000_0000;
        /// Set the mask bit while drawing
        const SET_MASK_WHILE_DRAWING   = 0b0000_0000_0000_0000_0000_1000_0000_0000;
        /// Reject writes to masked pixels
        const CHECK_MASK_BEFORE_DRAW   = 0b0000_0000_0000_0000_0001_0000_0000_0000;
        /// Interlace field
        const INTERLACE_FIELD          = 0b0000_0000_0000_0000_0010_0000_0000_0000;
        /// Reverse flag
        const REVERSE_FLAG             = 0b0000_0000_0000_0000_0100_0000_0000_0000;
        /// Texture disable
        const TEXTURE_DISABLE          = 0b0000_0000_0000_0000_1000_0000_0000_0000;
        /// Horizontal resolution 2 (368 mode)
        const HORIZONTAL_RES_2         = 0b0000_0000_0000_0001_0000_0000_0000_0000;
        /// Horizontal resolution 1
        const HORIZONTAL_RES_1         = 0b0000_0000_0000_0110_0000_0000_0000_0000;
        /// Vertical resolution (480-line mode)
        const VERTICAL_RES             = 0b0000_0000_0000_1000_0000_0000_0000_0000;
        /// Video mode (PAL when set)
        const VIDEO_MODE               = 0b0000_0000_0001_0000_0000_0000_0000_0000;
        /// Display area color depth (24bpp when set)
        const DISPLAY_AREA_24BIT       = 0b0000_0000_0010_0000_0000_0000_0000_0000;
        /// Vertical interlace enabled
        const VERTICAL_INTERLACE       = 0b0000_0000_0100_0000_0000_0000_0000_0000;
        /// Display disabled
        const DISPLAY_DISABLED         = 0b0000_0000_1000_0000_0000_0000_0000_0000;
        /// Interrupt request (GP0 0x1F)
        const INTERRUPT_REQUEST        = 0b0000_0001_0000_0000_0000_0000_0000_0000;
        /// DMA data request
        const DMA_REQUEST              = 0b0000_0010_0000_0000_0000_0000_0000_0000;
        /// Ready to receive a command word
        const READY_TO_RECEIVE_CMD     = 0b0000_0100_0000_0000_0000_0000_0000_0000;
        /// Ready to send VRAM to the CPU
        const READY_TO_SEND_VRAM       = 0b0000_1000_0000_0000_0000_0000_0000_0000;
        /// Ready to receive a DMA block
        const READY_TO_RECEIVE_DMA     = 0b0001_0000_0000_0000_0000_0000_0000_0000;
        /// DMA direction
        const DMA_DIRECTION            = 0b0110_0000_0000_0000_0000_0000_0000_0000;
        /// Drawing odd lines in interlaced mode
        const INTERLACE_ODD_LINE       = 0b1000_0000_0000_0000_0000_0000_0000_0000;
    }
}

impl GpuStat {
    /// Replace the draw-mode mirror bits (0-10, 15) from a GP0(0xE1) value
    pub fn set_draw_mode_bits(&mut self, draw_mode: u16) {
        let keep = self.bits() & !0x0000_87FF;
        let low = (draw_mode as u32) & 0x7FF;
        let disable = ((draw_mode as u32 >> 11) & 1) << 15;
        *self = GpuStat::from_bits_retain(keep | low | disable);
    }

    /// DMA direction field (0-3)
    pub fn dma_direction(self) -> u32 {
        (self.bits() & GpuStat::DMA_DIRECTION.bits()) >> 29
    }

    /// Store the DMA direction field
    pub fn set_dma_direction(&mut self, direction: u32) {
        let keep = self.bits() & !GpuStat::DMA_DIRECTION.bits();
        *self = GpuStat::from_bits_retain(keep | ((direction & 3) << 29));
    }

    /// Active horizontal display resolution in pixels
    pub fn horizontal_resolution(self) -> u32 {
        if self.contains(GpuStat::HORIZONTAL_RES_2) {
            368
        } else {
            match (self.bits() & GpuStat::HORIZONTAL_RES_1.bits()) >> 17 {
                0 => 256,
                1 => 320,
                2 => 512,
                _ => 640,
            }
        }
    }

    /// Active vertical display resolution in lines
    pub fn vertical_resolution(self) -> u32 {
        if self.contains(GpuStat::VERTICAL_RES) && self.contains(GpuStat::VERTICAL_INTERLACE) {
            480
        } else {
            240
        }
    }

    /// Whether draws must skip the displayed field
    pub fn interlaced_rendering_enabled(self) -> bool {
        self.contains(GpuStat::VERTICAL_INTERLACE)
            && self.contains(GpuStat::VERTICAL_RES)
            && !self.contains(GpuStat::DRAW_TO_DISPLAYED_FIELD)
    }
}

/// Display range/origin registers (GP1 0x05-0x07)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayState {
    /// Display area origin X in VRAM
    pub start_x: u16,
    /// Display area origin Y in VRAM
    pub start_y: u16,
    /// Horizontal display range in GPU clocks (x1, x2)
    pub h_range: (u16, u16),
    /// Vertical display range in scanlines (y1, y2)
    pub v_range: (u16, u16),
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            start_x: 0,
            start_y: 0,
            h_range: (0x200, 0x200 + 256 * 10),
            v_range: (0x10, 0x10 + 240),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_mode_mirror() {
        let mut stat = GpuStat::default();
        // Page (5, 1), semi-transparency 2, 8-bit, dither, draw-to-display,
        // texture disable.
        let reg: u16 = 5 | (1 << 4) | (2 << 5) | (1 << 7) | (1 << 9) | (1 << 10) | (1 << 11);
        stat.set_draw_mode_bits(reg);

        assert_eq!(stat.bits() & 0xF, 5);
        assert!(stat.contains(GpuStat::TEXTURE_PAGE_Y_BASE));
        assert_eq!((stat.bits() >> 5) & 3, 2);
        assert!(stat.contains(GpuStat::DITHER_ENABLED));
        assert!(stat.contains(GpuStat::DRAW_TO_DISPLAYED_FIELD));
        assert!(stat.contains(GpuStat::TEXTURE_DISABLE));

        // Writing again clears superseded bits.
        stat.set_draw_mode_bits(0);
        assert_eq!(stat.bits() & 0x87FF, 0);
    }

    #[test]
    fn test_horizontal_resolution_decode() {
        let mut stat = GpuStat::default();
        assert_eq!(stat.horizontal_resolution(), 256);

        stat = GpuStat::from_bits_retain(1 << 17);
        assert_eq!(stat.horizontal_resolution(), 320);
        stat = GpuStat::from_bits_retain(2 << 17);
        assert_eq!(stat.horizontal_resolution(), 512);
        stat = GpuStat::from_bits_retain(3 << 17);
        assert_eq!(stat.horizontal_resolution(), 640);
        stat = GpuStat::from_bits_retain(1 << 16);
        assert_eq!(stat.horizontal_resolution(), 368);
    }

    #[test]
    fn test_interlaced_rendering_gate() {
        let mut stat = GpuStat::VERTICAL_INTERLACE | GpuStat::VERTICAL_RES;
        assert!(stat.interlaced_rendering_enabled());

        stat |= GpuStat::DRAW_TO_DISPLAYED_FIELD;
        assert!(!stat.interlaced_rendering_enabled());

        assert!(!GpuStat::VERTICAL_INTERLACE.interlaced_rendering_enabled());
    }

    #[test]
    fn test_dma_direction_roundtrip() {
        let mut stat = GpuStat::default();
        stat.set_dma_direction(2);
        assert_eq!(stat.dma_direction(), 2);
        stat.set_dma_direction(3);
        assert_eq!(stat.dma_direction(), 3);
    }
}
