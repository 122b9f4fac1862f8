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

//! Rectangle (sprite) rasterization
//!
//! Two nested loops over the destination rows and columns. Sprites honour
//! the texture window but are never dithered; interlaced rendering skips
//! rows on the displayed field.

use super::raster::shade_pixel;
use super::DrawState;
use crate::gpu::primitives::DrawingArea;
use crate::queue::record::SpritePayload;
use crate::vram::Vram;

/// Rasterize one axis-aligned rectangle
pub(super) fn draw_sprite(
    state: &DrawState,
    vram: &mut Vram,
    area: &DrawingArea,
    sprite: &SpritePayload,
) {
    let origin_u = (sprite.texcoord & 0xFF) as u32;
    let origin_v = ((sprite.texcoord >> 8) & 0xFF) as u32;
    let r = (sprite.color & 0xFF) as u8;
    let g = ((sprite.color >> 8) & 0xFF) as u8;
    let b = ((sprite.color >> 16) & 0xFF) as u8;

    for offset_y in 0..sprite.height {
        let y = sprite.y + offset_y as i32;
        if y < area.top as i32
            || y > area.bottom as i32
            || state.params.skip_interlaced_line(y)
        {
            continue;
        }

        let texcoord_y = (origin_v + offset_y) as u8;

        for offset_x in 0..sprite.width {
            let x = sprite.x + offset_x as i32;
            if x < area.left as i32 || x > area.right as i32 {
                continue;
            }

            let texcoord_x = (origin_u + offset_x) as u8;
            shade_pixel(state, vram, x as u32, y as u32, r, g, b, texcoord_x, texcoord_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::primitives::{TextureMode, TextureWindow, TransparencyMode};
    use crate::queue::record::CommandParams;

    fn sprite_state() -> DrawState {
        DrawState {
            shading: false,
            texture: false,
            raw_texture: false,
            transparency: false,
            dithering: false,
            transparency_mode: TransparencyMode::HalfBackgroundPlusHalfForeground,
            texture_mode: TextureMode::Palette4,
            texpage_x: 0,
            texpage_y: 0,
            clut_x: 0,
            clut_y: 0,
            window: TextureWindow::default(),
            params: CommandParams::empty(),
            mask_and: 0,
            mask_or: 0,
        }
    }

    #[test]
    fn test_solid_rectangle() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let sprite = SpritePayload {
            x: 10,
            y: 10,
            width: 8,
            height: 4,
            texcoord: 0,
            color: 0x0000FF,
        };
        draw_sprite(&sprite_state(), &mut vram, &area, &sprite);

        for y in 10..14 {
            for x in 10..18 {
                assert_eq!(vram.get_pixel(x, y), 0x001F);
            }
        }
        assert_eq!(vram.get_pixel(9, 10), 0);
        assert_eq!(vram.get_pixel(18, 10), 0);
        assert_eq!(vram.get_pixel(10, 14), 0);
    }

    #[test]
    fn test_rectangle_clipped() {
        let mut vram = Vram::new();
        let area = DrawingArea { left: 0, top: 0, right: 11, bottom: 11 };
        let sprite = SpritePayload {
            x: 8,
            y: 8,
            width: 8,
            height: 8,
            texcoord: 0,
            color: 0xFFFFFF,
        };
        draw_sprite(&sprite_state(), &mut vram, &area, &sprite);

        assert_ne!(vram.get_pixel(11, 11), 0);
        assert_eq!(vram.get_pixel(12, 8), 0);
        assert_eq!(vram.get_pixel(8, 12), 0);
    }

    #[test]
    fn test_interlaced_rows_skipped() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();
        let mut state = sprite_state();
        state.params = CommandParams::INTERLACED_RENDERING | CommandParams::ACTIVE_LINE_LSB;
        let sprite = SpritePayload {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
            texcoord: 0,
            color: 0xFFFFFF,
        };
        draw_sprite(&state, &mut vram, &area, &sprite);

        // Field 1 displayed: odd rows skipped.
        assert_ne!(vram.get_pixel(0, 0), 0);
        assert_eq!(vram.get_pixel(0, 1), 0);
        assert_ne!(vram.get_pixel(0, 2), 0);
        assert_eq!(vram.get_pixel(0, 3), 0);
    }

    #[test]
    fn test_textured_sprite_with_clut() {
        let mut vram = Vram::new();
        let area = DrawingArea::default();

        // 4bpp texture page at (64, 0): one word holding indices 1,2,3,0.
        vram.set_pixel(64, 0, 0x0321);
        // CLUT at (0, 480).
        vram.set_pixel(0, 480, 0x0000); // index 0: transparent
        vram.set_pixel(1, 480, 0x001F);
        vram.set_pixel(2, 480, 0x03E0);
        vram.set_pixel(3, 480, 0x7C00);

        let mut state = sprite_state();
        state.texture = true;
        state.raw_texture = true;
        state.texture_mode = TextureMode::Palette4;
        state.texpage_x = 64;
        state.texpage_y = 0;
        state.clut_x = 0;
        state.clut_y = 480;

        let sprite = SpritePayload {
            x: 100,
            y: 100,
            width: 4,
            height: 1,
            texcoord: 0,
            color: 0x808080,
        };
        draw_sprite(&state, &mut vram, &area, &sprite);

        assert_eq!(vram.get_pixel(100, 100), 0x001F);
        assert_eq!(vram.get_pixel(101, 100), 0x03E0);
        assert_eq!(vram.get_pixel(102, 100), 0x7C00);
        // Texel 0x0000 draws nothing.
        assert_eq!(vram.get_pixel(103, 100), 0x0000);
    }
}
