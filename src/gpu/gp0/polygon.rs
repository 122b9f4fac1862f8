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

//! GP0(0x20..0x3F) polygon commands
//!
//! Word count per vertex is `1 + textured + shaded`, plus one color word at
//! the head for flat-shaded polygons. A textured polygon's texpage attribute
//! rewrites the live draw mode register; the palette comes from the first
//! vertex's texcoord word.
//!
//! Oversized polygons (bounding box over 1023×511) are culled whole; for
//! quads each triangle is culled independently and the quad may degrade to a
//! single triangle.

use crate::gpu::primitives::{
    truncate_vertex_coord, DrawModeReg, RenderCommand, TexturePaletteReg, VertexPosition,
};
use crate::gpu::timing;
use crate::queue::record::{
    DrawHeaderPayload, PolygonVertex, PrecisePolygonVertex, RecordBuffer, RecordTag,
};
use crate::vram::{MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH};

use super::Gpu;

/// Bounding box of three vertices exceeds the rasterizable size
fn triangle_culled(v0: (i32, i32), v1: (i32, i32), v2: (i32, i32)) -> bool {
    let min_x = v0.0.min(v1.0).min(v2.0);
    let max_x = v0.0.max(v1.0).max(v2.0);
    let min_y = v0.1.min(v1.1).min(v2.1);
    let max_y = v0.1.max(v1.1).max(v2.1);
    (max_x - min_x) >= MAX_PRIMITIVE_WIDTH || (max_y - min_y) >= MAX_PRIMITIVE_HEIGHT
}

impl Gpu {
    /// GP0(0x20..0x3F): render a polygon
    pub(in crate::gpu) fn handle_polygon(&mut self) -> bool {
        let rc = RenderCommand(*self.fifo.front().unwrap());
        let words_per_vertex = rc.words_per_vertex();
        let num_vertices: usize = if rc.quad_polygon() { 4 } else { 3 };
        let total_words = words_per_vertex * num_vertices + usize::from(!rc.shading_enable());
        if self.fifo.len() < total_words {
            return false;
        }

        self.pending_ticks += timing::polygon_setup_ticks(
            rc.quad_polygon(),
            rc.shading_enable(),
            rc.texture_enable(),
        );

        // The texpage attribute updates the live draw mode; the palette
        // comes from the first vertex's texcoord word.
        if rc.texture_enable() {
            let texpage_index = if rc.shading_enable() { 5 } else { 4 };
            let attr = (self.fifo[texpage_index] >> 16) as u16;
            let merged = (attr & DrawModeReg::POLYGON_TEXPAGE_MASK)
                | (self.draw_mode.0 & !DrawModeReg::POLYGON_TEXPAGE_MASK);
            self.set_draw_mode(merged);
            self.palette =
                TexturePaletteReg(((self.fifo[2] >> 16) as u16) & TexturePaletteReg::MASK);
        }

        self.fifo.pop_front();

        let first_color = rc.color_for_first_vertex();
        let use_pgxp = self.settings.pgxp_enable && self.precise_vertex_hook.is_some();

        let mut verts: Vec<PolygonVertex> = Vec::with_capacity(num_vertices);
        let mut precise: Vec<PrecisePolygonVertex> = Vec::with_capacity(num_vertices);
        let mut valid_w = use_pgxp;

        for i in 0..num_vertices {
            let color = if rc.shading_enable() && i > 0 {
                self.fifo.pop_front().unwrap() & 0x00FF_FFFF
            } else {
                first_color
            };
            let pos_word = self.fifo.pop_front().unwrap();
            let vp = VertexPosition::from_u32(pos_word);
            let native_x = truncate_vertex_coord(self.drawing_offset.0 + vp.x);
            let native_y = truncate_vertex_coord(self.drawing_offset.1 + vp.y);
            let texcoord = if rc.texture_enable() {
                self.fifo.pop_front().unwrap() & 0xFFFF
            } else {
                0
            };

            verts.push(PolygonVertex { x: native_x, y: native_y, color, texcoord });

            if use_pgxp {
                let hook = self.precise_vertex_hook.as_ref().unwrap();
                match hook(pos_word, native_x, native_y) {
                    Some((x, y, w)) => precise.push(PrecisePolygonVertex {
                        x,
                        y,
                        w,
                        color,
                        texcoord,
                        native_x,
                        native_y,
                    }),
                    None => {
                        valid_w = false;
                        precise.push(PrecisePolygonVertex {
                            x: native_x as f32,
                            y: native_y as f32,
                            w: 1.0,
                            color,
                            texcoord,
                            native_x,
                            native_y,
                        });
                    }
                }
            }
        }
        if use_pgxp && !valid_w {
            for v in &mut precise {
                v.w = 1.0;
            }
        }

        // Cull each triangle independently.
        let p = |v: &PolygonVertex| (v.x, v.y);
        let first_culled = triangle_culled(p(&verts[0]), p(&verts[1]), p(&verts[2]));
        if first_culled {
            log::trace!(
                "culling too-large polygon: {:?} {:?} {:?}",
                p(&verts[0]),
                p(&verts[1]),
                p(&verts[2])
            );
            if !rc.quad_polygon() {
                return true;
            }
        } else {
            self.pending_ticks += timing::triangle_fill_ticks(
                verts[0].x,
                verts[0].y,
                verts[1].x,
                verts[1].y,
                verts[2].x,
                verts[2].y,
                rc.shading_enable(),
                rc.texture_enable(),
                rc.transparency_enable(),
            );
        }

        let mut emit_count = num_vertices;
        if rc.quad_polygon() {
            let second_culled = triangle_culled(p(&verts[1]), p(&verts[2]), p(&verts[3]));
            if second_culled {
                if first_culled {
                    return true;
                }
                emit_count = 3;
            } else {
                self.pending_ticks += timing::triangle_fill_ticks(
                    verts[2].x,
                    verts[2].y,
                    verts[1].x,
                    verts[1].y,
                    verts[3].x,
                    verts[3].y,
                    rc.shading_enable(),
                    rc.texture_enable(),
                    rc.transparency_enable(),
                );
                if first_culled {
                    // Keep the second triangle only.
                    verts.remove(0);
                    if use_pgxp {
                        precise.remove(0);
                    }
                    emit_count = 3;
                }
            }
        }

        let head = DrawHeaderPayload {
            rc: rc.0,
            draw_mode: self.draw_mode.0 as u32,
            palette: self.palette.0 as u32,
            window: self.texture_window,
            params: self.command_params().bits(),
            num_vertices: emit_count as u32,
        };

        let words = if use_pgxp {
            let mut buf = RecordBuffer::new(RecordTag::DrawPrecisePolygon);
            buf.push_pod(&head);
            buf.push_pod_slice(&precise[..emit_count]);
            buf.finish()
        } else {
            let mut buf = RecordBuffer::new(RecordTag::DrawPolygon);
            buf.push_pod(&head);
            buf.push_pod_slice(&verts[..emit_count]);
            buf.finish()
        };
        self.push_record(words);
        true
    }
}
