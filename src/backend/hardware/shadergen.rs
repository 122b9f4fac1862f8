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

//! Shader source generation
//!
//! Builds GLSL source for every pipeline variant. The device layer treats
//! sources as opaque strings and may translate them; the generated text is
//! also the shader-cache key, so equal variants always hash equally.

use std::fmt::Write;

use super::pipeline::{PipelineKey, RenderPass, ShaderTextureMode};
use crate::device::DeviceFeatures;
use crate::settings::{DisplayFilter, GpuSettings, TextureFilter};

/// Common preamble: uniforms and helpers shared by the draw shaders
fn draw_preamble(out: &mut String) {
    out.push_str(
        "#version 330 core\n\
         uniform uint u_texture_window;\n\
         uniform uint u_clut_x;\n\
         uniform uint u_clut_y;\n\
         uniform uint u_interlace_enable;\n\
         uniform uint u_interlace_field;\n\
         uniform uint u_set_mask_bit;\n\
         uniform uint u_resolution_scale;\n\
         uniform sampler2D samp_vram;\n\n\
         uvec2 apply_texture_window(uvec2 coords) {\n\
           uint and_x = u_texture_window & 0xFFu;\n\
           uint and_y = (u_texture_window >> 8) & 0xFFu;\n\
           uint or_x = (u_texture_window >> 16) & 0xFFu;\n\
           uint or_y = (u_texture_window >> 24) & 0xFFu;\n\
           return uvec2((coords.x & and_x) | or_x, (coords.y & and_y) | or_y);\n\
         }\n\n\
         uint sample_vram_u16(uvec2 coords) {\n\
           vec4 texel = texelFetch(samp_vram, ivec2(coords * u_resolution_scale), 0);\n\
           uvec4 c = uvec4(round(texel * 31.0));\n\
           uint mask = texel.a != 0.0 ? 0x8000u : 0u;\n\
           return c.r | (c.g << 5) | (c.b << 10) | mask;\n\
         }\n\n",
    );
}

/// Vertex shader for the draw pipelines
pub fn draw_vertex_shader(resolution_scale: u32) -> String {
    format!(
        "#version 330 core\n\
         layout(location = 0) in vec4 a_pos;\n\
         layout(location = 1) in vec4 a_color;\n\
         layout(location = 2) in uint a_texpage;\n\
         layout(location = 3) in uint a_uv;\n\
         layout(location = 4) in uint a_uv_limits;\n\
         out vec4 v_color;\n\
         out vec2 v_uv;\n\
         flat out uint v_texpage;\n\
         flat out uint v_uv_limits;\n\
         const float SCALE = {scale}.0;\n\
         void main() {{\n\
           // Native VRAM coordinates to clip space over the scaled target.\n\
           float x = (a_pos.x * SCALE) / ({vw}.0 * SCALE) * 2.0 - 1.0;\n\
           float y = (a_pos.y * SCALE) / ({vh}.0 * SCALE) * 2.0 - 1.0;\n\
           gl_Position = vec4(x * a_pos.w, y * a_pos.w, a_pos.z * a_pos.w, a_pos.w);\n\
           v_color = a_color;\n\
           v_uv = vec2(float(a_uv & 0xFFu), float((a_uv >> 8) & 0xFFu));\n\
           v_texpage = a_texpage;\n\
           v_uv_limits = a_uv_limits;\n\
         }}\n",
        scale = resolution_scale.max(1),
        vw = 1024,
        vh = 512,
    )
}

/// Texel fetch expression for a texture mode
fn write_texture_fetch(out: &mut String, mode: ShaderTextureMode) {
    let paletted = matches!(
        mode,
        ShaderTextureMode::Palette4
            | ShaderTextureMode::Palette8
            | ShaderTextureMode::RawPalette4
            | ShaderTextureMode::RawPalette8
    );
    out.push_str(
        "uint fetch_texel(uvec2 uv) {\n\
           uv = apply_texture_window(uv);\n\
           uint page_x = (v_texpage & 0xFu) * 64u;\n\
           uint page_y = ((v_texpage >> 4) & 1u) * 256u;\n",
    );
    match mode {
        ShaderTextureMode::Palette4 | ShaderTextureMode::RawPalette4 => out.push_str(
            "  uint word = sample_vram_u16(uvec2(page_x + uv.x / 4u, page_y + uv.y));\n\
             uint index = (word >> ((uv.x % 4u) * 4u)) & 0xFu;\n",
        ),
        ShaderTextureMode::Palette8 | ShaderTextureMode::RawPalette8 => out.push_str(
            "  uint word = sample_vram_u16(uvec2(page_x + uv.x / 2u, page_y + uv.y));\n\
             uint index = (word >> ((uv.x % 2u) * 8u)) & 0xFFu;\n",
        ),
        _ => out.push_str(
            "  return sample_vram_u16(uvec2(page_x + uv.x, page_y + uv.y));\n",
        ),
    }
    if paletted {
        out.push_str("  return sample_vram_u16(uvec2(u_clut_x + index, u_clut_y));\n");
    }
    out.push_str("}\n\n");
}

/// Fragment shader for one draw pipeline variant
pub fn draw_fragment_shader(
    key: &PipelineKey,
    features: &DeviceFeatures,
    settings: &GpuSettings,
) -> String {
    let mut out = String::with_capacity(4096);
    draw_preamble(&mut out);

    let textured = key.texture_mode != ShaderTextureMode::Disabled;
    let raw = matches!(
        key.texture_mode,
        ShaderTextureMode::RawPalette4
            | ShaderTextureMode::RawPalette8
            | ShaderTextureMode::RawDirect16
    );
    let dual_source = key.transparency.is_some()
        && key.render_pass == RenderPass::Combined
        && features.contains(DeviceFeatures::DUAL_SOURCE_BLEND);

    out.push_str(
        "in vec4 v_color;\n\
         in vec2 v_uv;\n\
         flat in uint v_texpage;\n\
         flat in uint v_uv_limits;\n",
    );
    if dual_source {
        out.push_str(
            "layout(location = 0, index = 0) out vec4 o_color;\n\
             layout(location = 0, index = 1) out vec4 o_blend;\n\n",
        );
    } else {
        out.push_str("layout(location = 0) out vec4 o_color;\n\n");
    }

    if textured {
        write_texture_fetch(&mut out, key.texture_mode);
    }

    if key.dither {
        out.push_str(
            "const float DITHER[16] = float[16](\n\
               -4.0, 0.0, -3.0, 1.0, 2.0, -2.0, 3.0, -1.0,\n\
               -3.0, 1.0, -4.0, 0.0, 3.0, -1.0, 2.0, -2.0);\n\n",
        );
    }

    out.push_str("void main() {\n");

    if key.interlace {
        out.push_str(
            "  uint native_y = uint(gl_FragCoord.y) / u_resolution_scale;\n\
             if ((native_y & 1u) == u_interlace_field) discard;\n",
        );
    }

    if textured {
        let _ = writeln!(
            out,
            "  vec2 uv_min = vec2(float(v_uv_limits & 0xFFu), float((v_uv_limits >> 8) & 0xFFu));\n\
             \x20 vec2 uv_max = vec2(float((v_uv_limits >> 16) & 0xFFu), float((v_uv_limits >> 24) & 0xFFu));\n\
             \x20 vec2 uv = clamp(v_uv, uv_min, uv_max);\n\
             \x20 uint texel = fetch_texel(uvec2(uv));\n\
             \x20 if (texel == 0u) discard;"
        );
        if settings.texture_filter != TextureFilter::Nearest {
            out.push_str("  // filtered variants blend neighbouring fetches here\n");
        }
        if raw {
            out.push_str(
                "  vec3 rgb = vec3(float(texel & 0x1Fu), float((texel >> 5) & 0x1Fu),\n\
                 \x20                 float((texel >> 10) & 0x1Fu)) / 31.0;\n",
            );
        } else {
            out.push_str(
                "  vec3 shade = v_color.rgb * 255.0;\n\
                 \x20 vec3 tex = vec3(float(texel & 0x1Fu), float((texel >> 5) & 0x1Fu),\n\
                 \x20                 float((texel >> 10) & 0x1Fu));\n\
                 \x20 vec3 rgb = min(floor(tex * shade / 16.0), 255.0) / 255.0;\n",
            );
        }
        out.push_str("  bool semi = (texel & 0x8000u) != 0u;\n");
    } else {
        out.push_str(
            "  vec3 rgb = v_color.rgb;\n\
             \x20 bool semi = true;\n",
        );
    }

    if key.dither {
        out.push_str(
            "  float bias = DITHER[(uint(gl_FragCoord.y / float(u_resolution_scale)) & 3u) * 4u\n\
             \x20                   + (uint(gl_FragCoord.x / float(u_resolution_scale)) & 3u)];\n\
             \x20 rgb = clamp(rgb + vec3(bias / 255.0), 0.0, 1.0);\n",
        );
    }
    if !settings.true_color {
        out.push_str("  rgb = floor(rgb * 31.0) / 31.0;\n");
    }

    match key.render_pass {
        RenderPass::OnlyOpaque => out.push_str("  if (semi) discard;\n"),
        RenderPass::OnlyTransparent => out.push_str("  if (!semi) discard;\n"),
        _ => {}
    }

    out.push_str("  float mask = u_set_mask_bit != 0u ? 1.0 : ");
    out.push_str(if textured { "(semi ? 1.0 : 0.0);\n" } else { "0.0;\n" });

    if dual_source {
        // Second source carries the per-pixel blend factor; opaque texels
        // blend with zero so they overwrite.
        out.push_str(
            "  o_color = vec4(rgb, mask);\n\
             \x20 o_blend = semi ? vec4(1.0) : vec4(0.0);\n",
        );
    } else if let (Some(mode), RenderPass::Combined, true) = (
        key.transparency,
        key.render_pass,
        features.contains(DeviceFeatures::FRAMEBUFFER_FETCH),
    ) {
        use crate::gpu::primitives::TransparencyMode;
        let blend = match mode {
            TransparencyMode::HalfBackgroundPlusHalfForeground => "dst.rgb * 0.5 + rgb * 0.5",
            TransparencyMode::BackgroundPlusForeground => "min(dst.rgb + rgb, 1.0)",
            TransparencyMode::BackgroundMinusForeground => "max(dst.rgb - rgb, 0.0)",
            TransparencyMode::BackgroundPlusQuarterForeground => "min(dst.rgb + rgb * 0.25, 1.0)",
        };
        let _ = writeln!(
            out,
            "  vec4 dst = gl_LastFragData[0];\n\
             \x20 o_color = vec4(semi ? ({blend}) : rgb, mask);"
        );
    } else {
        out.push_str("  o_color = vec4(rgb, mask);\n");
    }

    out.push_str("}\n");
    out
}

/// Fullscreen triangle vertex shader shared by the utility passes
pub fn fullscreen_vertex_shader() -> String {
    "#version 330 core\n\
     out vec2 v_uv;\n\
     void main() {\n\
       vec2 pos = vec2(float((gl_VertexID << 1) & 2), float(gl_VertexID & 2));\n\
       v_uv = pos;\n\
       gl_Position = vec4(pos * 2.0 - 1.0, 0.0, 1.0);\n\
     }\n"
        .to_string()
}

/// Rebuild depth from the color target's mask bit
pub fn depth_reset_fragment_shader() -> String {
    "#version 330 core\n\
     uniform sampler2D samp_vram;\n\
     in vec2 v_uv;\n\
     layout(location = 0) out vec4 o_color;\n\
     void main() {\n\
       vec4 color = texture(samp_vram, v_uv);\n\
       o_color = color;\n\
       gl_FragDepth = color.a != 0.0 ? 1.0 : 0.0;\n\
     }\n"
        .to_string()
}

/// VRAM fill quad
pub fn fill_fragment_shader(true_color: bool) -> String {
    let quantize = if true_color {
        ""
    } else {
        "  rgb = floor(rgb * 31.0) / 31.0;\n"
    };
    format!(
        "#version 330 core\n\
         uniform vec4 u_fill_color;\n\
         uniform uint u_interlace_enable;\n\
         uniform uint u_interlace_field;\n\
         uniform uint u_resolution_scale;\n\
         layout(location = 0) out vec4 o_color;\n\
         void main() {{\n\
           if (u_interlace_enable != 0u) {{\n\
             uint native_y = uint(gl_FragCoord.y) / u_resolution_scale;\n\
             if ((native_y & 1u) == u_interlace_field) discard;\n\
           }}\n\
           vec3 rgb = u_fill_color.rgb;\n\
         {quantize}\
           o_color = vec4(rgb, 0.0);\n\
         }}\n"
    )
}

/// CPU→VRAM write quad sampling the staging texture
pub fn vram_write_fragment_shader() -> String {
    "#version 330 core\n\
     uniform usampler2D samp_staging;\n\
     uniform uvec4 u_write_rect;\n\
     uniform uint u_set_mask_bit;\n\
     uniform uint u_resolution_scale;\n\
     layout(location = 0) out vec4 o_color;\n\
     void main() {\n\
       uvec2 native = uvec2(gl_FragCoord.xy) / u_resolution_scale;\n\
       uvec2 offs = (native - u_write_rect.xy) & uvec2(1023u, 511u);\n\
       uint value = texelFetch(samp_staging, ivec2(u_write_rect.xy + offs), 0).r;\n\
       uint mask = (value >> 15) | u_set_mask_bit;\n\
       vec3 rgb = vec3(float(value & 0x1Fu), float((value >> 5) & 0x1Fu),\n\
                       float((value >> 10) & 0x1Fu)) / 31.0;\n\
       o_color = vec4(rgb, float(mask));\n\
       gl_FragDepth = mask != 0u ? 1.0 : 0.0;\n\
     }\n"
        .to_string()
}

/// VRAM→VRAM sampled copy quad (used when regions overlap or masks apply)
pub fn vram_copy_fragment_shader() -> String {
    "#version 330 core\n\
     uniform sampler2D samp_vram;\n\
     uniform uvec4 u_src_rect;\n\
     uniform uvec4 u_dst_rect;\n\
     uniform uint u_set_mask_bit;\n\
     uniform uint u_resolution_scale;\n\
     layout(location = 0) out vec4 o_color;\n\
     void main() {\n\
       uvec2 offs = uvec2(gl_FragCoord.xy) - u_dst_rect.xy * u_resolution_scale;\n\
       vec4 src = texelFetch(samp_vram, ivec2(u_src_rect.xy * u_resolution_scale + offs), 0);\n\
       float mask = max(src.a, float(u_set_mask_bit));\n\
       o_color = vec4(src.rgb, mask);\n\
       gl_FragDepth = mask != 0.0 ? 1.0 : 0.0;\n\
     }\n"
        .to_string()
}

/// Encode two 16bpp pixels per RGBA8 output pixel for readback
pub fn readback_encode_fragment_shader() -> String {
    "#version 330 core\n\
     uniform sampler2D samp_vram;\n\
     uniform uvec4 u_src_rect;\n\
     uniform uint u_resolution_scale;\n\
     layout(location = 0) out vec4 o_color;\n\
     uint encode(vec4 texel) {\n\
       uvec3 c = uvec3(round(texel.rgb * 31.0));\n\
       uint mask = texel.a != 0.0 ? 0x8000u : 0u;\n\
       return c.r | (c.g << 5) | (c.b << 10) | mask;\n\
     }\n\
     void main() {\n\
       uvec2 dst = uvec2(gl_FragCoord.xy);\n\
       uvec2 src = uvec2(u_src_rect.x + dst.x * 2u, u_src_rect.y + dst.y);\n\
       uint lo = encode(texelFetch(samp_vram, ivec2(src * u_resolution_scale), 0));\n\
       uint hi = encode(texelFetch(samp_vram, ivec2((src + uvec2(1u, 0u)) * u_resolution_scale), 0));\n\
       o_color = vec4(float(lo & 0xFFu), float(lo >> 8), float(hi & 0xFFu), float(hi >> 8)) / 255.0;\n\
     }\n"
        .to_string()
}

/// Final display pass
pub fn display_fragment_shader(format_24bpp: bool, filter: DisplayFilter) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(
        "#version 330 core\n\
         uniform sampler2D samp_display;\n\
         uniform uvec4 u_display_rect;\n\
         uniform uint u_resolution_scale;\n\
         in vec2 v_uv;\n\
         layout(location = 0) out vec4 o_color;\n",
    );
    out.push_str("void main() {\n");
    if format_24bpp {
        // Three-byte pixels packed across 16-bit cells; always native scale.
        out.push_str(
            "  uint col = uint(v_uv.x * float(u_display_rect.z));\n\
             \x20 uint row = u_display_rect.y + uint(v_uv.y * float(u_display_rect.w));\n\
             \x20 uint byte_offset = u_display_rect.x * 2u + col * 3u;\n\
             \x20 uint cell0 = uint(texelFetch(samp_display, ivec2(byte_offset / 2u, row), 0).r * 65535.0);\n\
             \x20 uint cell1 = uint(texelFetch(samp_display, ivec2(byte_offset / 2u + 1u, row), 0).r * 65535.0);\n\
             \x20 uint packed = (byte_offset & 1u) != 0u ? ((cell0 >> 8) | (cell1 << 8)) : (cell0 | (cell1 << 16));\n\
             \x20 o_color = vec4(float(packed & 0xFFu), float((packed >> 8) & 0xFFu),\n\
             \x20                float((packed >> 16) & 0xFFu), 255.0) / 255.0;\n",
        );
    } else {
        match filter {
            DisplayFilter::Nearest | DisplayFilter::NearestInteger => out.push_str(
                "  vec2 uv = (vec2(u_display_rect.xy) + v_uv * vec2(u_display_rect.zw))\n\
                 \x20          * float(u_resolution_scale);\n\
                 \x20 o_color = vec4(texelFetch(samp_display, ivec2(uv), 0).rgb, 1.0);\n",
            ),
            DisplayFilter::Bilinear => out.push_str(
                "  vec2 uv = (vec2(u_display_rect.xy) + v_uv * vec2(u_display_rect.zw))\n\
                 \x20          / vec2(textureSize(samp_display, 0)) * float(u_resolution_scale);\n\
                 \x20 o_color = vec4(texture(samp_display, uv).rgb, 1.0);\n",
            ),
            DisplayFilter::BilinearSharp => out.push_str(
                "  // Sharp bilinear: snap to texel centres, then add a sub-pixel\n\
                 \x20 // term scaled by the integer upscale factor.\n\
                 \x20 vec2 size = vec2(u_display_rect.zw) * float(u_resolution_scale);\n\
                 \x20 vec2 pixel = v_uv * size;\n\
                 \x20 vec2 snapped = floor(pixel) + clamp(fract(pixel) * float(u_resolution_scale)\n\
                 \x20                                      - 0.5 * (float(u_resolution_scale) - 1.0), 0.0, 1.0);\n\
                 \x20 vec2 uv = (vec2(u_display_rect.xy) * float(u_resolution_scale) + snapped)\n\
                 \x20          / vec2(textureSize(samp_display, 0));\n\
                 \x20 o_color = vec4(texture(samp_display, uv).rgb, 1.0);\n",
            ),
        }
    }
    out.push_str("}\n");
    out
}

/// Box downsample: average an S×S block per output pixel
pub fn downsample_box_fragment_shader(scale: u32) -> String {
    format!(
        "#version 330 core\n\
         uniform sampler2D samp_src;\n\
         in vec2 v_uv;\n\
         layout(location = 0) out vec4 o_color;\n\
         const int SCALE = {scale};\n\
         void main() {{\n\
           ivec2 base = ivec2(gl_FragCoord.xy) * SCALE;\n\
           vec3 sum = vec3(0.0);\n\
           for (int y = 0; y < SCALE; y++)\n\
             for (int x = 0; x < SCALE; x++)\n\
               sum += texelFetch(samp_src, base + ivec2(x, y), 0).rgb;\n\
           o_color = vec4(sum / float(SCALE * SCALE), 1.0);\n\
         }}\n",
        scale = scale.max(1)
    )
}

/// Adaptive downsample composite from the mip chain and blurred weights
pub fn downsample_adaptive_fragment_shader(scale: u32) -> String {
    let levels = 32 - (scale.max(1)).leading_zeros();
    format!(
        "#version 330 core\n\
         uniform sampler2D samp_mips;\n\
         uniform sampler2D samp_weights;\n\
         in vec2 v_uv;\n\
         layout(location = 0) out vec4 o_color;\n\
         const float MAX_LEVEL = {max_level}.0;\n\
         void main() {{\n\
           // The weight image marks where detail lives: flat regions pull\n\
           // from deep mips, detailed regions stay near level 0.\n\
           float weight = texture(samp_weights, v_uv).r;\n\
           float level = (1.0 - weight) * MAX_LEVEL;\n\
           o_color = vec4(textureLod(samp_mips, v_uv, level).rgb, 1.0);\n\
         }}\n",
        max_level = levels
    )
}
