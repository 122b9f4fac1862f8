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

//! Command records carried by the draw queue
//!
//! Every completed GP0 command is encoded as one variable-length record: a
//! two-word header (`tag`, total size in words) followed by a POD payload and
//! optional trailing inline data (vertices, 16bpp pixels). Records travel the
//! ring as raw words and are decoded in place on the worker side; all payload
//! types have an alignment of at most 4 so a word-aligned ring slice can be
//! reinterpreted directly.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::gpu::primitives::TextureWindow;
use crate::worker::WorkerCall;

/// Header words preceding every record
pub const HEADER_WORDS: usize = 2;

/// Record type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordTag {
    /// Tombstone consuming the ring tail; the reader restarts at offset 0
    Wraparound = 0,
    /// Reset backend state, optionally clearing VRAM
    Reset = 1,
    /// 16bpp rectangle fill
    FillVram = 2,
    /// CPU→VRAM blit with inline pixel data
    UpdateVram = 3,
    /// VRAM→VRAM blit
    CopyVram = 4,
    /// Synchronous VRAM mirror for GPUREAD (hardware backend downloads)
    ReadVram = 5,
    /// Drawing area change; invalidates backend scissor state
    SetDrawingArea = 6,
    /// Triangle or quad with integer vertices
    DrawPolygon = 7,
    /// Triangle or quad with PGXP float positions
    DrawPrecisePolygon = 8,
    /// Axis-aligned, optionally textured rectangle
    DrawSprite = 9,
    /// Line strip (2..N vertices)
    DrawLine = 10,
    /// Display parameter change, optionally presenting a frame
    UpdateDisplay = 11,
    /// Clear the displayed image
    ClearDisplay = 12,
    /// Switch between software and hardware backends
    ChangeBackend = 13,
    /// Change swap-chain vsync
    UpdateVsync = 14,
    /// Host closure executed on the worker thread
    AsyncCall = 15,
}

impl RecordTag {
    /// Decode a tag word; unknown values are a queue corruption bug
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => RecordTag::Wraparound,
            1 => RecordTag::Reset,
            2 => RecordTag::FillVram,
            3 => RecordTag::UpdateVram,
            4 => RecordTag::CopyVram,
            5 => RecordTag::ReadVram,
            6 => RecordTag::SetDrawingArea,
            7 => RecordTag::DrawPolygon,
            8 => RecordTag::DrawPrecisePolygon,
            9 => RecordTag::DrawSprite,
            10 => RecordTag::DrawLine,
            11 => RecordTag::UpdateDisplay,
            12 => RecordTag::ClearDisplay,
            13 => RecordTag::ChangeBackend,
            14 => RecordTag::UpdateVsync,
            15 => RecordTag::AsyncCall,
            _ => return None,
        })
    }
}

bitflags! {
    /// Per-command GPUSTAT snapshot carried with every record
    ///
    /// The parser samples these at the moment the command completes, because
    /// the active display field can change before the worker dispatches the
    /// record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandParams: u32 {
        /// Force the mask bit on every written pixel
        const SET_MASK_WHILE_DRAWING = 1 << 0;
        /// Reject writes to pixels whose mask bit is already set
        const CHECK_MASK_BEFORE_DRAW = 1 << 1;
        /// Interlaced rendering active; skip rows on the displayed field
        const INTERLACED_RENDERING = 1 << 2;
        /// LSB of the displayed scanline at submission time
        const ACTIVE_LINE_LSB = 1 << 3;
        /// Reserved
        const RESERVED = 1 << 4;
    }
}

impl CommandParams {
    /// AND mask applied to the destination pixel before a write is allowed
    #[inline(always)]
    pub fn mask_and(self) -> u16 {
        if self.contains(CommandParams::CHECK_MASK_BEFORE_DRAW) {
            0x8000
        } else {
            0
        }
    }

    /// OR mask applied to every written pixel
    #[inline(always)]
    pub fn mask_or(self) -> u16 {
        if self.contains(CommandParams::SET_MASK_WHILE_DRAWING) {
            0x8000
        } else {
            0
        }
    }

    /// True when either mask behaviour is active
    #[inline(always)]
    pub fn masking_enabled(self) -> bool {
        self.intersects(
            CommandParams::SET_MASK_WHILE_DRAWING | CommandParams::CHECK_MASK_BEFORE_DRAW,
        )
    }

    /// LSB of the displayed scanline at submission time
    #[inline(always)]
    pub fn active_line_lsb(self) -> u32 {
        u32::from(self.contains(CommandParams::ACTIVE_LINE_LSB))
    }

    /// Whether row `y` must be skipped under interlaced rendering
    #[inline(always)]
    pub fn skip_interlaced_line(self, y: i32) -> bool {
        self.contains(CommandParams::INTERLACED_RENDERING)
            && (y as u32 & 1) == self.active_line_lsb()
    }
}

bitflags! {
    /// Flags carried by [`UpdateDisplayPayload`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DisplayFlags: u32 {
        /// Interlaced scanout: emit alternate rows of a full-height frame
        const INTERLACED = 1 << 0;
        /// Display area holds 24bpp pixels packed across 16-bit cells
        const FORMAT_24BIT = 1 << 1;
        /// Display output is disabled (present black)
        const DISABLED = 1 << 2;
        /// Present this frame to the host (counts toward the frame cap)
        const PRESENT = 1 << 3;
    }
}

/// Record header: tag plus total record size in words (header included)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RecordHeader {
    /// [`RecordTag`] as u32
    pub tag: u32,
    /// Total size of the record in 32-bit words, rounded up to a multiple of 2
    pub size_words: u32,
}

/// Payload of [`RecordTag::Reset`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ResetPayload {
    /// Non-zero to zero the shadow (and device) VRAM
    pub clear_vram: u32,
}

/// Payload of [`RecordTag::FillVram`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FillVramPayload {
    /// Destination X, already snapped to a multiple of 16
    pub x: u16,
    /// Destination Y
    pub y: u16,
    /// Width, already rounded up to a multiple of 16
    pub width: u16,
    /// Height in rows
    pub height: u16,
    /// 24-bit fill color
    pub color: u32,
    /// [`CommandParams`] bits
    pub params: u32,
}

/// Payload of [`RecordTag::UpdateVram`]; `width * height` u16 pixels follow
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct UpdateVramPayload {
    /// Destination X
    pub x: u16,
    /// Destination Y
    pub y: u16,
    /// Width in pixels
    pub width: u16,
    /// Height in rows
    pub height: u16,
    /// [`CommandParams`] bits
    pub params: u32,
}

/// Payload of [`RecordTag::CopyVram`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct CopyVramPayload {
    /// Source X
    pub src_x: u16,
    /// Source Y
    pub src_y: u16,
    /// Destination X
    pub dst_x: u16,
    /// Destination Y
    pub dst_y: u16,
    /// Width in pixels
    pub width: u16,
    /// Height in rows
    pub height: u16,
    /// [`CommandParams`] bits
    pub params: u32,
}

/// Payload of [`RecordTag::ReadVram`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ReadVramPayload {
    /// Source X
    pub x: u16,
    /// Source Y
    pub y: u16,
    /// Width in pixels
    pub width: u16,
    /// Height in rows
    pub height: u16,
}

/// Payload of [`RecordTag::SetDrawingArea`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SetDrawingAreaPayload {
    /// Left edge, inclusive
    pub left: u16,
    /// Top edge, inclusive
    pub top: u16,
    /// Right edge, inclusive
    pub right: u16,
    /// Bottom edge, inclusive
    pub bottom: u16,
}

/// Shared head of every draw record
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DrawHeaderPayload {
    /// Raw render command word
    pub rc: u32,
    /// Draw mode register bits at submission
    pub draw_mode: u32,
    /// Palette register bits at submission
    pub palette: u32,
    /// Resolved texture window
    pub window: TextureWindow,
    /// [`CommandParams`] bits
    pub params: u32,
    /// Vertex count in the trailing array
    pub num_vertices: u32,
}

/// Integer polygon vertex
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PolygonVertex {
    /// X after drawing-offset add and 11-bit truncation
    pub x: i32,
    /// Y after drawing-offset add and 11-bit truncation
    pub y: i32,
    /// 24-bit RGB
    pub color: u32,
    /// Packed texcoord (u in bits 0-7, v in bits 8-15)
    pub texcoord: u32,
}

impl PolygonVertex {
    /// Red channel
    #[inline(always)]
    pub fn r(&self) -> u8 {
        (self.color & 0xFF) as u8
    }

    /// Green channel
    #[inline(always)]
    pub fn g(&self) -> u8 {
        ((self.color >> 8) & 0xFF) as u8
    }

    /// Blue channel
    #[inline(always)]
    pub fn b(&self) -> u8 {
        ((self.color >> 16) & 0xFF) as u8
    }

    /// Texture U
    #[inline(always)]
    pub fn u(&self) -> u8 {
        (self.texcoord & 0xFF) as u8
    }

    /// Texture V
    #[inline(always)]
    pub fn v(&self) -> u8 {
        ((self.texcoord >> 8) & 0xFF) as u8
    }
}

/// PGXP-enriched polygon vertex
///
/// Carries the sub-pixel float position alongside the native-space integer
/// position; the software backend uses only the latter.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PrecisePolygonVertex {
    /// Sub-pixel X
    pub x: f32,
    /// Sub-pixel Y
    pub y: f32,
    /// Homogeneous W (1.0 when PGXP had no data for this vertex)
    pub w: f32,
    /// 24-bit RGB
    pub color: u32,
    /// Packed texcoord
    pub texcoord: u32,
    /// Native-space X (offset applied, truncated)
    pub native_x: i32,
    /// Native-space Y (offset applied, truncated)
    pub native_y: i32,
}

impl PrecisePolygonVertex {
    /// Downgrade to the integer vertex the software rasterizer consumes
    pub fn to_native(&self) -> PolygonVertex {
        PolygonVertex {
            x: self.native_x,
            y: self.native_y,
            color: self.color,
            texcoord: self.texcoord,
        }
    }
}

/// Trailing payload of [`RecordTag::DrawSprite`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SpritePayload {
    /// Top-left X after drawing-offset add and truncation
    pub x: i32,
    /// Top-left Y after drawing-offset add and truncation
    pub y: i32,
    /// Width in pixels (1-1023)
    pub width: u32,
    /// Height in rows (1-511)
    pub height: u32,
    /// Packed texcoord of the top-left texel
    pub texcoord: u32,
    /// 24-bit RGB modulation color
    pub color: u32,
}

/// Line vertex
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct LineVertex {
    /// X after drawing-offset add (not truncated; lines mask during the walk)
    pub x: i32,
    /// Y after drawing-offset add
    pub y: i32,
    /// 24-bit RGB
    pub color: u32,
}

impl LineVertex {
    /// Red channel
    #[inline(always)]
    pub fn r(&self) -> u8 {
        (self.color & 0xFF) as u8
    }

    /// Green channel
    #[inline(always)]
    pub fn g(&self) -> u8 {
        ((self.color >> 8) & 0xFF) as u8
    }

    /// Blue channel
    #[inline(always)]
    pub fn b(&self) -> u8 {
        ((self.color >> 16) & 0xFF) as u8
    }
}

/// Payload of [`RecordTag::UpdateDisplay`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct UpdateDisplayPayload {
    /// Display origin X in VRAM
    pub x: u16,
    /// Display origin Y in VRAM
    pub y: u16,
    /// Active display width in pixels
    pub width: u16,
    /// Active display height in rows
    pub height: u16,
    /// LSB of the displayed scanline (interlace field)
    pub field: u32,
    /// [`DisplayFlags`] bits
    pub flags: u32,
    /// Display aspect ratio (width / height)
    pub aspect: f32,
}

impl UpdateDisplayPayload {
    /// Decoded display flags
    #[inline]
    pub fn display_flags(&self) -> DisplayFlags {
        DisplayFlags::from_bits_truncate(self.flags)
    }
}

/// Payload of [`RecordTag::ChangeBackend`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ChangeBackendPayload {
    /// 0 = software, 1 = hardware
    pub backend: u32,
}

/// Payload of [`RecordTag::UpdateVsync`]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct UpdateVsyncPayload {
    /// Non-zero enables vsync
    pub vsync: u32,
}

/// A decoded record borrowing the queue storage it was read from
///
/// The borrow ends before the reader advances past the record, so the slices
/// are valid for the duration of the dispatch only. `AsyncCall` transfers
/// ownership of the boxed closure; a record must therefore be decoded exactly
/// once.
pub enum Record<'a> {
    /// Ring tail tombstone (handled inside the queue, never dispatched)
    Wraparound,
    /// Backend reset
    Reset(ResetPayload),
    /// 16bpp fill
    FillVram(FillVramPayload),
    /// CPU→VRAM blit
    UpdateVram(UpdateVramPayload, &'a [u16]),
    /// VRAM→VRAM blit
    CopyVram(CopyVramPayload),
    /// Synchronous VRAM mirror
    ReadVram(ReadVramPayload),
    /// Drawing area change
    SetDrawingArea(SetDrawingAreaPayload),
    /// Integer polygon
    DrawPolygon(DrawHeaderPayload, &'a [PolygonVertex]),
    /// PGXP polygon
    DrawPrecisePolygon(DrawHeaderPayload, &'a [PrecisePolygonVertex]),
    /// Rectangle
    DrawSprite(DrawHeaderPayload, SpritePayload),
    /// Line strip
    DrawLine(DrawHeaderPayload, &'a [LineVertex]),
    /// Display change / present
    UpdateDisplay(UpdateDisplayPayload),
    /// Clear displayed image
    ClearDisplay,
    /// Backend switch
    ChangeBackend(ChangeBackendPayload),
    /// Vsync change
    UpdateVsync(UpdateVsyncPayload),
    /// Host closure
    AsyncCall(WorkerCall),
}

/// Incrementally builds one encoded record
///
/// The builder writes the header first and patches the final size in
/// [`RecordBuffer::finish`]; total sizes are rounded up to an even number of
/// words so the ring's wrap tombstone always fits in any tail gap.
pub struct RecordBuffer {
    words: Vec<u32>,
}

impl RecordBuffer {
    /// Start a record of the given tag
    pub fn new(tag: RecordTag) -> Self {
        Self {
            words: vec![tag as u32, 0],
        }
    }

    /// Append a POD value; its size must be a multiple of 4
    pub fn push_pod<T: Pod>(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        debug_assert_eq!(bytes.len() % 4, 0);
        for chunk in bytes.chunks_exact(4) {
            self.words
                .push(u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
    }

    /// Append a slice of POD values
    pub fn push_pod_slice<T: Pod>(&mut self, values: &[T]) {
        for value in values {
            self.push_pod(value);
        }
    }

    /// Append 16-bit pixels, padding an odd count with a zero half-word
    pub fn push_u16_slice(&mut self, data: &[u16]) {
        for pair in data.chunks(2) {
            let lo = pair[0] as u32;
            let hi = if pair.len() > 1 { pair[1] as u32 } else { 0 };
            self.words.push(lo | (hi << 16));
        }
    }

    /// Patch the size field and return the encoded words
    pub fn finish(mut self) -> Vec<u32> {
        if self.words.len() % 2 != 0 {
            self.words.push(0);
        }
        self.words[1] = self.words.len() as u32;
        self.words
    }
}

/// Copy a POD value out of a word slice starting at `word_offset`
#[inline]
fn read_pod<T: Pod>(words: &[u32], word_offset: usize) -> T {
    let n = std::mem::size_of::<T>() / 4;
    let bytes: &[u8] = bytemuck::cast_slice(&words[word_offset..word_offset + n]);
    *bytemuck::from_bytes(bytes)
}

/// Borrow a POD slice out of a word slice
#[inline]
fn read_pod_slice<T: Pod>(words: &[u32], word_offset: usize, count: usize) -> &[T] {
    let n = (count * std::mem::size_of::<T>()).div_ceil(4);
    &bytemuck::cast_slice::<u32, T>(&words[word_offset..word_offset + n])[..count]
}

/// Word size of a POD type
#[inline]
pub const fn pod_words<T>() -> usize {
    std::mem::size_of::<T>() / 4
}

/// Decode one record from its encoded words (header included)
///
/// # Panics
///
/// Panics on an unknown tag or truncated payload; both indicate queue
/// corruption, which is unrecoverable.
pub fn decode(words: &[u32]) -> Record<'_> {
    let tag = RecordTag::from_u32(words[0]).expect("corrupt command queue: unknown record tag");
    let p = HEADER_WORDS;
    match tag {
        RecordTag::Wraparound => Record::Wraparound,
        RecordTag::Reset => Record::Reset(read_pod(words, p)),
        RecordTag::FillVram => Record::FillVram(read_pod(words, p)),
        RecordTag::UpdateVram => {
            let payload: UpdateVramPayload = read_pod(words, p);
            let num_pixels = payload.width as usize * payload.height as usize;
            let data_off = p + pod_words::<UpdateVramPayload>();
            let data: &[u16] = bytemuck::cast_slice(&words[data_off..]);
            Record::UpdateVram(payload, &data[..num_pixels])
        }
        RecordTag::CopyVram => Record::CopyVram(read_pod(words, p)),
        RecordTag::ReadVram => Record::ReadVram(read_pod(words, p)),
        RecordTag::SetDrawingArea => Record::SetDrawingArea(read_pod(words, p)),
        RecordTag::DrawPolygon => {
            let head: DrawHeaderPayload = read_pod(words, p);
            let verts = read_pod_slice(
                words,
                p + pod_words::<DrawHeaderPayload>(),
                head.num_vertices as usize,
            );
            Record::DrawPolygon(head, verts)
        }
        RecordTag::DrawPrecisePolygon => {
            let head: DrawHeaderPayload = read_pod(words, p);
            let verts = read_pod_slice(
                words,
                p + pod_words::<DrawHeaderPayload>(),
                head.num_vertices as usize,
            );
            Record::DrawPrecisePolygon(head, verts)
        }
        RecordTag::DrawSprite => {
            let head: DrawHeaderPayload = read_pod(words, p);
            let sprite = read_pod(words, p + pod_words::<DrawHeaderPayload>());
            Record::DrawSprite(head, sprite)
        }
        RecordTag::DrawLine => {
            let head: DrawHeaderPayload = read_pod(words, p);
            let verts = read_pod_slice(
                words,
                p + pod_words::<DrawHeaderPayload>(),
                head.num_vertices as usize,
            );
            Record::DrawLine(head, verts)
        }
        RecordTag::UpdateDisplay => Record::UpdateDisplay(read_pod(words, p)),
        RecordTag::ClearDisplay => Record::ClearDisplay,
        RecordTag::ChangeBackend => Record::ChangeBackend(read_pod(words, p)),
        RecordTag::UpdateVsync => Record::UpdateVsync(read_pod(words, p)),
        RecordTag::AsyncCall => {
            let ptr = ((words[p] as u64) | ((words[p + 1] as u64) << 32)) as usize;
            // SAFETY: the pointer was produced by encode_async_call on the
            // producer side and the SPSC queue delivers each record to exactly
            // one decode call, so the box is reconstructed exactly once.
            let call = unsafe { *Box::from_raw(ptr as *mut WorkerCall) };
            Record::AsyncCall(call)
        }
    }
}

/// Encode an [`RecordTag::AsyncCall`] record, leaking the closure into the
/// payload as a raw pointer until [`decode`] reclaims it
pub fn encode_async_call(call: WorkerCall) -> Vec<u32> {
    let ptr = Box::into_raw(Box::new(call)) as usize as u64;
    let mut buf = RecordBuffer::new(RecordTag::AsyncCall);
    buf.push_pod(&(ptr as u32));
    buf.push_pod(&((ptr >> 32) as u32));
    buf.finish()
}
