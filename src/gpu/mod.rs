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

//! GPU front end: the GP0/GP1 command parser
//!
//! Lives on the emulation thread. Accepts 32-bit words through the same
//! interface the hardware exposes at 0x1F801810/0x1F801814, maintains the
//! drawing environment, recognizes variable-length commands and emits one
//! typed record per completed command into the draw queue.
//!
//! # State machine
//!
//! ```text
//!           ┌────── environment / NOP / interrupt-request
//!  Idle ────┼── 0x20..0x7F ─► classify ─► accumulate vertex words ─► emit
//!           ├── 0xA0..0xBF ─► WritingVram (raw 16bpp pairs until done)
//!           ├── 0xC0..0xDF ─► ReadingVram (paced out through GPUREAD)
//!           └── 0x80..0x9F ─► emit CopyVram
//!
//!  polylines: DrawingPolyLine until a vertex word matches
//!  0x5000_5000 under the 0xF000_F000 mask (minimum two vertices)
//! ```

pub mod primitives;
pub mod registers;
pub mod timing;

mod gp0;
mod gp1;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{create_backend, BackendContext};
use crate::error::Result;
use crate::queue::record::{
    self, CommandParams, DisplayFlags, RecordBuffer, RecordTag, UpdateDisplayPayload,
};
use crate::queue::sync::Semaphore;
use crate::queue::CommandQueue;
use crate::settings::{BackendKind, GpuSettings, MessageSink, TextureReplacementHook};
use crate::vram::Vram;
use crate::worker::{DeviceFactory, FramePresenter, WorkerHandle, WorkerState};

use primitives::{DrawModeReg, DrawingArea, RenderCommand, TexturePaletteReg, TextureWindow};
use registers::{DisplayState, GpuStat};

/// PGXP sub-pixel vertex lookup
///
/// Given the raw position word and the native-space position after the
/// drawing offset, returns the enriched `(x, y, w)` when the CPU core has
/// precise data for this vertex.
pub type PreciseVertexHook = Arc<dyn Fn(u32, i32, i32) -> Option<(f32, f32, f32)> + Send + Sync>;

/// Construction options for [`Gpu`]
pub struct GpuOptions {
    /// Initial settings
    pub settings: GpuSettings,
    /// Run the backend on a dedicated worker thread
    pub threaded: bool,
    /// Host frame callback
    pub presenter: Option<FramePresenter>,
    /// Host message sink
    pub message_sink: Option<MessageSink>,
    /// GPU device factory for the hardware backend
    pub device_factory: Option<DeviceFactory>,
    /// Texture replacement hook
    pub texture_replacement: Option<TextureReplacementHook>,
    /// PGXP vertex enrichment hook
    pub precise_vertex_hook: Option<PreciseVertexHook>,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            settings: GpuSettings::default(),
            threaded: false,
            presenter: None,
            message_sink: None,
            device_factory: None,
            texture_replacement: None,
            precise_vertex_hook: None,
        }
    }
}

/// Parser blitter states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(in crate::gpu) enum BlitterState {
    /// Accepting commands
    Idle,
    /// Consuming raw 16bpp data words of a CPU→VRAM transfer
    WritingVram,
    /// Pacing VRAM data out through GPUREAD
    ReadingVram,
    /// Accumulating polyline vertices
    DrawingPolyLine,
}

/// Geometry of the transfer in flight
#[derive(Debug, Clone, Copy, Default)]
pub(in crate::gpu) struct VramTransfer {
    /// Destination/source X
    pub x: u32,
    /// Destination/source Y
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in rows
    pub height: u32,
}

/// Where completed records go: the worker queue or an inline dispatcher
enum CommandSink {
    /// Dispatch on the calling thread (threadless mode)
    Inline(Box<WorkerState>),
    /// Cross-thread queue plus worker handle
    Threaded {
        queue: Arc<CommandQueue>,
        worker: Option<WorkerHandle>,
    },
}

impl CommandSink {
    fn push(&mut self, words: &[u32]) -> Result<()> {
        match self {
            CommandSink::Inline(state) => {
                state.dispatch(record::decode(words));
                Ok(())
            }
            CommandSink::Threaded { queue, .. } => queue.push(words),
        }
    }

    fn push_and_sync(&mut self, words: &[u32]) -> Result<()> {
        match self {
            CommandSink::Inline(state) => {
                state.dispatch(record::decode(words));
                Ok(())
            }
            CommandSink::Threaded { queue, .. } => queue.push_and_sync(words),
        }
    }

    fn sync(&mut self) {
        if let CommandSink::Threaded { queue, .. } = self {
            queue.sync();
        }
    }

    fn shutdown(&mut self) {
        if let CommandSink::Threaded { worker, .. } = self {
            if let Some(mut worker) = worker.take() {
                worker.shutdown();
            }
        }
    }
}

/// The GPU front end
///
/// # Examples
///
/// ```
/// use echo_gpu::{Gpu, GpuOptions};
///
/// let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
///
/// // GP0(0xE1): set draw mode, then read GPUSTAT.
/// gpu.gp0_write(0xE100_0005);
/// assert_eq!(gpu.status() & 0xF, 5);
/// ```
pub struct Gpu {
    /// Incoming GP0 word FIFO
    pub(in crate::gpu) fifo: VecDeque<u32>,

    /// Parser state
    pub(in crate::gpu) blitter_state: BlitterState,

    /// Raw data words of the CPU→VRAM transfer in flight
    pub(in crate::gpu) blit_buffer: Vec<u32>,

    /// Data words still expected by the transfer in flight
    pub(in crate::gpu) blit_remaining_words: u32,

    /// Geometry of the transfer in flight
    pub(in crate::gpu) vram_transfer: VramTransfer,

    /// Accumulated polyline words (positions, and colors when shaded)
    pub(in crate::gpu) polyline_buffer: Vec<u32>,

    /// Render command of the polyline in flight
    pub(in crate::gpu) render_command: RenderCommand,

    /// Words pending for GPUREAD during a VRAM→CPU transfer
    pub(in crate::gpu) read_fifo: VecDeque<u32>,

    /// GPUREAD latch for GP1(0x10) info queries
    pub(in crate::gpu) gpuread_latch: u32,

    /// GPUSTAT bits
    pub(in crate::gpu) stat: GpuStat,

    /// GP0(0xE1) draw mode register
    pub(in crate::gpu) draw_mode: DrawModeReg,

    /// Palette register of the last textured primitive
    pub(in crate::gpu) palette: TexturePaletteReg,

    /// Raw GP0(0xE2) register value (for GP1 info queries)
    pub(in crate::gpu) texture_window_reg: u32,

    /// Resolved texture window
    pub(in crate::gpu) texture_window: TextureWindow,

    /// GP0(0xE3/0xE4) drawing area
    pub(in crate::gpu) drawing_area: DrawingArea,

    /// GP0(0xE5) drawing offset
    pub(in crate::gpu) drawing_offset: (i32, i32),

    /// GP1 display registers
    pub(in crate::gpu) display: DisplayState,

    /// LSB of the scanline currently displayed (driven by the CRTC)
    pub(in crate::gpu) active_line_lsb: bool,

    /// Ticks accumulated since the last `consume_ticks`
    pub(in crate::gpu) pending_ticks: u32,

    /// Producer-side settings copy
    pub(in crate::gpu) settings: GpuSettings,

    /// PGXP enrichment hook
    pub(in crate::gpu) precise_vertex_hook: Option<PreciseVertexHook>,

    /// Shadow VRAM (locked only after queue synchronization)
    vram: Arc<Mutex<Vram>>,

    /// Frames queued but not presented
    queued_frames: Arc<AtomicU32>,

    /// Posted by the worker after each present
    frame_done: Arc<Semaphore>,

    /// A fatal error asked the emulator to halt
    halt_requested: bool,

    /// Record destination
    sink: CommandSink,
}

impl Gpu {
    /// Create a GPU pipeline
    pub fn new(options: GpuOptions) -> Result<Self> {
        let vram = Arc::new(Mutex::new(Vram::new()));
        let queued_frames = Arc::new(AtomicU32::new(0));
        let frame_done = Arc::new(Semaphore::new(0));

        let ctx = BackendContext {
            settings: options.settings.clone(),
            sink: options.message_sink.clone(),
            texture_replacement: options.texture_replacement.clone(),
        };

        // The worker is the sole owner of the device, so the pipeline always
        // starts on the software backend; a hardware request is marshalled
        // through the queue below and the device factory runs worker-side.
        let state = WorkerState {
            settings: options.settings.clone(),
            vram: vram.clone(),
            backend: create_backend(BackendKind::Software, ctx, None),
            presenter: options.presenter,
            device_factory: options.device_factory,
            sink: options.message_sink,
            texture_replacement: options.texture_replacement,
            queued_frames: queued_frames.clone(),
            frame_done: frame_done.clone(),
        };

        let sink = if options.threaded {
            let queue = Arc::new(CommandQueue::new());
            let worker = WorkerHandle::spawn(queue.clone(), state)
                .map_err(|e| crate::error::GpuError::DeviceCreate { message: e.to_string() })?;
            CommandSink::Threaded {
                queue,
                worker: Some(worker),
            }
        } else {
            CommandSink::Inline(Box::new(state))
        };

        let mut gpu = Self {
            fifo: VecDeque::new(),
            blitter_state: BlitterState::Idle,
            blit_buffer: Vec::new(),
            blit_remaining_words: 0,
            vram_transfer: VramTransfer::default(),
            polyline_buffer: Vec::new(),
            render_command: RenderCommand::default(),
            read_fifo: VecDeque::new(),
            gpuread_latch: 0,
            stat: GpuStat::DISPLAY_DISABLED,
            draw_mode: DrawModeReg::default(),
            palette: TexturePaletteReg::default(),
            texture_window_reg: 0,
            texture_window: TextureWindow::default(),
            drawing_area: DrawingArea::default(),
            drawing_offset: (0, 0),
            display: DisplayState::default(),
            active_line_lsb: false,
            pending_ticks: 0,
            settings: options.settings,
            precise_vertex_hook: options.precise_vertex_hook,
            vram,
            queued_frames,
            frame_done,
            halt_requested: false,
            sink,
        };

        if gpu.settings.backend == BackendKind::Hardware {
            gpu.change_backend(BackendKind::Hardware);
        }
        Ok(gpu)
    }

    /// Append one word to the GP0 port
    pub fn gp0_write(&mut self, word: u32) {
        self.fifo.push_back(word);
        self.process_fifo();
    }

    /// Append a run of GP0 words (DMA block transfer)
    ///
    /// Equivalent to repeated [`Gpu::gp0_write`] calls.
    pub fn gp0_write_run(&mut self, words: &[u32]) {
        self.fifo.extend(words.iter().copied());
        self.process_fifo();
    }

    /// Process the GP1 display-control port
    pub fn gp1_write(&mut self, value: u32) {
        let command = (value >> 24) & 0x3F;
        match command {
            0x00 => self.gp1_reset(),
            0x01 => self.gp1_reset_command_buffer(),
            0x02 => self.gp1_acknowledge_interrupt(),
            0x03 => self.gp1_display_enable(value),
            0x04 => self.gp1_dma_direction(value),
            0x05 => self.gp1_display_area_start(value),
            0x06 => self.gp1_horizontal_display_range(value),
            0x07 => self.gp1_vertical_display_range(value),
            0x08 => self.gp1_display_mode(value),
            0x09 => self.gp1_allow_texture_disable(value),
            0x10..=0x1F => self.gp1_get_gpu_info(value),
            _ => {
                log::warn!("unknown GP1 command 0x{:02X} (0x{:08X})", command, value);
            }
        }
    }

    /// Read the GPUREAD port
    ///
    /// Returns VRAM readback words during a VRAM→CPU transfer, otherwise the
    /// latched GP1(0x10) response.
    pub fn gpu_read(&mut self) -> u32 {
        if self.blitter_state == BlitterState::ReadingVram {
            let word = self.read_fifo.pop_front().unwrap_or(0);
            if self.read_fifo.is_empty() {
                log::debug!("VRAM→CPU transfer complete");
                self.blitter_state = BlitterState::Idle;
                // Commands may have queued up behind the transfer.
                self.process_fifo();
            }
            self.gpuread_latch = word;
            return word;
        }
        self.gpuread_latch
    }

    /// Current GPUSTAT value
    pub fn status(&self) -> u32 {
        let mut stat = self.stat;

        stat.remove(
            GpuStat::READY_TO_RECEIVE_CMD
                | GpuStat::READY_TO_SEND_VRAM
                | GpuStat::READY_TO_RECEIVE_DMA
                | GpuStat::DMA_REQUEST
                | GpuStat::INTERLACE_ODD_LINE,
        );

        match self.blitter_state {
            BlitterState::Idle => {
                if self.fifo.is_empty() {
                    stat.insert(GpuStat::READY_TO_RECEIVE_CMD);
                }
                stat.insert(GpuStat::READY_TO_RECEIVE_DMA);
            }
            BlitterState::WritingVram | BlitterState::DrawingPolyLine => {
                stat.insert(GpuStat::READY_TO_RECEIVE_DMA);
            }
            BlitterState::ReadingVram => {
                stat.insert(GpuStat::READY_TO_SEND_VRAM);
            }
        }

        let dma_request = match self.stat.dma_direction() {
            0 => false,
            1 => true, // FIFO not full
            2 => stat.contains(GpuStat::READY_TO_RECEIVE_DMA),
            _ => stat.contains(GpuStat::READY_TO_SEND_VRAM),
        };
        if dma_request {
            stat.insert(GpuStat::DMA_REQUEST);
        }

        // Bit 31 toggles with the displayed line in interlaced modes.
        if self.active_line_lsb && !self.stat.contains(GpuStat::DISPLAY_DISABLED) {
            stat.insert(GpuStat::INTERLACE_ODD_LINE);
        }

        stat.bits()
    }

    /// State of the GPU IRQ line (GP0 0x1F)
    pub fn gpu_irq_line(&self) -> bool {
        self.stat.contains(GpuStat::INTERRUPT_REQUEST)
    }

    /// Acknowledge the GPU interrupt (interrupt controller side)
    pub fn acknowledge_irq(&mut self) {
        self.stat.remove(GpuStat::INTERRUPT_REQUEST);
    }

    /// Inject the LSB of the currently displayed scanline (CRTC)
    pub fn set_active_line_lsb(&mut self, lsb: bool) {
        self.active_line_lsb = lsb;
    }

    /// Take the ticks accumulated by parsed commands
    pub fn consume_ticks(&mut self) -> u32 {
        std::mem::take(&mut self.pending_ticks)
    }

    /// Apply a settings change
    ///
    /// The new value is marshalled through the queue; the worker applies it
    /// at a record boundary.
    pub fn update_settings(&mut self, new: GpuSettings) {
        if new == self.settings {
            return;
        }
        self.settings = new.clone();
        let words = record::encode_async_call(Box::new(move |state| state.apply_settings(new)));
        self.push_record(words);
        self.sink.sync();
    }

    /// Switch the rasterizer backend, waiting for completion
    pub fn change_backend(&mut self, kind: BackendKind) {
        self.settings.backend = kind;
        let mut buf = RecordBuffer::new(RecordTag::ChangeBackend);
        buf.push_pod(&record::ChangeBackendPayload {
            backend: match kind {
                BackendKind::Software => 0,
                BackendKind::Hardware => 1,
            },
        });
        let words = buf.finish();
        if let Err(e) = self.sink.push_and_sync(&words) {
            log::error!("backend switch failed: {}", e);
        }
    }

    /// Change swap-chain vsync, waiting for completion
    pub fn update_vsync(&mut self, vsync: bool) {
        self.settings.vsync = vsync;
        let mut buf = RecordBuffer::new(RecordTag::UpdateVsync);
        buf.push_pod(&record::UpdateVsyncPayload {
            vsync: u32::from(vsync),
        });
        let words = buf.finish();
        if let Err(e) = self.sink.push_and_sync(&words) {
            log::error!("vsync update failed: {}", e);
        }
    }

    /// Present the current display configuration as a frame
    ///
    /// Blocks while the queued-frame cap is reached (backpressure against a
    /// slow GPU). The host calls this once per vertical blank.
    pub fn present_frame(&mut self) {
        let cap = self.settings.max_queued_frames.max(1);
        while self.queued_frames.load(Ordering::Acquire) >= cap {
            self.frame_done.wait();
        }
        self.queued_frames.fetch_add(1, Ordering::AcqRel);

        let payload = self.display_payload(true);
        let mut buf = RecordBuffer::new(RecordTag::UpdateDisplay);
        buf.push_pod(&payload);
        let words = buf.finish();
        self.push_record(words);
    }

    /// Drain the queue and wait until every prior command has executed
    pub fn flush_sync(&mut self) {
        self.sink.sync();
    }

    /// Synchronously read a rectangle of the shadow VRAM
    ///
    /// Observes every prior draw: the queue is drained (and the hardware
    /// backend mirrors drawn regions back) before the copy.
    pub fn read_vram_rect(&mut self, x: u32, y: u32, width: u32, height: u32) -> Vec<u16> {
        let mut buf = RecordBuffer::new(RecordTag::ReadVram);
        buf.push_pod(&record::ReadVramPayload {
            x: x as u16,
            y: y as u16,
            width: width as u16,
            height: height as u16,
        });
        let words = buf.finish();
        if let Err(e) = self.sink.push_and_sync(&words) {
            log::error!("VRAM read failed: {}", e);
        }
        self.vram.lock().unwrap().read_rect(x, y, width, height)
    }

    /// Whether a fatal pipeline error asked the emulator to halt
    ///
    /// Set when the draw queue cannot hold a record even after waiting; the
    /// host should stop emulation. Rendering errors never set this.
    pub fn halt_requested(&self) -> bool {
        self.halt_requested
    }

    /// Stop the worker and tear the pipeline down
    pub fn shutdown(&mut self) {
        self.sink.shutdown();
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Push an encoded record, reporting queue exhaustion
    pub(in crate::gpu) fn push_record(&mut self, words: Vec<u32>) {
        if let Err(e) = self.sink.push(&words) {
            // Queue allocation failure is fatal for the producer.
            log::error!("draw queue allocation failed: {}", e);
            self.halt_requested = true;
        }
    }

    /// Push an encoded record and wait for the worker to drain
    pub(in crate::gpu) fn push_record_sync(&mut self, words: Vec<u32>) {
        if let Err(e) = self.sink.push_and_sync(&words) {
            log::error!("draw queue allocation failed: {}", e);
            self.halt_requested = true;
        }
    }

    /// Lock the shadow VRAM; callers must have synchronized first
    pub(in crate::gpu) fn lock_vram(&self) -> std::sync::MutexGuard<'_, Vram> {
        self.vram.lock().unwrap()
    }

    /// Snapshot of the per-command GPUSTAT bits
    pub(in crate::gpu) fn command_params(&self) -> CommandParams {
        let mut params = CommandParams::empty();
        if self.stat.contains(GpuStat::SET_MASK_WHILE_DRAWING) {
            params |= CommandParams::SET_MASK_WHILE_DRAWING;
        }
        if self.stat.contains(GpuStat::CHECK_MASK_BEFORE_DRAW) {
            params |= CommandParams::CHECK_MASK_BEFORE_DRAW;
        }
        if self.stat.interlaced_rendering_enabled() {
            params |= CommandParams::INTERLACED_RENDERING;
        }
        if self.active_line_lsb {
            params |= CommandParams::ACTIVE_LINE_LSB;
        }
        params
    }

    /// Update the draw mode register and its GPUSTAT mirror
    pub(in crate::gpu) fn set_draw_mode(&mut self, bits: u16) {
        if bits != self.draw_mode.0 {
            self.draw_mode = DrawModeReg(bits);
            self.stat.set_draw_mode_bits(bits);
        }
    }

    /// Build the display payload from the current registers
    pub(in crate::gpu) fn display_payload(&self, present: bool) -> UpdateDisplayPayload {
        let width = self.stat.horizontal_resolution() as u16;
        let height = self.stat.vertical_resolution() as u16;

        let mut flags = DisplayFlags::empty();
        if self.stat.contains(GpuStat::VERTICAL_INTERLACE) && self.stat.contains(GpuStat::VERTICAL_RES)
        {
            flags |= DisplayFlags::INTERLACED;
        }
        if self.stat.contains(GpuStat::DISPLAY_AREA_24BIT) {
            flags |= DisplayFlags::FORMAT_24BIT;
        }
        if self.stat.contains(GpuStat::DISPLAY_DISABLED) {
            flags |= DisplayFlags::DISABLED;
        }
        if present {
            flags |= DisplayFlags::PRESENT;
        }

        UpdateDisplayPayload {
            x: self.display.start_x,
            y: self.display.start_y,
            width,
            height,
            field: u32::from(self.active_line_lsb),
            flags: flags.bits(),
            aspect: 4.0 / 3.0,
        }
    }

    /// Emit an UpdateDisplay record without presentation
    pub(in crate::gpu) fn push_display_update(&mut self) {
        let payload = self.display_payload(false);
        let mut buf = RecordBuffer::new(RecordTag::UpdateDisplay);
        buf.push_pod(&payload);
        let words = buf.finish();
        self.push_record(words);
    }

    /// Drain the FIFO as far as the current state allows
    pub(in crate::gpu) fn process_fifo(&mut self) {
        loop {
            let progressed = match self.blitter_state {
                BlitterState::WritingVram => self.continue_vram_write(),
                BlitterState::DrawingPolyLine => self.continue_polyline(),
                // Readback blocks command processing until drained.
                BlitterState::ReadingVram => false,
                BlitterState::Idle => self.try_process_command(),
            };
            if !progressed {
                break;
            }
        }
    }

    /// Decode one command at the FIFO head; false when more words are needed
    fn try_process_command(&mut self) -> bool {
        let Some(&first) = self.fifo.front() else {
            return false;
        };
        let opcode = (first >> 24) as u8;

        match opcode {
            // NOP and the unknown low opcodes
            0x00 | 0x03..=0x1E | 0xE0 | 0xE7..=0xEF => {
                self.fifo.pop_front();
                true
            }
            // Clear texture cache: no cache in this implementation
            0x01 => {
                self.fifo.pop_front();
                true
            }
            0x02 => self.handle_fill_rectangle(),
            0x1F => self.handle_interrupt_request(),
            0x20..=0x3F => self.handle_polygon(),
            0x40..=0x5F => {
                if RenderCommand(first).polyline() {
                    self.handle_polyline_start()
                } else {
                    self.handle_line()
                }
            }
            0x60..=0x7F => self.handle_rectangle(),
            0x80..=0x9F => self.handle_vram_copy(),
            0xA0..=0xBF => self.handle_vram_write_start(),
            0xC0..=0xDF => self.handle_vram_read_start(),
            0xE1 => self.gp0_draw_mode(),
            0xE2 => self.gp0_texture_window(),
            0xE3 => self.gp0_drawing_area_top_left(),
            0xE4 => self.gp0_drawing_area_bottom_right(),
            0xE5 => self.gp0_drawing_offset(),
            0xE6 => self.gp0_mask_settings(),
            _ => {
                log::warn!(
                    "unknown GP0 command 0x{:02X} (word 0x{:08X}, {} words buffered)",
                    opcode,
                    first,
                    self.fifo.len()
                );
                self.fifo.pop_front();
                true
            }
        }
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        self.shutdown();
    }
}
