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

//! GPU worker thread
//!
//! The sole consumer of the draw queue and the only code allowed to touch
//! the [`crate::device::GpuDevice`]. Records are dispatched strictly in FIFO
//! order. On an empty queue the thread normally blocks on the wake
//! semaphore; with [`crate::GpuSettings::run_idle`] set it instead keeps
//! re-presenting the last frame, throttled to the configured max FPS, and
//! polls for new records between presents.
//!
//! The same dispatch code also runs inline (threadless mode) on the
//! emulation thread, which is what unit tests use.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::backend::{create_backend, BackendContext, GpuBackend, PresentedFrame};
use crate::device::null::NullDevice;
use crate::device::GpuDevice;
use crate::gpu::primitives::DrawingArea;
use crate::queue::record::{DisplayFlags, Record, UpdateVramPayload};
use crate::queue::sync::Semaphore;
use crate::queue::CommandQueue;
use crate::settings::{BackendKind, GpuSettings, MessageSink, TextureReplacementHook};
use crate::vram::Vram;

/// Host frame callback
pub type FramePresenter = Box<dyn FnMut(&PresentedFrame) + Send>;

/// Factory producing GPU devices for the hardware backend
///
/// Called on the worker thread whenever a hardware backend is (re)created.
pub type DeviceFactory =
    Arc<dyn Fn() -> crate::error::Result<Box<dyn GpuDevice>> + Send + Sync>;

/// Closure marshalled through the queue to run on the worker
pub type WorkerCall = Box<dyn FnOnce(&mut WorkerState) + Send>;

/// Everything the worker owns while dispatching
pub struct WorkerState {
    /// Authoritative settings copy
    pub settings: GpuSettings,
    /// The shadow VRAM shared with the front end
    pub vram: Arc<Mutex<Vram>>,
    /// Active backend
    pub backend: Box<dyn GpuBackend>,
    /// Host frame callback
    pub presenter: Option<FramePresenter>,
    /// Device factory for backend switches
    pub device_factory: Option<DeviceFactory>,
    /// Host message sink
    pub sink: Option<MessageSink>,
    /// Texture replacement hook
    pub texture_replacement: Option<TextureReplacementHook>,
    /// Frames queued but not yet presented (backpressure)
    pub queued_frames: Arc<AtomicU32>,
    /// Posted once per presented frame
    pub frame_done: Arc<Semaphore>,
}

impl WorkerState {
    fn ctx(&self) -> BackendContext {
        BackendContext {
            settings: self.settings.clone(),
            sink: self.sink.clone(),
            texture_replacement: self.texture_replacement.clone(),
        }
    }

    fn make_device(&self) -> Option<Box<dyn GpuDevice>> {
        match &self.device_factory {
            Some(factory) => match factory() {
                Ok(device) => Some(device),
                Err(e) => {
                    log::error!("device creation failed: {}", e);
                    None
                }
            },
            None => Some(Box::new(NullDevice::new())),
        }
    }

    /// Replace the backend, moving the device across when possible
    pub fn switch_backend(&mut self, kind: BackendKind) {
        let device = match kind {
            BackendKind::Hardware => self.backend.take_device().or_else(|| self.make_device()),
            BackendKind::Software => {
                // The device is dropped with the old backend.
                None
            }
        };
        self.settings.backend = kind;
        self.backend = create_backend(kind, self.ctx(), device);
        log::info!("switched to {} backend", self.backend.name());
        self.seed_backend_vram();
    }

    /// Apply a settings change, recreating the backend when required
    pub fn apply_settings(&mut self, new: GpuSettings) {
        let old = std::mem::replace(&mut self.settings, new.clone());
        if old.requires_backend_recreate(&new) {
            let device = match new.backend {
                BackendKind::Hardware => self.backend.take_device().or_else(|| self.make_device()),
                BackendKind::Software => None,
            };
            self.backend = create_backend(new.backend, self.ctx(), device);
            self.seed_backend_vram();
        } else {
            self.backend.update_settings(&old, &new);
        }
    }

    /// Replay the full shadow VRAM into a freshly created backend so its
    /// device-side copy starts coherent
    fn seed_backend_vram(&mut self) {
        if self.settings.backend != BackendKind::Hardware {
            return;
        }
        let snapshot = {
            let vram = self.vram.lock().unwrap();
            vram.pixels().to_vec()
        };
        let payload = UpdateVramPayload {
            x: 0,
            y: 0,
            width: crate::vram::VRAM_WIDTH as u16,
            height: crate::vram::VRAM_HEIGHT as u16,
            params: 0,
        };
        let mut vram = self.vram.lock().unwrap();
        self.backend.update_vram(&mut vram, &payload, &snapshot);
    }

    /// Re-present the last frame while no records arrive
    ///
    /// Runs outside the frame backpressure accounting: idle presents were
    /// never counted by the producer, so neither the queued-frame counter
    /// nor the frame-done semaphore moves here.
    fn idle_present(&mut self) {
        let frame = {
            let vram = self.vram.lock().unwrap();
            self.backend.present_current_frame(&vram)
        };
        if let Some(frame) = frame {
            if let Some(presenter) = &mut self.presenter {
                presenter(&frame);
            }
        }
    }

    fn present(&mut self, frame: PresentedFrame) {
        if let Some(presenter) = &mut self.presenter {
            presenter(&frame);
        }
        // Release one unit of backpressure; the producer counted this frame
        // before pushing its record, so the counter is never zero here.
        self.queued_frames.fetch_sub(1, Ordering::AcqRel);
        self.frame_done.post();
    }

    /// Dispatch one decoded record
    pub fn dispatch(&mut self, record: Record<'_>) {
        match record {
            Record::Wraparound => {}
            Record::Reset(p) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.reset(&mut vram, p.clear_vram != 0);
            }
            Record::FillVram(p) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.fill_vram(&mut vram, &p);
            }
            Record::UpdateVram(p, data) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.update_vram(&mut vram, &p, data);
            }
            Record::CopyVram(p) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.copy_vram(&mut vram, &p);
            }
            Record::ReadVram(p) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.read_vram(&mut vram, &p);
            }
            Record::SetDrawingArea(p) => {
                self.backend.drawing_area_changed(DrawingArea {
                    left: p.left as u32,
                    top: p.top as u32,
                    right: p.right as u32,
                    bottom: p.bottom as u32,
                });
            }
            Record::DrawPolygon(head, verts) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.draw_polygon(&mut vram, &head, verts);
            }
            Record::DrawPrecisePolygon(head, verts) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.draw_precise_polygon(&mut vram, &head, verts);
            }
            Record::DrawSprite(head, sprite) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.draw_sprite(&mut vram, &head, &sprite);
            }
            Record::DrawLine(head, verts) => {
                let mut vram = self.vram.lock().unwrap();
                self.backend.draw_line(&mut vram, &head, verts);
            }
            Record::UpdateDisplay(p) => {
                let present_requested = p.display_flags().contains(DisplayFlags::PRESENT);
                let frame = {
                    let vram = self.vram.lock().unwrap();
                    self.backend.update_display(&vram, &p)
                };
                match frame {
                    Some(frame) => self.present(frame),
                    None if present_requested => {
                        // The frame was dropped (device loss); release the
                        // producer's backpressure unit anyway.
                        self.queued_frames.fetch_sub(1, Ordering::AcqRel);
                        self.frame_done.post();
                    }
                    None => {}
                }
            }
            Record::ClearDisplay => self.backend.clear_display(),
            Record::ChangeBackend(p) => {
                let kind = if p.backend == 0 { BackendKind::Software } else { BackendKind::Hardware };
                self.switch_backend(kind);
            }
            Record::UpdateVsync(p) => self.backend.update_vsync(p.vsync != 0),
            Record::AsyncCall(call) => call(self),
        }
    }
}

/// Handle to the spawned worker thread
pub struct WorkerHandle {
    join: Option<JoinHandle<()>>,
    queue: Arc<CommandQueue>,
}

impl WorkerHandle {
    /// Spawn the worker thread
    pub fn spawn(queue: Arc<CommandQueue>, mut state: WorkerState) -> std::io::Result<Self> {
        let thread_queue = queue.clone();
        let join = std::thread::Builder::new()
            .name("gpu-worker".into())
            .spawn(move || {
                log::debug!("GPU worker thread running ({})", state.backend.name());
                run_worker_loop(&thread_queue, &mut state);
                log::debug!("GPU worker thread exiting");
            })?;
        Ok(Self {
            join: Some(join),
            queue,
        })
    }

    /// Signal shutdown and join the thread
    pub fn shutdown(&mut self) {
        if let Some(join) = self.join.take() {
            self.queue.request_shutdown();
            if let Err(e) = join.join() {
                log::error!("GPU worker thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The dispatch loop: drain, service syncs, idle-present, exit on shutdown
fn run_worker_loop(queue: &CommandQueue, state: &mut WorkerState) {
    let mut next_idle_present = Instant::now();
    loop {
        let mut worked = false;
        while queue.try_dispatch(|record| state.dispatch(record)) {
            worked = true;
        }

        if worked {
            // The producer went quiet; push any batched draws to the device.
            state.backend.flush();
        }

        if queue.shutdown_requested() && queue.is_empty() {
            break;
        }

        if worked {
            continue;
        }

        if state.settings.run_idle {
            // Idle-present mode: never block on the empty queue. Re-present
            // the last frame at the configured rate and poll for records in
            // between. Uncapped settings idle at the nominal display rate.
            let fps = if state.settings.max_displayed_fps > 0.0 {
                state.settings.max_displayed_fps
            } else {
                60.0
            };
            let period = Duration::from_secs_f32(1.0 / fps);
            let now = Instant::now();
            if now >= next_idle_present {
                state.idle_present();
                next_idle_present = now + period;
            }
            let wait = next_idle_present.saturating_duration_since(Instant::now());
            queue.wake.wait_timeout(wait.min(Duration::from_millis(10)));
        } else {
            // Block until the producer posts work; the timeout keeps the
            // loop responsive to shutdown without a dedicated wakeup.
            queue.wake.wait_timeout(Duration::from_millis(10));
        }
    }

    // Backend (and device) teardown happens here, on the worker thread.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::record::{FillVramPayload, RecordBuffer, RecordTag, UpdateDisplayPayload};

    fn make_state() -> (WorkerState, Arc<Mutex<Vram>>) {
        let vram = Arc::new(Mutex::new(Vram::new()));
        let settings = GpuSettings::default();
        let ctx = BackendContext {
            settings: settings.clone(),
            sink: None,
            texture_replacement: None,
        };
        let state = WorkerState {
            settings,
            vram: vram.clone(),
            backend: create_backend(BackendKind::Software, ctx, None),
            presenter: None,
            device_factory: None,
            sink: None,
            texture_replacement: None,
            queued_frames: Arc::new(AtomicU32::new(0)),
            frame_done: Arc::new(Semaphore::new(0)),
        };
        (state, vram)
    }

    fn fill_record(x: u16, y: u16, w: u16, h: u16, color: u32) -> Vec<u32> {
        let mut buf = RecordBuffer::new(RecordTag::FillVram);
        buf.push_pod(&FillVramPayload {
            x,
            y,
            width: w,
            height: h,
            color,
            params: 0,
        });
        buf.finish()
    }

    #[test]
    fn test_worker_thread_executes_records() {
        let queue = Arc::new(CommandQueue::new());
        let (state, vram) = make_state();
        let mut handle = WorkerHandle::spawn(queue.clone(), state).unwrap();

        queue.push(&fill_record(0, 0, 16, 16, 0x0000FF)).unwrap();
        queue.sync();

        assert_eq!(vram.lock().unwrap().get_pixel(0, 0), 0x001F);

        handle.shutdown();
    }

    #[test]
    fn test_shutdown_drains_pending_records() {
        let queue = Arc::new(CommandQueue::new());
        let (state, vram) = make_state();
        let mut handle = WorkerHandle::spawn(queue.clone(), state).unwrap();

        for i in 0..64u16 {
            queue.push(&fill_record(i * 16, 0, 16, 1, 0x00FF00)).unwrap();
        }
        handle.shutdown();

        let vram = vram.lock().unwrap();
        for i in 0..64u32 {
            assert_eq!(vram.get_pixel((i * 16) % 1024, 0), 0x03E0, "fill {}", i);
        }
    }

    #[test]
    fn test_backend_switch_preserves_vram() {
        let (mut state, vram) = make_state();
        vram.lock().unwrap().set_pixel(5, 5, 0x1234);

        state.switch_backend(BackendKind::Hardware);
        assert_eq!(state.backend.name(), "hardware");
        assert_eq!(vram.lock().unwrap().get_pixel(5, 5), 0x1234);

        state.switch_backend(BackendKind::Software);
        assert_eq!(state.backend.name(), "software");
        assert_eq!(vram.lock().unwrap().get_pixel(5, 5), 0x1234);
    }

    #[test]
    fn test_run_idle_represents_last_frame() {
        let queue = Arc::new(CommandQueue::new());
        let (mut state, _vram) = make_state();
        state.settings.run_idle = true;
        state.settings.max_displayed_fps = 500.0;

        let presented = Arc::new(AtomicU32::new(0));
        let presented2 = presented.clone();
        state.presenter = Some(Box::new(move |_frame| {
            presented2.fetch_add(1, Ordering::Relaxed);
        }));

        // The producer counts the one real frame it queues.
        state.queued_frames.fetch_add(1, Ordering::AcqRel);

        let mut handle = WorkerHandle::spawn(queue.clone(), state).unwrap();

        let mut buf = RecordBuffer::new(RecordTag::UpdateDisplay);
        buf.push_pod(&UpdateDisplayPayload {
            x: 0,
            y: 0,
            width: 320,
            height: 240,
            field: 0,
            flags: DisplayFlags::PRESENT.bits(),
            aspect: 4.0 / 3.0,
        });
        queue.push_and_sync(&buf.finish()).unwrap();

        // With no further records, idle re-presents accumulate past the one
        // queued frame.
        let deadline = Instant::now() + Duration::from_secs(2);
        while presented.load(Ordering::Relaxed) < 4 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(
            presented.load(Ordering::Relaxed) >= 4,
            "idle presents did not run"
        );

        handle.shutdown();
    }

    #[test]
    fn test_worker_blocks_without_run_idle() {
        let queue = Arc::new(CommandQueue::new());
        let (mut state, _vram) = make_state();

        let presented = Arc::new(AtomicU32::new(0));
        let presented2 = presented.clone();
        state.presenter = Some(Box::new(move |_frame| {
            presented2.fetch_add(1, Ordering::Relaxed);
        }));
        state.queued_frames.fetch_add(1, Ordering::AcqRel);

        let mut handle = WorkerHandle::spawn(queue.clone(), state).unwrap();

        let mut buf = RecordBuffer::new(RecordTag::UpdateDisplay);
        buf.push_pod(&UpdateDisplayPayload {
            x: 0,
            y: 0,
            width: 320,
            height: 240,
            field: 0,
            flags: DisplayFlags::PRESENT.bits(),
            aspect: 4.0 / 3.0,
        });
        queue.push_and_sync(&buf.finish()).unwrap();

        // Without run_idle the worker blocks; only the queued frame presents.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(presented.load(Ordering::Relaxed), 1);

        handle.shutdown();
    }

    #[test]
    fn test_async_call_runs_on_worker() {
        use std::sync::atomic::AtomicBool;

        let queue = Arc::new(CommandQueue::new());
        let (state, _vram) = make_state();
        let mut handle = WorkerHandle::spawn(queue.clone(), state).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let words = crate::queue::record::encode_async_call(Box::new(move |_state| {
            fired2.store(true, Ordering::Release);
        }));
        queue.push_and_sync(&words).unwrap();

        assert!(fired.load(Ordering::Acquire));
        handle.shutdown();
    }
}
