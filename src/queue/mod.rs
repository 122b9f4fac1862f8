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

//! Single-producer/single-consumer draw queue
//!
//! A fixed 4 MiB ring of 32-bit words carrying variable-length command
//! records from the emulation thread to the GPU worker thread. Records are
//! never split across the wrap point: when the tail gap is too small, a
//! `Wraparound` tombstone consumes it and both sides restart at offset 0.
//!
//! # Synchronization
//!
//! The write index is released by the producer after a record is fully
//! copied in and acquired by the consumer before decoding; the read index
//! flows the other way. The work semaphore is posted when the pending span
//! crosses a small threshold (or on demand), so the worker is not woken for
//! every record. `push_and_sync` additionally waits until the consumer has
//! drained the queue to empty.

pub mod record;
pub mod sync;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{GpuError, Result};
use record::{Record, RecordTag, HEADER_WORDS};
use sync::Semaphore;

/// Queue capacity in bytes
pub const COMMAND_QUEUE_SIZE: usize = 4 * 1024 * 1024;

/// Queue capacity in 32-bit words
pub const QUEUE_WORDS: usize = COMMAND_QUEUE_SIZE / 4;

/// Pending byte count that triggers a worker wake-up on push
pub const THRESHOLD_TO_WAKE: usize = 256;

/// The shared ring. One producer (`push*`), one consumer (`try_dispatch`).
pub struct CommandQueue {
    /// Ring storage. The producer writes only `[write, …)` space the consumer
    /// has released; the consumer reads only `[read, write)` committed space.
    buffer: Box<[UnsafeCell<u32>]>,
    /// Next word the producer will write, released after the copy
    write_ptr: AtomicUsize,
    /// Next word the consumer will read, released after dispatch
    read_ptr: AtomicUsize,
    /// Posted to wake the worker
    pub wake: Semaphore,
    /// Posted by the worker when a requested sync point is reached
    drained: Semaphore,
    /// Producer requests a drained notification
    sync_requested: AtomicBool,
    /// Producer requests worker exit after draining
    shutdown: AtomicBool,
}

// SAFETY: the UnsafeCell storage is only written by the single producer in
// regions the consumer has released, and only read by the single consumer in
// regions the producer has committed; the acquire/release index pairs order
// those accesses.
unsafe impl Send for CommandQueue {}
unsafe impl Sync for CommandQueue {}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(QUEUE_WORDS);
        buffer.resize_with(QUEUE_WORDS, || UnsafeCell::new(0));
        Self {
            buffer: buffer.into_boxed_slice(),
            write_ptr: AtomicUsize::new(0),
            read_ptr: AtomicUsize::new(0),
            wake: Semaphore::new(0),
            drained: Semaphore::new(0),
            sync_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Words currently enqueued (approximate from the producer side)
    pub fn pending_words(&self) -> usize {
        let write = self.write_ptr.load(Ordering::Relaxed);
        let read = self.read_ptr.load(Ordering::Relaxed);
        if write >= read {
            write - read
        } else {
            QUEUE_WORDS - read + write
        }
    }

    /// Whether the queue holds no records
    pub fn is_empty(&self) -> bool {
        self.write_ptr.load(Ordering::Acquire) == self.read_ptr.load(Ordering::Acquire)
    }

    /// Whether shutdown has been requested
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Request worker exit; the worker drains pending records first
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.post();
    }

    /// Append one encoded record (producer only)
    ///
    /// Blocks while the ring is full. Fails only when the record could never
    /// fit, which is a fatal condition for the producer.
    pub fn push(&self, words: &[u32]) -> Result<()> {
        let len = words.len();
        debug_assert!(len >= HEADER_WORDS && len % 2 == 0);
        if len + HEADER_WORDS >= QUEUE_WORDS / 2 {
            return Err(GpuError::QueueAllocation { size: len * 4 });
        }

        let offset = self.reserve(len);

        // SAFETY: `reserve` returned space the consumer cannot touch until
        // the write index is released below.
        unsafe {
            let dst = self.buffer.as_ptr().add(offset) as *mut u32;
            std::ptr::copy_nonoverlapping(words.as_ptr(), dst, len);
        }

        let mut new_write = offset + len;
        if new_write == QUEUE_WORDS {
            new_write = 0;
        }
        self.write_ptr.store(new_write, Ordering::Release);

        if self.pending_words() * 4 >= THRESHOLD_TO_WAKE {
            self.wake.post();
        }
        Ok(())
    }

    /// Append a record and wait until the worker has drained the queue
    pub fn push_and_sync(&self, words: &[u32]) -> Result<()> {
        self.push(words)?;
        self.sync();
        Ok(())
    }

    /// Wait until the worker has drained the queue to empty
    pub fn sync(&self) {
        if self.is_empty() {
            return;
        }
        self.sync_requested.store(true, Ordering::Release);
        self.wake.post();
        while !self.is_empty() {
            self.drained.wait();
        }
    }

    /// Find contiguous space for `len` words, emitting a wrap tombstone when
    /// the tail gap is too small. Spins while the ring is full.
    fn reserve(&self, len: usize) -> usize {
        let mut logged_full = false;
        loop {
            let read = self.read_ptr.load(Ordering::Acquire);
            let write = self.write_ptr.load(Ordering::Relaxed);

            if read <= write {
                let tail = QUEUE_WORDS - write;
                if tail >= len && !(read == 0 && tail == len) {
                    return write;
                }
                if tail < len && read > len {
                    // Tombstone out the tail; sizes are even so the two-word
                    // header always fits.
                    // SAFETY: same producer-owned region argument as push.
                    unsafe {
                        let dst = self.buffer.as_ptr().add(write) as *mut u32;
                        *dst = RecordTag::Wraparound as u32;
                        *dst.add(1) = tail as u32;
                    }
                    self.write_ptr.store(0, Ordering::Release);
                    self.wake.post();
                    continue;
                }
            } else if read - write - 1 >= len {
                return write;
            }

            if !logged_full {
                log::trace!("command queue full, producer waiting for {} words", len);
                logged_full = true;
            }
            self.wake.post();
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    /// Decode and dispatch the next record, if any (consumer only)
    ///
    /// Wraparound tombstones are consumed internally. Returns `false` when
    /// the queue is empty; the sync handshake is serviced either way.
    pub fn try_dispatch<F: FnOnce(Record<'_>)>(&self, f: F) -> bool {
        loop {
            let write = self.write_ptr.load(Ordering::Acquire);
            let read = self.read_ptr.load(Ordering::Relaxed);
            if read == write {
                self.service_sync();
                return false;
            }

            // SAFETY: `[read, write)` is committed by the producer; the header
            // and record body are fully written before the release store.
            let (tag_word, size) = unsafe {
                let ptr = self.buffer.as_ptr().add(read) as *const u32;
                (*ptr, *ptr.add(1) as usize)
            };

            if tag_word == RecordTag::Wraparound as u32 {
                self.read_ptr.store(0, Ordering::Release);
                continue;
            }

            // SAFETY: as above; the borrow ends before the read index advances.
            let words =
                unsafe { std::slice::from_raw_parts(self.buffer.as_ptr().add(read) as *const u32, size) };
            f(record::decode(words));

            let mut new_read = read + size;
            if new_read == QUEUE_WORDS {
                new_read = 0;
            }
            self.read_ptr.store(new_read, Ordering::Release);
            self.service_sync();
            return true;
        }
    }

    /// Post the drained semaphore when a sync was requested and the queue is
    /// now empty (consumer side)
    fn service_sync(&self) {
        if self.is_empty() && self.sync_requested.swap(false, Ordering::AcqRel) {
            self.drained.post();
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
