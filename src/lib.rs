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

//! PlayStation 1 GPU pipeline library
//!
//! This crate implements the GPU subsystem of a PlayStation 1 emulator: the
//! GP0/GP1 command parser, the draw queue feeding a dedicated worker thread,
//! and two rasterizer backends (a bit-exact software rasterizer and a
//! hardware backend targeting an abstract [`device::GpuDevice`]).
//!
//! # Architecture
//!
//! The emulation thread owns a [`Gpu`] front end and writes GP0/GP1 words to
//! it, exactly as the CPU core would write to the hardware ports at
//! 0x1F801810/0x1F801814. Completed commands are encoded as self-describing
//! records and pushed through a single-producer/single-consumer ring queue to
//! the GPU worker thread, which dispatches them to the active backend and
//! presents frames through a host-supplied callback.
//!
//! ```text
//!  CPU core ── gp0_write/gp1_write ──► Gpu (parser) ──► ring queue ──► worker
//!                                                                       │
//!                                      software backend ◄── dispatch ───┤
//!                                      hardware backend ◄───────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use echo_gpu::{Gpu, GpuOptions};
//!
//! let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
//!
//! // Flat opaque triangle covering the top-left corner.
//! gpu.gp0_write(0x2000_00FF); // command + color (red)
//! gpu.gp0_write(0x0000_0000); // vertex 1 (0, 0)
//! gpu.gp0_write(0x0000_003F); // vertex 2 (63, 0)
//! gpu.gp0_write(0x003F_0000); // vertex 3 (0, 63)
//! gpu.flush_sync();
//!
//! assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0x001F);
//! ```
//!
//! # References
//!
//! - [PSX-SPX: GPU](http://problemkaputt.de/psx-spx.htm#gpu)
//! - [PSX-SPX: GPU Rendering](http://problemkaputt.de/psx-spx.htm#gpurenderstatecommands)

pub mod backend;
pub mod device;
pub mod error;
pub mod gpu;
pub mod queue;
pub mod settings;
pub mod vram;
pub mod worker;

// Re-export commonly used types
pub use error::{GpuError, Result};
pub use gpu::{Gpu, GpuOptions};
pub use settings::{
    BackendKind, DisplayFilter, DownsampleMode, FramePixelFormat, GpuSettings, MessageSeverity,
    TextureFilter,
};
pub use vram::{Vram, VRAM_HEIGHT, VRAM_WIDTH};
