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

//! Pipeline integration tests over the public API

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use echo_gpu::device::null::NullDevice;
use echo_gpu::{BackendKind, Gpu, GpuOptions, GpuSettings};

fn pos(x: i16, y: i16) -> u32 {
    ((x as u16) as u32) | (((y as u16) as u32) << 16)
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_threaded_draw_and_readback() {
    init_logs();
    let mut gpu = Gpu::new(GpuOptions {
        threaded: true,
        ..GpuOptions::default()
    })
    .unwrap();

    // Fill a region, draw over part of it, read everything back.
    gpu.gp0_write(0x0200_0000 | 0xFF); // red fill
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(32 | (32 << 16));

    gpu.gp0_write(0x6000_FF00); // green rectangle
    gpu.gp0_write(pos(8, 8));
    gpu.gp0_write(8 | (8 << 16));

    let rect = gpu.read_vram_rect(0, 0, 32, 32);
    assert_eq!(rect[0], 0x001F);
    assert_eq!(rect[9 * 32 + 9], 0x03E0);
    assert_eq!(rect[31 * 32 + 31], 0x001F);

    gpu.shutdown();
}

#[test]
fn test_many_commands_through_worker() {
    let mut gpu = Gpu::new(GpuOptions {
        threaded: true,
        ..GpuOptions::default()
    })
    .unwrap();

    // Enough small fills to wrap the ring several times over a session.
    for i in 0..20_000u32 {
        let x = (i * 16) % 1024;
        let y = (i / 64) % 512;
        gpu.gp0_write(0x0200_0000 | (i & 0xFF));
        gpu.gp0_write(x | (y << 16));
        gpu.gp0_write(16 | (1 << 16));
    }
    gpu.flush_sync();

    // The final fill is observable.
    let last = 19_999u32;
    let x = (last * 16) % 1024;
    let y = (last / 64) % 512;
    let expected = echo_gpu::vram::rgb24_to_rgb15(last & 0xFF);
    assert_eq!(gpu.read_vram_rect(x, y, 1, 1)[0], expected);

    gpu.shutdown();
}

#[test]
fn test_backend_switch_midstream() {
    let factory: echo_gpu::worker::DeviceFactory = Arc::new(|| {
        Ok(Box::new(NullDevice::new()) as Box<dyn echo_gpu::device::GpuDevice>)
    });
    let mut gpu = Gpu::new(GpuOptions {
        device_factory: Some(factory),
        ..GpuOptions::default()
    })
    .unwrap();

    gpu.gp0_write(0x0200_00FF);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(16 | (1 << 16));

    gpu.change_backend(BackendKind::Hardware);

    // Transfers stay observable across the switch: the shadow survives and
    // the hardware backend keeps it authoritative for transfers.
    assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0x001F);

    gpu.gp0_write(0x0200_FF00);
    gpu.gp0_write(pos(32, 0));
    gpu.gp0_write(16 | (1 << 16));
    assert_eq!(gpu.read_vram_rect(32, 0, 1, 1)[0], 0x03E0);

    gpu.change_backend(BackendKind::Software);
    assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0x001F);
}

#[test]
fn test_hardware_backend_transfers() {
    let factory: echo_gpu::worker::DeviceFactory = Arc::new(|| {
        Ok(Box::new(NullDevice::new()) as Box<dyn echo_gpu::device::GpuDevice>)
    });
    let mut settings = GpuSettings::default();
    settings.backend = BackendKind::Hardware;
    settings.resolution_scale = 2;

    let mut gpu = Gpu::new(GpuOptions {
        settings,
        device_factory: Some(factory),
        ..GpuOptions::default()
    })
    .unwrap();

    // CPU→VRAM, VRAM→VRAM, readback: all mask semantics come from the
    // shadow even on the hardware backend.
    gpu.gp0_write(0xA000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(4 | (1 << 16));
    gpu.gp0_write(0x2222_1111);
    gpu.gp0_write(0x4444_3333);

    gpu.gp0_write(0x8000_0000);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(pos(0, 1));
    gpu.gp0_write(4 | (1 << 16));

    assert_eq!(
        gpu.read_vram_rect(0, 1, 4, 1),
        vec![0x1111, 0x2222, 0x3333, 0x4444]
    );
}

#[test]
fn test_settings_update_across_queue() {
    let mut gpu = Gpu::new(GpuOptions {
        threaded: true,
        ..GpuOptions::default()
    })
    .unwrap();

    let mut settings = GpuSettings::default();
    settings.max_queued_frames = 4;
    gpu.update_settings(settings.clone());

    // No observable change to rendering semantics.
    gpu.gp0_write(0x0200_00FF);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(16 | (1 << 16));
    assert_eq!(gpu.read_vram_rect(0, 0, 1, 1)[0], 0x001F);

    gpu.shutdown();
}

#[test]
fn test_presenter_backpressure_counts_frames() {
    let presented = Arc::new(AtomicU32::new(0));
    let presented2 = presented.clone();

    let mut gpu = Gpu::new(GpuOptions {
        threaded: true,
        presenter: Some(Box::new(move |_frame| {
            presented2.fetch_add(1, Ordering::Relaxed);
        })),
        ..GpuOptions::default()
    })
    .unwrap();

    gpu.gp1_write(0x0300_0000);
    for _ in 0..32 {
        gpu.present_frame();
    }
    gpu.flush_sync();

    assert_eq!(presented.load(Ordering::Relaxed), 32);
    gpu.shutdown();
}

#[test]
fn test_drop_joins_worker() {
    let mut gpu = Gpu::new(GpuOptions {
        threaded: true,
        ..GpuOptions::default()
    })
    .unwrap();
    gpu.gp0_write(0x0200_00FF);
    gpu.gp0_write(pos(0, 0));
    gpu.gp0_write(16 | (1 << 16));
    // Dropping must drain and join without hanging.
    drop(gpu);
}
