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

use criterion::{criterion_group, criterion_main, Criterion};
use echo_gpu::{Gpu, GpuOptions};
use std::hint::black_box;

fn pos(x: i16, y: i16) -> u32 {
    ((x as u16) as u32) | (((y as u16) as u32) << 16)
}

fn triangle_benchmark(c: &mut Criterion) {
    c.bench_function("flat_triangle_256", |b| {
        let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
        b.iter(|| {
            gpu.gp0_write(0x2000_00FF);
            gpu.gp0_write(pos(0, 0));
            gpu.gp0_write(pos(255, 0));
            gpu.gp0_write(pos(0, 255));
            black_box(gpu.consume_ticks());
        });
    });

    c.bench_function("shaded_textured_triangle_128", |b| {
        let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
        b.iter(|| {
            gpu.gp0_write(0x3400_00FF);
            gpu.gp0_write(pos(0, 0));
            gpu.gp0_write(0x0000_0000);
            gpu.gp0_write(0x00FF_FF00);
            gpu.gp0_write(pos(127, 0));
            gpu.gp0_write(0x0000_007F);
            gpu.gp0_write(0x0000_FF00);
            gpu.gp0_write(pos(0, 127));
            gpu.gp0_write(0x0000_00FF);
            black_box(gpu.consume_ticks());
        });
    });
}

fn sprite_benchmark(c: &mut Criterion) {
    c.bench_function("sprite_64x64", |b| {
        let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
        b.iter(|| {
            gpu.gp0_write(0x6000_00FF);
            gpu.gp0_write(pos(0, 0));
            gpu.gp0_write(64 | (64 << 16));
            black_box(gpu.consume_ticks());
        });
    });
}

fn transfer_benchmark(c: &mut Criterion) {
    c.bench_function("cpu_vram_write_64x64", |b| {
        let mut gpu = Gpu::new(GpuOptions::default()).unwrap();
        let words: Vec<u32> = (0..64 * 64 / 2).collect();
        b.iter(|| {
            gpu.gp0_write(0xA000_0000);
            gpu.gp0_write(pos(0, 0));
            gpu.gp0_write(64 | (64 << 16));
            gpu.gp0_write_run(&words);
            black_box(gpu.consume_ticks());
        });
    });
}

criterion_group!(benches, triangle_benchmark, sprite_benchmark, transfer_benchmark);
criterion_main!(benches);
