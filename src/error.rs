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

//! GPU pipeline error types

use thiserror::Error;

/// Result type for GPU pipeline operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// GPU pipeline error types
///
/// Rendering errors never reach the emulation thread synchronously; they are
/// reported through the message sink and the affected draw is dropped. The
/// variants here cover the cases that must propagate: queue exhaustion is
/// fatal for the producer, device problems are fatal for the backend that
/// owns the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// The command ring queue cannot hold a record even after waiting
    #[error("command queue cannot hold a {size}-byte record")]
    QueueAllocation {
        /// Encoded record size in bytes, including the header
        size: usize,
    },

    /// GPU device creation failed for the requested backend
    #[error("GPU device creation failed: {message}")]
    DeviceCreate {
        /// Device-provided failure description
        message: String,
    },

    /// Shader or pipeline compilation failed
    #[error("pipeline compilation failed: {message}")]
    PipelineCompile {
        /// Compiler output or failure description
        message: String,
    },

    /// Transient texture allocation failure; the current draw is skipped
    #[error("texture allocation failed ({width}x{height})")]
    TextureAllocation {
        /// Requested texture width in pixels
        width: u32,
        /// Requested texture height in pixels
        height: u32,
    },

    /// The device reported loss during present
    #[error("GPU device lost")]
    DeviceLost,

    /// Shader cache I/O failure (non-fatal; the cache is rebuilt)
    #[error("shader cache error: {message}")]
    ShaderCache {
        /// Error message
        message: String,
    },
}

impl From<std::io::Error> for GpuError {
    fn from(err: std::io::Error) -> Self {
        GpuError::ShaderCache {
            message: err.to_string(),
        }
    }
}
