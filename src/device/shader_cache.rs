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

//! On-disk shader cache
//!
//! Two files: an index (`shaders.idx`) holding a magic/version header and a
//! sequence of fixed entries, and a blob file (`shaders.bin`) holding the
//! compiled payloads back to back. Entries are keyed on MD5 digests of the
//! shader source and entry point. The format is opaque to correctness: a
//! corrupt or version-mismatched cache is discarded wholesale and rebuilt.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bincode::{config, Decode, Encode};

use crate::error::Result;

/// Index file magic
const INDEX_MAGIC: u32 = 0x4753_4843; // "CHSG"

/// Bumped whenever the entry layout or blob format changes
const INDEX_VERSION: u32 = 2;

/// One index entry
#[derive(Debug, Clone, Copy, Encode, Decode)]
struct IndexEntry {
    /// MD5 of the shader source
    shader_hash: [u8; 16],
    /// MD5 of the entry point name
    entry_hash: [u8; 16],
    /// Byte offset of the payload in the blob file
    payload_offset: u64,
    /// Payload length in bytes
    payload_length: u32,
}

/// Persistent cache of compiled shader payloads
pub struct ShaderCache {
    index_path: PathBuf,
    blob_path: PathBuf,
    entries: HashMap<([u8; 16], [u8; 16]), (u64, u32)>,
    blob_size: u64,
}

impl ShaderCache {
    /// Open (or create) the cache in a directory
    ///
    /// A damaged cache is deleted and recreated; opening never fails because
    /// of cache contents, only on filesystem errors.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index_path = dir.join("shaders.idx");
        let blob_path = dir.join("shaders.bin");

        let mut cache = Self {
            index_path,
            blob_path,
            entries: HashMap::new(),
            blob_size: 0,
        };

        if !cache.load_index() {
            log::warn!("shader cache invalid or outdated, rebuilding");
            cache.reset()?;
        }
        Ok(cache)
    }

    /// Number of cached payloads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no payloads
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn load_index(&mut self) -> bool {
        let mut file = match File::open(&self.index_path) {
            Ok(f) => f,
            // No cache yet counts as valid-and-empty.
            Err(_) => return !self.index_path.exists() && !self.blob_path.exists(),
        };

        let mut header = [0u8; 8];
        if file.read_exact(&mut header).is_err() {
            return false;
        }
        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if magic != INDEX_MAGIC || version != INDEX_VERSION {
            return false;
        }

        let blob_size = match std::fs::metadata(&self.blob_path) {
            Ok(m) => m.len(),
            Err(_) => return false,
        };

        let mut data = Vec::new();
        if file.read_to_end(&mut data).is_err() {
            return false;
        }

        let cfg = config::standard();
        let mut slice: &[u8] = &data;
        while !slice.is_empty() {
            let (entry, consumed): (IndexEntry, usize) =
                match bincode::decode_from_slice(slice, cfg) {
                    Ok(v) => v,
                    Err(_) => return false,
                };
            if entry.payload_offset + entry.payload_length as u64 > blob_size {
                return false;
            }
            self.entries.insert(
                (entry.shader_hash, entry.entry_hash),
                (entry.payload_offset, entry.payload_length),
            );
            slice = &slice[consumed..];
        }

        self.blob_size = blob_size;
        true
    }

    /// Delete both files and start empty
    pub fn reset(&mut self) -> Result<()> {
        self.entries.clear();
        self.blob_size = 0;
        let _ = std::fs::remove_file(&self.blob_path);

        let mut file = File::create(&self.index_path)?;
        file.write_all(&INDEX_MAGIC.to_le_bytes())?;
        file.write_all(&INDEX_VERSION.to_le_bytes())?;
        File::create(&self.blob_path)?;
        Ok(())
    }

    fn key(source: &str, entry_point: &str) -> ([u8; 16], [u8; 16]) {
        (md5::compute(source.as_bytes()).0, md5::compute(entry_point.as_bytes()).0)
    }

    /// Look up a compiled payload
    pub fn lookup(&self, source: &str, entry_point: &str) -> Option<Vec<u8>> {
        let key = Self::key(source, entry_point);
        let &(offset, length) = self.entries.get(&key)?;

        let mut file = File::open(&self.blob_path).ok()?;
        file.seek(SeekFrom::Start(offset)).ok()?;
        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload).ok()?;
        Some(payload)
    }

    /// Store a compiled payload
    pub fn insert(&mut self, source: &str, entry_point: &str, payload: &[u8]) -> Result<()> {
        let key = Self::key(source, entry_point);
        if self.entries.contains_key(&key) {
            return Ok(());
        }

        let mut blob = OpenOptions::new().append(true).open(&self.blob_path)?;
        let offset = self.blob_size;
        blob.write_all(payload)?;
        self.blob_size += payload.len() as u64;

        let entry = IndexEntry {
            shader_hash: key.0,
            entry_hash: key.1,
            payload_offset: offset,
            payload_length: payload.len() as u32,
        };
        let mut index = OpenOptions::new().append(true).open(&self.index_path)?;
        let encoded = bincode::encode_to_vec(entry, config::standard())
            .map_err(|e| crate::error::GpuError::ShaderCache { message: e.to_string() })?;
        index.write_all(&encoded)?;

        self.entries.insert(key, (offset, payload.len() as u32));
        Ok(())
    }
}
