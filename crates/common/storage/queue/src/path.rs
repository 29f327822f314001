// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Segment path scheme.
//!
//! A sequence number is split into [`SEGMENT_PATH_DEPTH`] bytes, most
//! significant first, each rendered as two lowercase hex digits. All bytes
//! but the last become directory levels; the last is the file name:
//!
//! ```text
//! seq 0x0102  ->  root/00/00/00/00/00/01/02
//! ```
//!
//! No directory ever holds more than 256 entries and every path has the same
//! depth.

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::ensure;

use crate::{Result, error::SequenceOverflowSnafu, store::StreamStore};

/// Number of byte groups in a segment path.
pub const SEGMENT_PATH_DEPTH: usize = 7;

/// Largest sequence number representable by the path scheme (2^56 - 1).
pub const MAX_SEQUENCE: u64 = (1 << (8 * SEGMENT_PATH_DEPTH)) - 1;

/// Returns the path of segment `sequence` under `root`.
pub fn segment_path<P: AsRef<Path>>(root: P, sequence: u64) -> Result<PathBuf> {
    ensure!(sequence <= MAX_SEQUENCE, SequenceOverflowSnafu { sequence });

    let bytes = sequence.to_be_bytes();
    let mut path = root.as_ref().to_path_buf();
    for byte in &bytes[bytes.len() - SEGMENT_PATH_DEPTH..] {
        path.push(format!("{byte:02x}"));
    }
    Ok(path)
}

fn parse_hex_byte(name: &str) -> Option<u8> {
    let is_lower_hex = |c: char| c.is_ascii_digit() || ('a'..='f').contains(&c);
    if name.len() != 2 || !name.chars().all(is_lower_hex) {
        return None;
    }
    u8::from_str_radix(name, 16).ok()
}

/// Walks the sharded tree under `root` and returns the sequence numbers of
/// all existing segments in ascending order.
///
/// A missing root yields an empty list. Entries that do not follow the path
/// scheme are ignored.
pub fn scan_segments<S: StreamStore + ?Sized, P: AsRef<Path>>(
    store: &S,
    root: P,
) -> io::Result<Vec<u64>> {
    let mut sequences = Vec::new();
    match scan_level(store, root.as_ref(), 0, 0, &mut sequences) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
        Ok(()) => Ok(sequences),
    }
}

fn scan_level<S: StreamStore + ?Sized>(
    store: &S,
    dir: &Path,
    depth: usize,
    prefix: u64,
    sequences: &mut Vec<u64>,
) -> io::Result<()> {
    let last_level = depth + 1 == SEGMENT_PATH_DEPTH;
    for entry in store.read_dir(dir)? {
        let Some(byte) = parse_hex_byte(&entry.name) else {
            continue;
        };
        let sequence = (prefix << 8) | u64::from(byte);
        match (last_level, entry.is_dir) {
            (true, false) => sequences.push(sequence),
            (false, true) => {
                scan_level(store, &dir.join(&entry.name), depth + 1, sequence, sequences)?;
            }
            _ => {}
        }
    }
    Ok(())
}
