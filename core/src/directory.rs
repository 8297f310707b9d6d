// Copyright 2024 Kevin Ludwig
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

use ods2_err::{Error, FsError, Result};

use crate::cursor::ByteCursor;
use crate::fileid::{FileId, FILE_ID_SIZE};

const RECORD_FIXED_HEADER: usize = 6; // W_SIZE, W_VERLIMIT, B_FLAGS, B_NAMECOUNT
const ENTRY_SIZE: usize = 2 + FILE_ID_SIZE; // W_VERSION, FID
const MAX_RECORDS_PER_BLOCK: usize = 62;

/// One version of a file, as listed inside a `DirectoryRecord`.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub version: u16,
    pub fid: FileId,
}

/// A named entry inside a directory block, carrying every retained version.
///
/// Only `entries[0]` (the highest version) is ever followed by the path
/// resolver; older versions are decoded but not surfaced, per the
/// latest-version-only non-goal.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    pub size: usize,
    pub name: String,
    pub entries: Vec<DirectoryEntry>,
}

/// Scans one 512-byte directory block into its records.
///
/// Scanning stops at the first record whose `W_SIZE`, read as signed 16-bit,
/// is negative (the `0xFFFF` end-of-block sentinel), or after 62 records,
/// whichever comes first.
pub fn decode_directory_block(block: &ByteCursor) -> Result<Vec<DirectoryRecord>> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    for _ in 0..MAX_RECORDS_PER_BLOCK {
        if offset + 2 > block.len() {
            break;
        }
        let raw_size = block.u16(offset)? as i16;
        if raw_size < 0 {
            break;
        }
        let w_size = raw_size as usize;

        let w_namecount = block.u8(offset + 5)? as usize;
        let name_bytes = block.bytes(offset + RECORD_FIXED_HEADER, w_namecount)?;
        let mut name = String::from_utf8_lossy(name_bytes).into_owned();
        if name.ends_with('.') {
            name.pop();
        }

        let record_size = w_size + 2;
        let header_and_name = RECORD_FIXED_HEADER + w_namecount;
        let pad = if header_and_name % 2 == 1 { 1 } else { 0 };
        let entries_start = offset + header_and_name + pad;
        let entries_region = record_size
            .checked_sub(header_and_name)
            .ok_or(Error::Fs(FsError::OutOfBounds))?;
        let entries_count = entries_region / ENTRY_SIZE;

        let mut entries = Vec::with_capacity(entries_count);
        for i in 0..entries_count {
            let entry_offset = entries_start + i * ENTRY_SIZE;
            let version = block.u16(entry_offset)?;
            let fid = FileId::decode(block, entry_offset + 2)?;
            entries.push(DirectoryEntry { version, fid });
        }

        records.push(DirectoryRecord {
            size: record_size,
            name,
            entries,
        });
        offset += record_size;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_record(buf: &mut Vec<u8>, name: &str, entries: &[(u16, u32)]) {
        let namecount = name.len() as u8;
        let header_and_name = 6 + namecount as usize;
        let pad = header_and_name % 2;
        let w_size = (header_and_name + pad + entries.len() * ENTRY_SIZE - 2) as u16;

        buf.extend_from_slice(&w_size.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // W_VERLIMIT
        buf.push(0); // B_FLAGS
        buf.push(namecount);
        buf.extend_from_slice(name.as_bytes());
        for _ in 0..pad {
            buf.push(0);
        }
        for &(version, file_number) in entries {
            buf.extend_from_slice(&version.to_le_bytes());
            buf.extend_from_slice(&(file_number as u16).to_le_bytes()); // W_NUM
            buf.extend_from_slice(&0u16.to_le_bytes()); // W_SEQ
            buf.push(0); // B_RVN
            buf.push((file_number >> 16) as u8); // B_NMX
        }
    }

    #[test]
    fn decodes_records_until_terminator() {
        let mut buf = Vec::new();
        push_record(&mut buf, "FOO.DIR", &[(1, 17)]);
        push_record(&mut buf, "BAR.TXT", &[(1, 18), (2, 18)]);
        let terminator_offset = buf.len();
        buf.extend_from_slice(&0xFFFFu16.to_le_bytes());
        buf.resize(512, 0);
        assert!(terminator_offset < 512);

        let cursor = ByteCursor::new(&buf);
        let records = decode_directory_block(&cursor).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "FOO");
        assert_eq!(records[0].entries[0].fid.file_number, 17);
        assert_eq!(records[1].name, "BAR");
        assert_eq!(records[1].entries.len(), 2);
        assert_eq!(records[1].entries[1].fid.file_number, 18);
    }

    #[test]
    fn record_whose_namecount_overruns_its_own_size_is_an_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_le_bytes()); // W_SIZE = 0 -> record_size = 2
        buf.extend_from_slice(&0u16.to_le_bytes()); // W_VERLIMIT
        buf.push(0); // B_FLAGS
        buf.push(255); // B_NAMECOUNT, far larger than record_size allows
        buf.resize(512, 0);

        let cursor = ByteCursor::new(&buf);
        assert!(decode_directory_block(&cursor).is_err());
    }
}
