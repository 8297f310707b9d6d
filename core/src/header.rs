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

use ods2_err::Result;

use crate::cursor::ByteCursor;
use crate::directory::{decode_directory_block, DirectoryRecord};
use crate::fileid::FileId;
use crate::map::{decode_map, vbn_to_lbn, Extent};
use crate::time::vms_to_unix;
use crate::BLOCK_SIZE;

const ABSENT_OFFSET: u8 = 0xFF;
const DIRECTORY_CHARACTERISTIC: u32 = 0x2000;

/// One decoded 512-byte file header: identification, retrieval map, and (for
/// directories) the directory records stored in the blocks it maps.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub fid: FileId,
    /// Parsed but never followed — multi-header extent chains are a non-goal.
    pub ext_fid: FileId,
    pub is_directory: bool,
    pub name: String,
    pub create_time: f64,
    pub revision_time: f64,
    pub expiration_time: f64,
    pub backup_time: f64,
    pub map: Vec<Extent>,
    pub total_block_count: u64,
    pub size: u64,
    pub records: Vec<DirectoryRecord>,
}

impl FileHeader {
    /// Decodes the header at absolute byte offset `header_offset` in `disk`.
    ///
    /// `disk` spans the whole volume image: directory records live in blocks
    /// this header's own map points at, so resolving them needs the full
    /// buffer, not just this header's 512 bytes.
    pub fn decode(disk: &ByteCursor, header_offset: usize) -> Result<Self> {
        let b_idoffset = disk.u8(header_offset)?;
        let b_mpoffset = disk.u8(header_offset + 1)?;
        let w_fid_offset = header_offset + 8;
        let w_ext_fid_offset = w_fid_offset + 6;
        let l_filechar_offset = w_ext_fid_offset + 6 + 32;
        let b_map_inuse_offset = l_filechar_offset + 4 + 2;

        let fid = FileId::decode(disk, w_fid_offset)?;
        let ext_fid = FileId::decode(disk, w_ext_fid_offset)?;
        let l_filechar = disk.u32(l_filechar_offset)?;
        let b_map_inuse = disk.u8(b_map_inuse_offset)?;
        let is_directory = (l_filechar & DIRECTORY_CHARACTERISTIC) != 0;

        let (name, create_time, revision_time, expiration_time, backup_time) =
            if b_idoffset != ABSENT_OFFSET {
                Self::decode_identification(disk, header_offset + b_idoffset as usize * 2)?
            } else {
                (String::new(), 0.0, 0.0, 0.0, 0.0)
            };

        let (map, total_block_count, size) = if b_mpoffset != ABSENT_OFFSET {
            let (map, total_block_count) = decode_map(
                disk,
                header_offset + b_mpoffset as usize * 2,
                b_map_inuse,
            )?;
            let size = total_block_count * BLOCK_SIZE as u64;
            (map, total_block_count, size)
        } else {
            (Vec::new(), 0, BLOCK_SIZE as u64)
        };

        let records = if is_directory {
            Self::decode_directory_records(disk, &map, total_block_count)?
        } else {
            Vec::new()
        };

        Ok(Self {
            fid,
            ext_fid,
            is_directory,
            name,
            create_time,
            revision_time,
            expiration_time,
            backup_time,
            map,
            total_block_count,
            size,
            records,
        })
    }

    fn decode_identification(
        disk: &ByteCursor,
        offset: usize,
    ) -> Result<(String, f64, f64, f64, f64)> {
        let t_filename = disk.bytes(offset, 20)?;
        let q_create = disk.u64(offset + 22)?;
        let q_revdate = disk.u64(offset + 30)?;
        let q_expdate = disk.u64(offset + 38)?;
        let q_bakdate = disk.u64(offset + 46)?;
        let t_filenameext = disk.bytes(offset + 54, 66)?;

        let mut raw = Vec::with_capacity(t_filename.len() + t_filenameext.len());
        raw.extend_from_slice(t_filename);
        raw.extend_from_slice(t_filenameext);
        let mut name = String::from_utf8_lossy(&raw)
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string();
        if let Some(idx) = name.rfind(';') {
            name.truncate(idx);
        }
        if name.ends_with('.') {
            name.pop();
        }

        Ok((
            name,
            vms_to_unix(q_create),
            vms_to_unix(q_revdate),
            vms_to_unix(q_expdate),
            vms_to_unix(q_bakdate),
        ))
    }

    fn decode_directory_records(
        disk: &ByteCursor,
        map: &[Extent],
        total_block_count: u64,
    ) -> Result<Vec<DirectoryRecord>> {
        let mut records = Vec::new();
        for vbn in 1..total_block_count {
            let Some(lbn) = vbn_to_lbn(map, vbn) else {
                continue;
            };
            let block_offset = lbn as usize * BLOCK_SIZE;
            let block = ByteCursor::new(disk.bytes(block_offset, BLOCK_SIZE)?);
            records.extend(decode_directory_block(&block)?);
        }
        Ok(records)
    }
}
