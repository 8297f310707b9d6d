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

pub const FILE_ID_SIZE: usize = 6;

/// A Files-11 file identifier: `(file_number, sequence_number, RVN)`.
///
/// `file_number` is assembled from the low word and the high byte of the
/// on-disk encoding (`(B_NMX << 16) | W_NUM`), which is how ODS-2 stretches a
/// file number past 16 bits without widening every reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    pub file_number: u32,
    pub sequence_number: u16,
    pub relative_volume_number: u8,
}

impl FileId {
    pub fn decode(cursor: &ByteCursor, offset: usize) -> Result<Self> {
        let w_num = cursor.u16(offset)?;
        let w_seq = cursor.u16(offset + 2)?;
        let b_rvn = cursor.u8(offset + 4)?;
        let b_nmx = cursor.u8(offset + 5)?;
        Ok(Self {
            file_number: ((b_nmx as u32) << 16) | w_num as u32,
            sequence_number: w_seq,
            relative_volume_number: b_rvn,
        })
    }
}

impl PartialOrd for FileId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.file_number, self.sequence_number).cmp(&(other.file_number, other.sequence_number))
    }
}
