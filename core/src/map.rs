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

use log::error;
use ods2_err::{Error, FsError, Result};

use crate::cursor::ByteCursor;

/// One contiguous run of logical blocks belonging to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lbn: u32,
    pub block_count: u32,
}

/// Decodes a retrieval-pointer region of `map_inuse_words * 2` bytes starting
/// at `offset` into an ordered list of extents plus their total block count.
///
/// Each pointer's format selector lives in the top two bits of its *second*
/// byte, which is why every arm below reads that byte before it knows how
/// wide the pointer is.
pub fn decode_map(
    cursor: &ByteCursor,
    offset: usize,
    map_inuse_words: u8,
) -> Result<(Vec<Extent>, u64)> {
    let end_offset = offset + map_inuse_words as usize * 2;
    let mut offset = offset;
    let mut extents = Vec::new();
    let mut total_block_count: u64 = 0;

    while offset < end_offset {
        let format = (cursor.u8(offset + 1)? >> 6) & 0x3;
        let width = match format {
            0 => 2,
            1 => 4,
            2 => 6,
            3 => 8,
            _ => unreachable!("format is masked to 2 bits"),
        };
        if offset + width > end_offset {
            error!("retrieval pointer at offset {offset} overruns the map region");
            return Err(Error::Fs(FsError::OutOfBounds));
        }

        let (lbn, block_count, consumed) = match format {
            0 => {
                error!("retrieval pointer format 0 at offset {offset} is unsupported");
                return Err(Error::Fs(FsError::UnsupportedExtent));
            }
            1 => {
                let count = cursor.u8(offset)? as u32;
                let high_lbn = cursor.u8(offset + 1)? & 0x3F;
                let low_lbn = cursor.u16(offset + 2)? as u32;
                (((high_lbn as u32) << 16) | low_lbn, count, width)
            }
            2 => {
                let count = cursor.u16(offset)? & 0x3FFF;
                let lbn = cursor.u16(offset + 2)? as u32;
                (lbn, count as u32, width)
            }
            3 => {
                let count_hi = cursor.u16(offset)? & 0x3FFF;
                let count_lo = cursor.u16(offset + 2)? as u32;
                let lbn = cursor.u32(offset + 4)?;
                (lbn, (count_hi as u32) << 16 | count_lo, width)
            }
            _ => unreachable!("format is masked to 2 bits"),
        };

        extents.push(Extent { lbn, block_count });
        total_block_count += block_count as u64;
        offset += consumed;
    }

    Ok((extents, total_block_count))
}

/// Resolves a 1-based virtual block number to its logical block number by
/// walking the extent list and accumulating each extent's base block count.
pub fn vbn_to_lbn(extents: &[Extent], vbn: u64) -> Option<u32> {
    let vbn = vbn.checked_sub(1)?;
    let mut base = 0u64;
    for extent in extents {
        let count = extent.block_count as u64;
        if vbn >= base && vbn < base + count {
            return Some(extent.lbn + (vbn - base) as u32);
        }
        base += count;
    }
    None
}
