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

use std::fs::File;
use std::path::Path;

use log::{error, warn};
use memmap2::Mmap;
use ods2_err::{Error, FsError, IoError, Result};

use crate::cursor::ByteCursor;
use crate::header::FileHeader;
use crate::map::vbn_to_lbn;
use crate::BLOCK_SIZE;

const MFD_NAME: &str = "000000.DIR";
/// Home Block extents belonging to INDEXF.SYS before the file-header area:
/// the boot block, the home blocks, and the alternate home/index blocks.
const INDEX_FILE_RESERVED_EXTENTS: usize = 3;

/// A mounted Files-11 ODS-2 volume: the Home Block, the file table built
/// from INDEXF.SYS, and a pointer at the Master File Directory.
pub struct Volume {
    mmap: Mmap,

    pub volume_name: String,
    pub structure_name: String,
    pub owner_name: String,
    pub format: String,
    pub reserved_file_count: u16,
    pub bitmap_blocks: u16,
    pub ibmap_lbn: u32,

    files: Vec<Option<FileHeader>>,
    mfd_file_number: u32,
}

impl Volume {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| Error::Io(IoError::Open(e)))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Io(IoError::Map(e)))?;

        if mmap.len() < 2 * BLOCK_SIZE {
            error!("image is shorter than two blocks, cannot contain a Home Block");
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let cursor = ByteCursor::new(&mmap);

        let home = HomeBlock::decode(&cursor)?;

        let index_offset = (home.ibmap_lbn + home.ibmap_size as u32) as usize * BLOCK_SIZE;
        let mut index_file = FileHeader::decode(&cursor, index_offset)?;

        if index_file.map.len() < INDEX_FILE_RESERVED_EXTENTS {
            error!("INDEXF.SYS map has fewer than the 3 reserved extents");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        for extent in index_file.map.drain(..INDEX_FILE_RESERVED_EXTENTS) {
            index_file.total_block_count -= extent.block_count as u64;
        }

        let mut files: Vec<Option<FileHeader>> = (0..index_file.total_block_count)
            .map(|_| None)
            .collect();
        let mut mfd_file_number = None;

        for vbn in 1..index_file.total_block_count {
            let Some(lbn) = vbn_to_lbn(&index_file.map, home.ibmap_size as u64 + vbn) else {
                continue;
            };
            let header_offset = lbn as usize * BLOCK_SIZE;
            if cursor.u8(header_offset)? == 0 {
                break;
            }

            let header = FileHeader::decode(&cursor, header_offset)?;
            if header.name == MFD_NAME {
                mfd_file_number = Some(header.fid.file_number);
            }

            match (header.fid.file_number as usize)
                .checked_sub(1)
                .and_then(|index| files.get_mut(index))
            {
                Some(slot) => *slot = Some(header),
                None => warn!("file number {} has no slot in the file table", header.fid.file_number),
            }
        }

        let mfd_file_number = mfd_file_number.ok_or_else(|| {
            error!("no {MFD_NAME} header found while scanning INDEXF.SYS");
            Error::Fs(FsError::Inconsistent)
        })?;

        Ok(Self {
            mmap,
            volume_name: home.volume_name,
            structure_name: home.structure_name,
            owner_name: home.owner_name,
            format: home.format,
            reserved_file_count: home.reserved_file_count,
            bitmap_blocks: home.ibmap_size,
            ibmap_lbn: home.ibmap_lbn,
            files,
            mfd_file_number,
        })
    }

    fn cursor(&self) -> ByteCursor<'_> {
        ByteCursor::new(&self.mmap)
    }

    pub fn mfd(&self) -> &FileHeader {
        self.file_by_number(self.mfd_file_number)
            .expect("file table always holds the MFD once open() has returned")
    }

    pub fn file_by_number(&self, file_number: u32) -> Option<&FileHeader> {
        let index = (file_number as usize).checked_sub(1)?;
        self.files.get(index)?.as_ref()
    }

    /// Resolves a POSIX-style path by walking directory records from the MFD.
    pub fn resolve(&self, path: &str) -> Result<&FileHeader> {
        let path = path.trim_matches('/');
        let mut file = self.mfd();
        if path.is_empty() {
            return Ok(file);
        }

        for component in path.split('/') {
            if !file.is_directory {
                return Err(Error::Fs(FsError::NotADirectory));
            }
            let record = file
                .records
                .iter()
                .find(|r| r.name == component)
                .ok_or(Error::Fs(FsError::NotFound))?;
            let file_number = record
                .entries
                .first()
                .ok_or(Error::Fs(FsError::NotFound))?
                .fid
                .file_number;
            file = self.file_by_number(file_number).ok_or(Error::Fs(FsError::NotFound))?;
        }
        Ok(file)
    }

    /// Reads `length` bytes starting at `offset` from `file`'s logical block
    /// stream. `offset` must be block-aligned; `length` is clamped so the
    /// read never runs past `file.size`. The returned buffer is exactly
    /// `end_offset - offset` bytes, even when that cuts a block short.
    pub fn read(&self, file: &FileHeader, offset: u64, length: u64) -> Result<Vec<u8>> {
        if offset % BLOCK_SIZE as u64 != 0 {
            warn!("unaligned read offset {offset}");
            return Err(Error::Fs(FsError::Unaligned));
        }

        let end_offset = (offset + length).min(file.size);
        if offset >= end_offset {
            return Ok(Vec::new());
        }

        let cursor = self.cursor();
        let mut data = Vec::with_capacity((end_offset - offset) as usize);
        let mut offset = offset;
        while offset < end_offset {
            let vbn = offset / BLOCK_SIZE as u64 + 1;
            let remaining = (end_offset - offset).min(BLOCK_SIZE as u64) as usize;
            if let Some(lbn) = vbn_to_lbn(&file.map, vbn) {
                let block_offset = lbn as usize * BLOCK_SIZE;
                data.extend_from_slice(&cursor.bytes(block_offset, BLOCK_SIZE)?[..remaining]);
            } else {
                warn!("vbn {vbn} of file {} has no mapping", file.fid.file_number);
                data.resize(data.len() + remaining, 0);
            }
            offset += BLOCK_SIZE as u64;
        }
        Ok(data)
    }

    /// `.`, `..`, then every visible (non-reserved) entry of `directory`.
    pub fn readdir<'a>(&'a self, directory: &'a FileHeader) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(".")
            .chain(std::iter::once(".."))
            .chain(directory.records.iter().filter_map(|r| {
                let file_number = r.entries.first()?.fid.file_number;
                (file_number > self.reserved_file_count as u32).then_some(r.name.as_str())
            }))
    }
}

struct HomeBlock {
    volume_name: String,
    structure_name: String,
    owner_name: String,
    format: String,
    reserved_file_count: u16,
    ibmap_size: u16,
    ibmap_lbn: u32,
}

impl HomeBlock {
    fn decode(cursor: &ByteCursor) -> Result<Self> {
        let base = BLOCK_SIZE;
        let ibmap_lbn = cursor.u32(base + 24)?;
        let ibmap_size = cursor.u16(base + 32)?;
        let reserved_file_count = cursor.u16(base + 34)?;

        let structure_name = ascii_field(cursor, base + 460, 12)?;
        let volume_name = ascii_field(cursor, base + 472, 12)?;
        let owner_name = ascii_field(cursor, base + 484, 12)?;
        let format = ascii_field(cursor, base + 496, 12)?;

        Ok(Self {
            volume_name,
            structure_name,
            owner_name,
            format,
            reserved_file_count,
            ibmap_size,
            ibmap_lbn,
        })
    }
}

fn ascii_field(cursor: &ByteCursor, offset: usize, len: usize) -> Result<String> {
    Ok(String::from_utf8_lossy(cursor.bytes(offset, len)?)
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_field_trims_padding() {
        let mut buf = vec![0u8; 24];
        buf[0..6].copy_from_slice(b"SYSTEM");
        buf[6..12].copy_from_slice(b"      ");
        let cursor = ByteCursor::new(&buf);
        assert_eq!(ascii_field(&cursor, 0, 12).unwrap(), "SYSTEM");
    }

    fn put_format1_pointer(buf: &mut [u8], offset: usize, lbn: u32, block_count: u8) {
        buf[offset] = block_count;
        buf[offset + 1] = 0x40 | ((lbn >> 16) as u8 & 0x3F);
        buf[offset + 2..offset + 4].copy_from_slice(&(lbn as u16).to_le_bytes());
    }

    /// Writes a minimal file header at `header_offset`, with identification
    /// and map areas immediately following the fixed 59-byte prefix, and a
    /// single format-1 retrieval pointer.
    fn put_header(
        buf: &mut [u8],
        header_offset: usize,
        file_number: u32,
        name: &str,
        is_directory: bool,
        lbn: u32,
        block_count: u8,
    ) {
        const ID_OFFSET: usize = 60;
        const MAP_OFFSET: usize = ID_OFFSET + 120;

        let h = &mut buf[header_offset..header_offset + 512];
        h[0] = (ID_OFFSET / 2) as u8;
        h[1] = (MAP_OFFSET / 2) as u8;
        h[2] = 0xFF;
        h[3] = 0xFF;

        h[8..10].copy_from_slice(&(file_number as u16).to_le_bytes());
        h[10..12].copy_from_slice(&1u16.to_le_bytes()); // W_SEQ
        h[12] = 0; // B_RVN
        h[13] = (file_number >> 16) as u8; // B_NMX

        let l_filechar_offset = 52;
        let l_filechar: u32 = if is_directory { 0x2000 } else { 0 };
        h[l_filechar_offset..l_filechar_offset + 4].copy_from_slice(&l_filechar.to_le_bytes());
        h[58] = 2; // B_MAP_INUSE: 2 words -> 4 bytes, one format-1 pointer

        let mut t_name = [0x20u8; 20];
        t_name[..name.len()].copy_from_slice(name.as_bytes());
        h[ID_OFFSET..ID_OFFSET + 20].copy_from_slice(&t_name);

        put_format1_pointer(&mut h[MAP_OFFSET..], 0, lbn, block_count);
    }

    fn put_directory_record(buf: &mut Vec<u8>, name: &str, file_number: u32) {
        let namecount = name.len() as u8;
        let header_and_name = 6 + namecount as usize;
        let pad = header_and_name % 2;
        let w_size = (header_and_name + pad + 8 - 2) as u16;

        buf.extend_from_slice(&w_size.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // W_VERLIMIT
        buf.push(0); // B_FLAGS
        buf.push(namecount);
        buf.extend_from_slice(name.as_bytes());
        for _ in 0..pad {
            buf.push(0);
        }
        buf.extend_from_slice(&1u16.to_le_bytes()); // version
        buf.extend_from_slice(&(file_number as u16).to_le_bytes()); // W_NUM
        buf.extend_from_slice(&0u16.to_le_bytes()); // W_SEQ
        buf.push(0); // B_RVN
        buf.push((file_number >> 16) as u8); // B_NMX
    }

    /// Builds a 12-block synthetic volume:
    ///   LBN 0  boot block
    ///   LBN 1  home block
    ///   LBN 2  storage bitmap (1 block, unused content)
    ///   LBN 3  INDEXF.SYS header (file 1)
    ///   LBN 4  MFD header (file 2, `000000.DIR`)
    ///   LBN 5  HELLO.TXT header (file 4)
    ///   LBN 6  MFD's sole directory block
    ///   LBN 10 HELLO.TXT block 0
    ///   LBN 11 HELLO.TXT block 1
    fn synthetic_volume_image() -> Vec<u8> {
        let mut buf = vec![0u8; 12 * BLOCK_SIZE];

        fn put_ascii_field(buf: &mut [u8], offset: usize, len: usize, value: &str) {
            let field = &mut buf[offset..offset + len];
            field.fill(b' ');
            field[..value.len()].copy_from_slice(value.as_bytes());
        }

        // Home Block (LBN 1).
        let home = BLOCK_SIZE;
        buf[home + 24..home + 28].copy_from_slice(&2u32.to_le_bytes()); // L_IBMAPLBN
        buf[home + 32..home + 34].copy_from_slice(&1u16.to_le_bytes()); // W_IBMAPSIZE
        buf[home + 34..home + 36].copy_from_slice(&2u16.to_le_bytes()); // W_RESFILES
        put_ascii_field(&mut buf, home + 460, 12, "ODS2");
        put_ascii_field(&mut buf, home + 472, 12, "TESTVOL");
        put_ascii_field(&mut buf, home + 484, 12, "SYSTEM");
        put_ascii_field(&mut buf, home + 496, 12, "DECFILE11A");

        // INDEXF.SYS header (LBN 3): three 1-block reserved extents the
        // bootstrap drops, followed by the real extent covering the
        // storage bitmap (its own vbn 1, never scanned) and the three
        // header slots at vbn 2..4.
        {
            const ID_OFFSET: usize = 60;
            const MAP_OFFSET: usize = ID_OFFSET + 120;
            let offset = 3 * BLOCK_SIZE;
            let h = &mut buf[offset..offset + 512];
            h[0] = (ID_OFFSET / 2) as u8;
            h[1] = (MAP_OFFSET / 2) as u8;
            h[2] = 0xFF;
            h[3] = 0xFF;
            h[8..10].copy_from_slice(&1u16.to_le_bytes()); // W_NUM
            h[10..12].copy_from_slice(&1u16.to_le_bytes()); // W_SEQ
            h[58] = 8; // B_MAP_INUSE: 8 words -> 16 bytes, 4 pointers
            let mut t_name = [0x20u8; 20];
            t_name[..10].copy_from_slice(b"INDEXF.SYS");
            h[ID_OFFSET..ID_OFFSET + 20].copy_from_slice(&t_name);

            put_format1_pointer(h, MAP_OFFSET, 0, 1); // dropped: boot block
            put_format1_pointer(h, MAP_OFFSET + 4, 1, 1); // dropped: home block
            put_format1_pointer(h, MAP_OFFSET + 8, 1, 1); // dropped: alt home/index
            put_format1_pointer(h, MAP_OFFSET + 12, 2, 4); // bitmap + 3 header slots
        }

        // MFD header (LBN 4): directory, map points at a single directory
        // block repeated over 2 vbns so the off-by-one-preserving scan
        // (vbn 1..total_block_count) still visits vbn 1.
        put_header(&mut buf, 4 * BLOCK_SIZE, 2, "000000.DIR", true, 6, 2);

        // HELLO.TXT header (LBN 5): plain file, 2 blocks at LBN 10.
        put_header(&mut buf, 5 * BLOCK_SIZE, 4, "HELLO.TXT", false, 10, 2);

        // MFD's directory block (LBN 6): itself, plus HELLO.TXT.
        {
            let mut records = Vec::new();
            put_directory_record(&mut records, "000000.DIR", 2);
            put_directory_record(&mut records, "HELLO.TXT", 4);
            records.extend_from_slice(&0xFFFFu16.to_le_bytes());
            let offset = 6 * BLOCK_SIZE;
            buf[offset..offset + records.len()].copy_from_slice(&records);
        }

        // HELLO.TXT content (LBN 10..12).
        buf[10 * BLOCK_SIZE..10 * BLOCK_SIZE + 5].copy_from_slice(b"hello");
        buf[11 * BLOCK_SIZE..11 * BLOCK_SIZE + 5].copy_from_slice(b"world");

        buf
    }

    fn write_temp_image(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ods2_test_{name}_{}.img", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn bootstrap_resolves_path_lists_directory_and_reads_file() {
        let path = write_temp_image("bootstrap", &synthetic_volume_image());
        let volume = Volume::open(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(volume.volume_name, "TESTVOL");
        assert_eq!(volume.reserved_file_count, 2);

        assert_eq!(volume.mfd().name, "000000.DIR");
        assert_eq!(volume.mfd().fid.file_number, 2);

        let names: Vec<&str> = volume.readdir(volume.mfd()).collect();
        assert_eq!(names, vec![".", "..", "HELLO.TXT"]);
        assert!(
            !names.contains(&"000000.DIR"),
            "the MFD's self-entry is below the reserved-file threshold and must not recurse"
        );

        let file = volume.resolve("/HELLO.TXT").unwrap();
        assert_eq!(file.fid.file_number, 4);
        assert_eq!(file.size, 2 * BLOCK_SIZE as u64);

        let data = volume.read(file, 0, file.size).unwrap();
        assert_eq!(&data[0..5], b"hello");
        assert_eq!(&data[512..517], b"world");

        let partial = volume.read(file, 0, 5).unwrap();
        assert_eq!(partial, b"hello");

        assert!(matches!(
            volume.read(file, 1, BLOCK_SIZE as u64),
            Err(Error::Fs(FsError::Unaligned))
        ));

        assert!(matches!(
            volume.resolve("/HELLO.TXT/anything"),
            Err(Error::Fs(FsError::NotADirectory))
        ));

        assert!(volume.resolve("/NOPE.TXT").is_err());
    }
}
