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

//! Translates `fuser` kernel callbacks into calls against [`ods2::Volume`].
//!
//! This is a thin adaptor, not a second decoder: every decision about what a
//! path or a block means is made by the core crate. The only state this
//! module owns is the inode <-> parent cache `readdir`/`lookup` need to hand
//! the kernel a `..` entry, since ODS-2 directory records carry no parent
//! pointer of their own.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, Request,
    FUSE_ROOT_ID,
};
use ods2::{FileHeader, Volume, BLOCK_SIZE};
use ods2_err::Error;

/// Kernel attribute cache lifetime. The volume never changes, so any TTL
/// would do; one second matches `fuser`'s own examples.
const TTL: Duration = Duration::from_secs(1);

pub struct Ods2Filesystem {
    volume: Volume,
    mountpoint: PathBuf,
    uid: u32,
    gid: u32,
    /// `child inode -> parent inode`, populated as the kernel walks the tree
    /// via `lookup`/`readdir`. Needed only to answer `..`.
    parents: Mutex<std::collections::HashMap<u64, u64>>,
}

impl Ods2Filesystem {
    pub fn new(volume: Volume, mountpoint: PathBuf, uid: u32, gid: u32) -> Self {
        let parents = Mutex::new(std::collections::HashMap::new());
        parents.lock().unwrap().insert(FUSE_ROOT_ID, FUSE_ROOT_ID);
        Self {
            volume,
            mountpoint,
            uid,
            gid,
            parents,
        }
    }

    fn root_file_number(&self) -> u32 {
        self.volume.mfd().fid.file_number
    }

    /// ODS-2 file numbers are 1-based and dense; the kernel's root inode is
    /// the fixed constant `FUSE_ROOT_ID` (1), which does not generally equal
    /// the MFD's file number (4). Every other inode maps 1:1 onto a file
    /// number.
    fn inode_to_file_number(&self, ino: u64) -> u32 {
        if ino == FUSE_ROOT_ID {
            self.root_file_number()
        } else {
            ino as u32
        }
    }

    fn file_number_to_inode(&self, file_number: u32) -> u64 {
        if file_number == self.root_file_number() {
            FUSE_ROOT_ID
        } else {
            file_number as u64
        }
    }

    fn file_by_inode(&self, ino: u64) -> Option<&FileHeader> {
        self.volume.file_by_number(self.inode_to_file_number(ino))
    }

    fn attr(&self, ino: u64, file: &FileHeader) -> FileAttr {
        let size = if file.fid.file_number == self.root_file_number() {
            // Keeps the mount point from looking empty; the MFD's own
            // block contents are never read, so the real size is moot.
            BLOCK_SIZE as u64
        } else {
            file.size
        };
        let kind = if file.is_directory {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        let perm = if file.is_directory { 0o555 } else { 0o444 };
        let mtime = vms_time(file.revision_time);
        let crtime = vms_time(file.create_time);

        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime,
            kind,
            perm,
            nlink: 0,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }
}

fn vms_time(seconds: f64) -> SystemTime {
    if seconds >= 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(seconds)
    } else {
        UNIX_EPOCH - Duration::from_secs_f64(-seconds)
    }
}

fn errno_for(error: &Error) -> i32 {
    use ods2_err::FsError;
    match error {
        Error::Fs(FsError::NotFound) => libc::ENOENT,
        Error::Fs(FsError::NotADirectory) => libc::ENOTDIR,
        Error::Fs(FsError::Unaligned) => libc::EINVAL,
        Error::Fs(FsError::OutOfBounds)
        | Error::Fs(FsError::Inconsistent)
        | Error::Fs(FsError::Index)
        | Error::Fs(FsError::UnsupportedExtent) => libc::EIO,
        Error::Io(_) => libc::EIO,
        Error::Unimplemented => libc::ENOSYS,
    }
}

impl Filesystem for Ods2Filesystem {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(dir) = self.file_by_inode(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !dir.is_directory {
            reply.error(libc::ENOTDIR);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };

        let Some(record) = dir.records.iter().find(|r| r.name == name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(entry) = record.entries.first() else {
            reply.error(libc::ENOENT);
            return;
        };

        let Some(file) = self.volume.file_by_number(entry.fid.file_number) else {
            reply.error(libc::ENOENT);
            return;
        };
        let ino = self.file_number_to_inode(file.fid.file_number);
        self.parents.lock().unwrap().insert(ino, parent);
        reply.entry(&TTL, &self.attr(ino, file), 0);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.file_by_inode(ino) {
            Some(file) => reply.attr(&TTL, &self.attr(ino, file)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        // Only the mount point's own inode (which is also the MFD's, since
        // `000000.DIR` is an entry of itself) answers this; every other
        // inode is a plain file or directory, never a symlink.
        if ino == FUSE_ROOT_ID {
            reply.data(self.mountpoint.as_os_str().as_bytes());
        } else {
            reply.error(libc::EINVAL);
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(file) = self.file_by_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if file.is_directory {
            reply.error(libc::EISDIR);
            return;
        }
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.volume.read(file, offset as u64, size as u64) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(dir) = self.file_by_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !dir.is_directory {
            reply.error(libc::ENOTDIR);
            return;
        }

        let parent_ino = self
            .parents
            .lock()
            .unwrap()
            .get(&ino)
            .copied()
            .unwrap_or(ino);

        // `.` and `..` always occupy slots 0 and 1; `Volume::readdir`
        // already yields them first, so names and inodes stay in lockstep.
        let entries: Vec<(u64, FileType, String)> = self
            .volume
            .readdir(dir)
            .enumerate()
            .map(|(i, name)| match i {
                0 => (ino, FileType::Directory, name.to_string()),
                1 => (parent_ino, FileType::Directory, name.to_string()),
                _ => {
                    let child_ino = dir
                        .records
                        .iter()
                        .find(|r| r.name == name)
                        .and_then(|r| r.entries.first())
                        .map(|e| self.file_number_to_inode(e.fid.file_number))
                        .unwrap_or(ino);
                    let kind = self
                        .volume
                        .file_by_number(self.inode_to_file_number(child_ino))
                        .map(|f| {
                            if f.is_directory {
                                FileType::Directory
                            } else {
                                FileType::RegularFile
                            }
                        })
                        .unwrap_or(FileType::RegularFile);
                    (child_ino, kind, name.to_string())
                }
            })
            .collect();

        for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}
