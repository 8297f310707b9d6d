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

//! `<image-file> <mount-point>` — mounts a Files-11 ODS-2 volume image
//! read-only, in the foreground, on a single thread.

mod fs;

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::process::ExitCode;

use fuser::MountOption;
use log::error;
use ods2::Volume;

use crate::fs::Ods2Filesystem;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args_os().skip(1);
    let (Some(image), Some(mountpoint)) = (args.next(), args.next()) else {
        eprintln!("usage: ods2fuse <image-file> <mount-point>");
        return ExitCode::FAILURE;
    };

    let metadata = match std::fs::metadata(&image) {
        Ok(metadata) => metadata,
        Err(err) => {
            error!("cannot stat {}: {err}", image.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    let volume = match Volume::open(&image) {
        Ok(volume) => volume,
        Err(err) => {
            error!("failed to open {}: {err}", image.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    let filesystem = Ods2Filesystem::new(
        volume,
        PathBuf::from(&mountpoint),
        metadata.uid(),
        metadata.gid(),
    );

    let options = vec![
        MountOption::RO,
        MountOption::FSName("ods2".to_string()),
    ];
    if let Err(err) = fuser::mount2(filesystem, &mountpoint, &options) {
        error!("mount failed: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
