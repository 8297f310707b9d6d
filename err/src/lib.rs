#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Not implemented")]
    Unimplemented,
    #[error("IO: {0}")]
    Io(#[from] IoError),
    #[error("FS: {0}")]
    Fs(FsError),
}

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("failed to open backing image: {0}")]
    Open(std::io::Error),
    #[error("failed to map backing image: {0}")]
    Map(std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("Inconsistent")]
    Inconsistent,
    #[error("Index")]
    Index,
    #[error("field extends past the end of the buffer")]
    OutOfBounds,
    #[error("retrieval pointer format 0 is unsupported")]
    UnsupportedExtent,
    #[error("path does not resolve to a file")]
    NotFound,
    #[error("offset is not a multiple of the block size")]
    Unaligned,
    #[error("index does not name a directory")]
    NotADirectory,
}

pub type Result<T> = core::result::Result<T, Error>;
