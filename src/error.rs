use libc::c_int;
use thiserror::Error;

use crate::{block_store::BlockNumber, inode::InodeNumber};

pub type FsResult<T> = Result<T, FsError>;

/// Errors surfaced by filesystem operations.
///
/// Every failing operation leaves the filesystem exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NoSuchPath(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("file exists: {0}")]
    NameExists(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("no such inode: {0}")]
    NoSuchInode(InodeNumber),
    #[error("invalid block: {0}")]
    InvalidBlock(BlockNumber),
    #[error("out of space: {needed} blocks needed, {free} free")]
    OutOfSpace { needed: usize, free: usize },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid permission: {0:?}")]
    InvalidPermission(String),
    #[error("cannot move {src} into its own subtree at {dst}")]
    InvalidMove { src: String, dst: String },
    #[error("resource busy: {0}")]
    Busy(String),
}

impl FsError {
    /// The closest Unix errno for this error.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NoSuchPath(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NameExists(_) => libc::EEXIST,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::NoSuchInode(_) => libc::ESTALE,
            FsError::InvalidBlock(_) => libc::EIO,
            FsError::OutOfSpace { .. } => libc::ENOSPC,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::InvalidPermission(_) => libc::EINVAL,
            FsError::InvalidMove { .. } => libc::EINVAL,
            FsError::Busy(_) => libc::EBUSY,
        }
    }
}
