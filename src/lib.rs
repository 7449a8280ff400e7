pub mod block_store;
pub mod config;
pub mod directory;
pub mod error;
pub mod inode;
pub mod path;
pub mod permissions;
pub mod shell;
pub mod storage;
pub mod vfs;

pub use config::FsConfig;
pub use error::{FsError, FsResult};
pub use vfs::Vfs;
