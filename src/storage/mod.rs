/// The block storage abstraction.
mod block_storage;
/// In-memory block storage.
mod memory;

pub use block_storage::*;
pub use memory::*;
