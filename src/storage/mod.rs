//! Storage backends for session state.

pub mod file;
pub mod memory;
pub mod paths;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::SessionStore;
