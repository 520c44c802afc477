//! Storage collaborators: registry persistence and the response cache.
//!
//! The core only sees the two traits. Backends:
//! - `SqliteStore`: on-disk, shared by registry and cache
//! - `MemoryStore`: in-process, nothing persists

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PersistenceStore, RegistrySnapshot, ResponseCache};
