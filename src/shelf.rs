//! Storage backends the change tracker decorates.
//!
//! - [`storage::Storage`]: the backend contract
//! - [`memory::MemoryStorage`]: in-process backend, useful for tests and embedding
//! - [`local::LocalStorage`]: flat directory of files inside a [`local::Shelf`]

pub mod local;
pub mod memory;
pub mod storage;

pub use local::{LocalStorage, Shelf};
pub use memory::MemoryStorage;
pub use storage::Storage;
