//! Storage module for validated chains

pub mod memory;

pub use memory::{MemoryBlockStore, StoreError, DEFAULT_REJECTED_LIMIT};
