//! Backend storage implementations
//!
//! - `memory`: In-memory storage for tests, dry runs and local tooling

pub mod memory;

pub use memory::{MemorySubscriberStore, MemorySuppressionList};
