//! Storage traits (ports) implemented by the infrastructure layer.
//!
//! The core crate never touches the filesystem directly.

pub mod status;

pub use status::{MemoryStatusStore, StatusStore};
