//! Infrastructure layer for glacium.
//!
//! Implements the storage and materialization traits defined in
//! `glacium-core` on the local filesystem, runs external command jobs and
//! loads `glacium.toml`.

pub mod config;
pub mod filesystem;
pub mod materializer;
pub mod process;
pub mod timing;
