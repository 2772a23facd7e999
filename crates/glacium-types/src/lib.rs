//! Shared domain types for glacium.
//!
//! Jobs, statuses, recipes, project metadata, pipeline layouts, configuration
//! and the error enums shared between the core engine and its storage
//! adapters.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, indexmap,
//! thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod project;
pub mod recipe;
pub mod run;
