//! Workflow engine for glacium.
//!
//! Dependency resolution, the job status state machine, the per-project
//! execution engine, recipe composition and the pipeline DSL. Storage and
//! project materialization are traits here ("ports") implemented by
//! `glacium-infra`; this crate depends only on `glacium-types`.

pub mod event;
pub mod job;
pub mod pipeline;
pub mod recipe;
pub mod repository;
pub mod workflow;
