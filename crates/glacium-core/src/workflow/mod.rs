//! Per-project execution:
//! - `dag` -- topological ordering with full cycle reporting
//! - `checkpoint` -- write-then-publish status persistence
//! - `manager` -- the `JobManager` execution engine

pub mod checkpoint;
pub mod dag;
pub mod manager;

pub use dag::GraphError;
pub use manager::{JobManager, ManagerError, RunSummary};
