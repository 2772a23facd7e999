//! Recipes: named, reusable job lists and additive synchronization of a
//! project against them.

pub mod registry;
pub mod sync;

pub use registry::{Recipe, RecipeError, RecipeRegistry, merge_chain};
pub use sync::plan_sync;
