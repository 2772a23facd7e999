use serde::{Deserialize, Serialize};

use crate::job::JobSpec;

/// Separator between recipe names in a chained reference (`"prep+solver"`).
pub const CHAIN_SEPARATOR: char = '+';

/// A declarative recipe: an ordered list of job specs under a name.
///
/// Recipes loaded from configuration use this form directly; recipes
/// registered in code produce the same job list from a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// Split a recipe reference into its chain members.
///
/// Empty segments (`"a++b"`, trailing `+`) are ignored and whitespace
/// around names is trimmed.
pub fn split_chain(reference: &str) -> Vec<&str> {
    reference
        .split(CHAIN_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
