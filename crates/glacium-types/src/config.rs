//! Configuration types for glacium.
//!
//! `GlaciumConfig` represents the top-level `glacium.toml`: where runs are
//! created, default pipeline concurrency, command job definitions and
//! recipes built from them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::recipe::RecipeDefinition;

/// Top-level configuration. All fields have defaults, an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlaciumConfig {
    /// Directory holding one subdirectory per project. Relative paths are
    /// resolved against the data directory.
    #[serde(default = "default_runs_root")]
    pub runs_root: PathBuf,

    /// Pipeline concurrency used when the CLI is not given `--concurrency`.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Command job kinds, keyed by job name.
    #[serde(default)]
    pub jobs: BTreeMap<String, CommandJobConfig>,

    #[serde(default)]
    pub recipes: Vec<RecipeDefinition>,
}

fn default_runs_root() -> PathBuf {
    PathBuf::from("runs")
}

fn default_concurrency() -> usize {
    1
}

impl Default for GlaciumConfig {
    fn default() -> Self {
        Self {
            runs_root: default_runs_root(),
            default_concurrency: default_concurrency(),
            jobs: BTreeMap::new(),
            recipes: Vec::new(),
        }
    }
}

/// An external program invoked as a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandJobConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Default dependencies when the job is added without a recipe.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Working directory relative to the project root.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
