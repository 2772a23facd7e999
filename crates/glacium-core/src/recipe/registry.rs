//! Explicit recipe registry with `+` chaining.

use std::collections::BTreeMap;
use std::sync::Arc;

use glacium_types::job::JobSpec;
use glacium_types::recipe::{CHAIN_SEPARATOR, RecipeDefinition, split_chain};
use indexmap::IndexMap;
use thiserror::Error;

use crate::job::ProjectContext;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("recipe '{0}' is not registered")]
    UnknownRecipe(String),

    #[error("empty recipe reference")]
    EmptyReference,

    #[error("invalid recipe name '{0}': names are non-empty and may not contain '+'")]
    InvalidName(String),

    #[error("recipe '{recipe}' declares invalid job name '{job}'")]
    InvalidJob { recipe: String, job: String },
}

type RecipeBuilder = Arc<dyn Fn(&ProjectContext) -> Vec<JobSpec> + Send + Sync>;

/// A registered recipe. Immutable once registered.
#[derive(Clone)]
pub struct Recipe {
    name: String,
    description: String,
    builder: RecipeBuilder,
}

impl Recipe {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn build(&self, project: &ProjectContext) -> Vec<JobSpec> {
        (self.builder)(project)
    }
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Name -> recipe mapping, kept sorted by name.
#[derive(Debug, Default, Clone)]
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe built by `builder`. An existing name is replaced
    /// with a warning.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        builder: F,
    ) -> Result<(), RecipeError>
    where
        F: Fn(&ProjectContext) -> Vec<JobSpec> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() || name.contains(CHAIN_SEPARATOR) {
            return Err(RecipeError::InvalidName(name));
        }
        if self.recipes.contains_key(&name) {
            tracing::warn!(recipe = %name, "recipe already registered, replacing");
        }
        self.recipes.insert(
            name.clone(),
            Recipe {
                name,
                description: description.into(),
                builder: Arc::new(builder),
            },
        );
        Ok(())
    }

    /// Register a fixed job list, as loaded from configuration.
    pub fn register_definition(&mut self, def: RecipeDefinition) -> Result<(), RecipeError> {
        if let Some(bad) = def
            .jobs
            .iter()
            .find(|j| j.name.trim().is_empty() || j.name.contains(CHAIN_SEPARATOR))
        {
            return Err(RecipeError::InvalidJob {
                recipe: def.name.clone(),
                job: bad.name.clone(),
            });
        }
        let jobs = def.jobs;
        self.register(def.name, def.description, move |_| jobs.clone())
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.recipes.keys().map(String::as_str).collect()
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.recipes.get(name).map(Recipe::description)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Build the job list for a recipe reference such as `"prep+solver"`.
    ///
    /// Every chain member must be registered. Outputs are merged with
    /// [`merge_chain`].
    pub fn build(
        &self,
        reference: &str,
        project: &ProjectContext,
    ) -> Result<Vec<JobSpec>, RecipeError> {
        let members = split_chain(reference);
        if members.is_empty() {
            return Err(RecipeError::EmptyReference);
        }
        let recipes = members
            .iter()
            .map(|name| {
                self.recipes
                    .get(*name)
                    .ok_or_else(|| RecipeError::UnknownRecipe(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let specs = merge_chain(recipes.iter().map(|r| r.build(project)));
        tracing::debug!(reference, jobs = specs.len(), "built recipe");
        Ok(specs)
    }
}

/// Concatenate job lists in order, keeping the first occurrence of each
/// name. A later occurrence contributes only its extra dependencies.
pub fn merge_chain<I>(lists: I) -> Vec<JobSpec>
where
    I: IntoIterator<Item = Vec<JobSpec>>,
{
    let mut merged: IndexMap<String, JobSpec> = IndexMap::new();
    for list in lists {
        for spec in list {
            match merged.get_mut(&spec.name) {
                Some(existing) => {
                    if existing.merge_deps(&spec) {
                        tracing::debug!(job = %spec.name, "merged dependencies from chained recipe");
                    }
                }
                None => {
                    merged.insert(spec.name.clone(), spec);
                }
            }
        }
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, deps: &[&str]) -> JobSpec {
        JobSpec::new(name).with_deps(deps.iter().copied())
    }

    fn project() -> ProjectContext {
        ProjectContext::new("p", "/tmp/p")
    }

    fn registry() -> RecipeRegistry {
        let mut reg = RecipeRegistry::new();
        reg.register("prep", "meshing only", |_| vec![job("MESH", &[])])
            .unwrap();
        reg.register("solver", "mesh and solve", |_| {
            vec![job("MESH", &[]), job("SOLVE", &["MESH"])]
        })
        .unwrap();
        reg.register("post", "", |_| {
            vec![job("SOLVE", &["CONVERT"]), job("POST", &["SOLVE"])]
        })
        .unwrap();
        reg
    }

    #[test]
    fn chain_dedupes_and_keeps_order() {
        let specs = registry().build("prep+solver", &project()).unwrap();
        assert_eq!(specs, vec![job("MESH", &[]), job("SOLVE", &["MESH"])]);
    }

    #[test]
    fn later_declaration_merges_dependencies() {
        let specs = registry().build("solver+post", &project()).unwrap();
        assert_eq!(
            specs,
            vec![
                job("MESH", &[]),
                job("SOLVE", &["MESH", "CONVERT"]),
                job("POST", &["SOLVE"]),
            ]
        );
    }

    #[test]
    fn unknown_member_fails_the_whole_chain() {
        let err = registry().build("prep+nope", &project()).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownRecipe(name) if name == "nope"));
        assert!(matches!(
            registry().build("", &project()).unwrap_err(),
            RecipeError::EmptyReference
        ));
    }

    #[test]
    fn names_are_sorted() {
        assert_eq!(registry().names(), vec!["post", "prep", "solver"]);
        assert_eq!(registry().describe("prep"), Some("meshing only"));
        assert_eq!(registry().describe("nope"), None);
    }

    #[test]
    fn reregistering_replaces() {
        let mut reg = registry();
        reg.register("prep", "new", |_| vec![job("GEOMETRY", &[])])
            .unwrap();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.describe("prep"), Some("new"));
        let specs = reg.build("prep", &project()).unwrap();
        assert_eq!(specs[0].name, "GEOMETRY");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut reg = RecipeRegistry::new();
        assert!(matches!(
            reg.register("a+b", "", |_| vec![]).unwrap_err(),
            RecipeError::InvalidName(_)
        ));
        let err = reg
            .register_definition(RecipeDefinition {
                name: "bad".into(),
                description: String::new(),
                jobs: vec![job("MESH+SOLVE", &[])],
            })
            .unwrap_err();
        assert!(matches!(err, RecipeError::InvalidJob { .. }));
    }
}
