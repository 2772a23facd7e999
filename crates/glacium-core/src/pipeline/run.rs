//! `Run`: one parameterized workflow instance inside a pipeline.

use glacium_types::run::{RunLink, RunSpec};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use uuid::Uuid;

use super::PipelineError;

/// Owned builder describing a single project to create and run.
///
/// Every mutator takes `self` and returns it, so runs read as chains:
///
/// ```
/// use glacium_core::pipeline::Run;
///
/// let run = Run::new()
///     .case("wing")
///     .set("aoa", 4)
///     .jobs(["MESH", "SOLVE"])
///     .tag("baseline");
/// assert_eq!(run.job_names(), ["MESH", "SOLVE"]);
/// ```
///
/// `clone()` produces a new run: fresh id, same case, parameters, jobs and
/// tags, and no dependency edges.
#[derive(Debug)]
pub struct Run {
    id: Uuid,
    case: Option<String>,
    parameters: IndexMap<String, Value>,
    jobs: Vec<String>,
    tags: IndexSet<String>,
    deps: IndexSet<Uuid>,
}

impl Run {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            case: None,
            parameters: IndexMap::new(),
            jobs: Vec::new(),
            tags: IndexSet::new(),
            deps: IndexSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Fluent mutators
    // -----------------------------------------------------------------------

    /// Select the case this run materializes from.
    pub fn case(mut self, case: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self
    }

    /// Set a parameter; a later value for the same key wins.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn set_bulk<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in params {
            self.parameters.insert(key.into(), value.into());
        }
        self
    }

    /// Append a job. Duplicates are kept here and collapsed when the run is
    /// materialized.
    pub fn job(mut self, name: impl Into<String>) -> Self {
        self.jobs.push(name.into());
        self
    }

    pub fn jobs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jobs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn clear_jobs(mut self) -> Self {
        self.jobs.clear();
        self
    }

    pub fn tag(mut self, label: impl Into<String>) -> Self {
        self.tags.insert(label.into());
        self
    }

    pub fn tags<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn remove_tag(mut self, label: &str) -> Self {
        self.tags.shift_remove(label);
        self
    }

    /// Require `other` to finish successfully before this run starts.
    pub fn depends_on(mut self, other: &Run) -> Self {
        self.deps.insert(other.id);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn selected_case(&self) -> Option<&str> {
        self.case.as_deref()
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Jobs as declared, duplicates included.
    pub fn job_names(&self) -> &[String] {
        &self.jobs
    }

    /// Jobs with duplicates collapsed, first occurrence wins.
    pub fn unique_jobs(&self) -> Vec<&str> {
        let unique: IndexSet<&str> = self.jobs.iter().map(String::as_str).collect();
        unique.into_iter().collect()
    }

    pub fn tag_set(&self) -> &IndexSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, label: &str) -> bool {
        self.tags.contains(label)
    }

    pub fn dependencies(&self) -> &IndexSet<Uuid> {
        &self.deps
    }

    pub(crate) fn strip_dependency(&mut self, id: &Uuid) {
        self.deps.shift_remove(id);
    }

    pub(crate) fn add_dependency(&mut self, id: Uuid) {
        self.deps.insert(id);
    }

    pub(crate) fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Exact copy including id and edges, for moving runs between
    /// pipelines and into executor tasks.
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            id: self.id,
            case: self.case.clone(),
            parameters: self.parameters.clone(),
            jobs: self.jobs.clone(),
            tags: self.tags.clone(),
            deps: self.deps.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation and presentation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.jobs.is_empty() {
            return Err(PipelineError::EmptyRun(self.id));
        }
        Ok(())
    }

    pub fn to_spec(&self) -> RunSpec {
        RunSpec {
            id: Some(self.id),
            case: self.case.clone(),
            parameters: self.parameters.clone(),
            jobs: self.jobs.clone(),
            tags: self.tags.clone(),
            after: self.deps.iter().copied().map(RunLink::Id).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(&self.to_spec())
            .map_err(|e| PipelineError::Serialize(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        serde_yaml_ng::to_string(&self.to_spec())
            .map_err(|e| PipelineError::Serialize(e.to_string()))
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Run {
    fn clone(&self) -> Self {
        Self {
            id: Uuid::now_v7(),
            case: self.case.clone(),
            parameters: self.parameters.clone(),
            jobs: self.jobs.clone(),
            tags: self.tags.clone(),
            deps: IndexSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_are_last_write_wins() {
        let run = Run::new().set("aoa", 0).set("velocity", 50).set("aoa", 4);
        assert_eq!(run.parameter("aoa"), Some(&json!(4)));
        let keys: Vec<_> = run.parameters().keys().collect();
        assert_eq!(keys, vec!["aoa", "velocity"]);
    }

    #[test]
    fn duplicate_jobs_collapse_only_when_materialized() {
        let run = Run::new().jobs(["MESH", "SOLVE"]).job("MESH");
        assert_eq!(run.job_names().len(), 3);
        assert_eq!(run.unique_jobs(), vec!["MESH", "SOLVE"]);
    }

    #[test]
    fn clone_drops_dependency_edges_and_gets_new_id() {
        let upstream = Run::new().job("MESH");
        let run = Run::new()
            .case("wing")
            .set("aoa", 2)
            .job("SOLVE")
            .tag("base")
            .depends_on(&upstream);
        let copy = run.clone();

        assert_ne!(copy.id(), run.id());
        assert!(copy.dependencies().is_empty());
        assert_eq!(run.dependencies().len(), 1);
        assert_eq!(copy.selected_case(), Some("wing"));
        assert_eq!(copy.parameter("aoa"), Some(&json!(2)));
        assert_eq!(copy.job_names(), run.job_names());
        assert!(copy.has_tag("base"));
    }

    #[test]
    fn tags_are_a_set() {
        let run = Run::new().tag("a").tag("b").tag("a").remove_tag("b");
        assert_eq!(run.tag_set().len(), 1);
        assert!(run.has_tag("a"));
    }

    #[test]
    fn empty_run_fails_validation() {
        let run = Run::new();
        assert!(matches!(run.validate(), Err(PipelineError::EmptyRun(id)) if id == run.id()));
        assert!(Run::new().job("MESH").validate().is_ok());
    }

    #[test]
    fn serializes_to_json_and_yaml() {
        let upstream = Run::new().job("MESH");
        let run = Run::new()
            .set("velocity", 50.0)
            .job("SOLVE")
            .depends_on(&upstream);

        let json: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(json["parameters"]["velocity"], json!(50.0));
        assert_eq!(json["after"][0], json!(upstream.id().to_string()));

        let yaml = run.to_yaml().unwrap();
        assert!(yaml.contains("velocity: 50.0"));
        assert!(yaml.contains("- SOLVE"));
    }
}
