//! Additive reconciliation of a project's job set against recipe output.

use std::collections::HashSet;

use glacium_types::job::JobSpec;

/// Jobs from `desired` that `existing` lacks, in recipe order, with the
/// dependency wiring the recipe gives them.
///
/// Existing jobs are never modified, so planning against the result of a
/// previous sync yields nothing.
pub fn plan_sync(existing: &[JobSpec], desired: &[JobSpec]) -> Vec<JobSpec> {
    let present: HashSet<&str> = existing.iter().map(|s| s.name.as_str()).collect();
    desired
        .iter()
        .filter(|spec| !present.contains(spec.name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, deps: &[&str]) -> JobSpec {
        JobSpec::new(name).with_deps(deps.iter().copied())
    }

    #[test]
    fn only_missing_jobs_are_planned() {
        let existing = vec![job("MESH", &[])];
        let desired = vec![job("MESH", &["PREP"]), job("SOLVE", &["MESH"])];
        let plan = plan_sync(&existing, &desired);
        assert_eq!(plan, vec![job("SOLVE", &["MESH"])]);
    }

    #[test]
    fn second_sync_plans_nothing() {
        let mut project = vec![job("MESH", &[])];
        let desired = vec![job("MESH", &[]), job("SOLVE", &["MESH"]), job("POST", &["SOLVE"])];

        let first = plan_sync(&project, &desired);
        assert_eq!(first.len(), 2);
        project.extend(first);

        assert!(plan_sync(&project, &desired).is_empty());
    }
}
