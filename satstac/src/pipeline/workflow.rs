use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_with::{OneOrMany, serde_as};
use serde_yaml::Value;
use tracing::{debug, warn};

use super::Job;
use crate::errors::{StacError, StacResult};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Workflow {
    /// Key of the workflow in the `workflows` map
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// A job invocation inside a workflow.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct WorkflowJob {
    /// Declared job being invoked
    pub job: String,
    /// Name other invocations refer to in `requires`; defaults to `job`
    pub name: String,
    pub requires: Vec<String>,
    pub filters: Option<Filters>,
    pub other: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Filters {
    pub branches: Option<BranchFilter>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Branch filter. Patterns are exact branch names, or regular expressions
/// enclosed in slashes (`/release-.*/`) that must match the whole name.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BranchFilter {
    #[serde_as(as = "OneOrMany<_>")]
    #[serde(default)]
    pub only: Vec<String>,
    #[serde_as(as = "OneOrMany<_>")]
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Deserialize)]
struct WorkflowJobParams {
    name: Option<String>,
    #[serde(default)]
    requires: Vec<String>,
    filters: Option<Filters>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl TryFrom<Value> for WorkflowJob {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(job) => Ok(Self {
                name: job.clone(),
                job,
                requires: Vec::new(),
                filters: None,
                other: BTreeMap::new(),
            }),
            Value::Mapping(map) if map.len() == 1 => {
                let Some((Value::String(job), params)) = map.into_iter().next() else {
                    return Err("workflow job name must be a string".to_string());
                };
                let params: WorkflowJobParams = if params.is_null() {
                    WorkflowJobParams {
                        name: None,
                        requires: Vec::new(),
                        filters: None,
                        other: BTreeMap::new(),
                    }
                } else {
                    serde_yaml::from_value(params).map_err(|e| format!("job `{job}`: {e}"))?
                };
                Ok(Self {
                    name: params.name.unwrap_or_else(|| job.clone()),
                    job,
                    requires: params.requires,
                    filters: params.filters,
                    other: params.other,
                })
            }
            v => Err(format!(
                "a workflow job must be a name or a single-key map, got {v:?}"
            )),
        }
    }
}

/// The `workflows` map may carry a `version` key next to the workflows.
pub(super) fn deserialize_workflows<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Workflow>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Workflows {
        #[serde(rename = "version")]
        _version: Option<Value>,
        #[serde(flatten)]
        workflows: BTreeMap<String, Workflow>,
    }
    Ok(Workflows::deserialize(deserializer)?.workflows)
}

fn pattern_matches(pattern: &str, branch: &str) -> StacResult<bool> {
    match pattern
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix('/'))
    {
        Some(re) => {
            let re = Regex::new(&format!("^(?:{re})$"))
                .map_err(|e| StacError::InvalidBranchFilter(e, pattern.to_string()))?;
            Ok(re.is_match(branch))
        }
        None => Ok(pattern == branch),
    }
}

fn any_matches(patterns: &[String], branch: &str) -> bool {
    patterns.iter().any(|p| {
        pattern_matches(p, branch).unwrap_or_else(|e| {
            warn!("{e}");
            false
        })
    })
}

impl BranchFilter {
    /// `only` is applied before `ignore`. An empty `only` admits every branch.
    #[must_use]
    pub fn admits(&self, branch: &str) -> bool {
        (self.only.is_empty() || any_matches(&self.only, branch))
            && !any_matches(&self.ignore, branch)
    }

    fn check(&self) -> StacResult<()> {
        for pattern in self.only.iter().chain(&self.ignore) {
            pattern_matches(pattern, "")?;
        }
        Ok(())
    }
}

impl WorkflowJob {
    #[must_use]
    pub fn admits(&self, branch: &str) -> bool {
        self.branch_filter().is_none_or(|f| f.admits(branch))
    }

    fn branch_filter(&self) -> Option<&BranchFilter> {
        self.filters.as_ref().and_then(|f| f.branches.as_ref())
    }
}

impl Workflow {
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&WorkflowJob> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn check(&self, declared: &BTreeMap<String, Job>) -> StacResult<()> {
        for job in &self.jobs {
            if !declared.contains_key(&job.job) {
                return Err(StacError::UnknownJob {
                    workflow: self.name.clone(),
                    job: job.job.clone(),
                });
            }
            if let Some(filter) = job.branch_filter() {
                filter.check()?;
            }
        }
        self.order().map(|_| ())
    }

    /// Indexes of `jobs` in dependency order. Among jobs whose requirements
    /// are satisfied, the one declared first comes first.
    fn order(&self) -> StacResult<Vec<usize>> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.jobs.len());
        for (i, job) in self.jobs.iter().enumerate() {
            if index.insert(job.name.as_str(), i).is_some() {
                return Err(StacError::DuplicateJobName {
                    workflow: self.name.clone(),
                    job: job.name.clone(),
                });
            }
        }
        for job in &self.jobs {
            if let Some(required) = job.requires.iter().find(|r| !index.contains_key(r.as_str())) {
                return Err(StacError::UnknownRequirement {
                    workflow: self.name.clone(),
                    job: job.name.clone(),
                    required: required.clone(),
                });
            }
        }

        let mut done = vec![false; self.jobs.len()];
        let mut order = Vec::with_capacity(self.jobs.len());
        while order.len() < self.jobs.len() {
            let next = (0..self.jobs.len()).find(|&i| {
                !done[i]
                    && self.jobs[i]
                        .requires
                        .iter()
                        .all(|r| index.get(r.as_str()).is_some_and(|&j| done[j]))
            });
            let Some(i) = next else {
                let stuck = self
                    .jobs
                    .iter()
                    .zip(&done)
                    .filter(|(_, done)| !**done)
                    .map(|(j, _)| j.name.clone())
                    .collect();
                return Err(StacError::DependencyCycle(self.name.clone(), stuck));
            };
            done[i] = true;
            order.push(i);
        }
        Ok(order)
    }

    /// Jobs that run on `branch`, in execution order.
    ///
    /// A job is left out when its branch filter rejects `branch`, or when any
    /// job it requires is left out.
    pub fn plan(&self, branch: &str) -> StacResult<Vec<&WorkflowJob>> {
        let mut kept = HashSet::new();
        let mut plan = Vec::new();
        for i in self.order()? {
            let job = &self.jobs[i];
            if !job.admits(branch) {
                debug!("Job {} of workflow {} is filtered out on branch {branch}", job.name, self.name);
            } else if let Some(r) = job.requires.iter().find(|r| !kept.contains(r.as_str())) {
                debug!("Job {} of workflow {} is skipped because {r} does not run", job.name, self.name);
            } else {
                kept.insert(job.name.as_str());
                plan.push(job);
            }
        }
        Ok(plan)
    }

    /// True when `job` is admitted on `branch` and every job it requires is
    /// in `succeeded`. Unknown jobs never start.
    #[must_use]
    pub fn can_start(&self, job: &str, branch: &str, succeeded: &[&str]) -> bool {
        self.job(job).is_some_and(|j| {
            j.admits(branch) && j.requires.iter().all(|r| succeeded.contains(&r.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::pipeline::Pipeline;
    use crate::pipeline::tests::circleci;

    fn names<'a>(jobs: &[&'a WorkflowJob]) -> Vec<&'a str> {
        jobs.iter().map(|j| j.name.as_str()).collect()
    }

    fn workflow(yaml: &str) -> Pipeline {
        let jobs = "
jobs:
  a: {steps: [checkout]}
  b: {steps: [checkout]}
  c: {steps: [checkout]}
  d: {steps: [checkout]}
";
        Pipeline::from_yaml(&format!("version: 2\n{jobs}workflows:\n  wf:\n{yaml}")).unwrap()
    }

    #[rstest]
    #[case("master", vec!["build_and_test_37", "deploy"])]
    #[case("feature/x", vec!["build_and_test_37"])]
    fn fixture_plan(#[case] branch: &str, #[case] expected: Vec<&str>) {
        let pipeline = circleci();
        let wf = pipeline.workflow("build_test_deploy").unwrap();
        assert_eq!(names(&wf.plan(branch).unwrap()), expected);
    }

    #[test]
    fn deploy_gate() {
        let pipeline = circleci();
        let wf = pipeline.workflow("build_test_deploy").unwrap();
        assert!(wf.can_start("build_and_test_37", "feature/x", &[]));
        assert!(!wf.can_start("deploy", "master", &[]));
        assert!(wf.can_start("deploy", "master", &["build_and_test_37"]));
        assert!(!wf.can_start("deploy", "develop", &["build_and_test_37"]));
        assert!(!wf.can_start("publish", "master", &["build_and_test_37"]));
    }

    #[test]
    fn declaration_order_ties() {
        let p = workflow(
            "    jobs:
      - d:
          requires: [b]
      - b
      - c:
          requires: [a]
      - a
",
        );
        let wf = p.workflow("wf").unwrap();
        assert_eq!(names(&wf.plan("main").unwrap()), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn dropped_requirement_drops_dependents() {
        let p = workflow(
            "    jobs:
      - a:
          filters:
            branches:
              ignore: /wip-.*/
      - b:
          requires: [a]
      - c
",
        );
        let wf = p.workflow("wf").unwrap();
        assert_eq!(names(&wf.plan("wip-1").unwrap()), vec!["c"]);
        assert_eq!(names(&wf.plan("main").unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn named_invocations() {
        let p = workflow(
            "    jobs:
      - a:
          name: a-py37
      - a:
          name: a-py38
      - b:
          requires: [a-py37, a-py38]
",
        );
        p.check().unwrap();
        let wf = p.workflow("wf").unwrap();
        assert_eq!(names(&wf.plan("main").unwrap()), vec!["a-py37", "a-py38", "b"]);
        assert_eq!(wf.job("a-py38").unwrap().job, "a");
    }

    #[rstest]
    #[case(&["master"], &[], "master", true)]
    #[case(&["master"], &[], "main", false)]
    #[case(&["/release-.*/"], &[], "release-1.2", true)]
    #[case(&["/release-.*/"], &[], "pre-release-1.2", false)]
    #[case(&[], &["gh-pages"], "gh-pages", false)]
    #[case(&[], &["gh-pages"], "main", true)]
    #[case(&["/feature-.*/"], &["feature-wip"], "feature-wip", false)]
    #[case(&[], &[], "anything", true)]
    fn branch_filter(
        #[case] only: &[&str],
        #[case] ignore: &[&str],
        #[case] branch: &str,
        #[case] admitted: bool,
    ) {
        let filter = BranchFilter {
            only: only.iter().map(ToString::to_string).collect(),
            ignore: ignore.iter().map(ToString::to_string).collect(),
        };
        assert_eq!(filter.admits(branch), admitted);
    }

    #[test]
    fn single_or_list_filters() {
        let filter: BranchFilter = serde_yaml::from_str("only: master").unwrap();
        assert_eq!(filter.only, vec!["master"]);
        let filter: BranchFilter = serde_yaml::from_str("ignore: [a, b]").unwrap();
        assert_eq!(filter.ignore, vec!["a", "b"]);
        assert!(filter.only.is_empty());
    }

    #[test]
    fn unknown_job() {
        let p = workflow("    jobs: [a, deploy]\n");
        let err = p.check().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Workflow `wf` refers to job `deploy` that is not declared in `jobs`"
        );
    }

    #[test]
    fn unknown_requirement() {
        let p = workflow("    jobs:\n      - a:\n          requires: [z]\n");
        let err = p.workflow("wf").unwrap().plan("main").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Job `a` in workflow `wf` requires `z`, which is not part of the workflow"
        );
    }

    #[rstest]
    #[case("    jobs: [a, a]\n", "a")]
    #[case("    jobs:\n      - a:\n          name: x\n      - b:\n          name: x\n", "x")]
    fn duplicate_names(#[case] yaml: &str, #[case] name: &str) {
        let p = workflow(yaml);
        let expected = format!("Workflow `wf` invokes more than one job named `{name}`");
        assert_eq!(p.check().unwrap_err().to_string(), expected);
        assert_eq!(p.workflow("wf").unwrap().plan("main").unwrap_err().to_string(), expected);
    }

    #[test]
    fn dependency_cycle() {
        let p = workflow(
            "    jobs:
      - a
      - b:
          requires: [c]
      - c:
          requires: [b]
",
        );
        let err = p.check().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Workflow `wf` has a dependency cycle involving jobs: ["b", "c"]"#
        );
    }

    #[test]
    fn bad_regex_filter() {
        let p = workflow(
            "    jobs:
      - a:
          filters:
            branches:
              only: /(unclosed/
",
        );
        assert!(matches!(
            p.check().unwrap_err(),
            StacError::InvalidBranchFilter(_, pattern) if pattern == "/(unclosed/"
        ));
        assert!(p.workflow("wf").unwrap().plan("main").unwrap().is_empty());
    }
}
