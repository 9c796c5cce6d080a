//! Read-only model of a CircleCI (config version 2) pipeline definition.
//!
//! The model answers the gating questions an executor would: which jobs of a
//! workflow run on a given branch, in which order, and whether a job may
//! start once some of its dependencies succeeded. Steps are never executed.

mod cache_key;
mod workflow;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use cache_key::{CacheKeyContext, checksum, render_cache_key};
use itertools::Itertools as _;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;
pub use workflow::{BranchFilter, Filters, Workflow, WorkflowJob};

use crate::errors::{StacError, StacResult};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Pipeline {
    pub version: Value,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
    #[serde(default, deserialize_with = "workflow::deserialize_workflows")]
    pub workflows: BTreeMap<String, Workflow>,
    /// Anchor holders and any other top-level keys
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub docker: Vec<DockerImage>,
    pub working_directory: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DockerImage {
    pub image: String,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// A single job step.
///
/// Steps are written either as a bare name (`- checkout`) or as a map with a
/// single key naming the step (`- run: {command: ...}`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Step {
    Checkout {
        path: Option<String>,
    },
    RestoreCache {
        keys: Vec<String>,
    },
    SaveCache {
        key: String,
        paths: Vec<String>,
    },
    Run {
        name: Option<String>,
        command: String,
    },
    Other {
        name: String,
        params: Value,
    },
}

impl Step {
    /// Name of the step as shown by the executor
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Checkout { .. } => "checkout",
            Self::RestoreCache { .. } => "restore_cache",
            Self::SaveCache { .. } => "save_cache",
            Self::Run {
                name: Some(name), ..
            } => name,
            Self::Run { command, .. } => command.lines().next().unwrap_or_default(),
            Self::Other { name, .. } => name,
        }
    }

    /// Cache key templates used by this step, if any.
    #[must_use]
    pub fn cache_keys(&self) -> &[String] {
        match self {
            Self::RestoreCache { keys } => keys,
            Self::SaveCache { key, .. } => std::slice::from_ref(key),
            _ => &[],
        }
    }
}

fn str_param(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn str_list_param(params: &Value, key: &str) -> Result<Vec<String>, String> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(Value::String(v)) => Ok(vec![v.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| format!("`{key}` must contain only strings"))
            })
            .collect(),
        Some(_) => Err(format!("`{key}` must be a string or a list of strings")),
    }
}

impl TryFrom<Value> for Step {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let (name, params) = match value {
            Value::String(name) => (name, Value::Null),
            Value::Mapping(map) if map.len() == 1 => {
                let Some((name, params)) = map.into_iter().next() else {
                    return Err("empty step".to_string());
                };
                let Value::String(name) = name else {
                    return Err(format!("step name must be a string, got {name:?}"));
                };
                (name, params)
            }
            v => return Err(format!("a step must be a name or a single-key map, got {v:?}")),
        };

        Ok(match name.as_str() {
            "checkout" => Self::Checkout {
                path: str_param(&params, "path"),
            },
            "run" => match params {
                Value::String(command) => Self::Run {
                    name: None,
                    command,
                },
                params => Self::Run {
                    name: str_param(&params, "name"),
                    command: str_param(&params, "command")
                        .ok_or("a `run` step needs a `command`")?,
                },
            },
            "restore_cache" => {
                let mut keys = str_list_param(&params, "keys")?;
                if keys.is_empty() {
                    keys = str_list_param(&params, "key")?;
                }
                Self::RestoreCache { keys }
            }
            "save_cache" => Self::SaveCache {
                key: str_param(&params, "key").ok_or("a `save_cache` step needs a `key`")?,
                paths: str_list_param(&params, "paths")?,
            },
            _ => Self::Other { name, params },
        })
    }
}

/// Apply YAML `<<` merge keys in place.
///
/// Keys present in the mapping itself win over merged ones. When `<<` holds a
/// list of mappings, earlier entries win over later ones.
pub fn resolve_merge_keys(value: &mut Value) {
    match value {
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                resolve_merge_keys(v);
            }
            if let Some(merge) = map.remove("<<") {
                let sources = match merge {
                    Value::Sequence(seq) => seq,
                    other => vec![other],
                };
                for source in sources {
                    if let Value::Mapping(source) = source {
                        merge_missing(map, source);
                    }
                }
            }
        }
        Value::Sequence(seq) => seq.iter_mut().for_each(resolve_merge_keys),
        Value::Tagged(tagged) => resolve_merge_keys(&mut tagged.value),
        _ => {}
    }
}

fn merge_missing(target: &mut Mapping, source: Mapping) {
    for (k, v) in source {
        if !target.contains_key(&k) {
            target.insert(k, v);
        }
    }
}

impl Pipeline {
    pub fn from_yaml(text: &str) -> StacResult<Self> {
        let mut value: Value = serde_yaml::from_str(text)?;
        resolve_merge_keys(&mut value);
        let mut pipeline: Self = serde_yaml::from_value(value)?;
        for (name, workflow) in &mut pipeline.workflows {
            workflow.name.clone_from(name);
        }
        debug!(
            "Loaded pipeline with {} jobs and {} workflows",
            pipeline.jobs.len(),
            pipeline.workflows.len()
        );
        Ok(pipeline)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> StacResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| StacError::IoError(e, path.into()))?;
        Self::from_yaml(&text).map_err(|e| match e {
            StacError::YamlSerdeError(e) => StacError::YamlParseError(e, path.into()),
            e => e,
        })
    }

    #[must_use]
    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    /// Check that every workflow only refers to declared jobs, and that job
    /// dependencies form no cycles.
    pub fn check(&self) -> StacResult<()> {
        for workflow in self.workflows.values() {
            workflow.check(&self.jobs)?;
        }
        Ok(())
    }

    /// Environment variables referenced by `run` commands, sorted and deduplicated.
    #[must_use]
    pub fn required_env_vars(&self) -> Vec<String> {
        self.jobs
            .values()
            .flat_map(|job| &job.steps)
            .filter_map(|step| match step {
                Step::Run { command, .. } => Some(env_var_refs(command)),
                _ => None,
            })
            .flatten()
            .sorted()
            .dedup()
            .map(ToString::to_string)
            .collect()
    }
}

fn ident_len(s: &str) -> usize {
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len())
}

/// Names of `$VAR` and `${VAR}` references in a shell command.
/// Positional and special parameters (`$1`, `$?`, `$$`) are skipped.
fn env_var_refs(command: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = command;
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let (name, tail) = if let Some(braced) = rest.strip_prefix('{') {
            let Some(end) = braced.find('}') else {
                break;
            };
            (&braced[..ident_len(braced)], &braced[end + 1..])
        } else {
            let end = ident_len(rest);
            (&rest[..end], &rest[end..])
        };
        if name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            refs.push(name);
        }
        rest = tail;
    }
    refs
}
