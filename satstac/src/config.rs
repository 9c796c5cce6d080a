//! Optional YAML configuration file.
//!
//! `${VAR}` and `${VAR:default}` references are substituted from the
//! environment before parsing.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use subst::VariableMap;

use crate::env::Env;
use crate::errors::{StacError, StacResult};
use crate::s3::DEFAULT_REGION;

pub type UnrecognizedValues = BTreeMap<String, serde_yaml::Value>;
pub type UnrecognizedKeys = BTreeSet<String>;

pub const DEFAULT_USER_AGENT: &str = concat!("satstac/", env!("CARGO_PKG_VERSION"));

/// Variables that configure a run without a config file.
pub const ENV_SETTINGS: [&str; 2] = ["AWS_REGION", "SATSTAC_DOWNLOAD_DIR"];

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,

    /// Directory downloads are written to when no file name is given
    pub download_dir: Option<PathBuf>,

    pub user_agent: Option<String>,

    #[serde(flatten)]
    pub unrecognized: UnrecognizedValues,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,

    /// Sign requests to S3 so that requester-pays buckets can be read
    #[serde(default = "default_requester_pays")]
    pub requester_pays: bool,

    #[serde(flatten)]
    pub unrecognized: UnrecognizedValues,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_requester_pays() -> bool {
    true
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            requester_pays: default_requester_pays(),
            unrecognized: UnrecognizedValues::new(),
        }
    }
}

fn copy_unrecognized_keys(result: &mut UnrecognizedKeys, prefix: &str, values: &UnrecognizedValues) {
    result.extend(values.keys().map(|k| format!("{prefix}{k}")));
}

impl Config {
    /// Fill in defaults and return the keys that were not understood.
    pub fn finalize(&mut self) -> UnrecognizedKeys {
        let mut res = UnrecognizedKeys::new();
        copy_unrecognized_keys(&mut res, "", &self.unrecognized);
        copy_unrecognized_keys(&mut res, "s3.", &self.s3.unrecognized);

        if self.s3.region.trim().is_empty() {
            self.s3.region = default_region();
        }
        if self.user_agent.is_none() {
            self.user_agent = Some(DEFAULT_USER_AGENT.to_string());
        }
        res
    }

    /// Configuration for a run without a config file, see [`ENV_SETTINGS`].
    #[must_use]
    pub fn from_env<'a>(env: &impl Env<'a>) -> Self {
        let mut config = Self::default();
        if let Some(region) = env.get_env_str("AWS_REGION") {
            config.s3.region = region;
        }
        config.download_dir = env.get_env_str("SATSTAC_DOWNLOAD_DIR").map(PathBuf::from);
        config
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        self.download_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }
}

pub fn read_config<'a, M>(file_name: &Path, env: &'a M) -> StacResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    let contents = fs::read_to_string(file_name)
        .map_err(|e| StacError::ConfigLoadError(e, file_name.into()))?;
    parse_config(&contents, env, file_name)
}

pub fn parse_config<'a, M>(contents: &str, env: &'a M, file_name: &Path) -> StacResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    subst::yaml::from_str(contents, env).map_err(|e| StacError::ConfigParseError(e, file_name.into()))
}

/// [`ENV_SETTINGS`] variables that are set, but that a loaded config file
/// never referenced. They have no effect.
pub fn ignored_env_settings<'a>(env: &impl Env<'a>) -> Vec<&'static str> {
    ENV_SETTINGS
        .into_iter()
        .filter(|v| env.has_unused_var(v))
        .collect()
}
