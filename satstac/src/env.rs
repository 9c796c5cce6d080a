//! Environment variable access.
//!
//! [`Env`] lets configuration substitution, S3 credential lookup and cache key
//! rendering read the environment through one mockable seam. Both
//! implementations remember which variables configuration substitution
//! asked for, so that settings shadowed by a config file can be reported.
//!
//! - [`OsEnv`]: process environment
//! - [`FauxEnv`]: fixed map for tests

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;

use subst::VariableMap;
use tracing::warn;

/// Environment variable access with Unicode validation and usage tracking.
pub trait Env<'a>: VariableMap<'a> {
    fn var_os(&self, key: &str) -> Option<OsString>;

    /// True if configuration substitution looked up `key`.
    fn was_substituted(&self, key: &str) -> bool;

    /// Get an environment variable as a UTF-8 [`String`].
    ///
    /// Logs a warning and returns `None` if the value is not valid Unicode.
    #[must_use]
    fn get_env_str(&self, key: &str) -> Option<String> {
        match self.var_os(key)?.into_string() {
            Ok(v) => Some(v),
            Err(v) => {
                let v = v.to_string_lossy();
                warn!("Environment variable {key} has invalid unicode. Lossy representation: {v}");
                None
            }
        }
    }

    /// True if the variable is set but configuration substitution never read it.
    #[must_use]
    fn has_unused_var(&self, key: &str) -> bool {
        !self.was_substituted(key) && self.var_os(key).is_some()
    }
}

/// Names looked up through [`VariableMap::get`].
#[derive(Debug, Default)]
struct Lookups(RefCell<HashSet<String>>);

impl Lookups {
    fn record(&self, key: &str) {
        self.0.borrow_mut().insert(key.to_string());
    }

    fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains(key)
    }
}

#[derive(Debug, Default)]
pub struct OsEnv(Lookups);

impl Env<'_> for OsEnv {
    fn var_os(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }

    fn was_substituted(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl<'a> VariableMap<'a> for OsEnv {
    type Value = String;

    fn get(&'a self, key: &str) -> Option<Self::Value> {
        self.0.record(key);
        std::env::var(key).ok()
    }
}

#[derive(Debug, Default)]
pub struct FauxEnv {
    vars: HashMap<&'static str, OsString>,
    lookups: Lookups,
}

impl FauxEnv {
    #[must_use]
    pub fn from_pairs<V: Into<OsString>, const N: usize>(pairs: [(&'static str, V); N]) -> Self {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k, v.into())).collect(),
            lookups: Lookups::default(),
        }
    }
}

impl<'a> VariableMap<'a> for FauxEnv {
    type Value = String;

    fn get(&'a self, key: &str) -> Option<Self::Value> {
        self.lookups.record(key);
        self.vars.get(key).map(|s| s.to_string_lossy().to_string())
    }
}

impl Env<'_> for FauxEnv {
    fn var_os(&self, key: &str) -> Option<OsString> {
        self.vars.get(key).cloned()
    }

    fn was_substituted(&self, key: &str) -> bool {
        self.lookups.contains(key)
    }
}
