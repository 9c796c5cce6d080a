use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use sha2::{Digest as _, Sha256};

use crate::env::Env;
use crate::errors::{StacError, StacResult};

/// Values available to cache key templates.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheKeyContext {
    pub branch: String,
    pub revision: String,
    /// Seconds since the Unix epoch
    pub epoch: i64,
    pub arch: String,
    /// Directory that `checksum` file names are relative to
    pub base_dir: PathBuf,
}

impl CacheKeyContext {
    #[must_use]
    pub fn new(branch: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            revision: revision.into(),
            epoch: Utc::now().timestamp(),
            arch: default_arch(),
            base_dir: PathBuf::from("."),
        }
    }
}

fn default_arch() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        a => a,
    };
    format!("arch1-{}-{arch}", std::env::consts::OS)
}

/// Base64 encoded SHA-256 digest of a file's content.
pub fn checksum(path: &Path) -> StacResult<String> {
    let data = fs::read(path).map_err(|e| StacError::IoError(e, path.to_path_buf()))?;
    Ok(STANDARD.encode(Sha256::digest(&data)))
}

/// Expand the `{{ ... }}` expressions of a cache key template.
///
/// Supported: `.Branch`, `.Revision`, `.Environment.NAME`, `epoch`, `arch`
/// and `checksum "file"`. Unset environment variables expand to nothing.
pub fn render_cache_key<'a>(
    template: &str,
    ctx: &CacheKeyContext,
    env: &impl Env<'a>,
) -> StacResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(StacError::InvalidTemplate(after.trim().to_string()));
        };
        out.push_str(&expand(after[..end].trim(), ctx, env)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand<'a>(expr: &str, ctx: &CacheKeyContext, env: &impl Env<'a>) -> StacResult<String> {
    match expr {
        ".Branch" => Ok(ctx.branch.clone()),
        ".Revision" => Ok(ctx.revision.clone()),
        "epoch" => Ok(ctx.epoch.to_string()),
        "arch" => Ok(ctx.arch.clone()),
        _ => {
            if let Some(var) = expr.strip_prefix(".Environment.") {
                Ok(env.get_env_str(var).unwrap_or_default())
            } else if let Some(arg) = expr.strip_prefix("checksum ") {
                let file = arg
                    .trim()
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .ok_or_else(|| StacError::InvalidTemplate(expr.to_string()))?;
                checksum(&ctx.base_dir.join(file))
            } else {
                Err(StacError::InvalidTemplate(expr.to_string()))
            }
        }
    }
}
