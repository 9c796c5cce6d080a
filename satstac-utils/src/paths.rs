use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path};

/// Split a path into all of its components.
///
/// An absolute path keeps its root (`/`) as the first component, and `.`/`..`
/// are preserved as-is. Repeated and trailing separators are ignored.
///
/// ```
/// # use std::path::Path;
/// # use satstac_utils::split_all;
/// let parts = split_all(Path::new("/data/landsat-8-l1/catalog.json"));
/// assert_eq!(parts, ["/", "data", "landsat-8-l1", "catalog.json"]);
/// ```
#[must_use]
pub fn split_all(path: &Path) -> Vec<&OsStr> {
    path.components().map(Component::as_os_str).collect()
}

/// Recursively create a directory, returning the same path.
///
/// An empty path or an already existing directory is not an error.
pub fn mkdirp(path: &Path) -> io::Result<&Path> {
    if !path.as_os_str().is_empty() && !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(path)
}
