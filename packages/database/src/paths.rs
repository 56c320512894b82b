#![allow(clippy::module_name_repetitions)]
//! Project store location.
//!
//! Resolution order: an explicit path, then the `TAILOR_DATABASE`
//! environment variable, then `<project>.duckdb` in the working directory.

use std::path::{Path, PathBuf};

/// Environment variable naming the project store file.
pub const DATABASE_ENV_VAR: &str = "TAILOR_DATABASE";

/// Project name used when none is given.
pub const DEFAULT_PROJECT: &str = "tailor";

/// Returns the default store path for a project.
#[must_use]
pub fn project_db_path(project: &str) -> PathBuf {
    PathBuf::from(format!("{project}.duckdb"))
}

/// Resolves the store path from an explicit path, an environment value,
/// and the project name.
///
/// Empty values count as absent.
#[must_use]
pub fn resolve_db_path(explicit: Option<&Path>, env_value: Option<&str>, project: &str) -> PathBuf {
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return path.to_path_buf();
    }
    if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        return PathBuf::from(value);
    }
    project_db_path(project)
}

/// Resolves the store path, reading [`DATABASE_ENV_VAR`] from the process
/// environment.
#[must_use]
pub fn db_path_from_env(explicit: Option<&Path>, project: &str) -> PathBuf {
    let env_value = std::env::var(DATABASE_ENV_VAR).ok();
    resolve_db_path(explicit, env_value.as_deref(), project)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
