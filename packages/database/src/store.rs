//! Handle to a project's `DuckDB` file.

use std::path::{Path, PathBuf};

use duckdb::Connection;

use crate::DbError;

/// A project store: one `DuckDB` file holding every layer of a project.
///
/// The handle only records the location. Each operation calls
/// [`ProjectStore::connect`] for a connection it owns for its duration, so
/// nothing is pooled or shared between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    /// Creates a handle for the store at `path`. Nothing is opened yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the store location from `--database`, `TAILOR_DATABASE`,
    /// and the project name.
    #[must_use]
    pub fn resolve(explicit: Option<&Path>, project: &str) -> Self {
        Self::new(crate::paths::db_path_from_env(explicit, project))
    }

    /// Path of the `DuckDB` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens (or creates) the store file and returns a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the parent directory cannot be created or the
    /// connection fails.
    pub fn connect(&self) -> Result<Connection, DbError> {
        if let Some(parent) = self.path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        log::debug!("Opening project store {}", self.path.display());
        let conn = Connection::open(&self.path)?;

        conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_creates_missing_directories() {
        let dir = std::env::temp_dir().join("tailor_store_test_connect");
        let _ = std::fs::remove_dir_all(&dir);
        let store = ProjectStore::new(dir.join("nested").join("project.duckdb"));

        let conn = store.connect().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
        drop(conn);

        assert!(store.path().exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_prefers_explicit_path() {
        let store = ProjectStore::resolve(Some(Path::new("explicit.duckdb")), "ignored");
        assert_eq!(store.path(), Path::new("explicit.duckdb"));
    }
}
