//! Sanity checks on the store location before it is opened.
//!
//! SQLite happily creates a database at any path, so a typo in `--db` would
//! silently start an empty store or clobber an unrelated file.

use anyhow::{bail, Result};
use std::path::Path;

const STORE_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

/// Validates that a path is acceptable as a release store.
///
/// Checks:
/// - The file extension must be one of `db`, `sqlite`, `sqlite3`
/// - The path must not be an existing directory
pub fn validate_store_path(path: &Path) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    if !STORE_EXTENSIONS.contains(&extension) {
        bail!(
            "Safety check failed: store '{}' is not a SQLite database (expected .db, .sqlite or .sqlite3)",
            path.display()
        );
    }

    if path.is_dir() {
        bail!(
            "Safety check failed: store '{}' is a directory",
            path.display()
        );
    }

    Ok(())
}
