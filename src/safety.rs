//! Safety utilities to prevent accidental file loss.
//!
//! These checks help prevent overwriting a playlist or catalog with match
//! output before the CLI writes anything.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Extensions that belong to catalog databases and are never valid outputs.
const DATABASE_EXTENSIONS: &[&str] = &["sqlite3", "sqlite", "db"];

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output must carry the required extension (e.g., "json")
/// - Output cannot be a database file
/// - Output cannot be the same file as any of the provided source paths
pub fn validate_output_path(
    output: &Path,
    required_extension: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if DATABASE_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: output '{}' looks like a catalog database",
            output.display()
        );
    }

    if extension != required_extension.to_ascii_lowercase() {
        bail!(
            "Safety check failed: output file '{}' must have a .{} extension",
            output.display(),
            required_extension
        );
    }

    let resolved_output = resolve(output);
    for source in source_paths {
        if resolved_output == resolve(source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

/// Canonical path when the file exists, the path as given otherwise.
fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
