//! Per-project sandboxed filesystem helper. Every project gets
//! `{root}/{project-id}/{src,tests,docs,config,output}`; every path
//! access is checked against the canonicalized project root so a
//! `../../etc/passwd` request can't escape the sandbox.

use std::path::{Path, PathBuf};

use cadence_core::error::CoreError;

const SUBDIRS: [&str; 5] = ["src", "tests", "docs", "config", "output"];

/// Create the project's workspace directories if they don't exist yet.
pub async fn ensure_layout(workspace_path: &str) -> Result<(), CoreError> {
    let root = Path::new(workspace_path);
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
    for subdir in SUBDIRS {
        tokio::fs::create_dir_all(root.join(subdir))
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
    }
    Ok(())
}

/// Resolve `relative` against `workspace_path`, rejecting anything that
/// canonicalizes outside the workspace root.
pub fn resolve(workspace_path: &str, relative: &str) -> Result<PathBuf, CoreError> {
    let root = Path::new(workspace_path);
    let candidate = root.join(relative);

    let canonical_root = dunce_canonicalize(root)?;
    let canonical_candidate = dunce_canonicalize(&candidate)?;

    if !canonical_candidate.starts_with(&canonical_root) {
        return Err(CoreError::validation("path", "path escapes workspace root"));
    }

    Ok(canonical_candidate)
}

/// `std::fs::canonicalize` requires the path to exist; fall back to
/// canonicalizing the nearest existing ancestor and re-appending the
/// remainder, so a not-yet-created file can still be checked.
fn dunce_canonicalize(path: &Path) -> Result<PathBuf, CoreError> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }

    let mut remainder = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(&current) {
            let mut resolved = canonical;
            for component in remainder.into_iter().rev() {
                resolved.push(component);
            }
            return Ok(resolved);
        }
        let Some(parent) = current.parent() else {
            return Err(CoreError::validation("path", "workspace root does not exist"));
        };
        if let Some(name) = current.file_name() {
            remainder.push(name.to_owned());
        }
        current = parent.to_path_buf();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_layout_creates_all_five_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj-1");
        ensure_layout(root.to_str().unwrap()).await.unwrap();
        for subdir in SUBDIRS {
            assert!(root.join(subdir).is_dir());
        }
    }

    #[tokio::test]
    async fn resolve_rejects_parent_directory_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj-2");
        ensure_layout(root.to_str().unwrap()).await.unwrap();

        let result = resolve(root.to_str().unwrap(), "../../etc/passwd");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resolve_accepts_path_within_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj-3");
        ensure_layout(root.to_str().unwrap()).await.unwrap();

        let result = resolve(root.to_str().unwrap(), "src/main.rs");
        assert!(result.is_ok());
    }
}
