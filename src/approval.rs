//! Approval records for `book.toml` files whose commands may be executed.
//!
//! Approvals are keyed direnv-style by a SHA-256 of the canonical path and
//! the file content, so any edit to `book.toml` revokes its approval.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "mdbook-cookbook";

/// SHA-256 of `path + "\n" + content`, hex encoded.
pub fn compute_hash(path: &Path, content: &str) -> String {
    let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(format!("{}\n{}", canonical_path.display(), content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A directory of approval records, one file per approved `book.toml`.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    dir: PathBuf,
}

impl ApprovalStore {
    /// Opens the per-user store.
    ///
    /// `$XDG_DATA_HOME` wins on every platform; otherwise the platform data
    /// directory is used.
    pub fn open() -> Result<Self> {
        if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
            if !xdg_data_home.is_empty() {
                return Ok(Self::at(PathBuf::from(xdg_data_home).join(APP_NAME).join("allow")));
            }
        }

        let proj_dirs = ProjectDirs::from("", "", APP_NAME)
            .context("Failed to determine project directories")?;
        Ok(Self::at(proj_dirs.data_dir().join("allow")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, book_toml_path: &Path) -> Result<PathBuf> {
        let content = fs::read_to_string(book_toml_path)
            .with_context(|| format!("Failed to read {}", book_toml_path.display()))?;
        Ok(self.dir.join(compute_hash(book_toml_path, &content)))
    }

    pub fn is_approved(&self, book_toml_path: &Path) -> Result<bool> {
        Ok(self.record_path(book_toml_path)?.exists())
    }

    /// Records approval for the current content of `book_toml_path`.
    pub fn approve(&self, book_toml_path: &Path) -> Result<()> {
        let record = self.record_path(book_toml_path)?;
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create approval directory: {}", self.dir.display())
        })?;

        let canonical_path = book_toml_path
            .canonicalize()
            .unwrap_or_else(|_| book_toml_path.to_path_buf());
        fs::write(&record, canonical_path.display().to_string())
            .with_context(|| format!("Failed to write approval file: {}", record.display()))?;
        log::debug!("Approval recorded in {}", record.display());
        Ok(())
    }

    /// Removes the approval for the current content, if any.
    ///
    /// Returns whether a record was removed.
    pub fn deny(&self, book_toml_path: &Path) -> Result<bool> {
        let record = self.record_path(book_toml_path)?;
        if !record.exists() {
            return Ok(false);
        }
        fs::remove_file(&record)
            .with_context(|| format!("Failed to remove approval file: {}", record.display()))?;
        Ok(true)
    }

    /// Paths of every approved `book.toml`, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut approved = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| {
            format!("Failed to read approval directory: {}", self.dir.display())
        })? {
            let entry = entry?;
            if entry.path().is_file() {
                if let Ok(path) = fs::read_to_string(entry.path()) {
                    approved.push(path);
                }
            }
        }
        approved.sort();
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ApprovalStore, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = ApprovalStore::at(dir.path().join("allow"));
        let book_toml = dir.path().join("book.toml");
        fs::write(&book_toml, "[book]\ntitle = \"Cookbook\"\n").unwrap();
        (dir, store, book_toml)
    }

    #[test]
    fn test_hash_depends_on_path_and_content() {
        let a = compute_hash(Path::new("/a/book.toml"), "x");
        assert_eq!(a, compute_hash(Path::new("/a/book.toml"), "x"));
        assert_ne!(a, compute_hash(Path::new("/b/book.toml"), "x"));
        assert_ne!(a, compute_hash(Path::new("/a/book.toml"), "y"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_approve_then_deny() {
        let (_dir, store, book_toml) = setup();
        assert!(!store.is_approved(&book_toml).unwrap());

        store.approve(&book_toml).unwrap();
        assert!(store.is_approved(&book_toml).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.deny(&book_toml).unwrap());
        assert!(!store.is_approved(&book_toml).unwrap());
        assert!(!store.deny(&book_toml).unwrap());
    }

    #[test]
    fn test_edit_revokes_approval() {
        let (_dir, store, book_toml) = setup();
        store.approve(&book_toml).unwrap();

        fs::write(
            &book_toml,
            "[preprocessor.doctest]\nrun-command = [\"rm\"]\n",
        )
        .unwrap();
        assert!(!store.is_approved(&book_toml).unwrap());
    }

    #[test]
    fn test_list_empty_store() {
        let store = ApprovalStore::at("/nonexistent/mdbook-cookbook/allow");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_missing_book_toml() {
        let (dir, store, _) = setup();
        assert!(store.is_approved(&dir.path().join("missing.toml")).is_err());
    }
}
