// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `Document` (§3) and the `DocumentStore` contract (§4.6). The store is
//! shared across papers; implementations must be safe under
//! single-writer-per-path, which holds automatically here since only one
//! `PaperAgent` ever owns a given canonical path at a time.

use crate::path::{AbsolutePath, ClientFilename};
use crate::sandbox;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// One file actively edited in a paper. `path` is the canonical key;
/// `filename` is kept around unchanged so the server can echo back exactly
/// what a peer sent, even if peers disagree on capitalization or `./`
/// prefixes that canonicalize to the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: AbsolutePath,
    pub filename: ClientFilename,
    pub text: String,
}

impl Document {
    #[must_use]
    pub fn new(path: AbsolutePath, filename: ClientFilename, text: String) -> Self {
        Self {
            path,
            filename,
            text,
        }
    }
}

/// Thrown by `DocumentStore::load` for a path with no backing content.
/// Distinct from a generic I/O failure so callers can decide to
/// instantiate an empty document rather than treat it as a `StoreFailure`.
#[derive(Debug, thiserror::Error)]
#[error("no document found at {0}")]
pub struct NotFound(pub AbsolutePath);

pub trait DocumentStore: Send + Sync {
    /// Loads the document at `path`, or `Err` wrapping [`NotFound`] if
    /// nothing is stored there yet.
    fn load(&self, path: &AbsolutePath, filename: &ClientFilename) -> Result<Document>;

    /// Persists atomically enough that a concurrent reader sees either the
    /// old or the new content, never a partial write.
    fn save(&self, document: &Document) -> Result<()>;

    /// Removes persistent state; a subsequent `load` must fail with
    /// [`NotFound`]. Idempotent: deleting a path with nothing persisted at
    /// it (e.g. a document nullified before its first `save`) succeeds.
    fn delete(&self, path: &AbsolutePath) -> Result<()>;
}

/// A `DocumentStore` backed by the paper's directory on disk, routed
/// through [`sandbox`] so no path can escape the paper root.
pub struct FilesystemStore {
    base_dir: std::path::PathBuf,
}

impl FilesystemStore {
    #[must_use]
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl DocumentStore for FilesystemStore {
    fn load(&self, path: &AbsolutePath, filename: &ClientFilename) -> Result<Document> {
        if !sandbox::exists(&self.base_dir, path.as_path())? {
            return Err(NotFound(path.clone()).into());
        }
        let bytes = sandbox::read_file(&self.base_dir, path.as_path())
            .with_context(|| format!("reading {path}"))?;
        let text = String::from_utf8(bytes).with_context(|| format!("{path} is not UTF-8"))?;
        Ok(Document::new(path.clone(), filename.clone(), text))
    }

    fn save(&self, document: &Document) -> Result<()> {
        sandbox::write_file(
            &self.base_dir,
            document.path.as_path(),
            document.text.as_bytes(),
        )
        .with_context(|| format!("writing {}", document.path))
    }

    fn delete(&self, path: &AbsolutePath) -> Result<()> {
        if !sandbox::exists(&self.base_dir, path.as_path())? {
            return Ok(());
        }
        sandbox::remove_file(&self.base_dir, path.as_path())
            .with_context(|| format!("deleting {path}"))
    }
}

/// A `DocumentStore` kept entirely in memory, used by tests and by
/// deployments that don't need documents to outlive the process.
#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<HashMap<AbsolutePath, Document>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn load(&self, path: &AbsolutePath, _filename: &ClientFilename) -> Result<Document> {
        self.documents
            .lock()
            .expect("in-memory store mutex poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| NotFound(path.clone()).into())
    }

    fn save(&self, document: &Document) -> Result<()> {
        self.documents
            .lock()
            .expect("in-memory store mutex poisoned")
            .insert(document.path.clone(), document.clone());
        Ok(())
    }

    fn delete(&self, path: &AbsolutePath) -> Result<()> {
        self.documents
            .lock()
            .expect("in-memory store mutex poisoned")
            .remove(path);
        Ok(())
    }
}
