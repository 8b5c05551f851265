// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `Filepath` handling. A path received from a peer is joined with the
//! paper's root directory and canonicalized; the canonical absolute path is
//! the stable key used by `SyncContext::documents`/`views`. Peers still see
//! the path as they sent it (`Document::filename`).

use crate::sandbox;
use anyhow::Result;
use derive_more::{AsRef, Deref, Display};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths like these are guaranteed to be absolute and lexically cleaned
/// relative to a paper root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Deref, AsRef, Display)]
#[as_ref(Path)]
#[display("{}", self.0.display())]
pub struct AbsolutePath(PathBuf);

impl AbsolutePath {
    /// Joins `filename` (as received from a peer) onto `paper_root` and
    /// canonicalizes the result, rejecting anything that would escape the
    /// paper root (e.g. `../../etc/passwd`).
    pub fn from_peer_filename(paper_root: &Path, filename: &str) -> Result<Self> {
        let joined = sandbox::canonicalize_lexically(paper_root, Path::new(filename))?;
        Ok(Self(joined))
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// The filename as seen by clients — not necessarily normalized, kept
/// separately from the canonical key so a `Document` can echo back exactly
/// what a peer sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Deref, AsRef, Display)]
#[as_ref(str)]
pub struct ClientFilename(String);

impl ClientFilename {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn joins_and_canonicalizes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let path = AbsolutePath::from_peer_filename(&root, "sub/chapter1.tex").unwrap();
        assert_eq!(path.as_path(), root.join("sub/chapter1.tex"));
    }

    #[test]
    fn rejects_escape_attempts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert!(AbsolutePath::from_peer_filename(&root, "../../etc/passwd").is_err());
    }

    #[test]
    fn same_file_yields_same_key_regardless_of_dotted_form() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = AbsolutePath::from_peer_filename(&root, "sub/./chapter1.tex").unwrap();
        let b = AbsolutePath::from_peer_filename(&root, "sub/x/../chapter1.tex").unwrap();
        assert_eq!(a, b);
    }
}
