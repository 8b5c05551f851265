// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! 👮🚨🚓
//! The functions in this module are supposed to prevent file I/O outside the
//! paper's root directory. All filesystem-backed `DocumentStore` I/O goes
//! through them.

use anyhow::{bail, Context, Result};
use path_clean::PathClean;
use std::fs;
use std::path::{Path, PathBuf};

pub fn read_file(absolute_base_dir: &Path, absolute_file_path: &Path) -> Result<Vec<u8>> {
    let canonical_file_path =
        check_inside_base_dir_and_canonicalize(absolute_base_dir, absolute_file_path)?;
    let bytes = fs::read(canonical_file_path)?;
    Ok(bytes)
}

/// Writes content to a file, creating the parent directories if needed.
pub fn write_file(
    absolute_base_dir: &Path,
    absolute_file_path: &Path,
    content: &[u8],
) -> Result<()> {
    let canonical_file_path =
        check_inside_base_dir_and_canonicalize(absolute_base_dir, absolute_file_path)?;

    let parent_dir = canonical_file_path
        .parent()
        .expect("Failed to get parent directory");
    fs::create_dir_all(parent_dir).context("Failed to create parent directory")?;

    // Write to a sibling temp file, then rename, so a concurrent reader
    // always sees either the old or the new content.
    let tmp_path = canonical_file_path.with_extension("papersync-tmp");
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, &canonical_file_path)?;
    Ok(())
}

pub fn remove_file(absolute_base_dir: &Path, absolute_file_path: &Path) -> Result<()> {
    let canonical_file_path =
        check_inside_base_dir_and_canonicalize(absolute_base_dir, absolute_file_path)?;
    fs::remove_file(canonical_file_path)?;
    Ok(())
}

pub fn exists(absolute_base_dir: &Path, absolute_file_path: &Path) -> Result<bool> {
    let canonical_file_path = canonicalize_lexically(absolute_base_dir, absolute_file_path)?;
    Ok(canonical_file_path.exists())
}

/// Lexically cleans `path` (joined onto `base_dir` if relative) and verifies
/// it stays inside `base_dir`, without requiring the path to exist on disk
/// yet. This is what callers should use to compute the stable canonical key
/// for a `Filepath` a peer hands us, since the backing `Document` may not
/// have been created yet.
pub fn canonicalize_lexically(absolute_base_dir: &Path, path: &Path) -> Result<PathBuf> {
    if !absolute_base_dir.is_absolute() {
        bail!(
            "Base directory '{}' is not absolute",
            absolute_base_dir.display()
        );
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        absolute_base_dir.join(path)
    };
    let cleaned = joined.clean();
    if !cleaned.starts_with(absolute_base_dir.clean()) {
        bail!(
            "Path '{}' is not inside the base directory '{}'",
            cleaned.display(),
            absolute_base_dir.display()
        );
    }
    Ok(cleaned)
}

fn check_inside_base_dir_and_canonicalize(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    let canonical_base_dir = absolute_and_canonicalized(base_dir)?;
    let canonical_path = absolute_and_canonicalized(path)?;

    if !canonical_path.starts_with(&canonical_base_dir) {
        bail!(
            "File path {} is not inside the base directory {}",
            canonical_path.display(),
            canonical_base_dir.display()
        );
    }

    Ok(canonical_path)
}

/// Like `Path::canonicalize`, but tolerates a path whose final components
/// don't exist yet: it canonicalizes the longest existing prefix and
/// lexically appends the rest.
fn absolute_and_canonicalized(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        bail!("Path is not absolute.");
    }

    let canonical_path = path.clean();
    let mut suffix_path = PathBuf::new();
    let mut prefix_path = canonical_path.clone();

    for component in path.components().rev() {
        if prefix_path.exists() {
            break;
        }
        prefix_path.pop();
        if let std::path::Component::Normal(os_str) = component {
            suffix_path = if suffix_path.components().count() == 0 {
                Path::new(os_str).to_path_buf()
            } else {
                Path::new(os_str).join(&suffix_path)
            };
        } else {
            panic!("Got unexpected Component variant while canonicalizing");
        }
    }

    let mut canonical_path = prefix_path
        .canonicalize()
        .context("Failed to canonicalize path, probably the base directory disappeared")?;

    if suffix_path.components().count() != 0 {
        canonical_path = canonical_path.join(suffix_path);
    }

    Ok(canonical_path)
}
