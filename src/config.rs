// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Host-provided configuration for a `PaperRegistry` deployment. The
//! transport embedding this engine (out of scope here, §1) is expected to
//! read this once at startup.

use ini::Ini;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory under which each paper gets its own subdirectory of
    /// files, passed to `FilesystemStore`.
    pub papers_root: PathBuf,
    /// Whether `PaperAgent::stop` persists documents before terminating.
    pub persist_on_stop: Option<bool>,
    pub debug_logging: Option<bool>,
}

impl AppConfig {
    #[must_use]
    pub fn from_config_file(config_file: &Path) -> Option<Self> {
        if !config_file.exists() {
            return None;
        }
        let conf = Ini::load_from_file(config_file)
            .expect("could not access config file, even though it exists");
        let general = conf.general_section();
        let papers_root = general
            .get("papers_root")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                config_file
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            });
        Some(Self {
            papers_root,
            persist_on_stop: general.get("persist_on_stop").map(|v| {
                v.parse()
                    .expect("failed to parse config parameter `persist_on_stop` as bool")
            }),
            debug_logging: general.get("debug_logging").map(|v| {
                v.parse()
                    .expect("failed to parse config parameter `debug_logging` as bool")
            }),
        })
    }

    #[must_use]
    pub fn persist_on_stop(&self) -> bool {
        self.persist_on_stop.unwrap_or(true)
    }

    #[must_use]
    pub fn debug_logging(&self) -> bool {
        self.debug_logging.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_none() {
        assert!(AppConfig::from_config_file(Path::new("/nonexistent/papersync.conf")).is_none());
    }

    #[test]
    fn reads_general_section() {
        let dir = temp_dir::TempDir::new().unwrap();
        let config_file = dir.path().join("papersync.conf");
        std::fs::write(
            &config_file,
            "[general]\npapers_root=/srv/papers\npersist_on_stop=false\n",
        )
        .unwrap();

        let config = AppConfig::from_config_file(&config_file).unwrap();
        assert_eq!(config.papers_root, PathBuf::from("/srv/papers"));
        assert!(!config.persist_on_stop());
        assert!(!config.debug_logging());
    }
}
