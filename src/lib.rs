// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A collaborative document synchronization engine implementing
//! differential synchronization (à la Neil Fraser): peers edit shared text
//! documents belonging to a paper, and a single-writer agent per paper keeps
//! per-peer shadows consistent with the authoritative server document via
//! diff/patch exchanges.

pub mod agent;
pub mod bus;
pub mod config;
pub mod diff_match_patch;
pub mod document;
pub mod error;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod path;
pub mod registry;
pub mod sandbox;
pub mod sync_machine;
pub mod uri;
pub mod view;

pub use agent::PaperAgent;
pub use diff_match_patch::{DiffProvider, TextDiffProvider};
pub use document::{Document, DocumentStore, FilesystemStore, InMemoryStore};
pub use error::{SyncError, SyncResult};
pub use ids::{PaperId, PeerId};
pub use messages::{Message, SyncAction, SyncCommand, SyncItem, SyncSession};
pub use registry::PaperRegistry;
