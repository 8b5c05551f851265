// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `DocumentView` (§3, §4.2): per-`(PeerId, Filepath)` shadow/backup/edit
//! stack state. A view never owns its `Document`; it's looked up by the
//! same canonical path key in `SyncContext::documents` whenever needed.

use crate::messages::SyncCommand;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DocumentView {
    pub shadow: String,
    pub backup_shadow: String,
    pub backup_shadow_revision: u64,
    pub server_shadow_revision: u64,
    pub client_shadow_revision: u64,
    /// Unacknowledged outbound commands, oldest first. Append-only except
    /// for acknowledgement trimming (§4.3 step 3); `flushStack` never
    /// clears it.
    pub edits: VecDeque<SyncCommand>,
    pub delta_ok: bool,
    pub overwrite: bool,
    pub changed: bool,
}

impl DocumentView {
    /// Creates a freshly joined view: shadow initialized from the current
    /// document text, revisions at zero, ready to accept deltas.
    #[must_use]
    pub fn new(initial_text: impl Into<String>) -> Self {
        let text = initial_text.into();
        Self {
            backup_shadow: text.clone(),
            shadow: text,
            backup_shadow_revision: 0,
            server_shadow_revision: 0,
            client_shadow_revision: 0,
            edits: VecDeque::new(),
            delta_ok: true,
            overwrite: false,
            changed: false,
        }
    }

    /// Recovers from a lost server response: rewinds to the last
    /// acknowledged-safe shadow.
    pub fn restore_backup_shadow(&mut self) {
        self.shadow = self.backup_shadow.clone();
        self.server_shadow_revision = self.backup_shadow_revision;
        self.edits.clear();
    }

    /// Reinitializes the view from a `Raw` action. Forcing the document
    /// text itself is the caller's job, since a view has no owning
    /// reference to its `Document` (§9's "views as interior-mutable
    /// objects owned by the agent" split).
    pub fn set_shadow(&mut self, data: &str, client_rev: u64, server_rev: u64) {
        self.shadow = data.to_string();
        self.backup_shadow = data.to_string();
        self.client_shadow_revision = client_rev;
        self.server_shadow_revision = server_rev;
        self.backup_shadow_revision = server_rev;
        self.edits.clear();
        self.delta_ok = true;
        self.changed = true;
    }

    /// Snapshots the current shadow as the new recovery point.
    pub fn update(&mut self) {
        self.backup_shadow = self.shadow.clone();
        self.backup_shadow_revision = self.server_shadow_revision;
        self.changed = true;
    }

    /// Drops every queued outbound command whose revision the peer has now
    /// acknowledged (§4.3 step 3).
    pub fn drop_acknowledged(&mut self, acknowledged_revision: u64) {
        self.edits
            .retain(|cmd| cmd.revision > acknowledged_revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_view_starts_caught_up_and_clean() {
        let view = DocumentView::new("hello");
        assert_eq!(view.shadow, "hello");
        assert_eq!(view.backup_shadow, "hello");
        assert!(view.delta_ok);
        assert!(!view.changed);
    }

    #[test]
    fn restore_backup_shadow_rewinds_and_clears_edits() {
        let mut view = DocumentView::new("hello");
        view.shadow = "hello world".to_string();
        view.server_shadow_revision = 3;
        view.restore_backup_shadow();
        assert_eq!(view.shadow, "hello");
        assert_eq!(view.server_shadow_revision, 0);
        assert!(view.edits.is_empty());
    }

    #[test]
    fn set_shadow_resets_everything_including_delta_ok() {
        let mut view = DocumentView::new("hello");
        view.delta_ok = false;
        view.set_shadow("goodbye", 5, 6);
        assert_eq!(view.shadow, "goodbye");
        assert_eq!(view.backup_shadow, "goodbye");
        assert_eq!(view.client_shadow_revision, 5);
        assert_eq!(view.server_shadow_revision, 6);
        assert_eq!(view.backup_shadow_revision, 6);
        assert!(view.delta_ok);
    }

    #[test]
    fn update_snapshots_shadow_as_backup() {
        let mut view = DocumentView::new("hello");
        view.shadow = "hello world".to_string();
        view.server_shadow_revision = 2;
        view.update();
        assert_eq!(view.backup_shadow, "hello world");
        assert_eq!(view.backup_shadow_revision, 2);
    }

    #[test]
    fn drop_acknowledged_trims_edits_leq_revision() {
        use crate::messages::SyncAction;

        let mut view = DocumentView::new("hello");
        for revision in [1, 2, 3] {
            view.edits.push_back(SyncCommand {
                filename: "f".into(),
                revision,
                action: SyncAction::Nullify,
            });
        }
        view.drop_acknowledged(2);
        let remaining: Vec<_> = view.edits.iter().map(|c| c.revision).collect();
        assert_eq!(remaining, vec![3]);
    }
}
