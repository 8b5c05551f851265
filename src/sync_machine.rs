// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `SyncContext` and the `SyncStateMachine` reducer (§4.3): the pure core
//! that turns one inbound `SyncCommand` into the outbound `SyncCommand`s a
//! view owes its peer. Everything here runs on a single paper agent's task
//! and touches only that agent's own state, so it needs no locking (§5).

use crate::bus::Mailboxes;
use crate::diff_match_patch::{DiffProvider, EditDeltaParser, EditOp};
use crate::document::{Document, DocumentStore, NotFound};
use crate::error::{SyncError, SyncResult};
use crate::ids::PeerId;
use crate::messages::{SyncAction, SyncCommand};
use crate::path::{AbsolutePath, ClientFilename};
use crate::uri::{decode_uri, encode_uri};
use crate::view::DocumentView;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Per-paper state: every `Document` and `DocumentView` a `PaperAgent`
/// owns, plus the peer mailboxes and the paper's last-write timestamp.
pub struct SyncContext {
    paper_root: PathBuf,
    pub documents: HashMap<AbsolutePath, Document>,
    pub views: HashMap<(PeerId, AbsolutePath), DocumentView>,
    pub mailboxes: Mailboxes,
    pub last_modification_time: time::OffsetDateTime,
}

impl SyncContext {
    #[must_use]
    pub fn new(paper_root: PathBuf) -> Self {
        Self {
            paper_root,
            documents: HashMap::new(),
            views: HashMap::new(),
            mailboxes: Mailboxes::new(),
            last_modification_time: time::OffsetDateTime::now_utc(),
        }
    }

    fn touch(&mut self) {
        self.last_modification_time = time::OffsetDateTime::now_utc();
    }

    /// Drops every view keyed by `path`, e.g. after a `Nullify`.
    fn drop_views_for_path(&mut self, path: &AbsolutePath) {
        self.views.retain(|(_, view_path), _| view_path != path);
    }

    /// Drops every view belonging to `peer`, e.g. on `Part`.
    pub fn drop_views_for_peer(&mut self, peer: &PeerId) {
        self.views.retain(|(view_peer, _), _| view_peer != peer);
    }
}

/// Applies one `SyncCommand` from `peer` against `ctx`, returning the
/// outbound `SyncCommand`s the peer should receive in response (§4.3
/// steps 1-5). Errors here are `StoreFailure`s; protocol-level
/// inconsistencies are handled internally and never surface.
pub fn apply_sync_command(
    ctx: &mut SyncContext,
    store: &dyn DocumentStore,
    diff_provider: &dyn DiffProvider,
    peer: &PeerId,
    command: &SyncCommand,
) -> SyncResult<Vec<SyncCommand>> {
    let filename = ClientFilename::new(command.filename.clone());
    let path = AbsolutePath::from_peer_filename(&ctx.paper_root, &command.filename)
        .map_err(SyncError::StoreFailure)?;

    ensure_document(ctx, store, &path, &filename)?;
    let view_key = (peer.clone(), path.clone());
    if !ctx.views.contains_key(&view_key) {
        let initial_text = ctx
            .documents
            .get(&path)
            .map(|doc| doc.text.clone())
            .unwrap_or_default();
        ctx.views.insert(view_key.clone(), DocumentView::new(initial_text));
    }

    // Revision gate (§4.3 step 3).
    {
        let view = ctx
            .views
            .get_mut(&view_key)
            .expect("view was just ensured to exist");
        if command.revision != view.server_shadow_revision
            && command.revision == view.backup_shadow_revision
        {
            view.restore_backup_shadow();
            ctx.touch();
        }
        let view = ctx.views.get_mut(&view_key).expect("view exists");
        view.drop_acknowledged(command.revision);
        view.delta_ok = command.revision == view.server_shadow_revision;
    }

    match &command.action {
        SyncAction::Delta {
            revision,
            edits,
            overwrite,
        } => {
            let touched = apply_delta(ctx, diff_provider, &view_key, peer, &command.filename, *revision, edits, *overwrite);
            if touched {
                ctx.touch();
            }
        }
        SyncAction::Raw {
            revision,
            data,
            overwrite,
        } => {
            apply_raw(ctx, &view_key, *revision, data, *overwrite)?;
            ctx.touch();
        }
        SyncAction::Nullify => {
            apply_nullify(ctx, store, &path)?;
            return Ok(Vec::new());
        }
    }

    let outbound = flush_stack(ctx, diff_provider, &view_key, &command.filename);
    Ok(outbound)
}

fn ensure_document(
    ctx: &mut SyncContext,
    store: &dyn DocumentStore,
    path: &AbsolutePath,
    filename: &ClientFilename,
) -> SyncResult<()> {
    if ctx.documents.contains_key(path) {
        return Ok(());
    }
    let document = match store.load(path, filename) {
        Ok(doc) => doc,
        Err(err) if err.downcast_ref::<NotFound>().is_some() => {
            Document::new(path.clone(), filename.clone(), String::new())
        }
        Err(err) => return Err(SyncError::StoreFailure(err)),
    };
    ctx.documents.insert(path.clone(), document);
    Ok(())
}

/// Applies a `Delta` action (§4.3.1). Returns whether the document text
/// actually changed, which gates the `lastModificationTime` update.
fn apply_delta(
    ctx: &mut SyncContext,
    diff_provider: &dyn DiffProvider,
    view_key: &(PeerId, AbsolutePath),
    peer: &PeerId,
    filename: &str,
    revision: u64,
    edits: &[EditOp],
    overwrite: bool,
) -> bool {
    let view = ctx.views.get_mut(view_key).expect("view exists");

    if !view.delta_ok {
        return false;
    }
    if revision < view.client_shadow_revision {
        return false; // duplicate, drop silently
    }
    if revision > view.client_shadow_revision {
        view.delta_ok = false;
        view.overwrite = overwrite;
        return false;
    }

    let joined_delta_text = EditDeltaParser::edits_to_delta_text(edits);
    let diffs = match diff_provider.diff_from_delta(&view.shadow, &joined_delta_text) {
        Ok(diffs) => diffs,
        Err(err) => {
            warn!(%peer, %filename, error = %err, "rejecting malformed delta");
            view.delta_ok = false;
            view.overwrite = overwrite;
            return false;
        }
    };

    let patch = diff_provider.patch_make(&view.shadow, &diffs);
    let patch_is_empty = patch.is_empty();
    view.shadow = diff_provider.diff_text2(&diffs);
    view.update();
    let new_shadow = view.shadow.clone();

    let document = ctx
        .documents
        .get_mut(&view_key.1)
        .expect("document was ensured to exist before delta processing");
    if overwrite {
        document.text = new_shadow;
    } else {
        let (merged, _results) = diff_provider.patch_apply(&patch, &document.text);
        document.text = merged;
    }

    let view = ctx.views.get_mut(view_key).expect("view exists");
    view.client_shadow_revision += 1;
    view.overwrite = overwrite;

    !patch_is_empty
}

fn apply_raw(
    ctx: &mut SyncContext,
    view_key: &(PeerId, AbsolutePath),
    revision: u64,
    data: &str,
    overwrite: bool,
) -> SyncResult<()> {
    let decoded = decode_uri(data).map_err(|err| SyncError::MalformedDelta {
        peer: view_key.0.to_string(),
        file: view_key.1.to_string(),
        reason: err.to_string(),
    })?;

    let view = ctx.views.get_mut(view_key).expect("view exists");
    let current_server_revision = view.server_shadow_revision;
    view.set_shadow(&decoded, revision, current_server_revision);

    if overwrite {
        let path = &view_key.1;
        if let Some(document) = ctx.documents.get_mut(path) {
            document.text = decoded;
        }
    }
    Ok(())
}

fn apply_nullify(ctx: &mut SyncContext, store: &dyn DocumentStore, path: &AbsolutePath) -> SyncResult<()> {
    store.delete(path).map_err(SyncError::StoreFailure)?;
    ctx.drop_views_for_path(path);
    ctx.documents.remove(path);
    Ok(())
}

/// `flushStack` (§4.3.2): synthesizes the outbound action bringing the
/// peer's shadow up to date, appends it to the view's edit stack, and
/// returns every currently queued action re-wrapped with the filename and
/// the view's post-flush `serverShadowRevision` (scenario 1 in §8: the
/// envelope's revision reflects the *current* flush, while each queued
/// action still carries the revision it was minted with).
fn flush_stack(
    ctx: &mut SyncContext,
    diff_provider: &dyn DiffProvider,
    view_key: &(PeerId, AbsolutePath),
    filename: &str,
) -> Vec<SyncCommand> {
    let document_text = ctx
        .documents
        .get(&view_key.1)
        .map(|doc| doc.text.clone())
        .unwrap_or_default();
    let view = ctx.views.get_mut(view_key).expect("view exists");

    if view.delta_ok {
        let mut diffs = diff_provider.diff_main(&view.shadow, &document_text);
        diff_provider.diff_cleanup_efficiency(&mut diffs);
        let delta_text = diff_provider.diff_to_delta(&diffs);
        let edits_parsed = EditDeltaParser::parse_edits(&delta_text)
            .expect("diff_toDelta output must round-trip through parse_edits");
        view.edits.push_back(SyncCommand {
            filename: filename.to_string(),
            revision: view.server_shadow_revision,
            action: SyncAction::Delta {
                revision: view.server_shadow_revision,
                edits: edits_parsed,
                overwrite: view.overwrite,
            },
        });
        view.server_shadow_revision += 1;
    } else {
        view.client_shadow_revision += 1;
        let action = if document_text.is_empty() {
            SyncAction::Raw {
                revision: view.server_shadow_revision,
                data: String::new(),
                overwrite: false,
            }
        } else {
            SyncAction::Raw {
                revision: view.server_shadow_revision,
                data: encode_uri(&document_text),
                overwrite: true,
            }
        };
        view.edits.push_back(SyncCommand {
            filename: filename.to_string(),
            revision: view.server_shadow_revision,
            action,
        });
    }

    view.shadow = document_text;
    view.changed = true;

    let after_revision = view.server_shadow_revision;
    view.edits
        .iter()
        .map(|cmd| SyncCommand {
            filename: filename.to_string(),
            revision: after_revision,
            action: cmd.action.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_match_patch::TextDiffProvider;
    use crate::document::InMemoryStore;
    use pretty_assertions::assert_eq;

    fn command(filename: &str, revision: u64, action: SyncAction) -> SyncCommand {
        SyncCommand {
            filename: filename.to_string(),
            revision,
            action,
        }
    }

    fn fixture() -> (SyncContext, InMemoryStore, TextDiffProvider, PeerId) {
        // `canonicalize_lexically` only requires the root to be absolute,
        // not to exist, and `InMemoryStore` never touches the filesystem.
        let root = PathBuf::from("/papers/paper1");
        (
            SyncContext::new(root),
            InMemoryStore::new(),
            TextDiffProvider,
            PeerId::new("a"),
        )
    }

    #[test]
    fn scenario_1_join_and_first_raw() {
        let (mut ctx, store, diff, peer) = fixture();
        let cmd = command(
            "f",
            0,
            SyncAction::Raw {
                revision: 0,
                data: "hello".to_string(),
                overwrite: true,
            },
        );
        let outbound = apply_sync_command(&mut ctx, &store, &diff, &peer, &cmd).unwrap();

        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].revision, 1);
        match &outbound[0].action {
            SyncAction::Delta {
                revision,
                edits,
                overwrite,
            } => {
                // Raw already brought the view's shadow in line with the
                // document, so the very next flush has nothing new to
                // report: every op is a `Retain`, none mutate the text.
                // `overwrite` is only ever set by a Delta, never by Raw, so
                // it's still at its initial `false` here.
                assert_eq!(*revision, 0);
                assert!(edits
                    .iter()
                    .all(|op| matches!(op, EditOp::Retain { .. })));
                assert!(!*overwrite);
            }
            other => panic!("expected Delta, got {other:?}"),
        }

        assert!(ctx.documents.values().any(|d| d.text == "hello"));
    }

    #[test]
    fn scenario_2_happy_path_delta() {
        let (mut ctx, store, diff, peer) = fixture();
        apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                0,
                SyncAction::Raw {
                    revision: 0,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            ),
        )
        .unwrap();

        let edits = EditDeltaParser::parse_edits("=5\t+%20world").unwrap();
        let outbound = apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                1,
                SyncAction::Delta {
                    revision: 0,
                    edits,
                    overwrite: false,
                },
            ),
        )
        .unwrap();

        let document = ctx.documents.values().next().unwrap();
        assert_eq!(document.text, "hello world");
        let view = ctx.views.values().next().unwrap();
        assert_eq!(view.shadow, "hello world");
        assert_eq!(view.client_shadow_revision, 1);
        assert!(!outbound.is_empty());
    }

    #[test]
    fn scenario_3_duplicate_delta_is_a_no_op() {
        let (mut ctx, store, diff, peer) = fixture();
        apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                0,
                SyncAction::Raw {
                    revision: 0,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            ),
        )
        .unwrap();

        let edits = EditDeltaParser::parse_edits("=5\t+%20world").unwrap();
        let delta_cmd = command(
            "f",
            1,
            SyncAction::Delta {
                revision: 0,
                edits,
                overwrite: false,
            },
        );
        apply_sync_command(&mut ctx, &store, &diff, &peer, &delta_cmd).unwrap();
        apply_sync_command(&mut ctx, &store, &diff, &peer, &delta_cmd).unwrap();

        let document = ctx.documents.values().next().unwrap();
        assert_eq!(document.text, "hello world");
    }

    #[test]
    fn scenario_4_lost_response_recovers_via_backup_shadow() {
        let (mut ctx, store, diff, peer) = fixture();
        apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                0,
                SyncAction::Raw {
                    revision: 0,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            ),
        )
        .unwrap();

        let edits = EditDeltaParser::parse_edits("=5\t+%20world").unwrap();
        let delta_cmd = command(
            "f",
            1,
            SyncAction::Delta {
                revision: 0,
                edits,
                overwrite: false,
            },
        );
        apply_sync_command(&mut ctx, &store, &diff, &peer, &delta_cmd).unwrap();

        // The peer never saw our response to `delta_cmd` and retransmits it
        // unchanged: its outer revision (1) no longer matches
        // `server_shadow_revision` (2), but it does match
        // `backup_shadow_revision` (1), so the engine rewinds to that backup
        // shadow instead of treating the resend as a future/desynced delta.
        let view_before = ctx.views.values().next().unwrap().clone();
        assert_eq!(view_before.server_shadow_revision, 2);
        assert_eq!(view_before.backup_shadow_revision, 1);

        apply_sync_command(&mut ctx, &store, &diff, &peer, &delta_cmd).unwrap();

        let document = ctx.documents.values().next().unwrap();
        assert_eq!(document.text, "hello world");
        let view = ctx.views.values().next().unwrap();
        assert_eq!(view.shadow, "hello world");
    }

    #[test]
    fn scenario_5_malformed_delta_triggers_raw_resync() {
        let (mut ctx, store, diff, peer) = fixture();
        apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                0,
                SyncAction::Raw {
                    revision: 0,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            ),
        )
        .unwrap();

        let bad_edits = vec![EditOp::Retain { count: 999 }];
        let outbound = apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                1,
                SyncAction::Delta {
                    revision: 0,
                    edits: bad_edits,
                    overwrite: false,
                },
            ),
        )
        .unwrap();

        let document = ctx.documents.values().next().unwrap();
        assert_eq!(document.text, "hello");
        assert_eq!(outbound.len(), 1);
        match &outbound[0].action {
            SyncAction::Raw { overwrite, .. } => assert!(*overwrite),
            other => panic!("expected Raw resync, got {other:?}"),
        }
    }

    #[test]
    fn nullify_removes_document_and_views() {
        let (mut ctx, store, diff, peer) = fixture();
        apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command(
                "f",
                0,
                SyncAction::Raw {
                    revision: 0,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            ),
        )
        .unwrap();

        let outbound = apply_sync_command(
            &mut ctx,
            &store,
            &diff,
            &peer,
            &command("f", 1, SyncAction::Nullify),
        )
        .unwrap();

        assert!(outbound.is_empty());
        assert!(ctx.documents.is_empty());
        assert!(ctx.views.is_empty());
    }
}
