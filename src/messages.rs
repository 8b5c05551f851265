// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire types for the external interface (§6): the inbound/outbound
//! `SyncSession` envelope and the tagged `SyncAction`/`SyncItem` sums
//! carried inside it. These mirror the editor-facing JSON-RPC types in the
//! daemon's `editor_protocol.rs`, but describe the session/paper transport
//! rather than an editor plugin protocol.

use crate::diff_match_patch::EditOp;
use crate::ids::{PaperId, PeerId};
use serde::{Deserialize, Serialize};

/// A peer-to-peer broadcast payload. The engine never interprets its
/// contents; it only fans it out via the `MessageBus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: serde_json::Value,
}

/// One synchronization action against a single file (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncAction {
    Delta {
        revision: u64,
        edits: Vec<EditOp>,
        overwrite: bool,
    },
    Raw {
        revision: u64,
        data: String,
        overwrite: bool,
    },
    Nullify,
}

/// A `SyncAction` addressed at a file, as exchanged in either direction of
/// a `SyncSession` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCommand {
    pub filename: String,
    pub revision: u64,
    pub action: SyncAction,
}

/// One element of a `SyncSession`'s `items` list: either a peer broadcast
/// or a file-scoped sync command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SyncItem {
    Message(Message),
    SyncCommand(SyncCommand),
}

/// The request/response envelope (§6). The same shape serves both
/// directions; requests carry items a peer is pushing, responses carry the
/// outbound `SyncCommand`s plus that peer's pending mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    pub peer: PeerId,
    pub paper: PaperId,
    pub items: Vec<SyncItem>,
}
