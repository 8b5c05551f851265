// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The error taxonomy callers can match on. Protocol-level inconsistencies
//! (`ProtocolDesync`, `MalformedDelta`) are self-healing inside the state
//! machine and rarely need to surface this far, but are kept distinguishable
//! from `StoreFailure`/`Stopped` so a caller's retry policy can tell "the
//! protocol will repair itself" from "this paper is gone".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Revision mismatch that could not be recovered via the backup shadow.
    /// Non-fatal: the state machine downgrades to a `Raw` resync on the next
    /// flush rather than failing the request.
    #[error("protocol desync for {peer}/{file}: client revision {revision} unreachable from server state")]
    ProtocolDesync {
        peer: String,
        file: String,
        revision: u64,
    },

    /// `diff_fromDelta` rejected a delta; the delta is ignored and no
    /// document mutation happens.
    #[error("malformed delta for {peer}/{file}: {reason}")]
    MalformedDelta {
        peer: String,
        file: String,
        reason: String,
    },

    /// I/O error surfaced from a `DocumentStore` operation.
    #[error("document store failure: {0}")]
    StoreFailure(#[from] anyhow::Error),

    /// The paper agent has received `Stop` and will not process further
    /// requests.
    #[error("synchronization stopped for this paper")]
    Stopped,

    /// A request variant the agent does not know how to handle. Reaching
    /// this is a programmer error.
    #[error("unknown request")]
    UnknownRequest,
}

pub type SyncResult<T> = Result<T, SyncError>;
