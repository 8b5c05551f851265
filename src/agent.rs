// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `PaperAgent` (§4.1): a single-writer task owning one paper's
//! `SyncContext`. Callers get a cheaply cloneable handle and talk to the
//! actor over a request channel, the same split the daemon's per-document
//! actor uses (`DaemonActor`/`Daemon` in `daemon.rs`): a typed request
//! enum, one reply channel per request, and a single task draining the
//! channel in arrival order.

use crate::diff_match_patch::DiffProvider;
use crate::document::DocumentStore;
use crate::error::{SyncError, SyncResult};
use crate::ids::PeerId;
use crate::messages::SyncItem;
use crate::sync_machine::{apply_sync_command, SyncContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

enum AgentRequest {
    Join {
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    Part {
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    SyncSession {
        peer: PeerId,
        items: Vec<SyncItem>,
        reply: oneshot::Sender<SyncResult<Vec<SyncItem>>>,
    },
    PersistPaper {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    LastModificationDate {
        reply: oneshot::Sender<time::OffsetDateTime>,
    },
    Stop {
        reply: oneshot::Sender<SyncResult<()>>,
    },
}

/// A cheaply cloneable handle to a running paper agent. Every method sends
/// one request and awaits its one reply; callers impose their own timeouts
/// (§5 "cancellation and timeouts").
#[derive(Clone)]
pub struct PaperAgent {
    sender: mpsc::Sender<AgentRequest>,
}

impl PaperAgent {
    /// Spawns the actor task and returns a handle to it. The task runs
    /// until `stop()` is called or every handle is dropped.
    pub fn spawn(
        paper_root: PathBuf,
        store: Arc<dyn DocumentStore>,
        diff_provider: Arc<dyn DiffProvider>,
    ) -> Self {
        Self::spawn_with_options(paper_root, store, diff_provider, true)
    }

    /// Like [`Self::spawn`], but lets the caller opt out of persisting
    /// documents when `stop()` is handled (`AppConfig::persist_on_stop`).
    pub fn spawn_with_options(
        paper_root: PathBuf,
        store: Arc<dyn DocumentStore>,
        diff_provider: Arc<dyn DiffProvider>,
        persist_on_stop: bool,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(64);
        let actor = PaperAgentActor {
            context: SyncContext::new(paper_root),
            store,
            diff_provider,
            receiver,
            persist_on_stop,
        };
        tokio::spawn(actor.run());
        Self { sender }
    }

    pub async fn join(&self, peer: PeerId) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::Join { peer, reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    pub async fn part(&self, peer: PeerId) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::Part { peer, reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    pub async fn sync_session(
        &self,
        peer: PeerId,
        items: Vec<SyncItem>,
    ) -> SyncResult<Vec<SyncItem>> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::SyncSession { peer, items, reply })
            .await?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    pub async fn persist_paper(&self) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::PersistPaper { reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    pub async fn last_modification_date(&self) -> SyncResult<time::OffsetDateTime> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::LastModificationDate { reply })
            .await?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    pub async fn stop(&self) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentRequest::Stop { reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    async fn send(&self, request: AgentRequest) -> SyncResult<()> {
        self.sender.send(request).await.map_err(|_| SyncError::Stopped)
    }
}

struct PaperAgentActor {
    context: SyncContext,
    store: Arc<dyn DocumentStore>,
    diff_provider: Arc<dyn DiffProvider>,
    receiver: mpsc::Receiver<AgentRequest>,
    persist_on_stop: bool,
}

impl PaperAgentActor {
    /// Drains requests in arrival order until `Stop` is handled. Breaking
    /// out drops `receiver`, which in turn drops every reply channel for
    /// requests still queued behind it — their senders see that as a
    /// closed channel and surface it as `SyncError::Stopped`, which is
    /// exactly the "fail fast" contract §5 asks for, with no separate
    /// draining state to track.
    async fn run(mut self) {
        while let Some(request) = self.receiver.recv().await {
            let should_stop = self.handle(request);
            if should_stop {
                break;
            }
        }
        debug!("paper agent task exiting");
    }

    /// Handles one request, returning whether the actor should stop
    /// accepting further work after this.
    fn handle(&mut self, request: AgentRequest) -> bool {
        match request {
            AgentRequest::Join { peer, reply } => {
                self.context.mailboxes.join(&peer);
                let _ = reply.send(());
                false
            }
            AgentRequest::Part { peer, reply } => {
                self.context.mailboxes.part(&peer);
                self.context.drop_views_for_peer(&peer);
                let _ = reply.send(());
                false
            }
            AgentRequest::SyncSession { peer, items, reply } => {
                let result = self.handle_sync_session(&peer, items);
                let _ = reply.send(result);
                false
            }
            AgentRequest::PersistPaper { reply } => {
                let result = self.persist_all();
                let _ = reply.send(result);
                false
            }
            AgentRequest::LastModificationDate { reply } => {
                let _ = reply.send(self.context.last_modification_time);
                false
            }
            AgentRequest::Stop { reply } => {
                let result = if self.persist_on_stop {
                    info!("stopping paper agent, persisting documents");
                    self.persist_all()
                } else {
                    info!("stopping paper agent without persisting documents");
                    Ok(())
                };
                let _ = reply.send(result);
                true
            }
        }
    }

    /// §4.1 `SyncSession`: processes each item in order, fanning out
    /// `Message`s and routing `SyncCommand`s through the state machine,
    /// then appends the peer's pending mailbox. A mid-batch failure aborts
    /// the remaining items but keeps whatever already mutated `context`.
    fn handle_sync_session(&mut self, peer: &PeerId, items: Vec<SyncItem>) -> SyncResult<Vec<SyncItem>> {
        let mut response_items = Vec::new();
        for item in items {
            match item {
                SyncItem::Message(message) => {
                    self.context.mailboxes.broadcast(peer, message);
                }
                SyncItem::SyncCommand(command) => {
                    let outbound = apply_sync_command(
                        &mut self.context,
                        self.store.as_ref(),
                        self.diff_provider.as_ref(),
                        peer,
                        &command,
                    )?;
                    response_items.extend(outbound.into_iter().map(SyncItem::SyncCommand));
                }
            }
        }
        let pending = self.context.mailboxes.drain(peer);
        response_items.extend(pending.into_iter().map(SyncItem::Message));
        Ok(response_items)
    }

    fn persist_all(&self) -> SyncResult<()> {
        for document in self.context.documents.values() {
            self.store.save(document).map_err(SyncError::StoreFailure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_match_patch::TextDiffProvider;
    use crate::document::InMemoryStore;
    use crate::messages::{SyncAction, SyncCommand};
    use tracing_test::traced_test;

    fn spawn_agent() -> PaperAgent {
        PaperAgent::spawn(
            PathBuf::from("/papers/paper1"),
            Arc::new(InMemoryStore::new()),
            Arc::new(TextDiffProvider),
        )
    }

    #[tokio::test]
    async fn join_then_sync_session_returns_outbound_commands() {
        let agent = spawn_agent();
        let peer = PeerId::new("a");
        agent.join(peer.clone()).await.unwrap();

        let items = vec![SyncItem::SyncCommand(SyncCommand {
            filename: "f".into(),
            revision: 0,
            action: SyncAction::Raw {
                revision: 0,
                data: "hello".into(),
                overwrite: true,
            },
        })];
        let response = agent.sync_session(peer, items).await.unwrap();
        assert_eq!(response.len(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn part_then_stop_persists_and_then_rejects() {
        let agent = spawn_agent();
        let peer = PeerId::new("a");
        agent.join(peer.clone()).await.unwrap();
        agent.part(peer).await.unwrap();
        agent.stop().await.unwrap();

        let err = agent.join(PeerId::new("b")).await.unwrap_err();
        assert!(matches!(err, SyncError::Stopped));
    }

    #[tokio::test]
    async fn broadcast_message_is_delivered_to_other_peer() {
        let agent = spawn_agent();
        let (a, b) = (PeerId::new("a"), PeerId::new("b"));
        agent.join(a.clone()).await.unwrap();
        agent.join(b.clone()).await.unwrap();

        agent
            .sync_session(
                a,
                vec![SyncItem::Message(crate::messages::Message {
                    payload: serde_json::json!({"hi": true}),
                })],
            )
            .await
            .unwrap();

        let response = agent.sync_session(b, vec![]).await.unwrap();
        assert_eq!(response.len(), 1);
        assert!(matches!(response[0], SyncItem::Message(_)));
    }

    #[tokio::test]
    async fn last_modification_date_is_queryable() {
        let agent = spawn_agent();
        let before = time::OffsetDateTime::now_utc();
        let reported = agent.last_modification_date().await.unwrap();
        assert!(reported <= time::OffsetDateTime::now_utc());
        assert!(reported >= before - time::Duration::seconds(5));
    }
}
