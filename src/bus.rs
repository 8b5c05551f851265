// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `MessageBus` (§4.4): per-paper in-memory peer mailbox fan-out. Lives as
//! a plain field inside `SyncContext` rather than a separate task — there
//! is nothing here that needs to suspend, and the paper agent already
//! serializes every call into it.

use crate::ids::PeerId;
use crate::messages::Message;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct Mailboxes {
    queues: HashMap<PeerId, VecDeque<Message>>,
}

impl Mailboxes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `peer` has a mailbox (empty if new). Idempotent.
    pub fn join(&mut self, peer: &PeerId) {
        self.queues.entry(peer.clone()).or_default();
    }

    /// Removes `peer`'s mailbox entirely. Idempotent.
    pub fn part(&mut self, peer: &PeerId) {
        self.queues.remove(peer);
    }

    /// Prepends `message` to every *other* known peer's mailbox. The
    /// sender's own mailbox is untouched.
    pub fn broadcast(&mut self, from: &PeerId, message: Message) {
        for (peer, queue) in &mut self.queues {
            if peer != from {
                queue.push_front(message.clone());
            }
        }
    }

    /// Drains `peer`'s mailbox, returning its contents in stored order
    /// (most recently broadcast message first, since broadcast prepends).
    /// The mailbox is left empty but still present if `peer` was known.
    pub fn drain(&mut self, peer: &PeerId) -> Vec<Message> {
        match self.queues.get_mut(peer) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn knows(&self, peer: &PeerId) -> bool {
        self.queues.contains_key(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u8) -> Message {
        Message {
            payload: serde_json::json!({ "n": n }),
        }
    }

    #[test]
    fn join_is_idempotent_and_creates_empty_mailbox() {
        let mut bus = Mailboxes::new();
        let a = PeerId::new("a");
        bus.join(&a);
        bus.join(&a);
        assert!(bus.knows(&a));
        assert_eq!(bus.drain(&a), Vec::new());
    }

    #[test]
    fn broadcast_skips_sender_and_reaches_others() {
        let mut bus = Mailboxes::new();
        let (a, b, c) = (PeerId::new("a"), PeerId::new("b"), PeerId::new("c"));
        bus.join(&a);
        bus.join(&b);
        bus.join(&c);

        bus.broadcast(&a, msg(1));

        assert_eq!(bus.drain(&a), Vec::new());
        assert_eq!(bus.drain(&b), vec![msg(1)]);
        assert_eq!(bus.drain(&c), vec![msg(1)]);
    }

    #[test]
    fn later_broadcasts_are_seen_first() {
        let mut bus = Mailboxes::new();
        let (a, b) = (PeerId::new("a"), PeerId::new("b"));
        bus.join(&a);
        bus.join(&b);

        bus.broadcast(&a, msg(1));
        bus.broadcast(&a, msg(2));

        assert_eq!(bus.drain(&b), vec![msg(2), msg(1)]);
    }

    #[test]
    fn drain_empties_the_mailbox() {
        let mut bus = Mailboxes::new();
        let (a, b) = (PeerId::new("a"), PeerId::new("b"));
        bus.join(&a);
        bus.join(&b);
        bus.broadcast(&a, msg(1));
        bus.drain(&b);
        assert_eq!(bus.drain(&b), Vec::new());
    }

    #[test]
    fn part_removes_mailbox() {
        let mut bus = Mailboxes::new();
        let a = PeerId::new("a");
        bus.join(&a);
        bus.part(&a);
        assert!(!bus.knows(&a));
    }
}
