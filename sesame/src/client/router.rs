// sesame-os3/sesame/src/client/router.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

use sesame_proto::{ItemCode, Packet};

/// What [`Router::resolve`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Delivered,
    /// Consumed by a request that already gave up waiting.
    Discarded,
    Unmatched,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    tx: oneshot::Sender<Packet>,
}

/// Pairs incoming packets with the requests waiting for them.
///
/// Waiters are kept per item code in send order and every response
/// consumes the oldest one. A waiter whose receiver was dropped after its
/// command went out stays queued and swallows the late response, so the
/// next request for the same item never sees an answer meant for an
/// earlier one. Requests that never reached the lock are cancelled
/// instead. Once closed, no new request is accepted.
#[derive(Debug, Default)]
pub(crate) struct Router {
    next_id: u64,
    waiters: HashMap<ItemCode, VecDeque<Waiter>>,
    closed: bool,
}

impl Router {
    /// Returns the waiter id and its receiver, or `None` once closed.
    pub(crate) fn register(&mut self, item: ItemCode) -> Option<(u64, oneshot::Receiver<Packet>)> {
        if self.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.waiters.entry(item).or_default().push_back(Waiter { id, tx });
        Some((id, rx))
    }

    /// Removes a waiter whose command was never sent.
    pub(crate) fn cancel(&mut self, item: ItemCode, id: u64) {
        if let Some(queue) = self.waiters.get_mut(&item) {
            queue.retain(|waiter| waiter.id != id);
            if queue.is_empty() {
                self.waiters.remove(&item);
            }
        }
    }

    /// Hands `packet` to the oldest waiter for its item code.
    pub(crate) fn resolve(&mut self, packet: &Packet) -> Resolution {
        let Some(queue) = self.waiters.get_mut(&packet.item) else {
            return Resolution::Unmatched;
        };
        let resolution = match queue.pop_front() {
            Some(waiter) => match waiter.tx.send(packet.clone()) {
                Ok(()) => Resolution::Delivered,
                Err(_) => Resolution::Discarded,
            },
            None => Resolution::Unmatched,
        };
        if queue.is_empty() {
            self.waiters.remove(&packet.item);
        }
        resolution
    }

    /// Requests for `item` still listening for their response.
    pub(crate) fn pending(&self, item: ItemCode) -> usize {
        self.waiters
            .get(&item)
            .map_or(0, |queue| queue.iter().filter(|w| !w.tx.is_closed()).count())
    }

    /// Drops every waiter and refuses new ones; receivers observe a closed channel.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
