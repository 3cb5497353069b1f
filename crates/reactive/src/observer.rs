//! Observer registry and change routing.
//!
//! This module provides `ObserverRegistry`, which owns one `Observer` per
//! active subscription and routes every store change to all of them in a
//! deterministic order. Each observer stamps its events with a
//! per-subscription sequence number starting at 1.

use crate::change_set::ChangeSet;
use crate::live_query::LiveQuery;
use std::collections::BTreeMap;
use strand_core::{ChangeEvent, ConnectionId, SubscriptionId};
use strand_storage::{DocumentStore, StoreChange};

/// Globally unique key of a subscription: connection plus client-chosen id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub connection: ConnectionId,
    pub id: SubscriptionId,
}

impl SubscriptionKey {
    pub fn new(connection: ConnectionId, id: SubscriptionId) -> Self {
        Self { connection, id }
    }
}

/// A change event with its per-subscription sequence number.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequenced {
    pub seq: u64,
    pub event: ChangeEvent,
}

/// The live query behind one subscription.
#[derive(Debug)]
pub struct Observer {
    live: LiveQuery,
    next_seq: u64,
}

impl Observer {
    pub fn new(live: LiveQuery) -> Self {
        Self { live, next_seq: 1 }
    }

    #[inline]
    pub fn live(&self) -> &LiveQuery {
        &self.live
    }

    /// Stamps a batch of changes with consecutive sequence numbers.
    pub fn sequence(&mut self, changes: ChangeSet) -> Vec<Sequenced> {
        changes
            .into_iter()
            .map(|event| {
                let seq = self.next_seq;
                self.next_seq += 1;
                Sequenced { seq, event }
            })
            .collect()
    }
}

/// Registry of observers keyed by subscription.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observers: BTreeMap<SubscriptionKey, Observer>,
}

impl ObserverRegistry {
    /// Creates a new observer registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. Returns false if the key is already taken.
    pub fn register(&mut self, key: SubscriptionKey, observer: Observer) -> bool {
        if self.observers.contains_key(&key) {
            return false;
        }
        self.observers.insert(key, observer);
        true
    }

    /// Unregisters an observer by key.
    ///
    /// Returns true if the observer was found and removed.
    pub fn unregister(&mut self, key: &SubscriptionKey) -> bool {
        self.observers.remove(key).is_some()
    }

    /// Drops every observer owned by a connection, returning how many.
    pub fn unregister_connection(&mut self, connection: ConnectionId) -> usize {
        let before = self.observers.len();
        self.observers.retain(|key, _| key.connection != connection);
        before - self.observers.len()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.observers.contains_key(key)
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&Observer> {
        self.observers.get(key)
    }

    /// Returns the number of registered observers.
    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Routes one store change to every observer.
    ///
    /// An observer whose re-evaluation fails emits nothing for this change.
    pub fn dispatch(
        &mut self,
        change: &StoreChange,
        store: &dyn DocumentStore,
    ) -> Vec<(SubscriptionKey, Vec<Sequenced>)> {
        let mut routed = Vec::new();
        for (key, observer) in &mut self.observers {
            match observer.live.on_store_change(change, store) {
                Ok(changes) if changes.is_empty() => {}
                Ok(changes) => routed.push((key.clone(), observer.sequence(changes))),
                Err(error) => {
                    tracing::warn!(
                        connection = %key.connection,
                        sub = %key.id,
                        seq = change.seq,
                        %error,
                        "live query re-evaluation failed"
                    );
                }
            }
        }
        routed
    }
}
