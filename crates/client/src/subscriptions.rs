//! Subscription manager.
//!
//! Subscriptions are deduplicated by structural equality of their name and
//! parameters: subscribing twice to the same publication shares one server
//! subscription and hands out two reference-counted handles. The server
//! subscription is stopped when the last handle is released.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use strand_core::{Error, Result, SubscriptionId, Value};
use strand_protocol::{ClientMessage, MethodError};

/// Caller-side token for one `subscribe` call.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
}

impl SubscriptionHandle {
    /// The shared server subscription behind this handle.
    #[inline]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }
}

type ReadyCallback = Box<dyn FnOnce()>;

struct Entry {
    name: String,
    params: Value,
    refs: usize,
    ready: bool,
    last_seq: u64,
    error: Option<MethodError>,
    on_ready: Vec<ReadyCallback>,
}

/// Reference-counted, deduplicated subscriptions.
#[derive(Default)]
pub struct SubscriptionManager {
    entries: BTreeMap<SubscriptionId, Entry>,
    by_key: HashMap<(String, Value), SubscriptionId>,
    next_id: u64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle and whether a new server subscription is needed.
    pub fn subscribe(&mut self, name: &str, params: Value) -> (SubscriptionHandle, bool) {
        let key = (name.to_string(), params);
        if let Some(id) = self.by_key.get(&key) {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.refs += 1;
                tracing::debug!(sub = %id, refs = entry.refs, publication = name, "subscription shared");
                return (SubscriptionHandle { id: id.clone() }, false);
            }
        }

        self.next_id += 1;
        let id = SubscriptionId::new(format!("s{}", self.next_id));
        let (name, params) = key;
        self.by_key.insert((name.clone(), params.clone()), id.clone());
        self.entries.insert(
            id.clone(),
            Entry {
                name,
                params,
                refs: 1,
                ready: false,
                last_seq: 0,
                error: None,
                on_ready: Vec::new(),
            },
        );
        (SubscriptionHandle { id }, true)
    }

    /// Releases a handle. Returns true when it was the last one and the
    /// subscription is gone.
    ///
    /// Consumes the handle, so each `subscribe` releases exactly once.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let Some(entry) = self.entries.get_mut(&handle.id) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return false;
        }
        if let Some(entry) = self.entries.remove(&handle.id) {
            self.by_key.remove(&(entry.name, entry.params));
        }
        true
    }

    pub fn is_ready(&self, handle: &SubscriptionHandle) -> bool {
        self.entries.get(&handle.id).is_some_and(|e| e.ready)
    }

    /// Runs `callback` once the subscription is ready; immediately if it
    /// already is.
    pub fn on_ready<F>(&mut self, handle: &SubscriptionHandle, callback: F)
    where
        F: FnOnce() + 'static,
    {
        match self.entries.get_mut(&handle.id) {
            Some(entry) if entry.ready => callback(),
            Some(entry) => entry.on_ready.push(Box::new(callback)),
            None => {}
        }
    }

    /// Records `ready` from the server. Returns false for unknown ids.
    pub fn mark_ready(&mut self, id: &SubscriptionId) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.ready = true;
        for callback in entry.on_ready.drain(..) {
            callback();
        }
        true
    }

    /// Connection lost: nothing is ready and sequences restart.
    pub fn mark_all_not_ready(&mut self) {
        for entry in self.entries.values_mut() {
            entry.ready = false;
            entry.last_seq = 0;
        }
    }

    /// True once every live subscription has reported ready.
    pub fn all_ready(&self) -> bool {
        self.entries
            .values()
            .filter(|e| e.error.is_none())
            .all(|e| e.ready)
    }

    /// Checks the sequence number of a data message.
    ///
    /// Returns `Ok(false)` for subscriptions this client no longer holds.
    /// Under strict sequencing every message must be exactly one past the
    /// last; otherwise it must only move forward.
    pub fn accept_seq(&mut self, id: &SubscriptionId, seq: u64, strict: bool) -> Result<bool> {
        let Some(entry) = self.entries.get_mut(id) else {
            return Ok(false);
        };
        let in_order = if strict {
            seq == entry.last_seq + 1
        } else {
            seq > entry.last_seq
        };
        if !in_order {
            return Err(Error::protocol_violation(format!(
                "subscription {id} got seq {seq} after {}",
                entry.last_seq
            )));
        }
        entry.last_seq = seq;
        Ok(true)
    }

    /// Records a `nosub` for the subscription.
    pub fn fail(&mut self, id: &SubscriptionId, error: MethodError) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.ready = false;
        entry.on_ready.clear();
        entry.error = Some(error);
        true
    }

    pub fn error(&self, handle: &SubscriptionHandle) -> Option<&MethodError> {
        self.entries.get(&handle.id).and_then(|e| e.error.as_ref())
    }

    /// The `sub` message that starts `id` on the server.
    pub fn subscribe_message(&self, id: &SubscriptionId) -> Option<ClientMessage> {
        self.entries.get(id).map(|entry| ClientMessage::Sub {
            id: id.clone(),
            name: entry.name.clone(),
            params: entry.params.clone(),
        })
    }

    /// `sub` messages for every held subscription that has not failed.
    pub fn resubscribe_messages(&self) -> Vec<ClientMessage> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.error.is_none())
            .filter_map(|(id, _)| self.subscribe_message(id))
            .collect()
    }

    pub fn active_ids(&self) -> Vec<SubscriptionId> {
        self.entries.keys().cloned().collect()
    }

    #[inline]
    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of distinct server subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
