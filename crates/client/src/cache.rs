//! Client-side document cache.
//!
//! The cache keeps two layers. The authoritative layer holds what the server
//! published, with the set of subscriptions that own each document. The
//! optimistic layer is an ordered list of patches from local method
//! simulations. Reads see the view: authoritative fields with every patch
//! applied on top, in call order.
//!
//! Every mutation recomputes the view for the documents it touched and
//! notifies observers with the view-level `ChangeEvent`s. When a layer
//! changes but the view does not, observers hear nothing.

use crate::patch::{OptimisticPatch, PatchState};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strand_core::{
    ChangeEvent, CorrelationId, Document, DocumentId, Error, FieldDelta, Fields, Query, Result,
    SubscriptionId,
};

/// Handle returned by `ClientCache::observe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type ViewObserver = Box<dyn Fn(&ChangeEvent)>;

#[derive(Clone, Debug, Default)]
struct ServerDoc {
    fields: Fields,
    owners: BTreeSet<SubscriptionId>,
    /// Owners from before a reconnect that have not re-published it yet.
    stale: BTreeSet<SubscriptionId>,
}

impl ServerDoc {
    fn disown(&mut self, sub: &SubscriptionId) {
        self.owners.remove(sub);
        self.stale.remove(sub);
    }

    fn is_orphaned(&self) -> bool {
        self.owners.is_empty() && self.stale.is_empty()
    }
}

/// Authoritative documents plus optimistic patches.
#[derive(Default)]
pub struct ClientCache {
    server: BTreeMap<DocumentId, ServerDoc>,
    patches: Vec<OptimisticPatch>,
    view: BTreeMap<DocumentId, Fields>,
    observers: BTreeMap<ObserverId, ViewObserver>,
    next_observer: u64,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a query over the current view.
    pub fn find(&self, query: &Query) -> Vec<Document> {
        let docs: Vec<Document> = self
            .view
            .iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();
        query.evaluate(&docs)
    }

    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.view
            .get(id)
            .map(|fields| Document::new(id.clone(), fields.clone()))
    }

    #[inline]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.view.contains_key(id)
    }

    /// Number of documents in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.view.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Fields of the authoritative layer only.
    pub fn server_fields(&self, id: &DocumentId) -> Option<&Fields> {
        self.server.get(id).map(|doc| &doc.fields)
    }

    /// Number of patches still layered over the authoritative data.
    #[inline]
    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    /// True while some patch still refers to `id`.
    pub fn is_pinned(&self, id: &DocumentId) -> bool {
        self.patches.iter().any(|patch| patch.touches(id))
    }

    /// Registers a callback for view changes.
    pub fn observe<F>(&mut self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.insert(id, Box::new(callback));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Applies an authoritative event published by subscription `sub`.
    pub fn apply_event(&mut self, sub: &SubscriptionId, event: ChangeEvent) -> Result<()> {
        let id = event.id().clone();
        match event {
            ChangeEvent::Added { fields, .. } => {
                let doc = self.server.entry(id.clone()).or_default();
                doc.stale.remove(sub);
                let shared = doc.owners.iter().any(|owner| owner != sub);
                if shared {
                    doc.fields.extend(fields);
                } else {
                    doc.fields = fields;
                }
                doc.owners.insert(sub.clone());
            }
            ChangeEvent::Changed { delta, .. } => {
                let doc = self.server.get_mut(&id).ok_or_else(|| {
                    Error::protocol_violation(format!("changed for unknown document {id}"))
                })?;
                delta.apply_to(&mut doc.fields);
            }
            ChangeEvent::Removed { .. } => {
                let doc = self.server.get_mut(&id).ok_or_else(|| {
                    Error::protocol_violation(format!("removed for unknown document {id}"))
                })?;
                doc.disown(sub);
                if doc.is_orphaned() {
                    self.server.remove(&id);
                }
            }
        }

        for patch in &mut self.patches {
            patch.supersede(&id);
        }
        self.patches
            .retain(|patch| !(patch.state() == PatchState::Committed && patch.is_empty()));
        self.refresh(&id);
        Ok(())
    }

    /// Layers a simulated patch over the view.
    pub fn apply_patch(&mut self, patch: OptimisticPatch) {
        let targets = patch.targets();
        self.patches.push(patch);
        for id in &targets {
            self.refresh(id);
        }
    }

    /// Marks the patch of a successful call as committed.
    ///
    /// When the call inserted one document under a local id and `server_id`
    /// names a different one, the insert moves to that id.
    pub fn commit(&mut self, correlation: CorrelationId, server_id: Option<&DocumentId>) -> bool {
        let Some(patch) = self.patches.iter_mut().find(|p| p.correlation() == correlation) else {
            return false;
        };
        patch.commit();
        let Some(server_id) = server_id else {
            return true;
        };
        if let Some(temporary) = patch.rebind_insert(server_id) {
            tracing::debug!(%correlation, %temporary, %server_id, "rebound optimistic insert");
            self.refresh(&temporary);
            self.refresh(server_id);
        }
        true
    }

    /// Undoes the patch of a failed call.
    pub fn rollback(&mut self, correlation: CorrelationId) -> bool {
        let removed = self.remove_patch(correlation);
        if removed {
            tracing::debug!(%correlation, "rolled back optimistic patch");
        }
        removed
    }

    /// Drops the patch of a call whose writes have all arrived.
    pub fn discard(&mut self, correlation: CorrelationId) -> bool {
        self.remove_patch(correlation)
    }

    fn remove_patch(&mut self, correlation: CorrelationId) -> bool {
        let Some(index) = self.patches.iter().position(|p| p.correlation() == correlation) else {
            return false;
        };
        let patch = self.patches.remove(index);
        for id in patch.targets() {
            if self.server.get(&id).is_some_and(ServerDoc::is_orphaned) && !self.is_pinned(&id) {
                self.server.remove(&id);
            }
            self.refresh(&id);
        }
        true
    }

    /// Releases every document `sub` owns. Documents no longer owned by any
    /// subscription leave the cache unless a patch still refers to them.
    pub fn evict_subscription(&mut self, sub: &SubscriptionId) {
        let owned: Vec<DocumentId> = self
            .server
            .iter()
            .filter(|(_, doc)| doc.owners.contains(sub) || doc.stale.contains(sub))
            .map(|(id, _)| id.clone())
            .collect();
        for id in owned {
            self.release(&id, |doc| doc.disown(sub));
        }
    }

    /// Marks everything `sub` owns as awaiting re-publication.
    pub fn mark_stale(&mut self, sub: &SubscriptionId) {
        for doc in self.server.values_mut() {
            if doc.owners.remove(sub) {
                doc.stale.insert(sub.clone());
            }
        }
    }

    /// Drops what `sub` owned before a reconnect but did not publish again.
    pub fn sweep_stale(&mut self, sub: &SubscriptionId) {
        let stale: Vec<DocumentId> = self
            .server
            .iter()
            .filter(|(_, doc)| doc.stale.contains(sub))
            .map(|(id, _)| id.clone())
            .collect();
        if !stale.is_empty() {
            tracing::debug!(%sub, documents = stale.len(), "sweeping stale documents");
        }
        for id in stale {
            self.release(&id, |doc| {
                doc.stale.remove(sub);
            });
        }
    }

    fn release(&mut self, id: &DocumentId, disown: impl FnOnce(&mut ServerDoc)) {
        let pinned = self.is_pinned(id);
        if let Some(doc) = self.server.get_mut(id) {
            disown(doc);
            if doc.is_orphaned() && !pinned {
                self.server.remove(id);
            }
        }
        self.refresh(id);
    }

    /// Recomputes the view of one document and notifies on a difference.
    fn refresh(&mut self, id: &DocumentId) {
        let base = self.server.get(id).map(|doc| doc.fields.clone());
        let next = self
            .patches
            .iter()
            .fold(base, |current, patch| patch.layer(id, current));

        let event = match (self.view.get(id), next) {
            (None, None) => None,
            (None, Some(fields)) => {
                self.view.insert(id.clone(), fields.clone());
                Some(ChangeEvent::Added { id: id.clone(), fields })
            }
            (Some(_), None) => {
                self.view.remove(id);
                Some(ChangeEvent::Removed { id: id.clone() })
            }
            (Some(current), Some(fields)) => {
                let delta = FieldDelta::between(current, &fields);
                if delta.is_empty() {
                    None
                } else {
                    self.view.insert(id.clone(), fields);
                    Some(ChangeEvent::Changed { id: id.clone(), delta })
                }
            }
        };

        if let Some(event) = event {
            for observer in self.observers.values() {
                observer(&event);
            }
        }
    }
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("documents", &self.server.len())
            .field("patches", &self.patches.len())
            .field("view", &self.view.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
