//! Live query implementation.
//!
//! A `LiveQuery` holds the current membership of one query's result set and
//! turns each `StoreChange` into the `ChangeSet` that moves a subscriber from
//! the old result to the new one.
//!
//! Two strategies are used:
//!
//! - **Incremental** (no limit): membership of a document depends only on the
//!   document itself, so the before/after images of the change are enough.
//!   Cost is O(1) per mutation regardless of collection size.
//! - **Requery** (limit set): the window depends on its neighbours, so a
//!   relevant change re-evaluates the query and diffs the member sets.

use crate::change_set::ChangeSet;
use std::collections::BTreeMap;
use strand_core::{Document, DocumentId, FieldDelta, Fields, Query, Result};
use strand_storage::{DocumentStore, StoreChange};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Incremental,
    Requery,
}

/// A query whose result set is kept in sync with the store.
#[derive(Debug)]
pub struct LiveQuery {
    query: Query,
    strategy: Strategy,
    /// Projected fields of every member
    members: BTreeMap<DocumentId, Fields>,
    /// Last store sequence reflected in `members`
    seen_seq: u64,
}

impl LiveQuery {
    /// Evaluates the query once and returns the live query with its initial
    /// result, in query order.
    pub fn start(query: Query, store: &dyn DocumentStore) -> Result<(Self, Vec<Document>)> {
        let snapshot = store.snapshot(&query)?;
        let strategy = if query.is_incremental() {
            Strategy::Incremental
        } else {
            Strategy::Requery
        };
        let members = snapshot
            .documents
            .iter()
            .map(|doc| (doc.id().clone(), doc.fields().clone()))
            .collect();
        let live = Self {
            query,
            strategy,
            members,
            seen_seq: snapshot.seq,
        };
        Ok((live, snapshot.documents))
    }

    #[inline]
    pub fn query(&self) -> &Query {
        &self.query
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[inline]
    pub fn seen_seq(&self) -> u64 {
        self.seen_seq
    }

    /// Returns the number of documents in the result.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.members.contains_key(id)
    }

    /// Current result, ordered by the query's sort keys.
    pub fn result(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .members
            .iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();
        docs.sort_by(|a, b| self.query.compare(a, b));
        docs
    }

    /// Handles one store mutation.
    ///
    /// Changes already reflected by the last evaluation are ignored. On
    /// error nothing is emitted and the membership is left untouched.
    pub fn on_store_change(
        &mut self,
        change: &StoreChange,
        store: &dyn DocumentStore,
    ) -> Result<ChangeSet> {
        if change.seq <= self.seen_seq {
            return Ok(ChangeSet::new());
        }

        match self.strategy {
            Strategy::Incremental => {
                self.seen_seq = change.seq;
                Ok(self.apply(change))
            }
            Strategy::Requery => {
                if !self.affected_by(change) {
                    self.seen_seq = change.seq;
                    return Ok(ChangeSet::new());
                }
                let snapshot = store.snapshot(&self.query)?;
                self.seen_seq = snapshot.seq.max(change.seq);
                Ok(self.rediff(snapshot.documents))
            }
        }
    }

    /// A change can only move a limited window if the document was in it or
    /// matches the selector now.
    fn affected_by(&self, change: &StoreChange) -> bool {
        self.members.contains_key(&change.id)
            || change
                .after
                .as_ref()
                .is_some_and(|doc| self.query.matches(doc))
    }

    fn apply(&mut self, change: &StoreChange) -> ChangeSet {
        let mut changes = ChangeSet::new();
        let matched = change.after.as_ref().filter(|doc| self.query.matches(doc));

        match (self.members.get_mut(&change.id), matched) {
            (None, None) => {}
            (None, Some(doc)) => {
                let fields = self.query.projection.apply(doc.fields());
                self.members.insert(change.id.clone(), fields.clone());
                changes.add(change.id.clone(), fields);
            }
            (Some(_), None) => {
                self.members.remove(&change.id);
                changes.remove(change.id.clone());
            }
            (Some(current), Some(doc)) => {
                let fields = self.query.projection.apply(doc.fields());
                let delta = FieldDelta::between(current, &fields);
                if !delta.is_empty() {
                    *current = fields;
                    changes.change(change.id.clone(), delta);
                }
            }
        }
        changes
    }

    fn rediff(&mut self, documents: Vec<Document>) -> ChangeSet {
        let next: BTreeMap<DocumentId, Fields> =
            documents.into_iter().map(Document::into_parts).collect();
        let mut changes = ChangeSet::new();

        for (id, old) in &self.members {
            match next.get(id) {
                None => changes.remove(id.clone()),
                Some(new) => {
                    let delta = FieldDelta::between(old, new);
                    if !delta.is_empty() {
                        changes.change(id.clone(), delta);
                    }
                }
            }
        }
        for (id, fields) in &next {
            if !self.members.contains_key(id) {
                changes.add(id.clone(), fields.clone());
            }
        }

        self.members = next;
        changes
    }
}
