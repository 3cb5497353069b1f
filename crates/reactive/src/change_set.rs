//! Change set for tracking live query result changes.
//!
//! A ChangeSet is the ordered batch of events one store mutation (or one
//! initial snapshot) produces for a single live query.

use strand_core::{ChangeEvent, Document, DocumentId, FieldDelta, Fields};

/// An ordered batch of changes to one result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    events: Vec<ChangeEvent>,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set representing an initial result set.
    ///
    /// Every document becomes an `added` event, in result order.
    pub fn initial(docs: Vec<Document>) -> Self {
        let events = docs
            .into_iter()
            .map(|doc| {
                let (id, fields) = doc.into_parts();
                ChangeEvent::Added { id, fields }
            })
            .collect();
        Self { events }
    }

    pub fn add(&mut self, id: DocumentId, fields: Fields) {
        self.events.push(ChangeEvent::Added { id, fields });
    }

    pub fn change(&mut self, id: DocumentId, delta: FieldDelta) {
        self.events.push(ChangeEvent::Changed { id, delta });
    }

    pub fn remove(&mut self, id: DocumentId) {
        self.events.push(ChangeEvent::Removed { id });
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Appends another change set after this one.
    pub fn merge(&mut self, other: ChangeSet) {
        self.events.extend(other.events);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEvent> {
        self.events.iter()
    }

    #[inline]
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
