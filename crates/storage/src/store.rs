//! The document store contract.
//!
//! The store is the system of record. Server-side code mutates it only
//! through `insert`, `update` and `remove`; the publication engine reads it
//! through `snapshot` and learns about mutations from the typed change feed
//! returned by `on_change`.

use strand_core::{Document, DocumentId, FieldDelta, Query, Result};
use tokio::sync::mpsc;

/// Kind of store mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// One committed mutation, with the document before and after it.
///
/// `seq` is the store-wide mutation sequence; it increases by one per
/// committed mutation, so observers can tell which changes a snapshot
/// already reflects.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub seq: u64,
    pub kind: ChangeKind,
    pub id: DocumentId,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl StoreChange {
    pub fn inserted(seq: u64, doc: Document) -> Self {
        Self {
            seq,
            kind: ChangeKind::Inserted,
            id: doc.id().clone(),
            before: None,
            after: Some(doc),
        }
    }

    pub fn updated(seq: u64, before: Document, after: Document) -> Self {
        Self {
            seq,
            kind: ChangeKind::Updated,
            id: after.id().clone(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn removed(seq: u64, doc: Document) -> Self {
        Self {
            seq,
            kind: ChangeKind::Removed,
            id: doc.id().clone(),
            before: Some(doc),
            after: None,
        }
    }
}

/// Receiving end of a store's change notifications.
pub type ChangeFeed = mpsc::UnboundedReceiver<StoreChange>;

/// Query result together with the mutation sequence it reflects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
    pub seq: u64,
}

/// Queryable store of documents with add/update/remove primitives.
pub trait DocumentStore: Send + Sync {
    /// Evaluates a query and reports the sequence it was evaluated at.
    fn snapshot(&self, query: &Query) -> Result<Snapshot>;

    /// Evaluates a query.
    fn find(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.snapshot(query)?.documents)
    }

    fn get(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Inserts a document, failing with `DuplicateId` if the id is taken.
    fn insert(&self, doc: Document) -> Result<DocumentId>;

    /// Applies a delta. Returns false when the document does not exist.
    fn update(&self, id: &DocumentId, delta: &FieldDelta) -> Result<bool>;

    /// Removes a document. Returns false when it does not exist.
    fn remove(&self, id: &DocumentId) -> Result<bool>;

    /// Registers a watcher that receives every committed mutation in order.
    fn on_change(&self) -> Result<ChangeFeed>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
