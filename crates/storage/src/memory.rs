//! In-memory document store.
//!
//! Documents live in a hash map keyed by id, with a separate insertion-order
//! index so unsorted queries return documents in the order they were added.
//! Change notifications are published while the write lock is still held,
//! which makes notification atomic with the mutation and gives every watcher
//! the same global order.

use crate::store::{ChangeFeed, DocumentStore, Snapshot, StoreChange};
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use strand_core::{Document, DocumentId, Error, FieldDelta, Query, Result};
use tokio::sync::mpsc;

struct Slot {
    position: u64,
    doc: Document,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<DocumentId, Slot>,
    /// Insertion position -> id
    order: BTreeMap<u64, DocumentId>,
    next_position: u64,
    seq: u64,
    watchers: Vec<mpsc::UnboundedSender<StoreChange>>,
}

impl Inner {
    fn ordered(&self) -> impl Iterator<Item = &Document> {
        self.order
            .values()
            .filter_map(|id| self.docs.get(id).map(|slot| &slot.doc))
    }

    /// Assigns the next sequence number and fans the change out.
    fn publish(&mut self, build: impl FnOnce(u64) -> StoreChange) -> u64 {
        self.seq += 1;
        let change = build(self.seq);
        // Closed feeds are dropped here.
        self.watchers.retain(|tx| tx.send(change.clone()).is_ok());
        self.seq
    }
}

/// Thread-safe in-memory implementation of `DocumentStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with documents, in order.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Result<Self> {
        let store = Self::new();
        for doc in docs {
            store.insert(doc)?;
        }
        Ok(store)
    }

    /// Current mutation sequence.
    pub fn seq(&self) -> Result<u64> {
        Ok(self.read()?.seq)
    }

    /// Number of live change feeds.
    pub fn watcher_count(&self) -> Result<usize> {
        Ok(self.read()?.watchers.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::internal("document store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::internal("document store lock poisoned"))
    }
}

impl DocumentStore for MemoryStore {
    fn snapshot(&self, query: &Query) -> Result<Snapshot> {
        let inner = self.read()?;
        Ok(Snapshot {
            documents: query.evaluate(inner.ordered()),
            seq: inner.seq,
        })
    }

    fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(id).map(|slot| slot.doc.clone()))
    }

    fn insert(&self, doc: Document) -> Result<DocumentId> {
        let mut inner = self.write()?;
        if inner.docs.contains_key(doc.id()) {
            return Err(Error::duplicate_id(doc.id().clone()));
        }

        let id = doc.id().clone();
        let position = inner.next_position;
        inner.next_position += 1;
        inner.order.insert(position, id.clone());
        inner.docs.insert(
            id.clone(),
            Slot {
                position,
                doc: doc.clone(),
            },
        );

        let seq = inner.publish(|seq| StoreChange::inserted(seq, doc));
        tracing::debug!(%id, seq, "document inserted");
        Ok(id)
    }

    fn update(&self, id: &DocumentId, delta: &FieldDelta) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(slot) = inner.docs.get_mut(id) else {
            return Ok(false);
        };

        let before = slot.doc.clone();
        if !slot.doc.apply(delta) {
            // Matched but nothing changed: no event.
            return Ok(true);
        }
        let after = slot.doc.clone();

        let seq = inner.publish(|seq| StoreChange::updated(seq, before, after));
        tracing::debug!(%id, seq, fields = delta.len(), "document updated");
        Ok(true)
    }

    fn remove(&self, id: &DocumentId) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(slot) = inner.docs.remove(id) else {
            return Ok(false);
        };
        inner.order.remove(&slot.position);

        let seq = inner.publish(|seq| StoreChange::removed(seq, slot.doc));
        tracing::debug!(%id, seq, "document removed");
        Ok(true)
    }

    fn on_change(&self) -> Result<ChangeFeed> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.write()?.watchers.push(tx);
        Ok(rx)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.docs.len())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("MemoryStore");
        match self.inner.read() {
            Ok(inner) => debug
                .field("documents", &inner.docs.len())
                .field("seq", &inner.seq)
                .finish(),
            Err(_) => debug.field("poisoned", &true).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;
    use serde_json::json;
    use strand_core::{Fields, Selector, SortOrder, Value};

    fn fields(value: serde_json::Value) -> Fields {
        match Value::from(value) {
            Value::Map(map) => map,
            _ => Fields::new(),
        }
    }

    fn task(id: &str, text: &str) -> Document {
        Document::new(DocumentId::new(id), fields(json!({"text": text, "isChecked": false})))
    }

    #[test]
    fn test_insert_get_and_duplicate() {
        let store = MemoryStore::new();
        let id = store.insert(task("t1", "First Task")).unwrap();
        assert_eq!(id.as_str(), "t1");
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get(&id).unwrap().is_some());

        let err = store.insert(task("t1", "again")).unwrap_err();
        assert_eq!(err, Error::duplicate_id(DocumentId::new("t1")));
    }

    #[test]
    fn test_find_keeps_insertion_order() {
        let store = MemoryStore::with_documents(vec![
            task("c", "Third"),
            task("a", "First"),
            task("b", "Second"),
        ])
        .unwrap();

        let ids: Vec<String> = store
            .find(&Query::all())
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);

        let sorted = store.find(&Query::all().with_sort("text", SortOrder::Asc)).unwrap();
        assert_eq!(sorted[0].id().as_str(), "a");
    }

    #[test]
    fn test_update_and_remove_report_existence() {
        let store = MemoryStore::with_documents(vec![task("t1", "First")]).unwrap();
        let delta = FieldDelta::new().with_set("isChecked", true);

        assert!(store.update(&DocumentId::new("t1"), &delta).unwrap());
        assert!(!store.update(&DocumentId::new("nope"), &delta).unwrap());
        assert_eq!(
            store.find(&Query::filter(Selector::eq("isChecked", true))).unwrap().len(),
            1
        );

        assert!(store.remove(&DocumentId::new("t1")).unwrap());
        assert!(!store.remove(&DocumentId::new("t1")).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_change_feed_order_and_images() {
        let store = MemoryStore::new();
        let mut feed = store.on_change().unwrap();

        store.insert(task("t1", "First")).unwrap();
        store
            .update(&DocumentId::new("t1"), &FieldDelta::new().with_set("isChecked", true))
            .unwrap();
        store.remove(&DocumentId::new("t1")).unwrap();

        let inserted = feed.try_recv().unwrap();
        assert_eq!((inserted.seq, inserted.kind), (1, ChangeKind::Inserted));
        assert!(inserted.before.is_none());

        let updated = feed.try_recv().unwrap();
        assert_eq!((updated.seq, updated.kind), (2, ChangeKind::Updated));
        assert_eq!(
            updated.before.as_ref().and_then(|d| d.get("isChecked")),
            Some(&Value::Bool(false))
        );
        assert_eq!(
            updated.after.as_ref().and_then(|d| d.get("isChecked")),
            Some(&Value::Bool(true))
        );

        let removed = feed.try_recv().unwrap();
        assert_eq!((removed.seq, removed.kind), (3, ChangeKind::Removed));
        assert!(removed.after.is_none());
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn test_noop_and_failed_mutations_publish_nothing() {
        let store = MemoryStore::with_documents(vec![task("t1", "First")]).unwrap();
        let mut feed = store.on_change().unwrap();

        let same = FieldDelta::new().with_set("isChecked", false);
        assert!(store.update(&DocumentId::new("t1"), &same).unwrap());
        assert!(store.insert(task("t1", "dup")).is_err());
        assert!(!store.remove(&DocumentId::new("missing")).unwrap());

        assert!(feed.try_recv().is_err());
        assert_eq!(store.seq().unwrap(), 1);
    }

    #[test]
    fn test_snapshot_reports_seq_and_drops_closed_feeds() {
        let store = MemoryStore::new();
        let feed = store.on_change().unwrap();
        store.insert(task("t1", "First")).unwrap();
        assert_eq!(store.snapshot(&Query::all()).unwrap().seq, 1);

        drop(feed);
        store.insert(task("t2", "Second")).unwrap();
        assert_eq!(store.watcher_count().unwrap(), 0);
    }
}
