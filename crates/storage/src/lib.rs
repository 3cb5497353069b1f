//! Strand Storage - the document store behind the Strand sync engine.
//!
//! This crate provides:
//!
//! - `DocumentStore`: the queryable store contract (find / insert / update / remove)
//! - `StoreChange` / `ChangeFeed`: typed, ordered mutation notifications
//! - `MemoryStore`: a thread-safe in-memory implementation
//!
//! # Example
//!
//! ```rust
//! use strand_core::{Document, DocumentId, FieldDelta, Query};
//! use strand_storage::{DocumentStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut feed = store.on_change().unwrap();
//!
//! let id = store.insert(Document::new(DocumentId::new("t1"), Default::default())).unwrap();
//! store.update(&id, &FieldDelta::new().with_set("isChecked", true)).unwrap();
//!
//! assert_eq!(store.find(&Query::all()).unwrap().len(), 1);
//! assert_eq!(feed.try_recv().unwrap().seq, 1);
//! assert_eq!(feed.try_recv().unwrap().seq, 2);
//! ```

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{ChangeFeed, ChangeKind, DocumentStore, Snapshot, StoreChange};
