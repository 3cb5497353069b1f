//! Strand Reactive - the publication engine of the Strand sync engine.
//!
//! This crate turns named, parameterized queries into live result sets.
//! When the document store changes, every affected subscription receives the
//! incremental `added` / `changed` / `removed` events that move it to the new
//! result, stamped with a per-subscription sequence number.
//!
//! # Core Concepts
//!
//! - `ChangeSet`: ordered batch of change events for one result set
//! - `LiveQuery`: a query plus its current membership, updated per store change
//! - `ObserverRegistry`: routes store changes to every live subscription
//! - `PublicationEngine`: publications, access checks and subscription lifecycle
//!
//! # Example
//!
//! ```ignore
//! use strand_reactive::{Emission, PublicationEngine, SubscriptionKey};
//!
//! let mut engine = PublicationEngine::new(store.clone());
//! engine.publish("tasks", |_principal, _params| Ok(Some(Query::all())));
//!
//! for emission in engine.subscribe(key, "tasks", &Value::Null, &principal)? {
//!     deliver(emission);
//! }
//! while let Some(change) = feed.recv().await {
//!     for emission in engine.on_store_change(&change) {
//!         deliver(emission);
//!     }
//! }
//! ```

pub mod change_set;
pub mod live_query;
pub mod observer;
pub mod publication;

pub use change_set::ChangeSet;
pub use live_query::{LiveQuery, Strategy};
pub use observer::{Observer, ObserverRegistry, Sequenced, SubscriptionKey};
pub use publication::{Emission, PublicationEngine, QueryFactory};
