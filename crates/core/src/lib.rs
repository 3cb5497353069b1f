//! Strand Core - shared types for the Strand live-query sync engine.
//!
//! This crate provides the vocabulary the server and client speak:
//!
//! - `Value`: tagged union of JSON-representable field values
//! - `Document` / `DocumentId`: an immutable id plus ordered fields
//! - `FieldDelta`: top-level set/unset delta carried by `changed` events
//! - `Query` / `Selector`: predicates with sort, limit and projection
//! - `ChangeEvent`: added / changed / removed
//! - `Principal` / `AccessPolicy`: explicit caller identity and the access predicate
//! - `Error`: error kinds shared by store, publications and methods
//!
//! # Example
//!
//! ```rust
//! use strand_core::{Document, FieldDelta, Query, Selector, Value};
//!
//! let mut doc = Document::from_fields(
//!     [("text".to_string(), Value::from("X")), ("isChecked".to_string(), Value::from(false))]
//!         .into_iter()
//!         .collect(),
//! );
//!
//! let open = Query::filter(Selector::eq("isChecked", false));
//! assert!(open.matches(&doc));
//!
//! doc.apply(&FieldDelta::new().with_set("isChecked", true));
//! assert!(!open.matches(&doc));
//! ```

mod auth;
pub mod config;
mod delta;
mod document;
mod error;
mod event;
mod ids;
pub mod pattern;
pub mod query;
mod value;

pub use auth::{AccessPolicy, AllowAll, Principal, RequireUser};
pub use delta::FieldDelta;
pub use document::{Document, ID_FIELD};
pub use error::{Error, ErrorKind, Result};
pub use event::ChangeEvent;
pub use ids::{ConnectionId, CorrelationId, DocumentId, SessionId, SubscriptionId, GENERATED_ID_LEN};
pub use query::{Projection, Query, Selector, SortKey, SortOrder};
pub use value::{lookup, Fields, Value};
