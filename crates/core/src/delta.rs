//! Field-level deltas between two versions of a document.
//!
//! A `FieldDelta` is the payload of a `changed` event and the unit of
//! mutation a method applies through `DocumentStore::update`. It only
//! addresses top-level fields: a nested map is replaced as a whole.

use crate::query::Projection;
use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Top-level fields to overwrite and fields to drop.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDelta {
    /// Fields set to a new value
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub set: Fields,
    /// Fields removed from the document
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unset: BTreeSet<String>,
}

impl FieldDelta {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field assignment.
    pub fn with_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.unset.remove(&field);
        self.set.insert(field, value.into());
        self
    }

    /// Adds a field removal.
    pub fn with_unset(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.set.remove(&field);
        self.unset.insert(field);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Number of fields this delta touches.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len() + self.unset.len()
    }

    /// Returns true if the delta writes or removes `field`.
    pub fn touches(&self, field: &str) -> bool {
        self.set.contains_key(field) || self.unset.contains(field)
    }

    /// Computes the minimal delta turning `old` into `new`.
    pub fn between(old: &Fields, new: &Fields) -> Self {
        let set = new
            .iter()
            .filter(|(key, value)| old.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let unset = old
            .keys()
            .filter(|key| !new.contains_key(*key))
            .cloned()
            .collect();
        Self { set, unset }
    }

    /// Applies the delta, returning whether anything changed.
    pub fn apply_to(&self, fields: &mut Fields) -> bool {
        let mut changed = false;
        for (key, value) in &self.set {
            if fields.get(key) != Some(value) {
                fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        for key in &self.unset {
            changed |= fields.remove(key).is_some();
        }
        changed
    }

    /// Drops every field the projection hides.
    pub fn restrict(&self, projection: &Projection) -> Self {
        Self {
            set: self
                .set
                .iter()
                .filter(|(key, _)| projection.allows(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            unset: self
                .unset
                .iter()
                .filter(|key| projection.allows(key))
                .cloned()
                .collect(),
        }
    }
}
