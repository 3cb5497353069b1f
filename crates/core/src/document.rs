//! Document definitions.

use crate::delta::FieldDelta;
use crate::ids::DocumentId;
use crate::value::{lookup, Fields, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Reserved field name that resolves to the document id.
pub const ID_FIELD: &str = "_id";

/// A document: an immutable id plus an ordered field mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    fields: Fields,
}

impl Document {
    /// Creates a document. A stray `_id` entry in `fields` is dropped.
    pub fn new(id: DocumentId, mut fields: Fields) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    /// Builds a document from raw fields, taking the id from a string `_id`
    /// field when present and generating one otherwise.
    pub fn from_fields(mut fields: Fields) -> Self {
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => DocumentId::new(id),
            _ => DocumentId::generate(),
        };
        Self { id, fields }
    }

    #[inline]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Returns a top-level field.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolves a dotted field path, with `_id` mapping to the id.
    pub fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        if path == ID_FIELD {
            return Some(Cow::Owned(Value::String(self.id.as_str().to_string())));
        }
        lookup(&self.fields, path).map(Cow::Borrowed)
    }

    /// Applies a delta in place, returning whether any field changed.
    pub fn apply(&mut self, delta: &FieldDelta) -> bool {
        delta.apply_to(&mut self.fields)
    }

    pub fn into_parts(self) -> (DocumentId, Fields) {
        (self.id, self.fields)
    }
}
