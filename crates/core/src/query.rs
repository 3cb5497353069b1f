//! Queries over a document collection.
//!
//! A `Query` is a selector plus optional sort, limit and projection. It is a
//! pure function of collection state: `evaluate` produces the ordered result,
//! while `matches` is the cheap per-document membership test live queries use
//! to stay incremental.
//!
//! # Example
//!
//! ```ignore
//! use strand_core::query::{Query, Selector, SortOrder};
//!
//! let open_tasks = Query::filter(Selector::eq("isChecked", false))
//!     .with_sort("createdAt", SortOrder::Desc)
//!     .with_limit(20);
//!
//! let page = open_tasks.evaluate(store_documents.iter());
//! ```

use crate::document::Document;
use crate::pattern::like;
use crate::value::{Fields, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Predicate over a document.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Selector {
    /// Matches every document
    #[default]
    All,
    /// Field equals value; `Null` also matches a missing field
    Eq(String, Value),
    /// Negation of `Eq`
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    /// Field equals any of the values
    In(String, Vec<Value>),
    /// Field presence
    Exists(String, bool),
    /// String field matches a LIKE pattern
    Like(String, String),
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Not(Box<Selector>),
}

impl Selector {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Lte(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Gte(field.into(), value.into())
    }

    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Selector::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Selector::Exists(field.into(), true)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Selector::Like(field.into(), pattern.into())
    }

    /// Conjunction, flattening nested `And`s and dropping `All`.
    pub fn and(self, other: Selector) -> Self {
        match (self, other) {
            (Selector::All, other) => other,
            (this, Selector::All) => this,
            (Selector::And(mut clauses), other) => {
                clauses.push(other);
                Selector::And(clauses)
            }
            (this, other) => Selector::And(vec![this, other]),
        }
    }

    pub fn or(self, other: Selector) -> Self {
        match self {
            Selector::Or(mut clauses) => {
                clauses.push(other);
                Selector::Or(clauses)
            }
            this => Selector::Or(vec![this, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Selector::Not(Box::new(self))
    }

    /// Evaluates the selector against one document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Selector::All => true,
            Selector::Eq(field, value) => equals(doc, field, value),
            Selector::Ne(field, value) => !equals(doc, field, value),
            Selector::Lt(field, value) => compares(doc, field, value, Ordering::is_lt),
            Selector::Lte(field, value) => compares(doc, field, value, Ordering::is_le),
            Selector::Gt(field, value) => compares(doc, field, value, Ordering::is_gt),
            Selector::Gte(field, value) => compares(doc, field, value, Ordering::is_ge),
            Selector::In(field, values) => values.iter().any(|value| equals(doc, field, value)),
            Selector::Exists(field, present) => doc.field(field).is_some() == *present,
            Selector::Like(field, pattern) => doc
                .field(field)
                .is_some_and(|found| found.as_str().is_some_and(|s| like(s, pattern))),
            Selector::And(clauses) => clauses.iter().all(|clause| clause.matches(doc)),
            Selector::Or(clauses) => clauses.iter().any(|clause| clause.matches(doc)),
            Selector::Not(inner) => !inner.matches(doc),
        }
    }
}

fn equals(doc: &Document, field: &str, value: &Value) -> bool {
    match doc.field(field) {
        Some(found) => match found.as_ref() {
            Value::Array(items) if !matches!(value, Value::Array(_)) => items.contains(value),
            found => found == value,
        },
        None => value.is_null(),
    }
}

fn compares(doc: &Document, field: &str, value: &Value, accept: fn(Ordering) -> bool) -> bool {
    doc.field(field)
        .and_then(|found| found.compare_same_type(value))
        .is_some_and(accept)
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort key; missing fields sort first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Top-level field projection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(BTreeSet<String>),
    Exclude(BTreeSet<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Returns true if `field` survives the projection.
    pub fn allows(&self, field: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(fields) => fields.contains(field),
            Projection::Exclude(fields) => !fields.contains(field),
        }
    }

    pub fn apply(&self, fields: &Fields) -> Fields {
        match self {
            Projection::All => fields.clone(),
            _ => fields
                .iter()
                .filter(|(key, _)| self.allows(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// A selector plus sort, limit and projection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub selector: Selector,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub projection: Projection,
}

impl Query {
    /// Query matching every document in insertion order.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    #[inline]
    pub fn matches(&self, doc: &Document) -> bool {
        self.selector.matches(doc)
    }

    /// Returns true when membership of one document can be decided from that
    /// document alone. A limit makes membership depend on the rest of the set.
    #[inline]
    pub fn is_incremental(&self) -> bool {
        self.limit.is_none()
    }

    /// Orders two documents by the sort keys.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.sort {
            let ordering = match (a.field(&key.field), b.field(&key.field)) {
                (Some(x), Some(y)) => x.as_ref().cmp(y.as_ref()),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return match key.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    }

    /// Applies the projection to one document.
    pub fn project(&self, doc: &Document) -> Document {
        Document::new(doc.id().clone(), self.projection.apply(doc.fields()))
    }

    /// Evaluates the query over documents given in insertion order.
    ///
    /// Sorting is stable, so ties keep insertion order.
    pub fn evaluate<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut matched: Vec<&Document> = docs.into_iter().filter(|doc| self.matches(doc)).collect();
        if !self.sort.is_empty() {
            matched.sort_by(|a, b| self.compare(a, b));
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched.into_iter().map(|doc| self.project(doc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DocumentId;
    use serde_json::json;

    fn doc(id: &str, fields: serde_json::Value) -> Document {
        let fields = match Value::from(fields) {
            Value::Map(map) => map,
            _ => Fields::new(),
        };
        Document::new(DocumentId::new(id), fields)
    }

    fn tasks() -> Vec<Document> {
        vec![
            doc("a", json!({"text": "First Task", "isChecked": false, "rank": 3})),
            doc("b", json!({"text": "Second Task", "isChecked": true, "rank": 1})),
            doc("c", json!({"text": "Third Task", "rank": 2, "tags": ["home", "urgent"]})),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id().as_str()).collect()
    }

    #[test]
    fn test_eq_and_missing_fields() {
        let docs = tasks();
        assert_eq!(ids(&Query::filter(Selector::eq("isChecked", false)).evaluate(&docs)), ["a"]);
        assert_eq!(ids(&Query::filter(Selector::eq("isChecked", Value::Null)).evaluate(&docs)), ["c"]);
        assert_eq!(ids(&Query::filter(Selector::ne("isChecked", true)).evaluate(&docs)), ["a", "c"]);
        assert_eq!(ids(&Query::filter(Selector::eq("_id", "b")).evaluate(&docs)), ["b"]);
    }

    #[test]
    fn test_array_membership() {
        let docs = tasks();
        assert_eq!(ids(&Query::filter(Selector::eq("tags", "urgent")).evaluate(&docs)), ["c"]);
        assert_eq!(ids(&Query::filter(Selector::one_of("tags", ["work", "home"])).evaluate(&docs)), ["c"]);
    }

    #[test]
    fn test_range_only_compares_same_type() {
        let docs = tasks();
        assert_eq!(ids(&Query::filter(Selector::gte("rank", 2)).evaluate(&docs)), ["a", "c"]);
        assert!(Query::filter(Selector::lt("text", 5)).evaluate(&docs).is_empty());
        assert_eq!(ids(&Query::filter(Selector::lte("rank", 1)).evaluate(&docs)), ["b"]);
    }

    #[test]
    fn test_boolean_composition() {
        let docs = tasks();
        let selector = Selector::like("text", "%Task")
            .and(Selector::exists("isChecked"))
            .and(Selector::eq("isChecked", true).not());
        assert_eq!(ids(&Query::filter(selector).evaluate(&docs)), ["a"]);

        let either = Selector::eq("rank", 1).or(Selector::eq("rank", 2));
        assert_eq!(ids(&Query::filter(either).evaluate(&docs)), ["b", "c"]);
        assert_eq!(Selector::All.and(Selector::exists("x")), Selector::exists("x"));
    }

    #[test]
    fn test_sort_limit_projection() {
        let docs = tasks();
        let query = Query::all()
            .with_sort("rank", SortOrder::Desc)
            .with_limit(2)
            .with_projection(Projection::include(["text"]));
        let result = query.evaluate(&docs);
        assert_eq!(ids(&result), ["a", "c"]);
        assert_eq!(result[0].fields().len(), 1);
        assert!(!query.is_incremental());
    }

    #[test]
    fn test_sort_is_stable_and_missing_first() {
        let docs = tasks();
        let result = Query::all().with_sort("isChecked", SortOrder::Asc).evaluate(&docs);
        assert_eq!(ids(&result), ["c", "a", "b"]);
        assert_eq!(ids(&Query::all().evaluate(&docs)), ["a", "b", "c"]);
    }

    #[test]
    fn test_exclude_projection() {
        let projection = Projection::exclude(["rank"]);
        assert!(!projection.allows("rank"));
        assert!(projection.allows("text"));
        let projected = Query::all().with_projection(projection).project(&tasks()[0]);
        assert!(projected.get("rank").is_none());
        assert_eq!(projected.id().as_str(), "a");
    }
}
