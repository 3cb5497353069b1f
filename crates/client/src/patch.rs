//! Optimistic patches.
//!
//! A patch is the list of document operations a local simulation produced
//! for one method call. Patches never touch the authoritative layer; the
//! cache layers them over it when computing the view.

use std::collections::BTreeSet;
use strand_core::{CorrelationId, DocumentId, FieldDelta, Fields};

/// One simulated document operation.
#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    Insert { id: DocumentId, fields: Fields },
    Update { id: DocumentId, delta: FieldDelta },
    Remove { id: DocumentId },
}

impl PatchOp {
    #[inline]
    pub fn target(&self) -> &DocumentId {
        match self {
            PatchOp::Insert { id, .. } | PatchOp::Update { id, .. } | PatchOp::Remove { id } => id,
        }
    }

    /// Applies the operation to the fields a document has below this patch.
    pub fn apply(&self, current: Option<Fields>) -> Option<Fields> {
        match self {
            PatchOp::Insert { fields, .. } => Some(fields.clone()),
            PatchOp::Update { delta, .. } => current.map(|mut fields| {
                delta.apply_to(&mut fields);
                fields
            }),
            PatchOp::Remove { .. } => None,
        }
    }

    fn retarget(&mut self, to: DocumentId) {
        match self {
            PatchOp::Insert { id, .. } | PatchOp::Update { id, .. } | PatchOp::Remove { id } => *id = to,
        }
    }
}

/// Lifecycle of a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchState {
    /// The server has not answered yet.
    Pending,
    /// The server accepted the call; waiting for its writes to arrive.
    Committed,
}

/// Operations of one method call, tagged with its correlation id.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimisticPatch {
    correlation: CorrelationId,
    ops: Vec<PatchOp>,
    state: PatchState,
}

impl OptimisticPatch {
    pub fn new(correlation: CorrelationId, ops: Vec<PatchOp>) -> Self {
        Self {
            correlation,
            ops,
            state: PatchState::Pending,
        }
    }

    #[inline]
    pub fn correlation(&self) -> CorrelationId {
        self.correlation
    }

    #[inline]
    pub fn state(&self) -> PatchState {
        self.state
    }

    #[inline]
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn targets(&self) -> BTreeSet<DocumentId> {
        self.ops.iter().map(|op| op.target().clone()).collect()
    }

    pub fn touches(&self, id: &DocumentId) -> bool {
        self.ops.iter().any(|op| op.target() == id)
    }

    pub fn commit(&mut self) {
        self.state = PatchState::Committed;
    }

    /// Drops the operations on `id` once authoritative data for it arrived.
    ///
    /// Only committed patches are superseded. Returns true if anything was
    /// dropped.
    pub fn supersede(&mut self, id: &DocumentId) -> bool {
        if self.state != PatchState::Committed {
            return false;
        }
        let before = self.ops.len();
        self.ops.retain(|op| op.target() != id);
        self.ops.len() != before
    }

    /// Moves a single locally generated insert to the id the server chose.
    ///
    /// Returns the temporary id when a rebind happened.
    pub fn rebind_insert(&mut self, server_id: &DocumentId) -> Option<DocumentId> {
        let mut inserts = self.ops.iter().filter_map(|op| match op {
            PatchOp::Insert { id, .. } => Some(id),
            _ => None,
        });
        let temporary = inserts.next()?.clone();
        if inserts.next().is_some() || &temporary == server_id {
            return None;
        }
        for op in self.ops.iter_mut().filter(|op| op.target() == &temporary) {
            op.retarget(server_id.clone());
        }
        Some(temporary)
    }

    /// Layers this patch's operations on `id` over `base`.
    pub fn layer(&self, id: &DocumentId, base: Option<Fields>) -> Option<Fields> {
        self.ops
            .iter()
            .filter(|op| op.target() == id)
            .fold(base, |current, op| op.apply(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::Value;

    fn fields(text: &str) -> Fields {
        [("text".to_string(), Value::from(text))].into_iter().collect()
    }

    #[test]
    fn test_layer_applies_ops_in_order() {
        let id = DocumentId::new("a");
        let patch = OptimisticPatch::new(
            CorrelationId::new(1),
            vec![
                PatchOp::Insert { id: id.clone(), fields: fields("x") },
                PatchOp::Update {
                    id: id.clone(),
                    delta: FieldDelta::new().with_set("isChecked", true),
                },
            ],
        );
        let layered = patch.layer(&id, None).unwrap();
        assert_eq!(layered.get("text"), Some(&Value::from("x")));
        assert_eq!(layered.get("isChecked"), Some(&Value::from(true)));
        assert_eq!(patch.layer(&DocumentId::new("b"), None), None);
    }

    #[test]
    fn test_update_of_missing_document_is_noop() {
        let op = PatchOp::Update {
            id: DocumentId::new("a"),
            delta: FieldDelta::new().with_set("x", 1),
        };
        assert_eq!(op.apply(None), None);
    }

    #[test]
    fn test_only_committed_patches_are_superseded() {
        let id = DocumentId::new("a");
        let mut patch = OptimisticPatch::new(CorrelationId::new(1), vec![PatchOp::Remove { id: id.clone() }]);
        assert!(!patch.supersede(&id));
        patch.commit();
        assert!(patch.supersede(&id));
        assert!(patch.is_empty());
    }

    #[test]
    fn test_rebind_single_insert() {
        let temp = DocumentId::new("temp");
        let mut patch = OptimisticPatch::new(
            CorrelationId::new(1),
            vec![PatchOp::Insert { id: temp.clone(), fields: fields("x") }],
        );
        let server = DocumentId::new("server");
        assert_eq!(patch.rebind_insert(&server), Some(temp.clone()));
        assert!(patch.touches(&server));
        assert!(!patch.touches(&temp));
        assert_eq!(patch.rebind_insert(&server), None);
    }

    #[test]
    fn test_rebind_skips_multiple_inserts() {
        let mut patch = OptimisticPatch::new(
            CorrelationId::new(1),
            vec![
                PatchOp::Insert { id: DocumentId::new("a"), fields: fields("x") },
                PatchOp::Insert { id: DocumentId::new("b"), fields: fields("y") },
            ],
        );
        assert_eq!(patch.rebind_insert(&DocumentId::new("c")), None);
    }
}
