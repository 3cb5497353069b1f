//! Change events describing how a result set moved.

use crate::delta::FieldDelta;
use crate::ids::DocumentId;
use crate::value::Fields;

/// One change to a subscription's result set (or to the client's view).
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    /// Document entered the set
    Added { id: DocumentId, fields: Fields },
    /// Document stayed in the set with different fields
    Changed { id: DocumentId, delta: FieldDelta },
    /// Document left the set
    Removed { id: DocumentId },
}

impl ChangeEvent {
    /// The document this event is about.
    #[inline]
    pub fn id(&self) -> &DocumentId {
        match self {
            ChangeEvent::Added { id, .. }
            | ChangeEvent::Changed { id, .. }
            | ChangeEvent::Removed { id } => id,
        }
    }

    #[inline]
    pub fn is_added(&self) -> bool {
        matches!(self, ChangeEvent::Added { .. })
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        matches!(self, ChangeEvent::Removed { .. })
    }
}
