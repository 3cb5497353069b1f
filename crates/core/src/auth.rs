//! Principals and the pluggable access predicate.
//!
//! Every publication factory and method handler receives the caller's
//! `Principal` explicitly; nothing reads a "current connection" from
//! ambient state.

use crate::ids::ConnectionId;
use crate::value::Value;

/// Identity of the caller behind one connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal {
    pub connection: ConnectionId,
    pub user_id: Option<String>,
}

impl Principal {
    /// Anonymous principal for a connection.
    pub fn anonymous(connection: ConnectionId) -> Self {
        Self {
            connection,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Decides whether a principal may subscribe or invoke.
pub trait AccessPolicy: Send + Sync {
    fn can_subscribe(&self, principal: &Principal, publication: &str, params: &Value) -> bool;

    fn can_invoke(&self, principal: &Principal, method: &str, args: &Value) -> bool;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_subscribe(&self, _: &Principal, _: &str, _: &Value) -> bool {
        true
    }

    fn can_invoke(&self, _: &Principal, _: &str, _: &Value) -> bool {
        true
    }
}

/// Denies anonymous principals.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequireUser;

impl AccessPolicy for RequireUser {
    fn can_subscribe(&self, principal: &Principal, _: &str, _: &Value) -> bool {
        principal.is_authenticated()
    }

    fn can_invoke(&self, principal: &Principal, _: &str, _: &Value) -> bool {
        principal.is_authenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_user() {
        let anonymous = Principal::anonymous(ConnectionId::new(1));
        let alice = anonymous.clone().with_user("alice");

        assert!(!RequireUser.can_subscribe(&anonymous, "tasks", &Value::Null));
        assert!(RequireUser.can_invoke(&alice, "tasks.insert", &Value::Null));
        assert!(AllowAll.can_invoke(&anonymous, "tasks.insert", &Value::Null));
    }
}
