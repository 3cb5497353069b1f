//! Server methods.
//!
//! A method is a named handler that may mutate the store. Handlers receive
//! the caller's principal explicitly through `MethodContext`.

use hashbrown::HashMap;
use strand_core::{CorrelationId, Error, Principal, Result, Value};
use strand_storage::DocumentStore;

/// A registered method body.
pub type MethodHandler = Box<dyn Fn(&MethodContext<'_>, &Value) -> Result<Value> + Send + Sync>;

/// Everything a handler may use: who is calling and the store.
pub struct MethodContext<'a> {
    principal: &'a Principal,
    store: &'a dyn DocumentStore,
    invocation: CorrelationId,
}

impl<'a> MethodContext<'a> {
    pub fn new(principal: &'a Principal, store: &'a dyn DocumentStore, invocation: CorrelationId) -> Self {
        Self {
            principal,
            store,
            invocation,
        }
    }

    #[inline]
    pub fn principal(&self) -> &Principal {
        self.principal
    }

    #[inline]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store
    }

    #[inline]
    pub fn invocation(&self) -> CorrelationId {
        self.invocation
    }

    /// The caller's user id, or `Unauthorized`.
    pub fn require_user(&self) -> Result<&str> {
        self.principal
            .user_id
            .as_deref()
            .ok_or_else(|| Error::unauthorized("login required"))
    }
}

/// Named method handlers.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, MethodHandler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one with that name.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&MethodContext<'_>, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<&MethodHandler> {
        self.handlers.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Reads a required argument from a map-shaped argument value.
pub fn arg<'v>(args: &'v Value, name: &str) -> Result<&'v Value> {
    args.get(name)
        .ok_or_else(|| Error::validation(format!("missing argument `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::{ConnectionId, DocumentId, ErrorKind};
    use strand_storage::MemoryStore;

    #[test]
    fn test_register_and_call() {
        let mut registry = MethodRegistry::new();
        registry.register("count", |ctx, _| Ok(Value::from(ctx.store().len()? as i64)));
        assert!(registry.contains("count"));
        assert_eq!(registry.len(), 1);

        let store = MemoryStore::new();
        let principal = Principal::anonymous(ConnectionId::new(1));
        let ctx = MethodContext::new(&principal, &store, CorrelationId::new(1));
        let handler = registry.get("count").unwrap();
        assert_eq!(handler(&ctx, &Value::Null).unwrap(), Value::from(0));
        assert_eq!(ctx.invocation(), CorrelationId::new(1));
    }

    #[test]
    fn test_require_user_and_arg() {
        let store = MemoryStore::new();
        let anonymous = Principal::anonymous(ConnectionId::new(1));
        let ctx = MethodContext::new(&anonymous, &store, CorrelationId::new(1));
        assert_eq!(ctx.require_user().unwrap_err().kind(), ErrorKind::Unauthorized);

        let alice = anonymous.clone().with_user("alice");
        let ctx = MethodContext::new(&alice, &store, CorrelationId::new(2));
        assert_eq!(ctx.require_user().unwrap(), "alice");

        let args = Value::from(serde_json::json!({"_id": "t1"}));
        assert_eq!(arg(&args, "_id").unwrap(), &Value::from("t1"));
        let err = arg(&args, "text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(store.get(&DocumentId::new("t1")).unwrap().is_none());
    }
}
