//! Method invoker.
//!
//! A call runs its registered local simulation (if any) against a staged
//! copy of the view; the simulated operations become an `OptimisticPatch`.
//! The call itself is tracked until the server answers with `result` and
//! confirms with `updated`.

use crate::cache::ClientCache;
use crate::patch::{OptimisticPatch, PatchOp};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use strand_core::{CorrelationId, Document, DocumentId, Error, FieldDelta, Fields, Result, Value};
use strand_protocol::{ClientMessage, MethodError, Outcome};
use tokio::sync::oneshot;

/// What a caller eventually receives.
pub type MethodResult = std::result::Result<Value, MethodError>;

/// Local stand-in for a server method.
pub type Simulation = Box<dyn Fn(&mut SimulationContext<'_>, &Value) -> Result<()>>;

struct Registered {
    simulate: Simulation,
    returns_id: bool,
}

/// Staged view a simulation reads and writes.
pub struct SimulationContext<'a> {
    cache: &'a ClientCache,
    staged: BTreeMap<DocumentId, Option<Fields>>,
    ops: Vec<PatchOp>,
}

impl<'a> SimulationContext<'a> {
    fn new(cache: &'a ClientCache) -> Self {
        Self {
            cache,
            staged: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    pub fn get(&self, id: &DocumentId) -> Option<Fields> {
        match self.staged.get(id) {
            Some(staged) => staged.clone(),
            None => self.cache.get(id).map(|doc| doc.into_parts().1),
        }
    }

    /// Inserts a document under its `_id` or a freshly generated one.
    pub fn insert(&mut self, fields: Fields) -> Result<DocumentId> {
        let (id, fields) = Document::from_fields(fields).into_parts();
        if self.get(&id).is_some() {
            return Err(Error::duplicate_id(id));
        }
        self.staged.insert(id.clone(), Some(fields.clone()));
        self.ops.push(PatchOp::Insert { id: id.clone(), fields });
        Ok(id)
    }

    /// Returns false when the document is not in the view.
    pub fn update(&mut self, id: &DocumentId, delta: FieldDelta) -> bool {
        let Some(mut fields) = self.get(id) else {
            return false;
        };
        delta.apply_to(&mut fields);
        self.staged.insert(id.clone(), Some(fields));
        self.ops.push(PatchOp::Update { id: id.clone(), delta });
        true
    }

    pub fn remove(&mut self, id: &DocumentId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.staged.insert(id.clone(), None);
        self.ops.push(PatchOp::Remove { id: id.clone() });
        true
    }
}

/// Future of one method call.
///
/// Resolves with the server's answer. Disconnects do not fail a call; it
/// only resolves with `ConnectionLost` when the client itself is dropped.
#[derive(Debug)]
pub struct PendingCall {
    correlation: CorrelationId,
    rx: oneshot::Receiver<MethodResult>,
}

impl PendingCall {
    #[inline]
    pub fn correlation(&self) -> CorrelationId {
        self.correlation
    }

    /// Returns the result if it has arrived.
    pub fn try_result(&mut self) -> Option<MethodResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(MethodError::connection_lost())),
        }
    }
}

impl Future for PendingCall {
    type Output = MethodResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(MethodError::connection_lost())))
    }
}

struct Outstanding {
    method: String,
    args: Value,
    returns_id: bool,
    reply: Option<oneshot::Sender<MethodResult>>,
    answered: bool,
    sent: bool,
}

/// Tracks calls from invocation until the server confirms their writes.
#[derive(Default)]
pub struct MethodInvoker {
    simulations: BTreeMap<String, Registered>,
    outstanding: BTreeMap<CorrelationId, Outstanding>,
    next_id: u64,
}

impl MethodInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, method: impl Into<String>, simulation: F)
    where
        F: Fn(&mut SimulationContext<'_>, &Value) -> Result<()> + 'static,
    {
        self.insert_registered(method.into(), Box::new(simulation), false);
    }

    /// Registers a simulation for a method whose string result is the id the
    /// server gave the inserted document.
    pub fn register_insert<F>(&mut self, method: impl Into<String>, simulation: F)
    where
        F: Fn(&mut SimulationContext<'_>, &Value) -> Result<()> + 'static,
    {
        self.insert_registered(method.into(), Box::new(simulation), true);
    }

    fn insert_registered(&mut self, method: String, simulate: Simulation, returns_id: bool) {
        self.simulations.insert(method, Registered { simulate, returns_id });
    }

    /// Starts a call: assigns its correlation id and runs the simulation.
    pub fn begin(
        &mut self,
        method: &str,
        args: Value,
        cache: &ClientCache,
    ) -> (PendingCall, Option<OptimisticPatch>) {
        self.next_id += 1;
        let correlation = CorrelationId::new(self.next_id);

        let registered = self.simulations.get(method);
        let returns_id = registered.is_some_and(|r| r.returns_id);
        let patch = registered.and_then(|registered| {
            let mut ctx = SimulationContext::new(cache);
            match (registered.simulate)(&mut ctx, &args) {
                Ok(()) if ctx.ops.is_empty() => None,
                Ok(()) => Some(OptimisticPatch::new(correlation, ctx.ops)),
                Err(error) => {
                    tracing::warn!(method, %correlation, %error, "simulation failed, calling without a patch");
                    None
                }
            }
        });

        let (tx, rx) = oneshot::channel();
        self.outstanding.insert(
            correlation,
            Outstanding {
                method: method.to_string(),
                args,
                returns_id,
                reply: Some(tx),
                answered: false,
                sent: false,
            },
        );
        (PendingCall { correlation, rx }, patch)
    }

    /// The `method` message of an outstanding call.
    pub fn message(&self, correlation: CorrelationId) -> Option<ClientMessage> {
        self.outstanding.get(&correlation).map(|call| ClientMessage::Method {
            id: correlation,
            method: call.method.clone(),
            args: call.args.clone(),
        })
    }

    pub fn mark_sent(&mut self, correlation: CorrelationId) {
        if let Some(call) = self.outstanding.get_mut(&correlation) {
            call.sent = true;
        }
    }

    /// Messages for unanswered calls, in call order, marking them sent.
    ///
    /// Calls already sent once are included only when `include_sent` is set.
    pub fn take_unsent(&mut self, include_sent: bool) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        for (id, call) in &mut self.outstanding {
            if call.answered || (call.sent && !include_sent) {
                continue;
            }
            call.sent = true;
            messages.push(ClientMessage::Method {
                id: *id,
                method: call.method.clone(),
                args: call.args.clone(),
            });
        }
        messages
    }

    /// True while the call waits for its `result`.
    pub fn is_awaiting(&self, correlation: CorrelationId) -> bool {
        self.outstanding
            .get(&correlation)
            .is_some_and(|call| !call.answered)
    }

    /// Calls that have their `result` but not yet their `updated`.
    pub fn answered(&self) -> Vec<CorrelationId> {
        self.outstanding
            .iter()
            .filter(|(_, call)| call.answered)
            .map(|(id, _)| *id)
            .collect()
    }

    /// The server id of the document a call inserted, when the method was
    /// registered with `register_insert` and answered with a string.
    pub fn assigned_id(&self, correlation: CorrelationId, result: &Value) -> Option<DocumentId> {
        self.outstanding
            .get(&correlation)
            .filter(|call| call.returns_id)
            .and_then(|_| result.as_str())
            .map(DocumentId::new)
    }

    /// Delivers the server's answer to the caller.
    pub fn resolve(&mut self, correlation: CorrelationId, outcome: Outcome) -> bool {
        let Some(call) = self.outstanding.get_mut(&correlation) else {
            return false;
        };
        call.answered = true;
        if let Some(reply) = call.reply.take() {
            // The caller may have dropped its PendingCall.
            let _ = reply.send(outcome.into_result());
        }
        true
    }

    /// Forgets a call once its writes are confirmed.
    pub fn complete(&mut self, correlation: CorrelationId) -> bool {
        self.outstanding.remove(&correlation).is_some()
    }

    /// Number of calls not yet confirmed by `updated`.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::{ErrorKind, SubscriptionId, ChangeEvent};

    fn cache_with_task() -> ClientCache {
        let mut cache = ClientCache::new();
        let fields: Fields = [("isChecked".to_string(), Value::from(false))].into_iter().collect();
        cache
            .apply_event(
                &SubscriptionId::new("s1"),
                ChangeEvent::Added { id: DocumentId::new("t1"), fields },
            )
            .unwrap();
        cache
    }

    fn invoker() -> MethodInvoker {
        let mut invoker = MethodInvoker::new();
        invoker.register("toggle", |ctx, args| {
            let id = DocumentId::new(args.as_str().unwrap_or_default());
            let checked = ctx
                .get(&id)
                .and_then(|f| f.get("isChecked").and_then(Value::as_bool))
                .ok_or_else(|| Error::not_found(id.clone()))?;
            ctx.update(&id, FieldDelta::new().with_set("isChecked", !checked));
            Ok(())
        });
        invoker
    }

    #[test]
    fn test_simulation_produces_patch() {
        let cache = cache_with_task();
        let mut invoker = invoker();
        let (call, patch) = invoker.begin("toggle", Value::from("t1"), &cache);
        let patch = patch.unwrap();
        assert_eq!(patch.correlation(), call.correlation());
        assert_eq!(patch.ops().len(), 1);
        assert!(invoker.is_awaiting(call.correlation()));
    }

    #[test]
    fn test_failing_or_missing_simulation_has_no_patch() {
        let cache = cache_with_task();
        let mut invoker = invoker();
        let (_, patch) = invoker.begin("toggle", Value::from("missing"), &cache);
        assert!(patch.is_none());
        let (_, patch) = invoker.begin("unknown", Value::Null, &cache);
        assert!(patch.is_none());
        assert_eq!(invoker.outstanding(), 2);
    }

    #[test]
    fn test_staged_reads_see_earlier_writes() {
        let cache = ClientCache::new();
        let mut ctx = SimulationContext::new(&cache);
        let id = ctx
            .insert([("text".to_string(), Value::from("a"))].into_iter().collect())
            .unwrap();
        assert!(ctx.update(&id, FieldDelta::new().with_set("text", "b")));
        assert_eq!(ctx.get(&id).unwrap().get("text"), Some(&Value::from("b")));
        assert!(ctx.remove(&id));
        assert!(!ctx.remove(&id));
        assert_eq!(ctx.ops.len(), 3);
    }

    #[test]
    fn test_resolve_and_resend_bookkeeping() {
        let cache = ClientCache::new();
        let mut invoker = MethodInvoker::new();
        let (mut first, _) = invoker.begin("a", Value::Null, &cache);
        let (_second, _) = invoker.begin("b", Value::Null, &cache);

        assert_eq!(invoker.take_unsent(false).len(), 2);
        assert!(invoker.take_unsent(false).is_empty());
        assert_eq!(invoker.take_unsent(true).len(), 2);

        assert!(first.try_result().is_none());
        invoker.resolve(first.correlation(), Outcome::ok("done"));
        assert_eq!(first.try_result(), Some(Ok(Value::from("done"))));
        assert_eq!(invoker.take_unsent(true).len(), 1);
        assert_eq!(invoker.answered(), vec![first.correlation()]);

        assert!(invoker.complete(first.correlation()));
        assert_eq!(invoker.outstanding(), 1);
    }

    #[test]
    fn test_assigned_id_only_for_insert_methods() {
        let cache = ClientCache::new();
        let mut invoker = invoker();
        invoker.register_insert("add", |ctx, _| ctx.insert(Fields::new()).map(|_| ()));

        let (insert, _) = invoker.begin("add", Value::Null, &cache);
        let (toggle, _) = invoker.begin("toggle", Value::from("t1"), &cache);
        let (unknown, _) = invoker.begin("other", Value::Null, &cache);

        let result = Value::from("srv1");
        assert_eq!(invoker.assigned_id(insert.correlation(), &result), Some(DocumentId::new("srv1")));
        assert_eq!(invoker.assigned_id(insert.correlation(), &Value::from(1)), None);
        assert_eq!(invoker.assigned_id(toggle.correlation(), &result), None);
        assert_eq!(invoker.assigned_id(unknown.correlation(), &result), None);
    }

    #[test]
    fn test_dropped_invoker_fails_pending_call() {
        let cache = ClientCache::new();
        let mut invoker = MethodInvoker::new();
        let (mut call, _) = invoker.begin("a", Value::Null, &cache);
        drop(invoker);
        let err = call.try_result().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionLost);
    }

    #[tokio::test]
    async fn test_pending_call_is_a_future() {
        let cache = ClientCache::new();
        let mut invoker = MethodInvoker::new();
        let (call, _) = invoker.begin("a", Value::Null, &cache);
        invoker.resolve(call.correlation(), Outcome::failure(&Error::validation("bad")));
        let err = call.await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }
}
