//! The client: channel state machine over the cache, subscriptions and
//! method invoker.
//!
//! `Client` is transport-agnostic. Outgoing messages queue in an outbox the
//! transport drains with `take_outbox` or `drain_frames`; incoming frames are
//! fed to `receive_frame`. The transport reports a dropped connection with
//! `connection_lost` and reconnects with `connect`.
//!
//! # Example
//!
//! ```ignore
//! let mut client = Client::new(ClientConfig::default());
//! client.register_simulation("tasks.toggleChecked", toggle_locally);
//! client.connect();
//! let tasks = client.subscribe("tasks", Value::Null);
//!
//! for frame in client.drain_frames()? {
//!     transport.send(frame);
//! }
//! while let Some(frame) = transport.recv() {
//!     client.receive_frame(&frame)?;
//! }
//! ```

use crate::cache::{ClientCache, ObserverId};
use crate::config::ClientConfig;
use crate::invoker::{MethodInvoker, PendingCall, SimulationContext};
use crate::subscriptions::{SubscriptionHandle, SubscriptionManager};
use std::collections::VecDeque;
use strand_core::{
    ChangeEvent, CorrelationId, Document, DocumentId, Error, Query, Result, SessionId, Value,
};
use strand_protocol::{codec, ClientMessage, MethodError, Outcome, ServerMessage, PROTOCOL_VERSION};

/// Channel state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Lost the connection; cached data stays visible until resubscribed.
    Reconnecting,
}

/// Client side of the sync engine.
pub struct Client {
    config: ClientConfig,
    state: ConnectionState,
    session: Option<SessionId>,
    cache: ClientCache,
    subscriptions: SubscriptionManager,
    invoker: MethodInvoker,
    outbox: VecDeque<ClientMessage>,
    /// Calls answered before a disconnect whose `updated` never came.
    unconfirmed: Vec<CorrelationId>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            session: None,
            cache: ClientCache::new(),
            subscriptions: SubscriptionManager::new(),
            invoker: MethodInvoker::new(),
            outbox: VecDeque::new(),
            unconfirmed: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    #[inline]
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts the handshake, resuming the previous session if there was one.
    pub fn connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                self.outbox.push_back(ClientMessage::Connect {
                    version: PROTOCOL_VERSION,
                    session: self.session.clone(),
                });
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }
    }

    /// The transport dropped. Cached documents stay visible but stale,
    /// pending calls keep waiting.
    pub fn connection_lost(&mut self) {
        if matches!(self.state, ConnectionState::Disconnected | ConnectionState::Reconnecting) {
            return;
        }
        tracing::info!(session = ?self.session, "connection lost");
        self.state = ConnectionState::Reconnecting;
        self.outbox.clear();
        for id in self.subscriptions.active_ids() {
            self.cache.mark_stale(&id);
        }
        self.subscriptions.mark_all_not_ready();
        for correlation in self.invoker.answered() {
            if !self.unconfirmed.contains(&correlation) {
                self.unconfirmed.push(correlation);
            }
        }
    }

    /// Closes the channel on purpose.
    pub fn disconnect(&mut self) {
        self.connection_lost();
        self.outbox.clear();
        self.state = ConnectionState::Disconnected;
    }

    /// Subscribes to a publication. Identical subscriptions share one
    /// server subscription.
    pub fn subscribe(&mut self, name: &str, params: impl Into<Value>) -> SubscriptionHandle {
        let (handle, is_new) = self.subscriptions.subscribe(name, params.into());
        if is_new && self.state == ConnectionState::Connected {
            if let Some(message) = self.subscriptions.subscribe_message(handle.id()) {
                self.outbox.push_back(message);
            }
        }
        handle
    }

    /// Releases a handle; the last one stops the server subscription.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        let id = handle.id().clone();
        if !self.subscriptions.unsubscribe(handle) {
            return;
        }
        if self.state == ConnectionState::Connected {
            self.outbox.push_back(ClientMessage::Unsub { id: id.clone() });
        }
        self.cache.evict_subscription(&id);
        self.settle_unconfirmed();
    }

    pub fn is_ready(&self, handle: &SubscriptionHandle) -> bool {
        self.subscriptions.is_ready(handle)
    }

    pub fn on_ready<F>(&mut self, handle: &SubscriptionHandle, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.subscriptions.on_ready(handle, callback);
    }

    /// The `nosub` error of a failed subscription.
    pub fn subscription_error(&self, handle: &SubscriptionHandle) -> Option<&MethodError> {
        self.subscriptions.error(handle)
    }

    pub fn register_simulation<F>(&mut self, method: impl Into<String>, simulation: F)
    where
        F: Fn(&mut SimulationContext<'_>, &Value) -> Result<()> + 'static,
    {
        self.invoker.register(method, simulation);
    }

    /// Like `register_simulation`, for a method that inserts one document
    /// and returns the server's id for it. The optimistic insert moves to
    /// that id once the result arrives.
    pub fn register_insert_simulation<F>(&mut self, method: impl Into<String>, simulation: F)
    where
        F: Fn(&mut SimulationContext<'_>, &Value) -> Result<()> + 'static,
    {
        self.invoker.register_insert(method, simulation);
    }

    /// Invokes a server method, applying its simulation optimistically.
    pub fn call(&mut self, method: &str, args: impl Into<Value>) -> PendingCall {
        let (pending, patch) = self.invoker.begin(method, args.into(), &self.cache);
        if let Some(patch) = patch {
            self.cache.apply_patch(patch);
        }
        let correlation = pending.correlation();
        if self.state == ConnectionState::Connected {
            if let Some(message) = self.invoker.message(correlation) {
                self.outbox.push_back(message);
                self.invoker.mark_sent(correlation);
            }
        }
        tracing::debug!(method, %correlation, "method called");
        pending
    }

    pub fn find(&self, query: &Query) -> Vec<Document> {
        self.cache.find(query)
    }

    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.cache.get(id)
    }

    pub fn observe<F>(&mut self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.cache.observe(callback)
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.cache.unobserve(id)
    }

    /// Removes and returns every queued outgoing message.
    pub fn take_outbox(&mut self) -> Vec<ClientMessage> {
        self.outbox.drain(..).collect()
    }

    /// Like `take_outbox`, encoded as text frames.
    pub fn drain_frames(&mut self) -> Result<Vec<String>> {
        self.take_outbox().iter().map(codec::encode).collect()
    }

    /// Decodes and handles one incoming frame.
    pub fn receive_frame(&mut self, frame: &str) -> Result<()> {
        match codec::decode::<ServerMessage>(frame) {
            Ok(message) => self.receive(message),
            Err(error) => self.violation(error),
        }
    }

    /// Handles one incoming message. A protocol violation drops the
    /// connection and is returned.
    pub fn receive(&mut self, message: ServerMessage) -> Result<()> {
        match self.handle(message) {
            Err(error) if error.is_protocol_violation() => self.violation(error),
            other => other,
        }
    }

    fn violation(&mut self, error: Error) -> Result<()> {
        tracing::warn!(%error, "dropping connection");
        self.connection_lost();
        Err(error)
    }

    fn handle(&mut self, message: ServerMessage) -> Result<()> {
        if let ServerMessage::Connected { session } = message {
            return self.on_connected(session);
        }
        if let ServerMessage::Error { reason } = message {
            tracing::warn!(%reason, "server closed the connection");
            self.connection_lost();
            return Ok(());
        }
        if self.state != ConnectionState::Connected {
            return Err(Error::protocol_violation(format!(
                "message while {:?}",
                self.state
            )));
        }

        match message {
            ServerMessage::Added { .. } | ServerMessage::Changed { .. } | ServerMessage::Removed { .. } => {
                let Some((sub, seq, event)) = message.into_event() else {
                    return Ok(());
                };
                if !self.subscriptions.accept_seq(&sub, seq, self.config.strict_sequencing)? {
                    tracing::debug!(%sub, seq, "event for released subscription ignored");
                    return Ok(());
                }
                self.cache.apply_event(&sub, event)
            }
            ServerMessage::Ready { sub } => {
                if self.subscriptions.contains(&sub) {
                    self.cache.sweep_stale(&sub);
                    self.subscriptions.mark_ready(&sub);
                    self.settle_unconfirmed();
                }
                Ok(())
            }
            ServerMessage::NoSub { sub, error } => {
                tracing::warn!(%sub, %error, "subscription failed");
                if self.subscriptions.fail(&sub, error) {
                    self.cache.evict_subscription(&sub);
                    self.settle_unconfirmed();
                }
                Ok(())
            }
            ServerMessage::Result { id, outcome } => {
                if !self.invoker.is_awaiting(id) {
                    tracing::debug!(correlation = %id, "duplicate result ignored");
                    return Ok(());
                }
                match &outcome {
                    Outcome::Ok { value } => {
                        let server_id = self.invoker.assigned_id(id, value);
                        self.cache.commit(id, server_id.as_ref());
                    }
                    Outcome::Error { error } => {
                        tracing::debug!(correlation = %id, %error, "method failed");
                        self.cache.rollback(id);
                    }
                }
                self.invoker.resolve(id, outcome);
                Ok(())
            }
            ServerMessage::Updated { methods } => {
                for id in methods {
                    self.invoker.complete(id);
                    self.cache.discard(id);
                    self.unconfirmed.retain(|c| *c != id);
                }
                Ok(())
            }
            ServerMessage::Connected { .. } | ServerMessage::Error { .. } => Ok(()),
        }
    }

    fn on_connected(&mut self, session: SessionId) -> Result<()> {
        if self.state != ConnectionState::Connecting {
            return Err(Error::protocol_violation("unexpected connected"));
        }
        let resumed = self.session.as_ref() == Some(&session);
        tracing::info!(%session, resumed, "connected");
        self.state = ConnectionState::Connected;
        self.session = Some(session);

        self.outbox.extend(self.subscriptions.resubscribe_messages());
        let calls = self.invoker.take_unsent(self.config.resend_pending_methods);
        self.outbox.extend(calls);
        self.settle_unconfirmed();
        Ok(())
    }

    /// After a reconnect, once every held subscription has re-published (or
    /// none is held), the patches of calls answered before the drop are no
    /// longer needed.
    fn settle_unconfirmed(&mut self) {
        if self.unconfirmed.is_empty()
            || self.state != ConnectionState::Connected
            || !self.subscriptions.all_ready()
        {
            return;
        }
        for id in std::mem::take(&mut self.unconfirmed) {
            self.invoker.complete(id);
            self.cache.discard(id);
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
