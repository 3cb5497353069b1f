//! Connection hub.
//!
//! The hub owns the publication engine, the method registry, the session
//! table and one outbound frame queue per connection. It is driven by a
//! single owner: `Server` runs it on a task, tests drive it directly.
//!
//! Ordering per connection follows the order of `handle` calls: changes
//! already in the store feed go out first, then a method's `result`, then
//! every change event its writes caused, then `updated`.

use crate::config::ServerConfig;
use crate::methods::{MethodContext, MethodRegistry};
use crate::session::SessionTable;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strand_core::{
    AccessPolicy, AllowAll, ConnectionId, CorrelationId, Error, Principal, Query, Result,
    SessionId, SubscriptionId, Value,
};
use strand_protocol::{codec, ClientMessage, MethodError, Outcome, ServerMessage, PROTOCOL_VERSION};
use strand_reactive::{Emission, PublicationEngine, Sequenced, SubscriptionKey};
use strand_storage::{ChangeFeed, DocumentStore, StoreChange};
use tokio::sync::mpsc;

/// Outbound text frames of one connection.
pub type FrameReceiver = mpsc::UnboundedReceiver<String>;

struct Connection {
    principal: Principal,
    session: Option<SessionId>,
    outbound: mpsc::UnboundedSender<String>,
}

/// Single owner of all server-side sync state.
pub struct Hub {
    config: ServerConfig,
    feed: ChangeFeed,
    engine: PublicationEngine,
    methods: MethodRegistry,
    policy: Arc<dyn AccessPolicy>,
    connections: BTreeMap<ConnectionId, Connection>,
    sessions: SessionTable,
    next_connection: u64,
}

impl Hub {
    /// Creates a hub over `store` and starts watching its change feed.
    pub fn new(store: Arc<dyn DocumentStore>, config: ServerConfig) -> Result<Self> {
        let feed = store.on_change()?;
        let sessions = SessionTable::new(config.method_result_retention, config.retained_sessions);
        Ok(Self {
            config,
            feed,
            engine: PublicationEngine::new(store),
            methods: MethodRegistry::new(),
            policy: Arc::new(AllowAll),
            connections: BTreeMap::new(),
            sessions,
            next_connection: 0,
        })
    }

    /// Replaces the access policy for subscriptions and methods.
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.engine.set_policy(policy.clone());
        self.policy = policy;
        self
    }

    /// Registers a publication.
    pub fn publish<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Principal, &Value) -> Result<Option<Query>> + Send + Sync + 'static,
    {
        self.engine.publish(name, factory);
    }

    /// Registers a method.
    pub fn method<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&MethodContext<'_>, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.register(name, handler);
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.engine.store()
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.engine.subscription_count()
    }

    /// Accepts a connection for an optional authenticated user.
    pub fn open(&mut self, user_id: Option<String>) -> (ConnectionId, FrameReceiver) {
        self.next_connection += 1;
        let id = ConnectionId::new(self.next_connection);
        let mut principal = Principal::anonymous(id);
        principal.user_id = user_id;
        let (outbound, rx) = mpsc::unbounded_channel();
        tracing::info!(connection = %id, user = ?principal.user_id, "connection opened");
        self.connections.insert(
            id,
            Connection {
                principal,
                session: None,
                outbound,
            },
        );
        (id, rx)
    }

    /// Drops a connection and all of its subscriptions. Its session stays
    /// resumable for a while.
    pub fn close(&mut self, connection: ConnectionId) {
        let Some(conn) = self.connections.remove(&connection) else {
            return;
        };
        let dropped = self.engine.drop_connection(connection);
        if let Some(session) = &conn.session {
            self.sessions.detach(session);
        }
        tracing::info!(%connection, subscriptions = dropped, "connection closed");
    }

    /// Tells the peer why and drops the connection.
    pub fn reject(&mut self, connection: ConnectionId, error: &Error) {
        tracing::warn!(%connection, %error, "rejecting connection");
        self.send(
            connection,
            &ServerMessage::Error {
                reason: error.to_string(),
            },
        );
        self.close(connection);
    }

    /// Decodes and handles one frame. A protocol violation rejects the
    /// connection and is returned.
    pub fn handle_frame(&mut self, connection: ConnectionId, frame: &str) -> Result<()> {
        let result = codec::decode::<ClientMessage>(frame).and_then(|message| self.handle(connection, message));
        if let Err(error) = &result {
            if error.is_protocol_violation() {
                self.reject(connection, error);
            }
        }
        result
    }

    /// Handles one message from a connection.
    pub fn handle(&mut self, connection: ConnectionId, message: ClientMessage) -> Result<()> {
        let conn = self.connections.get_mut(&connection).ok_or(Error::ConnectionLost)?;

        if let ClientMessage::Connect { version, session } = message {
            if conn.session.is_some() {
                return Err(Error::protocol_violation("already connected"));
            }
            if version != PROTOCOL_VERSION {
                return Err(Error::protocol_violation(format!(
                    "unsupported protocol version {version}"
                )));
            }
            let (session, resumed) = self.sessions.attach(session);
            conn.session = Some(session.clone());
            tracing::info!(%connection, %session, resumed, "session attached");
            self.send(connection, &ServerMessage::Connected { session });
            return Ok(());
        }

        let Some(session) = conn.session.clone() else {
            return Err(Error::protocol_violation("message before connect"));
        };
        let principal = conn.principal.clone();

        match message {
            ClientMessage::Sub { id, name, params } => {
                self.on_subscribe(&principal, id, &name, &params)
            }
            ClientMessage::Unsub { id } => {
                let key = SubscriptionKey::new(connection, id);
                if self.engine.unsubscribe(&key) {
                    tracing::debug!(%connection, sub = %key.id, "unsubscribed");
                }
                Ok(())
            }
            ClientMessage::Method { id, method, args } => {
                self.on_method(&principal, &session, id, &method, &args);
                Ok(())
            }
            ClientMessage::Connect { .. } => Ok(()),
        }
    }

    fn on_subscribe(
        &mut self,
        principal: &Principal,
        id: SubscriptionId,
        name: &str,
        params: &Value,
    ) -> Result<()> {
        self.pump();
        let connection = principal.connection;
        let key = SubscriptionKey::new(connection, id.clone());
        match self.engine.subscribe(key, name, params, principal) {
            Ok(emissions) => self.route(emissions),
            Err(error) if error.is_protocol_violation() => return Err(error),
            Err(error) => {
                tracing::warn!(%connection, sub = %id, publication = name, %error, "subscription failed");
                self.send(
                    connection,
                    &ServerMessage::NoSub {
                        sub: id,
                        error: MethodError::from(&error),
                    },
                );
            }
        }
        Ok(())
    }

    fn on_method(
        &mut self,
        principal: &Principal,
        session: &SessionId,
        id: CorrelationId,
        method: &str,
        args: &Value,
    ) {
        // Writes queued before this call are routed ahead of its result.
        self.pump();
        let connection = principal.connection;
        if let Some(outcome) = self.sessions.completed(session, id).cloned() {
            tracing::debug!(%connection, correlation = %id, method, "replaying recorded outcome");
            self.send(connection, &ServerMessage::Result { id, outcome });
            self.send(connection, &ServerMessage::Updated { methods: vec![id] });
            return;
        }

        let result = if !self.policy.can_invoke(principal, method, args) {
            Err(Error::unauthorized(format!("not allowed to call {method}")))
        } else if let Some(handler) = self.methods.get(method) {
            let ctx = MethodContext::new(principal, self.engine.store().as_ref(), id);
            handler(&ctx, args)
        } else {
            Err(Error::unknown_method(method))
        };

        match &result {
            Ok(_) => tracing::debug!(%connection, correlation = %id, method, "method completed"),
            Err(error @ Error::NotFound { .. }) => {
                tracing::warn!(%connection, correlation = %id, method, %error, "method target missing")
            }
            Err(error) => tracing::debug!(%connection, correlation = %id, method, %error, "method failed"),
        }

        let outcome = Outcome::from(result);
        self.sessions.record(session, id, outcome.clone());
        self.send(connection, &ServerMessage::Result { id, outcome });
        self.pump();
        self.send(connection, &ServerMessage::Updated { methods: vec![id] });
    }

    /// Drains the store change feed, routing every resulting event.
    pub fn pump(&mut self) {
        while let Ok(change) = self.feed.try_recv() {
            self.apply_change(&change);
        }
    }

    /// Routes the events one store change causes.
    pub fn apply_change(&mut self, change: &StoreChange) {
        let emissions = self.engine.on_store_change(change);
        self.route(emissions);
    }

    /// Waits for the next store change.
    pub async fn next_change(&mut self) -> Option<StoreChange> {
        self.feed.recv().await
    }

    fn route(&self, emissions: Vec<Emission>) {
        for emission in emissions {
            let (connection, message) = match emission {
                Emission::Event(key, Sequenced { seq, event }) => {
                    (key.connection, ServerMessage::event(key.id, seq, event))
                }
                Emission::Ready(key) => (key.connection, ServerMessage::Ready { sub: key.id }),
            };
            self.send(connection, &message);
        }
    }

    fn send(&self, connection: ConnectionId, message: &ServerMessage) {
        let Some(conn) = self.connections.get(&connection) else {
            return;
        };
        match codec::encode(message) {
            Ok(frame) => {
                if conn.outbound.send(frame).is_err() {
                    tracing::debug!(%connection, "peer stopped reading");
                }
            }
            Err(error) => tracing::warn!(%connection, %error, "dropping unencodable message"),
        }
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("subscriptions", &self.engine.subscription_count())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
