//! Publication engine.
//!
//! Publications are named, parameterized live queries. `subscribe` evaluates
//! the publication's query once, emits an `added` for every document in the
//! initial result followed by `ready`, and registers an observer that turns
//! later store changes into incremental events for that subscription.
//!
//! The engine does no I/O: every operation returns the `Emission`s the caller
//! must deliver, tagged with the subscription they belong to.
//!
//! # Example
//!
//! ```ignore
//! use strand_reactive::{PublicationEngine, SubscriptionKey};
//! use strand_core::{Principal, Query, Value};
//!
//! let mut engine = PublicationEngine::new(store.clone());
//! engine.publish("tasks", |_principal, _params| Ok(Some(Query::all())));
//!
//! let emissions = engine.subscribe(key, "tasks", &Value::Null, &principal)?;
//! // ... deliver emissions, then for every change from the store feed:
//! let emissions = engine.on_store_change(&change);
//! ```

use crate::change_set::ChangeSet;
use crate::live_query::LiveQuery;
use crate::observer::{Observer, ObserverRegistry, Sequenced, SubscriptionKey};
use hashbrown::HashMap;
use std::sync::Arc;
use strand_core::{
    AccessPolicy, AllowAll, ConnectionId, Error, Principal, Query, Result, Value,
};
use strand_storage::{DocumentStore, StoreChange};

/// Maps subscription parameters and the caller to a query.
///
/// Returning `Ok(None)` publishes nothing; the subscription becomes ready
/// immediately with an empty result.
pub type QueryFactory = Box<dyn Fn(&Principal, &Value) -> Result<Option<Query>> + Send + Sync>;

/// Output of the engine, addressed to one subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum Emission {
    Event(SubscriptionKey, Sequenced),
    Ready(SubscriptionKey),
}

impl Emission {
    pub fn key(&self) -> &SubscriptionKey {
        match self {
            Emission::Event(key, _) | Emission::Ready(key) => key,
        }
    }
}

/// Registry of publications and their active observers.
pub struct PublicationEngine {
    store: Arc<dyn DocumentStore>,
    policy: Arc<dyn AccessPolicy>,
    publications: HashMap<String, QueryFactory>,
    observers: ObserverRegistry,
}

impl PublicationEngine {
    /// Creates an engine over `store` that allows every subscription.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            policy: Arc::new(AllowAll),
            publications: HashMap::new(),
            observers: ObserverRegistry::new(),
        }
    }

    pub fn set_policy(&mut self, policy: Arc<dyn AccessPolicy>) {
        self.policy = policy;
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Registers a named publication, replacing any previous one.
    pub fn publish<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Principal, &Value) -> Result<Option<Query>> + Send + Sync + 'static,
    {
        self.publications.insert(name.into(), Box::new(factory));
    }

    pub fn has_publication(&self, name: &str) -> bool {
        self.publications.contains_key(name)
    }

    /// Starts a subscription and returns its initial batch plus `ready`.
    ///
    /// A principal the policy denies gets an immediately-ready empty result
    /// rather than an error, so the existence of data is not revealed.
    pub fn subscribe(
        &mut self,
        key: SubscriptionKey,
        name: &str,
        params: &Value,
        principal: &Principal,
    ) -> Result<Vec<Emission>> {
        if self.observers.contains(&key) {
            return Err(Error::protocol_violation(format!(
                "subscription {} is already active",
                key.id
            )));
        }
        let factory = self
            .publications
            .get(name)
            .ok_or_else(|| Error::unknown_publication(name))?;

        if !self.policy.can_subscribe(principal, name, params) {
            tracing::debug!(publication = name, sub = %key.id, "subscription denied, publishing nothing");
            return Ok(vec![Emission::Ready(key)]);
        }
        let Some(query) = factory(principal, params)? else {
            return Ok(vec![Emission::Ready(key)]);
        };

        let (live, initial) = LiveQuery::start(query, self.store.as_ref())?;
        let mut observer = Observer::new(live);
        let mut emissions: Vec<Emission> = observer
            .sequence(ChangeSet::initial(initial))
            .into_iter()
            .map(|event| Emission::Event(key.clone(), event))
            .collect();
        tracing::debug!(
            publication = name,
            sub = %key.id,
            connection = %key.connection,
            documents = emissions.len(),
            "subscription started"
        );
        emissions.push(Emission::Ready(key.clone()));
        self.observers.register(key, observer);
        Ok(emissions)
    }

    /// Stops a subscription. Nothing further is emitted for it.
    pub fn unsubscribe(&mut self, key: &SubscriptionKey) -> bool {
        self.observers.unregister(key)
    }

    /// Stops every subscription of a connection.
    pub fn drop_connection(&mut self, connection: ConnectionId) -> usize {
        self.observers.unregister_connection(connection)
    }

    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        self.observers.contains(key)
    }

    /// Returns the number of active subscriptions.
    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.observers.len()
    }

    /// Turns one store change into events for every affected subscription.
    pub fn on_store_change(&mut self, change: &StoreChange) -> Vec<Emission> {
        self.observers
            .dispatch(change, self.store.as_ref())
            .into_iter()
            .flat_map(|(key, events)| {
                events
                    .into_iter()
                    .map(move |event| Emission::Event(key.clone(), event))
            })
            .collect()
    }
}
