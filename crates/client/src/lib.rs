//! Strand Client - the client half of the Strand sync engine.
//!
//! This crate keeps a local cache of the documents a client's subscriptions
//! publish and layers optimistic method results on top of it:
//!
//! - `ClientCache`: authoritative documents plus optimistic patches; reads see both
//! - `SubscriptionManager`: deduplicated, reference-counted subscriptions
//! - `MethodInvoker`: local simulations, pending calls and their results
//! - `Client`: the channel state machine tying them to a transport
//!
//! # Example
//!
//! ```ignore
//! use strand_client::{Client, ClientConfig};
//!
//! let mut client = Client::new(ClientConfig::default());
//! client.connect();
//! let tasks = client.subscribe("tasks", Value::Null);
//! let call = client.call("tasks.insert", serde_json::json!({"text": "Buy milk"}));
//! // the new task is visible in client.find(..) right away
//! let id = call.await?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod invoker;
pub mod patch;
pub mod subscriptions;

pub use cache::{ClientCache, ObserverId};
pub use client::{Client, ConnectionState};
pub use config::ClientConfig;
pub use invoker::{MethodInvoker, MethodResult, PendingCall, Simulation, SimulationContext};
pub use patch::{OptimisticPatch, PatchOp, PatchState};
pub use subscriptions::{SubscriptionHandle, SubscriptionManager};
