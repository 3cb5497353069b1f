//! Strand Server - the server half of the Strand sync engine.
//!
//! - `Hub`: connections, publications, methods and sessions behind one owner
//! - `Server` / `ServerHandle`: runs a hub on a tokio task
//! - `MethodRegistry` / `MethodContext`: server methods with explicit principals
//! - `SessionTable`: resumable sessions and at-most-once method outcomes
//! - `ServerConfig`: TOML-loadable tunables
//!
//! # Example
//!
//! ```ignore
//! use strand_server::{Hub, Server, ServerConfig};
//!
//! let mut hub = Hub::new(store.clone(), ServerConfig::default())?;
//! hub.publish("tasks", |_principal, _params| Ok(Some(Query::all())));
//! hub.method("tasks.delete", |ctx, args| {
//!     let id = DocumentId::new(arg(args, "_id")?.as_str().unwrap_or_default());
//!     Ok(Value::from(ctx.store().remove(&id)? as i64))
//! });
//!
//! let server = Server::new(hub).spawn();
//! let mut link = server.connect(None).await?;
//! link.send(frame)?;
//! ```

pub mod config;
pub mod hub;
pub mod methods;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use hub::{FrameReceiver, Hub};
pub use methods::{arg, MethodContext, MethodHandler, MethodRegistry};
pub use server::{ClientLink, Server, ServerHandle};
pub use session::SessionTable;
