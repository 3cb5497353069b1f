//! Strand Protocol - the change propagation channel.
//!
//! Messages exchanged between a Strand server and its clients, and the JSON
//! text frame codec that carries them. The transport itself is out of scope:
//! anything that moves ordered text frames will do.
//!
//! # Example
//!
//! ```rust
//! use strand_protocol::{codec, ClientMessage, PROTOCOL_VERSION};
//!
//! let frame = codec::encode(&ClientMessage::Connect { version: PROTOCOL_VERSION, session: None }).unwrap();
//! assert_eq!(frame, r#"{"msg":"connect","version":1}"#);
//! let decoded: ClientMessage = codec::decode(&frame).unwrap();
//! assert!(matches!(decoded, ClientMessage::Connect { .. }));
//! ```

pub mod codec;
mod message;

pub use message::{ClientMessage, MethodError, Outcome, ServerMessage, PROTOCOL_VERSION};
