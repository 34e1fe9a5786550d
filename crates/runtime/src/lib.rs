//! Proxima runtime - IPC transport, connection, and host serve loop.
//!
//! This crate carries the plumbing between the orchestration/client
//! process (the engine) and the automation host process that owns the
//! real browser tabs:
//!
//! - **Transport**: newline-delimited JSON objects over any duplex
//!   byte stream (unix socket, TCP, stdio pipe).
//! - **Connection**: client-side request/response correlation by
//!   caller-assigned ids, with local timeouts and late-response drop.
//! - **Host**: server-side loop dispatching each request to a
//!   [`HostHandler`] on its own task, one response per request.
//!
//! # Message flow
//!
//! 1. Engine calls [`Connection::request`] with action + payload
//! 2. Connection assigns the next id and registers a oneshot callback
//! 3. The request is serialized and written as one line
//! 4. The host handles the action and writes back one line with the id
//! 5. The read loop correlates the response and completes the callback
//! 6. If nothing arrives within the bound, the caller gets a timeout
//!    and a response arriving later is dropped

pub mod connection;
pub mod error;
pub mod host;
pub mod transport;

pub use connection::Connection;
pub use error::{Error, Result};
pub use host::{HostHandler, serve};
pub use transport::{TransportParts, TransportReceiver, TransportSender, line_transport};
