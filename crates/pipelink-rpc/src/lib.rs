//! Bidirectional JSON-RPC transport over a named local pipe
//!
//! This crate lets a long-running embedded interpreter process exchange
//! method calls with a host process over a single duplex local channel:
//! - Content-Length framing for arbitrary JSON payloads
//! - a background accept/dispatch loop serving one peer at a time
//! - registered handlers answering inbound JSON-RPC requests
//! - outbound calls from this process to the peer, correlated by id,
//!   riding the same physical connection as inbound traffic

pub mod client;
mod connection;
pub mod dispatch;
pub mod framing;
pub mod listener;
pub mod protocol;
pub mod service;

pub use client::RpcClient;
pub use dispatch::{DispatchTable, DispatchTableBuilder, HandlerError, HandlerResult};
pub use listener::{PipeListener, channel_name};
pub use protocol::{ErrorObject, Incoming, Params, Request, Response};
pub use service::{PIPE_NAME_ENV, RpcService};
