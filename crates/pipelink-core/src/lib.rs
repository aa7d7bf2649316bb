//! # pipelink-core
//!
//! Core types for the Pipelink bridge: the error taxonomy shared by the
//! transport, service, and client layers, plus the JSON-RPC error codes
//! used on the wire.

pub mod error;

pub use error::{LinkError, Result, error_codes};
