//! Process glue for the embedded-interpreter side of the Pipelink bridge
//!
//! Reads configuration from the environment, sets up logging, registers
//! the built-in RPC handlers, and offers a thin proxy for calling back
//! into the host application.

pub mod config;
pub mod handlers;
pub mod host;
pub mod logging;
