//! Method dispatch for inbound JSON-RPC requests
//!
//! Handlers are registered explicitly at process start through
//! [`DispatchTable::builder`]; the resulting table is immutable and safe
//! to share with the service's background task without further
//! synchronization. A handler defect never crashes the inbound loop:
//! errors become JSON-RPC error responses and panics are caught and
//! converted to internal-error responses.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use pipelink_core::error_codes;
use tracing::{debug, warn};

use crate::protocol::{Params, Request, Response};

/// Structured failure returned by a handler, mapped onto the JSON-RPC
/// error object verbatim
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub code: i32,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Internal error (`-32603`)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    /// Invalid params (`-32602`)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }
}

pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// A registered method handler: takes the parsed parameter mapping,
/// returns a JSON-serializable value or a structured error
type BoxedHandler = Box<dyn Fn(Params) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Builder for the method registry
#[derive(Default)]
pub struct DispatchTableBuilder {
    methods: HashMap<String, BoxedHandler>,
}

impl DispatchTableBuilder {
    /// Registers `handler` under `name`, replacing (with a warning) any
    /// earlier registration of the same name.
    pub fn register<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |params| Box::pin(handler(params)));
        if self.methods.insert(name.to_string(), boxed).is_some() {
            warn!(method = name, "handler registered twice, keeping the last one");
        }
        self
    }

    pub fn build(self) -> DispatchTable {
        DispatchTable {
            methods: self.methods,
        }
    }
}

/// Immutable mapping from method name to handler
pub struct DispatchTable {
    methods: HashMap<String, BoxedHandler>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    /// Names of all registered methods, for startup logging
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Dispatches one inbound request.
    ///
    /// Returns `None` for notifications (`id: null`), which get no
    /// response no matter how the handler fares. Unknown methods yield
    /// `-32601`; a handler panic yields `-32603`.
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        let Request {
            method, params, id, ..
        } = request;
        let is_notification = id.is_null();

        let Some(handler) = self.methods.get(&method) else {
            warn!(method = %method, "no handler for method");
            if is_notification {
                return None;
            }
            return Some(Response::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ));
        };

        debug!(method = %method, "dispatching request");
        let outcome = AssertUnwindSafe(handler(params)).catch_unwind().await;

        if is_notification {
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(method = %method, code = e.code, "notification handler failed: {}", e.message),
                Err(payload) => warn!(method = %method, "notification handler panicked: {}", panic_message(payload)),
            }
            return None;
        }

        let response = match outcome {
            Ok(Ok(value)) => Response::success(id, value),
            Ok(Err(e)) => Response::failure(id, e.code, e.message),
            Err(payload) => Response::failure(
                id,
                error_codes::INTERNAL_ERROR,
                format!("internal error: {}", panic_message(payload)),
            ),
        };
        Some(response)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}
