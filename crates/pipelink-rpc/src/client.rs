//! Outbound JSON-RPC calls toward the host process
//!
//! Calls ride the same physical connection the service uses for inbound
//! traffic. The client never owns a connection: each call reads the
//! shared slot and fails immediately with `NoActivePeer` when no peer is
//! attached; blocking on a future connection could deadlock the only
//! task able to accept one.

use pipelink_core::{LinkError, Result};
use serde_json::Value;
use tracing::debug;

use crate::connection::{PeerConnection, PeerSlot};
use crate::protocol::{Params, Request};

/// Handle for issuing calls to the peer over the active connection
#[derive(Clone)]
pub struct RpcClient {
    peer: PeerSlot,
}

impl RpcClient {
    pub(crate) fn new(peer: PeerSlot) -> Self {
        Self { peer }
    }

    /// Calls `method` on the peer and blocks until the correlated
    /// response arrives.
    ///
    /// Returns the `result` payload on success. An `error` response
    /// raises [`LinkError::RemoteFailure`] with the remote code and
    /// message; a dead or dying connection raises
    /// [`LinkError::TransportFailure`].
    pub async fn call(&self, method: &str, params: Params) -> Result<Value> {
        let conn = self.active_peer()?;

        let id = conn.next_request_id();
        let request = Request::new(method, params, Value::from(id));
        let body = serde_json::to_string(&request)?;

        // Register before writing so the response cannot slip past the
        // reader between write and registration
        let pending = conn.register_pending(id);
        debug!(method, id, "outbound call");
        if let Err(e) = conn.write_message(&body).await {
            conn.forget_pending(id);
            return Err(e);
        }

        let response = pending.await.map_err(|_| {
            LinkError::TransportFailure("connection closed while awaiting response".into())
        })?;

        match response.error {
            Some(error) => Err(LinkError::RemoteFailure {
                code: error.code,
                message: error.message,
            }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Sends a notification (`id: null`); no response is expected and
    /// none is awaited.
    pub async fn notify(&self, method: &str, params: Params) -> Result<()> {
        let conn = self.active_peer()?;
        let request = Request::notification(method, params);
        let body = serde_json::to_string(&request)?;
        debug!(method, "outbound notification");
        conn.write_message(&body).await
    }

    fn active_peer(&self) -> Result<std::sync::Arc<PeerConnection>> {
        self.peer
            .lock()
            .expect("peer slot lock poisoned")
            .clone()
            .ok_or(LinkError::NoActivePeer)
    }
}
