//! Convenience proxy for calling into the host application

use pipelink_rpc::{Params, RpcClient};
use serde_json::json;
use tracing::warn;

/// Thin wrapper over [`RpcClient`] for the host methods this process
/// actually uses. RPC failures are logged, never propagated: losing a
/// forwarded log line must not disturb the caller.
pub struct HostProxy {
    client: RpcClient,
}

impl HostProxy {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    /// Writes a log line through the host application. Returns whether
    /// the host accepted it.
    pub async fn log_message(&self, message: &str) -> bool {
        let mut params = Params::new();
        params.insert("message".into(), json!(message));
        match self.client.call("log_message", params).await {
            Ok(_) => true,
            Err(e) => {
                warn!("failed to forward log message to host: {e}");
                false
            }
        }
    }
}
