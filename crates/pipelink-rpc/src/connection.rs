//! Peer connection shared between the inbound loop and outbound calls
//!
//! Exactly one peer connection is live at a time. Its read half is owned
//! exclusively by a background reader task that routes every inbound
//! frame: requests go, in arrival order, to the service's dispatch loop;
//! responses are matched by id against the map of pending outbound
//! calls. The write half sits behind an async mutex so responses and
//! outbound requests are never interleaved on the wire.
//!
//! The connection slot — the process-wide `Option` of the live
//! connection — is guarded by a short-held std mutex that is never held
//! across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pipelink_core::{LinkError, Result};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::framing;
use crate::protocol::{Incoming, Request, Response};

/// Read half of a connection, type-erased so tests can drive the loop
/// through an in-memory duplex stream
pub(crate) type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of a connection
pub(crate) type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// The shared slot holding the currently active peer connection.
///
/// `None` means no peer is attached and outbound calls must fail
/// immediately rather than block waiting for one.
pub(crate) type PeerSlot = Arc<Mutex<Option<Arc<PeerConnection>>>>;

pub(crate) fn empty_slot() -> PeerSlot {
    Arc::new(Mutex::new(None))
}

/// One live peer connection: shared writer, outbound-call correlation
/// state, and an idempotent close flag
pub(crate) struct PeerConnection {
    writer: tokio::sync::Mutex<WriteHalf>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PeerConnection {
    pub(crate) fn new(writer: WriteHalf) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Writes one message as a single frame. The writer lock guarantees
    /// frames from concurrent writers are never interleaved.
    pub(crate) async fn write_message(&self, body: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::TransportFailure("connection closed".into()));
        }
        let mut writer = self.writer.lock().await;
        framing::write_frame(&mut *writer, body).await
    }

    pub(crate) async fn send_response(&self, response: &Response) -> Result<()> {
        let body = serde_json::to_string(response)?;
        self.write_message(&body).await
    }

    /// Next outbound request id; ids are never reused within a
    /// connection's lifetime.
    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers an outbound call awaiting the response with this id.
    pub(crate) fn register_pending(&self, id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id, tx);
        rx
    }

    /// Drops an outbound call's registration (used when the request
    /// write fails and no response can ever arrive).
    pub(crate) fn forget_pending(&self, id: u64) {
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(&id);
    }

    /// Routes an inbound response to the outbound call waiting on it.
    pub(crate) fn complete(&self, response: Response) {
        let Some(id) = response.id.as_u64() else {
            warn!(id = %response.id, "response with unrecognized id shape, dropping");
            return;
        };
        let waiter = self
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(&id);
        match waiter {
            // A dropped receiver just means the caller gave up
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(id, "response does not match any pending call, dropping"),
        }
    }

    /// Fails every pending outbound call; used when the connection dies.
    pub(crate) fn fail_pending(&self) {
        let waiters: Vec<_> = self
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .drain()
            .collect();
        // Dropping the senders surfaces as a TransportFailure on the
        // caller's side of each oneshot
        drop(waiters);
    }

    /// Shuts the write half down and releases the handle. Idempotent:
    /// closing twice is a no-op.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.fail_pending();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("write-half shutdown failed: {e}");
        }
    }
}

/// Reads frames until the peer disconnects or the stream corrupts.
///
/// Requests are forwarded to the dispatch loop in arrival order (the
/// bounded channel provides backpressure, never reordering). Responses
/// complete pending outbound calls. Malformed bodies are answered with a
/// synthesized error response so one bad message does not end the
/// session; framing-level corruption does end it, since the stream
/// position is unrecoverable.
pub(crate) async fn reader_task(
    reader: ReadHalf,
    conn: Arc<PeerConnection>,
    inbound_tx: mpsc::Sender<Request>,
) {
    let mut reader = BufReader::new(reader);
    loop {
        match framing::read_frame(&mut reader).await {
            Ok(Some(body)) => {
                debug!(len = body.len(), "frame received");
                match Incoming::parse(&body) {
                    Ok(Incoming::Request(request)) => {
                        if inbound_tx.send(request).await.is_err() {
                            // Dispatch loop is gone, session is over
                            break;
                        }
                    }
                    Ok(Incoming::Response(response)) => conn.complete(response),
                    Err(error) => {
                        warn!(code = error.code, "undecodable message: {}", error.message);
                        let reply = Response::failure(Value::Null, error.code, error.message);
                        if conn.send_response(&reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => {
                debug!("peer disconnected");
                break;
            }
            Err(LinkError::ProtocolFraming(reason)) => {
                warn!("framing error, dropping connection: {reason}");
                break;
            }
            Err(e) => {
                warn!("read failed, dropping connection: {e}");
                break;
            }
        }
    }
    conn.fail_pending();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Params;
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    fn boxed<T: AsyncRead + AsyncWrite + Send + Unpin + 'static>(
        stream: T,
    ) -> (ReadHalf, WriteHalf) {
        let (read, write) = tokio::io::split(stream);
        (Box::new(read), Box::new(write))
    }

    #[tokio::test]
    async fn test_write_message_produces_one_frame() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (_read, write) = boxed(ours);
        let conn = PeerConnection::new(write);

        conn.write_message(r#"{"id":1}"#).await.unwrap();

        let (mut peer_read, _peer_write) = tokio::io::split(theirs);
        let mut received = vec![0u8; 64];
        let n = peer_read.read(&mut received).await.unwrap();
        assert_eq!(&received[..n], framing::encode(r#"{"id":1}"#).as_slice());
    }

    #[tokio::test]
    async fn test_complete_routes_by_id() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let (_read, write) = boxed(ours);
        let conn = PeerConnection::new(write);

        let id = conn.next_request_id();
        let rx = conn.register_pending(id);
        conn.complete(Response::success(json!(id), json!("done")));

        let response = rx.await.unwrap();
        assert_eq!(response.result, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_unmatched_response_is_dropped() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let (_read, write) = boxed(ours);
        let conn = PeerConnection::new(write);

        let rx = conn.register_pending(conn.next_request_id());
        conn.complete(Response::success(json!(9999), json!("stray")));

        // The waiter is still pending; failing the connection resolves it
        conn.fail_pending();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let (_read, write) = boxed(ours);
        let conn = PeerConnection::new(write);

        conn.close().await;
        conn.close().await;

        let result = conn.write_message("{}").await;
        assert!(matches!(result, Err(LinkError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn test_request_ids_are_not_reused() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let (_read, write) = boxed(ours);
        let conn = PeerConnection::new(write);

        let a = conn.next_request_id();
        let b = conn.next_request_id();
        let c = conn.next_request_id();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_reader_routes_requests_and_responses() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = boxed(ours);
        let conn = Arc::new(PeerConnection::new(write));
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);

        let id = conn.next_request_id();
        let pending = conn.register_pending(id);

        let reader = tokio::spawn(reader_task(read, conn.clone(), inbound_tx));

        // Peer sends one request and one response, interleaved
        let (peer_read, peer_write) = tokio::io::split(theirs);
        let mut peer_write: WriteHalf = Box::new(peer_write);
        let request = serde_json::to_string(&Request::new("ping", Params::new(), json!(7))).unwrap();
        framing::write_frame(&mut peer_write, &request).await.unwrap();
        let response =
            serde_json::to_string(&Response::success(json!(id), json!("pong"))).unwrap();
        framing::write_frame(&mut peer_write, &response).await.unwrap();

        let inbound = inbound_rx.recv().await.unwrap();
        assert_eq!(inbound.method, "ping");

        let completed = pending.await.unwrap();
        assert_eq!(completed.result, Some(json!("pong")));

        // Dropping both split halves closes the duplex so the reader sees EOF
        drop(peer_read);
        drop(peer_write);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_answers_garbage_with_parse_error() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = boxed(ours);
        let conn = Arc::new(PeerConnection::new(write));
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);

        let reader = tokio::spawn(reader_task(read, conn, inbound_tx));

        let (peer_read, peer_write) = tokio::io::split(theirs);
        let mut peer_write: WriteHalf = Box::new(peer_write);
        framing::write_frame(&mut peer_write, "{not json").await.unwrap();

        let mut peer_read = BufReader::new(peer_read);
        let reply = framing::read_frame(&mut peer_read).await.unwrap().unwrap();
        let parsed: Response = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed.error.unwrap().code, -32700);
        assert!(parsed.id.is_null());

        // Dropping both split halves closes the duplex so the reader sees EOF
        drop(peer_read);
        drop(peer_write);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_fails_pending_on_disconnect() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = boxed(ours);
        let conn = Arc::new(PeerConnection::new(write));
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);

        let id = conn.next_request_id();
        let pending = conn.register_pending(id);

        let reader = tokio::spawn(reader_task(read, conn, inbound_tx));
        drop(theirs);

        reader.await.unwrap();
        assert!(pending.await.is_err());
    }
}
