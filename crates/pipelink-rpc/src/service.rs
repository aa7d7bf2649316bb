//! RPC service lifecycle and inbound loop
//!
//! The service owns the listener and a single background task that
//! accepts one peer at a time, publishes the live connection into the
//! shared slot, and dispatches inbound requests strictly in arrival
//! order until the peer disconnects, then loops back to accept the next
//! peer. `stop()` is advisory and non-blocking: it flips a flag the loop
//! observes at its await points; a task stuck deep in a system call is
//! abandoned at process exit, never joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipelink_core::{LinkError, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::client::RpcClient;
use crate::connection::{PeerConnection, PeerSlot, ReadHalf, WriteHalf, empty_slot, reader_task};
use crate::dispatch::DispatchTable;
use crate::listener::{self, PipeListener};

/// Environment variable naming the local-IPC channel
pub const PIPE_NAME_ENV: &str = "PIPELINK_RPC_PIPE";

/// Inbound requests buffered between the reader task and the dispatch
/// loop; bounded so a flooding peer gets backpressure instead of memory
const INBOUND_QUEUE_DEPTH: usize = 32;

/// Only one service may run per process
static SERVICE_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct ServiceShared {
    listener: PipeListener,
    table: DispatchTable,
    peer: PeerSlot,
    state: Mutex<ServiceState>,
}

/// JSON-RPC service bound to a named local channel
pub struct RpcService {
    shared: Arc<ServiceShared>,
    shutdown_tx: watch::Sender<bool>,
}

impl RpcService {
    /// Builds a service from an optional configured channel name.
    ///
    /// `None` means the feature is disabled, reported as
    /// [`LinkError::ConfigMissing`] for the caller to downgrade to an
    /// info-level "not configured" note rather than an error.
    pub fn from_config(pipe_name: Option<&str>, table: DispatchTable) -> Result<Self> {
        let name = pipe_name.ok_or_else(|| {
            LinkError::ConfigMissing(format!("{PIPE_NAME_ENV} is not set, RPC service disabled"))
        })?;
        Self::bind(name, table)
    }

    /// Binds the named channel and prepares the service in the stopped
    /// state; `start` actually begins accepting.
    pub fn bind(pipe_name: &str, table: DispatchTable) -> Result<Self> {
        let listener = PipeListener::bind(pipe_name)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(ServiceShared {
                listener,
                table,
                peer: empty_slot(),
                state: Mutex::new(ServiceState::Stopped),
            }),
            shutdown_tx,
        })
    }

    /// Spawns the background accept/dispatch loop.
    ///
    /// Calling `start` twice on the same service is a warned no-op;
    /// starting a second service while another is running in this
    /// process is rejected.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().expect("service state lock poisoned");
            match *state {
                ServiceState::Running | ServiceState::Starting => {
                    warn!("RPC service already running");
                    return Ok(());
                }
                ServiceState::Stopping => {
                    return Err(LinkError::Service(
                        "service is stopping and cannot be restarted".into(),
                    ));
                }
                ServiceState::Stopped => {}
            }
            if SERVICE_ACTIVE.swap(true, Ordering::AcqRel) {
                return Err(LinkError::Service(
                    "another RPC service is already running in this process".into(),
                ));
            }
            *state = ServiceState::Starting;
            let shared = self.shared.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(run(shared, shutdown));
            *state = ServiceState::Running;
        }

        info!("RPC service started");
        Ok(())
    }

    /// Requests shutdown and returns immediately; idempotent.
    ///
    /// The background task notices the flag at its next await point. It
    /// is never joined: a loop blocked on a peer that stays silent only
    /// goes away with the process.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock().expect("service state lock poisoned");
            match *state {
                ServiceState::Stopped | ServiceState::Stopping => {
                    info!("RPC service stop already requested");
                }
                _ => {
                    *state = ServiceState::Stopping;
                    info!("RPC service stopping");
                }
            }
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Client handle for outbound calls riding the active connection.
    pub fn client(&self) -> RpcClient {
        RpcClient::new(self.shared.peer.clone())
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.shared.state.lock().expect("service state lock poisoned"),
            ServiceState::Running | ServiceState::Starting
        )
    }
}

/// Accept loop: one peer at a time, forever, until told to stop.
async fn run(shared: Arc<ServiceShared>, mut shutdown: watch::Receiver<bool>) {
    let accept_guard = shutdown.clone();
    loop {
        if *shutdown.borrow() {
            break;
        }

        let accepted = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Service handle dropped; treat as stop
                    break;
                }
                continue;
            }
            stream = shared.listener.accept(|| !*accept_guard.borrow()) => stream,
        };

        let Some(stream) = accepted else {
            if *shutdown.borrow() {
                break;
            }
            // Transient accept failure; pause briefly so a broken
            // listener cannot spin the loop hot
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        };

        let (read, write) = listener::into_halves(stream);
        serve_stream(read, write, &shared.table, &shared.peer, &mut shutdown).await;
    }

    *shared.state.lock().expect("service state lock poisoned") = ServiceState::Stopped;
    SERVICE_ACTIVE.store(false, Ordering::Release);
    info!("RPC service loop exited");
}

/// Serves one connected peer until it disconnects, the stream corrupts,
/// or shutdown is requested.
///
/// The read half goes to a background reader task that correlates
/// responses to outbound calls and queues inbound requests; this loop
/// consumes that queue one request at a time, so dispatch order matches
/// arrival order and responses are written in the same order. The live
/// connection is published into the shared slot on entry and cleared on
/// the way out.
pub(crate) async fn serve_stream(
    read: ReadHalf,
    write: WriteHalf,
    table: &DispatchTable,
    peer: &PeerSlot,
    shutdown: &mut watch::Receiver<bool>,
) {
    let conn = Arc::new(PeerConnection::new(write));
    *peer.lock().expect("peer slot lock poisoned") = Some(conn.clone());

    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    let reader = tokio::spawn(reader_task(read, conn.clone(), inbound_tx));

    loop {
        let request = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            request = inbound_rx.recv() => match request {
                Some(request) => request,
                // Reader hit EOF or a framing error
                None => break,
            },
        };

        if let Some(response) = table.dispatch(request).await {
            if let Err(e) = conn.send_response(&response).await {
                warn!("failed to write response: {e}");
                break;
            }
        }
    }

    peer.lock().expect("peer slot lock poisoned").take();
    conn.close().await;
    reader.abort();
    let _ = reader.await;
    info!("peer session ended");
}
