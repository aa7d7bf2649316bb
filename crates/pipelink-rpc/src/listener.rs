//! Named local-IPC listener
//!
//! One named duplex channel, one peer at a time. On Windows the channel
//! name maps to a named pipe (`\\.\pipe\<name>`); elsewhere it maps to a
//! Unix-domain socket under the system temp directory. Both ends resolve
//! the OS-level name through [`channel_name`], so a host process only
//! needs the configured name to connect.

use pipelink_core::{LinkError, Result};

use interprocess::local_socket::tokio::Stream;
use interprocess::local_socket::traits::tokio::{Listener as _, Stream as _};
use interprocess::local_socket::{ListenerOptions, Name};

#[cfg(not(windows))]
use interprocess::local_socket::{GenericFilePath, ToFsName};
#[cfg(windows)]
use interprocess::local_socket::{GenericNamespaced, ToNsName};

use tracing::{debug, error, info};

use crate::connection::{ReadHalf, WriteHalf};

/// Resolves a configured channel name to the platform's OS-level name.
pub fn channel_name(pipe_name: &str) -> std::io::Result<Name<'static>> {
    #[cfg(windows)]
    {
        pipe_name.to_string().to_ns_name::<GenericNamespaced>()
    }
    #[cfg(not(windows))]
    {
        socket_path(pipe_name).to_fs_name::<GenericFilePath>()
    }
}

#[cfg(not(windows))]
fn socket_path(pipe_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{pipe_name}.sock"))
}

/// Listener bound to a named local channel
pub struct PipeListener {
    inner: interprocess::local_socket::tokio::Listener,
    #[cfg(not(windows))]
    path: std::path::PathBuf,
}

impl PipeListener {
    /// Binds the named channel.
    ///
    /// A socket file left behind by a crashed process is removed and the
    /// bind retried, but only after confirming nothing is listening on
    /// it; a live listener yields a service error instead.
    pub fn bind(pipe_name: &str) -> Result<Self> {
        let listener = match Self::try_create(pipe_name) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                Self::recover_addr_in_use(pipe_name, e)?
            }
            Err(e) => {
                return Err(LinkError::Service(format!(
                    "failed to bind channel {pipe_name:?}: {e}"
                )));
            }
        };

        info!(channel = pipe_name, "listening for a peer");
        Ok(Self {
            inner: listener,
            #[cfg(not(windows))]
            path: socket_path(pipe_name),
        })
    }

    /// Handles a bind that failed because the name is taken. A name held
    /// by a live listener is a hard error; on platforms with filesystem
    /// sockets, a leftover from a crashed process is cleaned up and the
    /// bind retried.
    #[cfg(windows)]
    fn recover_addr_in_use(
        pipe_name: &str,
        err: std::io::Error,
    ) -> Result<interprocess::local_socket::tokio::Listener> {
        Err(LinkError::Service(format!(
            "channel {pipe_name:?} is already in use: {err}"
        )))
    }

    #[cfg(not(windows))]
    fn recover_addr_in_use(
        pipe_name: &str,
        err: std::io::Error,
    ) -> Result<interprocess::local_socket::tokio::Listener> {
        debug!("bind reported name in use: {err}");
        let path = socket_path(pipe_name);
        if std::os::unix::net::UnixStream::connect(&path).is_ok() {
            return Err(LinkError::Service(format!(
                "channel {pipe_name:?} is already in use"
            )));
        }
        info!(path = %path.display(), "removing stale socket");
        std::fs::remove_file(&path)
            .map_err(|e| LinkError::Service(format!("failed to remove stale socket: {e}")))?;
        Self::try_create(pipe_name)
            .map_err(|e| LinkError::Service(format!("failed to bind channel {pipe_name:?}: {e}")))
    }

    fn try_create(
        pipe_name: &str,
    ) -> std::io::Result<interprocess::local_socket::tokio::Listener> {
        ListenerOptions::new()
            .name(channel_name(pipe_name)?)
            .create_tokio()
    }

    /// Blocks until a peer connects.
    ///
    /// Returns `None` on accept failure. The failure is logged only
    /// while `should_continue()` still holds; during shutdown a failed
    /// or cancelled accept is the expected way out and stays quiet.
    pub async fn accept<F>(&self, should_continue: F) -> Option<Stream>
    where
        F: Fn() -> bool,
    {
        match self.inner.accept().await {
            Ok(stream) => {
                debug!("peer connected");
                Some(stream)
            }
            Err(e) => {
                if should_continue() {
                    error!("accept failed: {e}");
                }
                None
            }
        }
    }
}

#[cfg(not(windows))]
impl Drop for PipeListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Splits an accepted stream into the type-erased halves the connection
/// layer works with.
pub(crate) fn into_halves(stream: Stream) -> (ReadHalf, WriteHalf) {
    let (recv, send) = stream.split();
    (Box::new(recv), Box::new(send))
}
