//! TCP ingestion server.
//!
//! One listener task accepts connections; each connection runs in its own
//! task registered under its `ip:port` key in a mutex-guarded registry, so
//! shutdown can close every open connection deterministically. No framing
//! is applied on the wire: each chunk the transport delivers is treated as
//! one complete payload unit, which matches devices that write one JSON
//! object or one line per send.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::registry::{DeviceRegistry, IngestStore};
use crate::{Error, Result};

/// Fixed greeting written on accept.
const WELCOME: &[u8] = b"Welcome to DevPulse Device Management\n";

/// Error line written when processing a chunk fails. The connection stays
/// open for subsequent chunks.
const PROCESS_ERROR: &[u8] = b"ERROR: Failed to process data\n";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for the ingestion listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestServerConfig {
    /// Listening address.
    #[serde(default = "default_listen_addr")]
    pub listen: String,

    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2022
}

impl Default for IngestServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl IngestServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listening address.
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    /// Set the listening port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Get the full socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))
    }
}

impl From<&devpulse_core::config::TcpConfig> for IngestServerConfig {
    fn from(config: &devpulse_core::config::TcpConfig) -> Self {
        Self {
            listen: config.listen.clone(),
            port: config.port,
        }
    }
}

/// Registry entry for one open connection. The entry is inserted before
/// the handler task is spawned, so the task's deregistration on exit
/// always finds an entry to remove.
struct ConnectionHandle {
    handle: Option<JoinHandle<()>>,
}

type ConnectionMap = Arc<Mutex<HashMap<String, ConnectionHandle>>>;

/// Running TCP ingestion server.
pub struct IngestServer {
    registry: Arc<DeviceRegistry>,
    local_addr: SocketAddr,
    connections: ConnectionMap,
    shutdown_tx: watch::Sender<bool>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IngestServer {
    /// Bind the listener and start accepting connections.
    ///
    /// A bind failure is returned to the caller and is fatal at startup;
    /// accept errors after a successful bind are logged and retried.
    pub async fn start(config: IngestServerConfig, store: Arc<dyn IngestStore>) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "TCP ingestion server listening");

        let registry = Arc::new(DeviceRegistry::new(store));
        let connections: ConnectionMap = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_handle = tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            connections.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            registry,
            local_addr,
            connections,
            shutdown_tx,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    /// The address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared device registry backing this server.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Endpoint keys of the currently open connections.
    pub fn active_connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().keys().cloned().collect()
    }

    /// Stop accepting, close every registered connection, and clear the
    /// registry. Each step is awaited before the next.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let accept = self.accept_handle.lock().unwrap().take();
        if let Some(handle) = accept {
            let _ = handle.await;
        }

        let entries: Vec<(String, ConnectionHandle)> = {
            let mut connections = self.connections.lock().unwrap();
            connections.drain().collect()
        };
        for (peer, entry) in entries {
            debug!(%peer, "closing device connection");
            if let Some(handle) = entry.handle {
                let _ = handle.await;
            }
        }

        info!("TCP ingestion server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<DeviceRegistry>,
    connections: ConnectionMap,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let key = peer.to_string();
                    info!(%peer, "new device connection");

                    // Register before spawning: removal must always follow
                    // insertion, even for a connection that finishes
                    // immediately.
                    connections
                        .lock()
                        .unwrap()
                        .insert(key.clone(), ConnectionHandle { handle: None });
                    let handle = tokio::spawn(handle_connection(
                        socket,
                        peer,
                        registry.clone(),
                        connections.clone(),
                        shutdown.clone(),
                    ));
                    // If the task already ran to completion it removed its
                    // entry; the finished handle needs no tracking.
                    if let Some(entry) = connections.lock().unwrap().get_mut(&key) {
                        entry.handle = Some(handle);
                    }
                }
                Err(e) => {
                    // A broken accept is not fatal once the bind succeeded.
                    warn!(error = %e, "failed to accept connection");
                }
            },
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    registry: Arc<DeviceRegistry>,
    connections: ConnectionMap,
    mut shutdown: watch::Receiver<bool>,
) {
    let key = peer.to_string();

    if let Err(e) = socket.write_all(WELCOME).await {
        warn!(%peer, error = %e, "failed to write greeting");
        connections.lock().unwrap().remove(&key);
        return;
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            read = socket.read(&mut buf) => match read {
                Ok(0) => {
                    info!(%peer, "connection closed");
                    break;
                }
                Ok(n) => {
                    if !process_chunk(&mut socket, peer, &registry, &buf[..n]).await {
                        break;
                    }
                }
                Err(e) => {
                    // Terminal for this connection only.
                    warn!(%peer, error = %e, "socket error");
                    break;
                }
            },
        }
    }

    connections.lock().unwrap().remove(&key);
}

/// Process one chunk and write the response. Returns false when the
/// connection should close (write failures only; processing errors keep
/// the connection open).
async fn process_chunk(
    socket: &mut TcpStream,
    peer: SocketAddr,
    registry: &DeviceRegistry,
    chunk: &[u8],
) -> bool {
    let response = match registry.ingest(chunk, peer) {
        Ok(ack) => match serde_json::to_vec(&ack) {
            Ok(mut line) => {
                line.push(b'\n');
                line
            }
            Err(e) => {
                error!(%peer, error = %e, "failed to encode acknowledgment");
                PROCESS_ERROR.to_vec()
            }
        },
        Err(e) => {
            error!(%peer, error = %e, "error processing data");
            PROCESS_ERROR.to_vec()
        }
    };

    socket.write_all(&response).await.is_ok()
}
