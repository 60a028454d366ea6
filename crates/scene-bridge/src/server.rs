//! Listener lifecycle and connection handling for the host side.
//!
//! The server owns one listener and a small explicit state machine around
//! it: idle until started, listening while the accept loop runs, stopped
//! after shutdown. `start` is idempotent and `stop` is safe in any state,
//! so host UI code can wire both to buttons without guarding call order.
//!
//! Each accepted connection gets its own task. Connections carry strictly
//! alternating request/response traffic; everything that touches the host
//! goes through the dispatcher and its main loop handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::framing;
use crate::host::{ResourceProvider, ToolRegistry};
use crate::mainloop::MainLoopHandle;
use crate::transport::{self, Endpoint, Listener, Stream};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

enum Lifecycle {
    Idle,
    Listening(ListenerTask),
    Stopped,
}

/// A running accept loop and its shutdown plumbing.
struct ListenerTask {
    endpoint: Endpoint,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ListenerTask {
    fn signal_shutdown(&mut self) {
        // Stop accepting new connections.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Tell active connection handlers to close.
        let _ = self.conn_shutdown_tx.send(true);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// The host-side server: binds the endpoint and serves every connection.
pub struct BridgeServer {
    config: ServerConfig,
    dispatcher: Dispatcher,
    state: Mutex<Lifecycle>,
}

impl BridgeServer {
    /// Assemble a server from the host's integration pieces.
    ///
    /// Nothing listens until [`start`](Self::start) is called.
    pub fn new(
        config: ServerConfig,
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn ResourceProvider>,
        main_loop: MainLoopHandle,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry, provider, main_loop, config.call_timeout);
        Self {
            config,
            dispatcher,
            state: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Bind the configured endpoint and start accepting connections.
    ///
    /// Idempotent: calling again while listening returns the endpoint already
    /// bound. After a stop the server may be started again.
    pub async fn start(&self) -> Result<Endpoint> {
        let mut state = self.state.lock().await;

        if let Lifecycle::Listening(task) = &*state {
            debug!(endpoint = %task.endpoint, "start called while already listening");
            return Ok(task.endpoint.clone());
        }

        let listener = Listener::bind(&self.config.endpoint).await?;
        let endpoint = listener.endpoint().clone();
        info!(%endpoint, "bridge server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(accept_loop(
            listener,
            self.dispatcher.clone(),
            self.config.max_connections,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        *state = Lifecycle::Listening(ListenerTask {
            endpoint: endpoint.clone(),
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        });

        Ok(endpoint)
    }

    /// Stop listening and close active connections.
    ///
    /// Safe in any state: before the first start, repeatedly, or while
    /// requests are in flight.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Listening(mut task) => {
                info!(endpoint = %task.endpoint, "bridge server stopping");
                task.signal_shutdown();
                transport::cleanup(&task.endpoint).await;
            }
            Lifecycle::Idle | Lifecycle::Stopped => {
                debug!("stop called with no listener running");
            }
        }
    }

    /// The endpoint currently listened on, if any.
    pub async fn endpoint(&self) -> Option<Endpoint> {
        match &*self.state.lock().await {
            Lifecycle::Listening(task) => Some(task.endpoint.clone()),
            _ => None,
        }
    }

    pub async fn is_listening(&self) -> bool {
        matches!(&*self.state.lock().await, Lifecycle::Listening(_))
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        // No async context here; signal what we can so the accept loop does
        // not outlive the server. The next bind cleans up any socket file.
        if let Ok(mut state) = self.state.try_lock() {
            if let Lifecycle::Listening(task) = &mut *state {
                task.signal_shutdown();
            }
        }
    }
}

async fn accept_loop(
    listener: Listener,
    dispatcher: Dispatcher,
    max_connections: usize,
    mut shutdown_rx: oneshot::Receiver<()>,
    conn_shutdown_rx: watch::Receiver<bool>,
    active_connections: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("accept loop shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok(stream) => {
                        let current = active_connections.load(Ordering::Relaxed);
                        if current >= max_connections {
                            // Dropping the accepted stream closes it.
                            warn!(current, max_connections, "rejecting connection: at capacity");
                            continue;
                        }

                        active_connections.fetch_add(1, Ordering::Relaxed);
                        let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
                        let dispatcher = dispatcher.clone();
                        let conns = active_connections.clone();
                        let mut conn_shutdown = conn_shutdown_rx.clone();

                        tokio::spawn(async move {
                            debug!(conn_id, "connection opened");
                            match handle_connection(stream, &dispatcher, &mut conn_shutdown).await {
                                Ok(()) => debug!(conn_id, "connection closed"),
                                Err(e) => debug!(conn_id, error = %e, "connection ended"),
                            }
                            conns.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

/// Serve one connection until clean EOF, a wire error, or shutdown.
///
/// A framing or IO error poisons only this connection; the error propagates
/// to the caller for logging and the stream is dropped without a reply.
async fn handle_connection(
    mut stream: Stream,
    dispatcher: &Dispatcher,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    loop {
        // Wait for either a message or the shutdown signal.
        let payload = tokio::select! {
            result = framing::read_message(&mut stream) => {
                match result? {
                    Some(payload) => payload,
                    None => return Ok(()), // clean disconnect
                }
            }
            _ = shutdown_rx.changed() => {
                return Ok(());
            }
        };

        let response = dispatcher.handle(payload).await;
        let reply = serde_json::to_value(&response)?;
        framing::write_message(&mut stream, &reply).await?;
    }
}
