//! Listening server: receive loop, event channels and dispatch.
//!
//! ```text
//! socket ──► decode_packet ──► messages channel
//!                 │                 │
//!                 │                 └──► Dispatcher (task per message)
//!                 │                            │
//!                 └── malformed ──► failures ◄─┘ handler faults
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use oscprims_codec::{decode_packet, Message, ALIGNMENT};
use oscprims_transport::UdpEndpoint;
use regex::Regex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{PeerError, Result, ServerFailure};
use crate::handler::{DispatchContext, Handler, HandlerId, HandlerResult, Route};

/// Smallest receive buffer: one address word plus one type-tag word.
const MIN_DATAGRAM_SIZE: usize = 2 * ALIGNMENT;

const RECV_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Whether the receive loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
}

struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Receives datagrams on a bound endpoint and routes decoded messages.
///
/// Every decoded message is published on the messages channel and handed to
/// the dispatcher. Malformed datagrams and handler faults are published on
/// the failures channel; neither stops the loop.
pub struct Server {
    endpoint: Arc<UdpEndpoint>,
    dispatcher: Arc<Dispatcher>,
    messages: broadcast::Sender<Arc<Message>>,
    failures: broadcast::Sender<ServerFailure>,
    config: ServerConfig,
    listener: Mutex<Option<Listener>>,
}

impl Server {
    /// Bind the receive endpoint. The server starts idle.
    ///
    /// A zero channel capacity is raised to 1, and the receive buffer to
    /// the smallest message size.
    pub async fn bind(mut config: ServerConfig) -> Result<Self> {
        config.channel_capacity = config.channel_capacity.max(1);
        config.max_datagram_size = config.max_datagram_size.max(MIN_DATAGRAM_SIZE);

        let endpoint = UdpEndpoint::bind(config.bind_addr).await?;
        let (messages, _) = broadcast::channel(config.channel_capacity);
        let (failures, _) = broadcast::channel(config.channel_capacity);

        Ok(Self {
            endpoint: Arc::new(endpoint),
            dispatcher: Arc::new(Dispatcher::new()),
            messages,
            failures,
            config,
            listener: Mutex::new(None),
        })
    }

    /// Start the receive loop on the current tokio runtime.
    ///
    /// Returns immediately. Calling this while already listening is a no-op.
    pub fn begin_listen(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PeerError::NoRuntime)?;
        let mut listener = self.lock_listener();
        if listener.as_ref().is_some_and(|l| !l.task.is_finished()) {
            debug!("begin_listen while already listening");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let receiver = Receiver {
            endpoint: Arc::clone(&self.endpoint),
            dispatcher: Arc::clone(&self.dispatcher),
            messages: self.messages.clone(),
            failures: self.failures.clone(),
            max_datagram_size: self.config.max_datagram_size,
        };
        let task = runtime.spawn(receiver.run(cancel.clone()));

        info!(local_addr = %self.local_addr(), "server listening");
        *listener = Some(Listener { cancel, task });
        Ok(())
    }

    /// Stop the receive loop and wait for it to exit.
    ///
    /// No message is received or dispatched after this returns. Handlers
    /// already running finish on their own. A no-op when idle.
    pub async fn end_listen(&self) {
        let listener = self.lock_listener().take();
        let Some(listener) = listener else {
            return;
        };
        listener.cancel.cancel();
        if let Err(err) = listener.task.await {
            warn!(error = %err, "receive loop ended abnormally");
        }
        info!(local_addr = %self.local_addr(), "server stopped listening");
    }

    pub fn state(&self) -> ServerState {
        match self.lock_listener().as_ref() {
            Some(listener) if !listener.task.is_finished() => ServerState::Listening,
            _ => ServerState::Idle,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ServerState::Listening
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Subscribe to decoded messages, in arrival order.
    ///
    /// Only messages received after subscribing are delivered.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Arc<Message>> {
        self.messages.subscribe()
    }

    /// Subscribe to malformed datagrams and handler faults.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ServerFailure> {
        self.failures.subscribe()
    }

    /// Shared dispatcher, for registering from handlers or other tasks.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn register<F, Fut>(&self, pattern: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.dispatcher.register(pattern, handler)
    }

    pub fn register_regex<F, Fut>(&self, pattern: Regex, handler: F) -> HandlerId
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.dispatcher.register_regex(pattern, handler)
    }

    pub fn register_blocking<F>(&self, pattern: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.dispatcher.register_blocking(pattern, handler)
    }

    pub fn register_handler(&self, pattern: Regex, handler: Arc<dyn Handler>) -> HandlerId {
        self.dispatcher.register_handler(pattern, handler)
    }

    pub fn register_routes(&self, routes: impl IntoIterator<Item = Route>) -> Result<Vec<HandlerId>> {
        self.dispatcher.register_routes(routes)
    }

    pub fn handler_count(&self) -> usize {
        self.dispatcher.len()
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.cancel.cancel();
            listener.task.abort();
            debug!("server dropped while listening");
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("state", &self.state())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// State owned by the receive loop task.
struct Receiver {
    endpoint: Arc<UdpEndpoint>,
    dispatcher: Arc<Dispatcher>,
    messages: broadcast::Sender<Arc<Message>>,
    failures: broadcast::Sender<ServerFailure>,
    max_datagram_size: usize,
}

impl Receiver {
    async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; self.max_datagram_size];
        let mut backoff = RecvBackoff::new();
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.endpoint.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) => {
                    backoff.reset();
                    self.handle_datagram(&buf[..len], from);
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(error = %err, retry_in = ?delay, "receive failed");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        debug!("receive loop exited");
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        let messages = match decode_packet(datagram) {
            Ok(messages) => messages,
            Err(error) => {
                warn!(
                    %from,
                    bytes = datagram.len(),
                    address = ?error.address(),
                    error = %error,
                    "dropping malformed datagram"
                );
                let _ = self.failures.send(ServerFailure::Malformed {
                    from,
                    error: Arc::new(error),
                });
                return;
            }
        };

        for message in messages {
            let message = Arc::new(message);
            debug!(%from, address = message.address(), "received message");
            let _ = self.messages.send(Arc::clone(&message));

            let dispatcher = Arc::clone(&self.dispatcher);
            let failures = self.failures.clone();
            tokio::spawn(async move {
                let outcome = dispatcher.dispatch(message).await;
                for fault in outcome.faults {
                    let _ = failures.send(ServerFailure::Handler(Arc::new(fault)));
                }
            });
        }
    }
}

/// Delay before retrying after consecutive receive errors. Doubles per
/// error up to a cap, and resets on the next successful receive.
#[derive(Debug)]
struct RecvBackoff {
    next: Duration,
}

impl RecvBackoff {
    fn new() -> Self {
        Self {
            next: RECV_BACKOFF_INITIAL,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(RECV_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = RECV_BACKOFF_INITIAL;
    }
}
