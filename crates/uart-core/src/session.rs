//! Connection session: one connect, subscribe, stream, cleanup lifecycle.
//!
//! A [`Session`] owns a single physical link for its whole life. Application
//! data never passes through [`Session::run`]; it arrives on the transport's
//! notification path, where a [`NotificationHandler`] feeds the
//! [`LineReassembler`] and publishes completed records into the latest-value
//! slot. `run` itself only waits for cancellation or for the link to go away.
//!
//! ```text
//! Connecting ──► Subscribed ──► Streaming ──► Closing ──► Closed
//!      │              │              │
//!      └──────────────┴──────────────┴──────► Failed
//! ```
//!
//! Once a link exists, every exit path passes through `Closing`, which makes
//! exactly one unsubscribe attempt and one disconnect attempt. Their failures
//! are logged at debug level and never replace the reason for closing.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use uart_types::uuid::UART_TX;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::reassembler::LineReassembler;
use crate::scan::DeviceHandle;
use crate::slot::SlotPublisher;
use crate::traits::{Link, NotificationCallback, Transport};

/// Default time allowed for establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default ceiling on buffered bytes without a delimiter.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Upper bound on each cleanup call.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Establishing the transport connection.
    Connecting,
    /// Registering the notification callback.
    Subscribed,
    /// Idle; data flows through the notification callback.
    Streaming,
    /// Unsubscribing and disconnecting.
    Closing,
    /// Terminal; resources released.
    Closed,
    /// Terminal; the session ended with an error.
    Failed,
}

impl SessionState {
    /// Whether the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Subscribed => "subscribed",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a streaming run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer disconnected or went out of range.
    LinkLost,
    /// The run was cancelled from outside.
    Cancelled,
}

/// Options for a connection session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Characteristic the peer notifies on.
    pub characteristic: Uuid,
    /// Time allowed for establishing the connection.
    pub connect_timeout: Duration,
    /// Buffered bytes without a delimiter before the partial record is dropped.
    pub max_pending_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            characteristic: UART_TX,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

impl SessionOptions {
    /// Create new session options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the notification characteristic.
    #[must_use]
    pub fn characteristic(mut self, uuid: Uuid) -> Self {
        self.characteristic = uuid;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pending-bytes ceiling.
    #[must_use]
    pub fn max_pending_bytes(mut self, max: usize) -> Self {
        self.max_pending_bytes = max;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be > 0"));
        }
        if self.max_pending_bytes == 0 {
            return Err(Error::invalid_config("max_pending_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Notification-path state: reassembles chunks and publishes records.
///
/// Moved into the transport's callback, which is its only caller.
#[derive(Debug)]
pub struct NotificationHandler {
    reassembler: LineReassembler,
    publisher: SlotPublisher,
    max_pending_bytes: usize,
    /// Set after an overflow discard: the rest of that line is still arriving.
    resync: bool,
}

impl NotificationHandler {
    /// Create a handler publishing into `publisher`.
    pub fn new(publisher: SlotPublisher, max_pending_bytes: usize) -> Self {
        Self {
            reassembler: LineReassembler::new(),
            publisher,
            max_pending_bytes,
            resync: false,
        }
    }

    /// Process one notification chunk. Returns the number of records published.
    ///
    /// After an oversized partial record is discarded, input is skipped up to
    /// and including the next delimiter so no fragment of it is published.
    pub fn handle(&mut self, mut chunk: &[u8]) -> usize {
        if self.resync {
            let Some(end) = chunk.iter().position(|&b| b == b'\n') else {
                return 0;
            };
            debug!(skipped = end + 1, "Resynchronized on record delimiter");
            chunk = &chunk[end + 1..];
            self.resync = false;
        }

        let records = self.reassembler.append(chunk);
        let count = records.len();
        for record in records {
            self.publisher.publish(record);
        }

        if self.reassembler.pending_len() > self.max_pending_bytes {
            let discarded = self.reassembler.clear();
            warn!(
                discarded,
                limit = self.max_pending_bytes,
                "No record delimiter within limit, dropping partial record"
            );
            self.resync = true;
        }

        count
    }

    /// The underlying reassembler.
    pub fn reassembler(&self) -> &LineReassembler {
        &self.reassembler
    }

    /// Wrap the handler into a transport callback.
    pub fn into_callback(mut self) -> NotificationCallback {
        Box::new(move |chunk: &[u8]| {
            self.handle(chunk);
        })
    }
}

/// One connection to a located peer.
///
/// If a session is dropped while it still holds a link (for example because
/// the task running it was aborted), a best-effort cleanup task is spawned.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    device: DeviceHandle,
    options: SessionOptions,
    publisher: SlotPublisher,
    state: SessionState,
    history: Vec<SessionState>,
    link: Option<Arc<T::Link>>,
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("has_link", &self.link.is_some())
            .finish()
    }
}

enum Connected<L> {
    Link(L),
    Cancelled,
    Failed(Error),
}

impl<T: Transport> Session<T> {
    /// Create a session for `device` that publishes records into `publisher`.
    pub fn new(
        transport: Arc<T>,
        device: DeviceHandle,
        options: SessionOptions,
        publisher: SlotPublisher,
    ) -> Self {
        Self {
            transport,
            device,
            options,
            publisher,
            state: SessionState::Connecting,
            history: vec![SessionState::Connecting],
            link: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state this session has been in, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// The peer this session targets.
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "Session state change");
        self.state = next;
        self.history.push(next);
    }

    /// Drive the session to a terminal state.
    ///
    /// Returns the reason streaming stopped, or the error that moved the
    /// session to [`SessionState::Failed`]. Cleanup has completed by the time
    /// this returns.
    #[tracing::instrument(level = "info", skip_all, fields(device = %self.device.name, address = %self.device.address))]
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<StreamEnd> {
        if self.state.is_terminal() {
            return Err(Error::invalid_config(format!(
                "session already {}, create a new one to reconnect",
                self.state
            )));
        }
        if let Err(e) = self.options.validate() {
            self.set_state(SessionState::Failed);
            return Err(e);
        }

        self.set_state(SessionState::Connecting);
        info!("Connecting...");
        let link = match self.connect(cancel).await {
            Connected::Link(link) => Arc::new(link),
            Connected::Cancelled => {
                info!("Cancelled before a link was established");
                self.close().await;
                self.set_state(SessionState::Closed);
                return Ok(StreamEnd::Cancelled);
            }
            Connected::Failed(e) => {
                warn!(error = %e, "Connection failed");
                self.set_state(SessionState::Failed);
                return Err(e);
            }
        };
        self.link = Some(Arc::clone(&link));
        info!("Connected");

        self.set_state(SessionState::Subscribed);
        let callback =
            NotificationHandler::new(self.publisher.clone(), self.options.max_pending_bytes)
                .into_callback();
        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = link.subscribe(self.options.characteristic, callback) => Some(result),
        };
        match subscribed {
            None => {
                info!("Cancelled while subscribing");
                self.close().await;
                self.set_state(SessionState::Closed);
                return Ok(StreamEnd::Cancelled);
            }
            Some(Err(e)) => {
                warn!(error = %e, characteristic = %self.options.characteristic, "Subscribe failed");
                log_services(link.as_ref()).await;
                self.close().await;
                self.set_state(SessionState::Failed);
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        self.set_state(SessionState::Streaming);
        info!(characteristic = %self.options.characteristic, "Streaming");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(StreamEnd::Cancelled),
            closed = link.closed() => closed.map(|()| StreamEnd::LinkLost),
        };
        drop(link);

        match &outcome {
            Ok(StreamEnd::Cancelled) => info!("Cancellation requested, closing"),
            Ok(StreamEnd::LinkLost) => warn!("Link lost"),
            Err(e) => warn!(error = %e, "Link failed"),
        }
        self.close().await;

        self.set_state(match outcome {
            Ok(_) => SessionState::Closed,
            Err(_) => SessionState::Failed,
        });
        info!(state = %self.state, "Session ended");
        outcome
    }

    async fn connect(&self, cancel: &CancellationToken) -> Connected<T::Link> {
        let transport = Arc::clone(&self.transport);
        let device = self.device.clone();
        let timeout = self.options.connect_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Connected::Cancelled,
            result = tokio::time::timeout(timeout, transport.connect(&device)) => match result {
                Ok(Ok(link)) => Connected::Link(link),
                Ok(Err(e)) => Connected::Failed(e),
                Err(_) => Connected::Failed(Error::connection_failed(
                    &device.address,
                    ConnectionFailureReason::Timeout,
                )),
            },
        }
    }

    /// Unsubscribe and disconnect, once.
    async fn close(&mut self) {
        self.set_state(SessionState::Closing);
        let Some(link) = self.link.take() else {
            return;
        };

        let characteristic = self.options.characteristic;
        match tokio::time::timeout(CLEANUP_TIMEOUT, link.unsubscribe(characteristic)).await {
            Ok(Ok(())) => debug!("Unsubscribed"),
            Ok(Err(e)) => debug!(error = %e, "Unsubscribe failed (link may already be down)"),
            Err(_) => debug!("Unsubscribe timed out"),
        }
        match tokio::time::timeout(CLEANUP_TIMEOUT, link.disconnect()).await {
            Ok(Ok(())) => debug!("Disconnected"),
            Ok(Err(e)) => debug!(error = %e, "Disconnect failed (link may already be down)"),
            Err(_) => debug!("Disconnect timed out"),
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        warn!(
            device_name = %self.device.name,
            device_address = %self.device.address,
            "Session dropped while connected - performing best-effort cleanup"
        );

        let characteristic = self.options.characteristic;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = link.unsubscribe(characteristic).await {
                    debug!(error = %e, "Best-effort unsubscribe failed");
                }
                if let Err(e) = link.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

/// Log the peer's services and characteristics.
async fn log_services<L: Link + ?Sized>(link: &L) {
    match link.services().await {
        Ok(services) => {
            info!("Available services:");
            for service in services {
                info!("Service: {}", service.uuid);
                for characteristic in service.characteristics {
                    info!(
                        "  Characteristic: {} Properties: [{}]",
                        characteristic.uuid,
                        characteristic.properties.join(", ")
                    );
                }
            }
        }
        Err(e) => debug!(error = %e, "Could not list services"),
    }
}
