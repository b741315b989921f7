//! Streaming supervisor: locate, then run one session, in a background task.
//!
//! [`Supervisor::run`] spawns a task that resolves the target name to a
//! device, runs a [`Session`] against it and reports how the run ended. The
//! returned [`StreamHandle`] is the consumer side: it reads the latest
//! record and cancels or joins the task.
//!
//! The run supports graceful shutdown via [`StreamHandle::cancel`], which uses
//! a cancellation token so the active session still unsubscribes and
//! disconnects before the task finishes.
//!
//! Without [`ReconnectOptions`] a lost link or a failed locate ends the run.
//! With them, both are retried after a backoff delay.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uart_types::Record;

use crate::error::{Error, Result};
use crate::reconnect::ReconnectOptions;
use crate::scan::{Located, ScanOptions, locate, log_discovered};
use crate::session::{Session, SessionOptions, StreamEnd};
use crate::slot::{SlotPublisher, SlotReceiver, latest_slot};
use crate::traits::Transport;

/// Options for a supervised run.
#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    /// Options for the locate step.
    pub scan: ScanOptions,
    /// Options for each session.
    pub session: SessionOptions,
    /// Retry policy after link loss or a failed locate. `None` means no retry.
    pub reconnect: Option<ReconnectOptions>,
}

impl SupervisorOptions {
    /// Create new supervisor options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan options.
    #[must_use]
    pub fn scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the session options.
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Enable reconnection.
    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectOptions) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    /// Validate all nested options.
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.session.validate()?;
        if let Some(reconnect) = &self.reconnect {
            reconnect.validate()?;
        }
        Ok(())
    }
}

/// Runs locate and session cycles against a transport.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use uart_core::{BtleTransport, Supervisor, SupervisorOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(BtleTransport::new().await?);
///     let supervisor = Supervisor::new(transport, SupervisorOptions::default());
///
///     let mut stream = supervisor.run("CIRCUITPY");
///     while let Some(record) = stream.await_latest().await {
///         println!("{}", record.display_spaced());
///     }
///     println!("Stream ended: {:?}", stream.join().await?);
///     Ok(())
/// }
/// ```
pub struct Supervisor<T: Transport> {
    transport: Arc<T>,
    options: SupervisorOptions,
}

impl<T: Transport> std::fmt::Debug for Supervisor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> Supervisor<T> {
    /// Create a supervisor over `transport`.
    pub fn new(transport: Arc<T>, options: SupervisorOptions) -> Self {
        Self { transport, options }
    }

    /// The options this supervisor runs with.
    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Spawn a background run streaming from the first peer whose name
    /// contains `target`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, target: impl Into<String>) -> StreamHandle {
        let target = target.into();
        let (publisher, receiver) = latest_slot();
        let cancel_token = CancellationToken::new();

        let transport = Arc::clone(&self.transport);
        let options = self.options.clone();
        let task_token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            let result = supervise(transport, &target, &options, publisher, &task_token).await;
            match &result {
                Ok(end) => info!(?end, "Streaming finished"),
                Err(e) => error!(error = %e, "Streaming failed"),
            }
            result
        });

        StreamHandle {
            receiver,
            handle: Some(handle),
            cancel_token,
        }
    }
}

#[tracing::instrument(level = "info", skip(transport, options, publisher, cancel))]
async fn supervise<T: Transport + 'static>(
    transport: Arc<T>,
    target: &str,
    options: &SupervisorOptions,
    publisher: SlotPublisher,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    options.validate()?;

    let mut attempt: u32 = 0;
    loop {
        let outcome = run_once(&transport, target, options, &publisher, cancel).await;

        let Some(reconnect) = &options.reconnect else {
            return outcome;
        };
        match &outcome {
            Ok(StreamEnd::LinkLost) => attempt = 0,
            Err(Error::DeviceNotFound { .. }) => {}
            Ok(StreamEnd::Cancelled) | Err(_) => return outcome,
        }

        attempt += 1;
        if !reconnect.allows_attempt(attempt) {
            warn!("Giving up after {} reconnection attempt(s)", attempt - 1);
            return outcome;
        }

        let delay = reconnect.delay_for_attempt(attempt - 1);
        info!("Reconnection attempt {} in {:?}", attempt, delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Reconnection cancelled");
                return Ok(StreamEnd::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_once<T: Transport + 'static>(
    transport: &Arc<T>,
    target: &str,
    options: &SupervisorOptions,
    publisher: &SlotPublisher,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    let located = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Cancelled during scan");
            return Ok(StreamEnd::Cancelled);
        }
        located = locate(transport.as_ref(), target, &options.scan) => located?,
    };

    let device = match located {
        Located::Found(device) => device,
        Located::NotFound(peers) => {
            warn!("Device '{}' not found among {} peer(s)", target, peers.len());
            log_discovered(&peers);
            return Err(Error::device_not_found(target, peers));
        }
    };

    let mut session = Session::new(
        Arc::clone(transport),
        device,
        options.session.clone(),
        publisher.clone(),
    );
    session.run(cancel).await
}

/// Consumer-side handle to a supervised run.
///
/// Dropping the handle cancels the run.
pub struct StreamHandle {
    receiver: SlotReceiver,
    handle: Option<JoinHandle<Result<StreamEnd>>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl StreamHandle {
    /// Wait for the next record, collapsing any backlog into the newest one.
    ///
    /// Returns `None` once the run has ended and no record is pending.
    pub async fn await_latest(&mut self) -> Option<Record> {
        self.receiver.await_latest().await
    }

    /// Take the pending record without waiting.
    pub fn try_latest(&mut self) -> Option<Record> {
        self.receiver.try_latest()
    }

    /// Request cancellation. The active session still runs its cleanup.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Get a cancellation token that can be used to cancel the run externally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Check if the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if the background task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the background task and return how the run ended.
    pub async fn join(mut self) -> Result<StreamEnd> {
        let Some(handle) = self.handle.take() else {
            return Err(Error::TaskFailed("stream task already joined".to_string()));
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "Stream task did not complete");
                Err(Error::TaskFailed(e.to_string()))
            }
        }
    }

    /// Cancel the run and wait for cleanup to finish.
    pub async fn shutdown(self) -> Result<StreamEnd> {
        self.cancel();
        self.join().await
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockTransport;

    fn reconnecting(max_attempts: u32) -> SupervisorOptions {
        SupervisorOptions::new().reconnect(
            ReconnectOptions::new()
                .max_attempts(max_attempts)
                .initial_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(100)),
        )
    }

    #[test]
    fn test_supervisor_options_validate() {
        assert!(SupervisorOptions::default().validate().is_ok());
        assert!(SupervisorOptions::default().reconnect.is_none());
        let bad = SupervisorOptions::new().scan(ScanOptions::new().duration(Duration::ZERO));
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_invalid_options_reported_through_join() {
        let transport = Arc::new(MockTransport::builder().named_peer("ARDUINO").build());
        let options =
            SupervisorOptions::new().session(SessionOptions::new().max_pending_bytes(0));
        let stream = Supervisor::new(transport, options).run("ARDUINO");
        assert!(matches!(stream.join().await, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_reconnects_after_link_loss() {
        let transport = Arc::new(
            MockTransport::builder()
                .peer(Some("CIRCUITPY"), "AA:AA:AA:AA:AA:AA", -40)
                .build(),
        );
        let link = transport.link_handle();
        let mut stream = Supervisor::new(Arc::clone(&transport), reconnecting(3)).run("CIRCUITPY");

        link.wait_subscribed().await;
        link.push(b"1.000,\n");
        assert_eq!(stream.await_latest().await.unwrap().as_str(), "1.000,");

        link.drop_link();
        link.wait_subscribed().await;
        assert_eq!(transport.connect_calls(), 2);

        link.push(b"2.000,\n");
        assert_eq!(stream.await_latest().await.unwrap().as_str(), "2.000,");

        assert_eq!(stream.shutdown().await.unwrap(), StreamEnd::Cancelled);
        assert_eq!(link.disconnect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_retries_then_gives_up() {
        let transport = Arc::new(MockTransport::builder().named_peer("Speaker").build());
        let stream = Supervisor::new(Arc::clone(&transport), reconnecting(2)).run("CIRCUITPY");

        let result = stream.join().await;
        assert!(matches!(result, Err(Error::DeviceNotFound { .. })));
        assert_eq!(transport.discover_calls(), 3);
        assert_eq!(transport.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(MockTransport::builder().named_peer("Speaker").build());
        let options = SupervisorOptions::new().reconnect(
            ReconnectOptions::new()
                .max_attempts(u32::MAX)
                .initial_delay(Duration::from_secs(3600))
                .max_delay(Duration::from_secs(7200)),
        );
        let stream = Supervisor::new(Arc::clone(&transport), options).run("CIRCUITPY");

        while transport.discover_calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stream.shutdown().await.unwrap(), StreamEnd::Cancelled);
        assert_eq!(transport.discover_calls(), 1);
    }

    #[tokio::test]
    async fn test_connection_error_is_not_retried() {
        let transport = Arc::new(
            MockTransport::builder()
                .named_peer("ARDUINO")
                .fail_connect("rejected")
                .build(),
        );
        let stream = Supervisor::new(Arc::clone(&transport), reconnecting(5)).run("ARDUINO");
        assert!(matches!(stream.join().await, Err(Error::ConnectionFailed { .. })));
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_handle_cancels_run() {
        let transport = Arc::new(MockTransport::builder().named_peer("ARDUINO").build());
        let link = transport.link_handle();
        let stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default()).run("ARDUINO");

        link.wait_subscribed().await;
        drop(stream);

        for _ in 0..100 {
            if link.disconnect_calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(link.unsubscribe_calls(), 1);
        assert_eq!(link.disconnect_calls(), 1);
    }
}
