use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{Endpoints, ReconnectPolicy};
use crate::models::events::{StatusEvent, StreamError};
use crate::models::identity::Identity;

/// Opens per-user push channels.
pub struct PushSubscriber {
    endpoints: Endpoints,
    policy: ReconnectPolicy,
}

impl PushSubscriber {
    pub fn new(endpoints: Endpoints, policy: ReconnectPolicy) -> Self {
        Self { endpoints, policy }
    }

    /// Subscribe to status events for `identity`.
    ///
    /// The connection runs on its own task and reconnects with exponential
    /// backoff until the returned handle is cancelled or dropped. Only
    /// `update_status` events reach the handle, in receipt order.
    pub fn subscribe(&self, identity: &Identity) -> Subscription {
        let url = self.endpoints.push_channel(identity);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracing::info!(user_id = %identity, "Subscribing to push channel");
        let task = tokio::spawn(run_channel(url, self.policy.clone(), tx, cancel.clone()));

        Subscription {
            events: rx,
            cancel,
            task,
        }
    }
}

/// Live push-channel subscription, owned by the view that displays its events.
///
/// Dropping the handle cancels the subscription and closes the socket.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StatusEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next status event. `None` once the subscription has ended and all
    /// received events were delivered.
    pub async fn next(&mut self) -> Option<StatusEvent> {
        self.events.recv().await
    }

    /// Stop listening and close the socket.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the connection task has exited (cancelled or gave up).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Stream for Subscription {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Delays between reconnect attempts. The nominal delay starts at `initial`
/// and doubles up to `max_delay`; each actual delay is drawn uniformly from
/// zero up to its nominal value (full jitter).
fn backoff(policy: &ReconnectPolicy) -> Box<dyn Iterator<Item = Duration> + Send> {
    let factor = (policy.initial.as_millis() as u64 / 2).max(1);
    let delays = ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(policy.max_delay)
        .map(jitter);

    match policy.max_attempts {
        Some(attempts) => Box::new(delays.take(attempts)),
        None => Box::new(delays),
    }
}

enum SessionEnd {
    Cancelled,
    ReceiverGone,
    Closed,
}

async fn run_channel(
    url: Url,
    policy: ReconnectPolicy,
    tx: mpsc::UnboundedSender<StatusEvent>,
    cancel: CancellationToken,
) {
    let mut delays = backoff(&policy);

    loop {
        match session(&url, &tx, &cancel).await {
            Ok(SessionEnd::Cancelled) => {
                tracing::info!(url = %url, "Push channel closed");
                return;
            }
            Ok(SessionEnd::ReceiverGone) => return,
            Ok(SessionEnd::Closed) => {
                tracing::warn!(url = %url, "Push channel disconnected");
                delays = backoff(&policy);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Push channel connection failed");
            }
        }

        let Some(delay) = delays.next() else {
            tracing::error!(url = %url, "Giving up on push channel after repeated failures");
            return;
        };

        metrics::counter!("push_reconnects_total").increment(1);
        tracing::debug!(url = %url, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One connection. `Err` only when the connection could not be opened.
async fn session(
    url: &Url,
    tx: &mpsc::UnboundedSender<StatusEvent>,
    cancel: &CancellationToken,
) -> Result<SessionEnd, StreamError> {
    let (mut socket, _response) = tokio::select! {
        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        connected = connect_async(url.as_str()) => connected?,
    };

    tracing::info!(url = %url, "Push channel connected");

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket.close(None).await;
                return Ok(SessionEnd::Cancelled);
            }
            frame = socket.next() => frame,
        };

        let text = match frame {
            None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
            Some(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "Push channel read failed");
                return Ok(SessionEnd::Closed);
            }
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(_))) => {
                drop_frame(&StreamError::UnexpectedFrame("binary"));
                continue;
            }
            // tungstenite answers pings itself
            Some(Ok(_)) => continue,
        };

        match StatusEvent::parse(&text) {
            Ok(event @ StatusEvent::UpdateStatus(_)) => {
                if tx.send(event).is_err() {
                    return Ok(SessionEnd::ReceiverGone);
                }
            }
            Ok(StatusEvent::Other { event }) => {
                tracing::debug!(event = %event, "Ignoring push event");
            }
            Err(e) => drop_frame(&e),
        }
    }
}

fn drop_frame(error: &StreamError) {
    metrics::counter!("push_frames_dropped_total").increment(1);
    tracing::warn!(error = %error, "Dropping push frame");
}
