//! Streaming Sessions
//!
//! One session per `GET /status` request. The session owns a broker
//! subscription for exactly as long as its response body is alive and turns
//! each delivered event into an SSE frame:
//!
//! ```text
//! event: temp
//! data: 42.8 °C
//!
//! ```
//!
//! When the client goes away hyper drops the body, which drops the session
//! and its subscription guard. Server shutdown ends the stream from inside.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::domain::event::Event;
use crate::infrastructure::broker::{SharedBroker, SubscriberId, Subscription};
use crate::infrastructure::metrics;

/// A single client's live event stream.
pub struct StreamingSession {
    subscription: Subscription,
    shutdown: CancellationToken,
    opened_at: Instant,
    frames_sent: u64,
}

impl StreamingSession {
    /// Subscribe to the broker and start a session.
    #[must_use]
    pub fn open(broker: &SharedBroker, shutdown: CancellationToken) -> Self {
        let subscription = broker.subscribe_owned();
        metrics::session_opened();
        tracing::info!(subscriber = %subscription.id(), "Session opened");

        Self {
            subscription,
            shutdown,
            opened_at: Instant::now(),
            frames_sent: 0,
        }
    }

    /// Subscriber backing this session.
    #[must_use]
    pub const fn subscriber_id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// Wait for the next event to send, or `None` when the session must end.
    pub async fn next_event(&mut self) -> Option<Arc<Event>> {
        tokio::select! {
            () = self.shutdown.cancelled() => None,
            event = self.subscription.recv() => {
                if event.is_some() {
                    self.frames_sent += 1;
                }
                event
            }
        }
    }

    /// Turn the session into an SSE frame stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send {
        futures::stream::unfold(self, |mut session| async move {
            let event = session.next_event().await?;
            Some((Ok(encode(&event)), session))
        })
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        metrics::session_closed();
        tracing::info!(
            subscriber = %self.subscription.id(),
            frames = self.frames_sent,
            duration_secs = self.opened_at.elapsed().as_secs(),
            "Session closed"
        );
    }
}

/// Encode an event as an SSE frame.
#[must_use]
pub fn encode(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.kind_str())
        .data(event.payload())
}

/// Session start failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server is draining; no new streams are accepted.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// `GET /status`: open a live SSE stream of every metric.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Response, SessionError> {
    if state.shutdown.is_cancelled() {
        return Err(SessionError::ShuttingDown);
    }

    let session = StreamingSession::open(&state.broker, state.shutdown.clone());
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(session.into_stream()),
    )
        .into_response())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::domain::metric::MetricKind;
    use crate::infrastructure::broker::EventBroker;

    fn broker() -> SharedBroker {
        Arc::new(EventBroker::with_defaults())
    }

    #[tokio::test]
    async fn session_registers_and_releases_subscriber() {
        let broker = broker();
        let session = StreamingSession::open(&broker, CancellationToken::new());
        assert_eq!(broker.subscriber_count(), 1);

        drop(session);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let broker = broker();
        let stream = StreamingSession::open(&broker, CancellationToken::new()).into_stream();
        assert_eq!(broker.subscriber_count(), 1);

        drop(stream);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn delivers_published_events() {
        let broker = broker();
        let mut session = StreamingSession::open(&broker, CancellationToken::new());

        let _ = broker.publish(Event::new(MetricKind::Mem, "312Mi / 976Mi"));
        let event = session.next_event().await.unwrap();
        assert_eq!(event.kind(), MetricKind::Mem);
        assert_eq!(session.frames_sent, 1);
    }

    #[tokio::test]
    async fn waits_for_traffic_then_wakes() {
        let broker = broker();
        let mut stream =
            task::spawn(StreamingSession::open(&broker, CancellationToken::new()).into_stream());
        assert_pending!(stream.poll_next());

        let _ = broker.publish(Event::new(MetricKind::Temp, "42.8 °C"));
        assert!(stream.is_woken());
        let frame = assert_ready!(stream.poll_next());
        assert!(matches!(frame, Some(Ok(_))));
    }

    #[tokio::test]
    async fn shutdown_ends_stream_and_unsubscribes() {
        let broker = broker();
        let shutdown = CancellationToken::new();
        let mut stream = Box::pin(StreamingSession::open(&broker, shutdown.clone()).into_stream());

        shutdown.cancel();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());

        drop(stream);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn shutting_down_maps_to_503() {
        let response = SessionError::ShuttingDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
