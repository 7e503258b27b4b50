//! Inbound webhook listener: a single POST route feeding an [`EventStream`].
//!
//! Callback events are handed over one at a time: the request that carried an event
//! does not complete until the application has taken it from the stream, so the
//! platform cannot outrun the consumer. An optional hand-off timeout bounds that wait;
//! an event whose request gave up is never delivered afterwards.
//!
//! When the server stops, the stream yields a single [`Incoming::Stopped`] saying why
//! (explicit shutdown or bind/serve failure) and then ends.

use crate::config::ListenAddr;
use crate::events::{parse_envelope, Envelope, InnerEvent};
use crate::signature::RequestVerifier;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Item read from the [`EventStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Event(InnerEvent),
    /// Last item before the stream ends.
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `Bot::stop` / `Bot::shutdown` was called (or the bot was dropped).
    Shutdown,
    /// The server could not bind or stopped serving.
    Failed(String),
}

struct Delivery {
    event: InnerEvent,
    taken: oneshot::Sender<()>,
}

/// Consumer end of the event channel.
pub struct EventStream {
    rx: mpsc::Receiver<Delivery>,
    stopped: Option<oneshot::Receiver<StopReason>>,
}

impl EventStream {
    /// Next event, then `Stopped` once the listener is gone, then `None`.
    pub async fn recv(&mut self) -> Option<Incoming> {
        while let Some(delivery) = self.rx.recv().await {
            if delivery.taken.send(()).is_ok() {
                return Some(Incoming::Event(delivery.event));
            }
            log::debug!(
                "dropping {} event abandoned by its webhook request",
                delivery.event.event_type()
            );
        }
        // Cleared only once resolved; recv stays cancel-safe.
        let stopped = self.stopped.as_mut()?;
        let reason = stopped.await.unwrap_or_else(|_| {
            StopReason::Failed("listener task ended without reporting".to_string())
        });
        self.stopped = None;
        Some(Incoming::Stopped(reason))
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HandoffError {
    #[error("event consumer is gone")]
    Closed,
    #[error("event consumer did not take the event within {0:?}")]
    TimedOut(Duration),
}

/// Producer end, cloned into every request.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<Delivery>,
    handoff_timeout: Option<Duration>,
}

impl EventSink {
    /// Queue the event and wait until the consumer has taken it.
    async fn deliver(&self, event: InnerEvent) -> Result<(), HandoffError> {
        let handoff = async {
            let (taken, ack) = oneshot::channel();
            self.tx
                .send(Delivery { event, taken })
                .await
                .map_err(|_| HandoffError::Closed)?;
            ack.await.map_err(|_| HandoffError::Closed)
        };
        match self.handoff_timeout {
            Some(limit) => tokio::time::timeout(limit, handoff)
                .await
                .map_err(|_| HandoffError::TimedOut(limit))?,
            None => handoff.await,
        }
    }
}

/// Create the hand-off channel: the sink for the server, the stream for the
/// application, and the sender the listener task reports its stop reason on.
pub(crate) fn event_channel(
    handoff_timeout: Option<Duration>,
) -> (EventSink, EventStream, oneshot::Sender<StopReason>) {
    let (tx, rx) = mpsc::channel(1);
    let (stopped_tx, stopped_rx) = oneshot::channel();
    (
        EventSink {
            tx,
            handoff_timeout,
        },
        EventStream {
            rx,
            stopped: Some(stopped_rx),
        },
        stopped_tx,
    )
}

#[derive(Clone)]
pub(crate) struct ListenerState {
    sink: EventSink,
    verifier: Arc<dyn RequestVerifier>,
}

impl ListenerState {
    pub(crate) fn new(sink: EventSink, verifier: Arc<dyn RequestVerifier>) -> Self {
        Self { sink, verifier }
    }
}

fn router(path: &str, state: ListenerState) -> Router {
    Router::new()
        .route(path, post(webhook))
        .with_state(state)
}

/// Bind and serve until `shutdown` fires (or its sender is dropped). Never returns an
/// error; failures become the stop reason.
pub(crate) async fn serve(
    addr: ListenAddr,
    state: ListenerState,
    shutdown: oneshot::Receiver<()>,
) -> StopReason {
    let app = router(&addr.path, state);
    let bind_addr = addr.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("webhook listener failed to bind {}: {}", bind_addr, e);
            return StopReason::Failed(format!("binding to {}: {}", bind_addr, e));
        }
    };
    log::info!("webhook listener on {}", addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
            log::info!("webhook listener shutting down, draining in-flight requests");
        })
        .await;
    match result {
        Ok(()) => {
            log::info!("webhook listener stopped");
            StopReason::Shutdown
        }
        Err(e) => {
            log::error!("webhook listener failed: {}", e);
            StopReason::Failed(e.to_string())
        }
    }
}

/// POST <path>: verify, parse, answer challenges, hand callback events to the stream.
async fn webhook(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.verifier.verify(&headers, &body) {
        log::warn!("rejecting webhook request: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let envelope = match parse_envelope(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("unparseable webhook body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match envelope {
        Envelope::UrlVerification { challenge } => {
            log::info!("answering url_verification challenge");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Envelope::Callback(callback) => {
            let event_type = callback.event.event_type().to_string();
            match state.sink.deliver(callback.event).await {
                Ok(()) => StatusCode::OK.into_response(),
                Err(e) => {
                    log::warn!("{} event not delivered: {}", event_type, e);
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                }
            }
        }
        Envelope::RateLimited {
            minute_rate_limited,
        } => {
            log::warn!(
                "slack is rate limiting event delivery (minute {:?})",
                minute_rate_limited
            );
            StatusCode::OK.into_response()
        }
        Envelope::Unknown(kind) => {
            log::info!("unexpected envelope type: {}", kind);
            StatusCode::OK.into_response()
        }
    }
}
