//! Events API webhook envelopes.
//!
//! Slack POSTs one of a few outer envelopes to the subscription URL: a one-time
//! `url_verification` challenge, an `event_callback` wrapping the inner event, or an
//! `app_rate_limited` notice. The inner event is carried to the application as-is;
//! only `message` and `app_mention` get typed fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope has no type")]
    MissingType,
    #[error("malformed {kind} envelope: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Outer webhook envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Subscription check; the challenge must be echoed back.
    UrlVerification { challenge: String },
    Callback(CallbackEvent),
    /// Slack stopped delivering events for a while.
    RateLimited { minute_rate_limited: Option<i64> },
    /// Any other envelope type (logged and dropped by the listener).
    Unknown(String),
}

/// An `event_callback` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub team_id: Option<String>,
    pub api_app_id: Option<String>,
    pub event_id: Option<String>,
    pub event_time: Option<i64>,
    pub event: InnerEvent,
}

/// The payload describing what happened.
#[derive(Debug, Clone, PartialEq)]
pub enum InnerEvent {
    Message(MessageEvent),
    AppMention(AppMentionEvent),
    /// Any other event type, with the verbatim JSON.
    Other { event_type: String, payload: Value },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
    /// Absent for some subtypes (e.g. `bot_message`).
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    pub thread_ts: Option<String>,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
    /// `"im"` for direct messages.
    pub channel_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMentionEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    pub thread_ts: Option<String>,
}

#[derive(Deserialize)]
struct ChallengeBody {
    challenge: String,
}

#[derive(Deserialize)]
struct CallbackBody {
    team_id: Option<String>,
    api_app_id: Option<String>,
    event_id: Option<String>,
    event_time: Option<i64>,
    event: Value,
}

#[derive(Deserialize)]
struct RateLimitedBody {
    minute_rate_limited: Option<i64>,
}

fn malformed(kind: &'static str) -> impl FnOnce(serde_json::Error) -> ParseError {
    move |source| ParseError::Malformed { kind, source }
}

/// Decode a raw webhook body. A verification envelope without a string `challenge`
/// is an error rather than an empty challenge.
pub fn parse_envelope(body: &[u8]) -> Result<Envelope, ParseError> {
    let value: Value = serde_json::from_slice(body)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingType)?
        .to_string();
    match kind.as_str() {
        "url_verification" => {
            let b: ChallengeBody =
                serde_json::from_value(value).map_err(malformed("url_verification"))?;
            Ok(Envelope::UrlVerification {
                challenge: b.challenge,
            })
        }
        "event_callback" => {
            let b: CallbackBody =
                serde_json::from_value(value).map_err(malformed("event_callback"))?;
            Ok(Envelope::Callback(CallbackEvent {
                team_id: b.team_id,
                api_app_id: b.api_app_id,
                event_id: b.event_id,
                event_time: b.event_time,
                event: InnerEvent::from_value(b.event),
            }))
        }
        "app_rate_limited" => {
            let b: RateLimitedBody =
                serde_json::from_value(value).map_err(malformed("app_rate_limited"))?;
            Ok(Envelope::RateLimited {
                minute_rate_limited: b.minute_rate_limited,
            })
        }
        _ => Ok(Envelope::Unknown(kind)),
    }
}

impl InnerEvent {
    /// Type the payload by its `type` field; anything that does not fit stays `Other`.
    pub fn from_value(payload: Value) -> Self {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let typed = match event_type.as_str() {
            "message" => serde_json::from_value(payload.clone()).map(InnerEvent::Message),
            "app_mention" => serde_json::from_value(payload.clone()).map(InnerEvent::AppMention),
            _ => return InnerEvent::Other { event_type, payload },
        };
        typed.unwrap_or_else(|e| {
            log::debug!("keeping {} event untyped: {}", event_type, e);
            InnerEvent::Other { event_type, payload }
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            InnerEvent::Message(_) => "message",
            InnerEvent::AppMention(_) => "app_mention",
            InnerEvent::Other { event_type, .. } => event_type,
        }
    }
}
