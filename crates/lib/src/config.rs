//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.widget/config.json`); environment
//! variables override file values: `SLACK_XOXB` (bot token), `SLACK_SIGNING_SECRET`,
//! `LISTEN_URL`. A missing file means defaults.

use crate::signature::{RequestVerifier, SigningSecret, Unverified};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_LISTEN_URL: &str = "http://localhost:3000/events-endpoint";
const DEFAULT_REPLY_TEXT: &str = "Yes, hello.";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed listen URL {url:?}: {reason}")]
    ListenUrl { url: String, reason: String },
    #[error("no bot token configured (set SLACK_XOXB or slack.botToken)")]
    MissingToken,
    #[error(
        "no signing secret configured (set SLACK_SIGNING_SECRET or slack.signingSecret, or listener.allowUnverified to accept unsigned requests)"
    )]
    MissingSigningSecret,
}

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Slack credentials and API endpoint.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Webhook listener settings.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Demo responder settings (used by the CLI).
    #[serde(default)]
    pub responder: ResponderConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`). Overridden by SLACK_XOXB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// App signing secret for webhook verification. Overridden by SLACK_SIGNING_SECRET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
    /// Web API base (default https://slack.com/api).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    /// `scheme://host:port/path` the webhook server binds and routes. Overridden by LISTEN_URL.
    #[serde(default = "default_listen_url")]
    pub url: String,
    /// Accept requests without a Slack signature. Only for endpoints behind other protection.
    #[serde(default)]
    pub allow_unverified: bool,
    /// How long a webhook request waits for the application to take its event before
    /// answering 503. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Text posted in reply to every message not written by the bot.
    #[serde(default = "default_reply_text")]
    pub reply_text: String,
}

fn default_listen_url() -> String {
    DEFAULT_LISTEN_URL.to_string()
}

fn default_reply_text() -> String {
    DEFAULT_REPLY_TEXT.to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            url: default_listen_url(),
            allow_unverified: false,
            handoff_timeout_secs: None,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            reply_text: default_reply_text(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Env var value if set and non-blank, else the config value if non-blank.
fn env_or(var: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| configured.and_then(|s| non_empty(s)))
}

/// Resolve the bot token: env SLACK_XOXB overrides config.
pub fn resolve_bot_token(config: &Config) -> Option<String> {
    env_or("SLACK_XOXB", config.slack.bot_token.as_ref())
}

/// Resolve the signing secret: env SLACK_SIGNING_SECRET overrides config.
pub fn resolve_signing_secret(config: &Config) -> Option<String> {
    env_or("SLACK_SIGNING_SECRET", config.slack.signing_secret.as_ref())
}

/// Resolve the listen URL: env LISTEN_URL overrides config; falls back to the default.
pub fn resolve_listen_url(config: &Config) -> String {
    env_or("LISTEN_URL", Some(&config.listener.url)).unwrap_or_else(default_listen_url)
}

pub fn resolve_api_base_url(config: &Config) -> Option<String> {
    config.slack.api_base_url.as_deref().and_then(non_empty)
}

/// Build the request verifier. A signing secret always wins; without one, unsigned
/// requests are accepted only when `listener.allowUnverified` is set.
pub fn resolve_verifier(config: &Config) -> Result<Arc<dyn RequestVerifier>, ConfigError> {
    if let Some(secret) = resolve_signing_secret(config).and_then(SigningSecret::new) {
        return Ok(Arc::new(secret));
    }
    if config.listener.allow_unverified {
        log::warn!("webhook signature verification disabled (listener.allowUnverified)");
        return Ok(Arc::new(Unverified));
    }
    Err(ConfigError::MissingSigningSecret)
}

/// Bind address and route parsed from a listen URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub host: String,
    pub port: u16,
    /// Route path, always starting with `/` and never the bare root.
    pub path: String,
}

impl ListenAddr {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let fail = |reason: &str| ConfigError::ListenUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(raw.trim()).map_err(|e| fail(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| fail("missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| fail("missing port"))?;
        let path = url.path();
        if path.is_empty() || path == "/" {
            return Err(fail("missing path"));
        }
        Ok(Self {
            host,
            port,
            path: path.to_string(),
        })
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WIDGET_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".widget").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
