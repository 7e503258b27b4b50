//! Slack Web API client: auth.test, users.info, conversations.info, chat.postMessage.

use crate::platform::{Channel, Identity, PlatformClient, PlatformError, User};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Web API client authenticated with a bot (`xoxb-`) token.
#[derive(Clone)]
pub struct SlackClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, None)
    }

    /// Client against a custom API base (tests, proxies). `None` uses https://slack.com/api.
    pub fn with_base_url(token: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| SLACK_API_BASE.to_string());
        Self {
            token: token.into(),
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Send a prepared request and unwrap Slack's `{"ok": ..., "error": ...}` wrapper.
    async fn call(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, PlatformError> {
        let res = request.bearer_auth(&self.token).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PlatformError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: Value = res.json().await?;
        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(classify_error(method, code));
        }
        Ok(data)
    }
}

/// Map a Slack error code to the error taxonomy the bot cares about.
fn classify_error(method: &str, code: &str) -> PlatformError {
    match code {
        "user_not_found" | "channel_not_found" | "users_not_found" => {
            PlatformError::NotFound(format!("{}: {}", method, code))
        }
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" => PlatformError::Auth(format!("{}: {}", method, code)),
        _ => PlatformError::Api(format!("{}: {}", method, code)),
    }
}

/// Pull a typed record out of a response body, either the whole body or one field.
fn decode<T: DeserializeOwned>(
    method: &str,
    data: Value,
    field: Option<&str>,
) -> Result<T, PlatformError> {
    let value = match field {
        Some(f) => data
            .get(f)
            .cloned()
            .ok_or_else(|| PlatformError::Api(format!("{}: response has no {}", method, f)))?,
        None => data,
    };
    serde_json::from_value(value)
        .map_err(|e| PlatformError::Api(format!("{}: unexpected response: {}", method, e)))
}

#[async_trait]
impl PlatformClient for SlackClient {
    async fn auth_test(&self) -> Result<Identity, PlatformError> {
        let method = "auth.test";
        let data = self.call(method, self.client.post(self.url(method))).await?;
        decode(method, data, None)
    }

    async fn user_info(&self, id: &str) -> Result<User, PlatformError> {
        let method = "users.info";
        let request = self.client.get(self.url(method)).query(&[("user", id)]);
        let data = self.call(method, request).await?;
        decode(method, data, Some("user"))
    }

    async fn channel_info(&self, id: &str) -> Result<Channel, PlatformError> {
        let method = "conversations.info";
        let request = self.client.get(self.url(method)).query(&[("channel", id)]);
        let data = self.call(method, request).await?;
        decode(method, data, Some("channel"))
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
        let method = "chat.postMessage";
        let body = serde_json::json!({ "channel": channel, "text": text });
        let request = self.client.post(self.url(method)).json(&body);
        self.call(method, request).await?;
        log::debug!("posted message to {}", channel);
        Ok(())
    }
}
