//! Shared helpers: a scripted platform client, free ports and webhook POSTs.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use widget::platform::{Channel, Identity, PlatformClient, PlatformError, User};
use widget::signature::{RequestVerifier, Unverified};
use widget::{Bot, EventStream, ListenOptions};

pub const BOT_USER_ID: &str = "UBOT";

/// In-memory platform with call counters.
#[derive(Default)]
pub struct FakePlatform {
    pub users: HashMap<String, User>,
    pub channels: HashMap<String, Channel>,
    /// auth.test fails with invalid_auth.
    pub reject_token: bool,
    /// Lookups fail with a transient API error.
    pub unavailable: bool,
    pub user_delay: Option<Duration>,
    pub auth_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub channel_calls: AtomicUsize,
    pub posted: Mutex<Vec<(String, String)>>,
}

impl FakePlatform {
    pub fn with_user(mut self, id: &str, name: &str) -> Self {
        self.users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                name: name.to_string(),
                real_name: None,
                is_bot: false,
                deleted: false,
            },
        );
        self
    }

    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.insert(
            id.to_string(),
            Channel {
                id: id.to_string(),
                name: name.to_string(),
                is_private: false,
                is_archived: false,
                is_member: true,
            },
        );
        self
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn channel_calls(&self) -> usize {
        self.channel_calls.load(Ordering::SeqCst)
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn auth_test(&self) -> Result<Identity, PlatformError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_token {
            return Err(PlatformError::Auth("auth.test: invalid_auth".into()));
        }
        Ok(Identity {
            user_id: BOT_USER_ID.to_string(),
            user: "widget".to_string(),
            team_id: "T1".to_string(),
            team: "Acme".to_string(),
            bot_id: Some("BBOT".to_string()),
        })
    }

    async fn user_info(&self, id: &str) -> Result<User, PlatformError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.user_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(PlatformError::Api("users.info: internal_error".into()));
        }
        self.users
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound("users.info: user_not_found".into()))
    }

    async fn channel_info(&self, id: &str) -> Result<Channel, PlatformError> {
        self.channel_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(PlatformError::Api("conversations.info: internal_error".into()));
        }
        self.channels
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound("conversations.info: channel_not_found".into()))
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
        self.posted
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn unverified() -> Arc<dyn RequestVerifier> {
    Arc::new(Unverified)
}

pub fn endpoint(port: u16) -> String {
    format!("http://127.0.0.1:{}/events-endpoint", port)
}

/// Start a bot on a free port with an unverified endpoint; returns the webhook URL.
pub async fn start_bot(fake: Arc<FakePlatform>) -> (Bot, EventStream, String) {
    let url = endpoint(free_port());
    let (bot, events) = Bot::start(ListenOptions::new(url.clone(), unverified()), fake)
        .await
        .expect("bot starts");
    (bot, events, url)
}

/// POST a body to the webhook, retrying while the listener is still coming up.
pub fn post(
    url: &str,
    body: &str,
    headers: Vec<(&'static str, String)>,
) -> impl Future<Output = reqwest::Response> + Send + 'static {
    let url = url.to_string();
    let body = body.to_string();
    async move {
        let client = reqwest::Client::new();
        let mut last_err = None;
        for _ in 0..100 {
            let mut req = client
                .post(&url)
                .header("content-type", "application/json")
                .body(body.clone());
            for (name, value) in &headers {
                req = req.header(*name, value.as_str());
            }
            match req.send().await {
                Ok(res) => return res,
                Err(e) if e.is_connect() => last_err = Some(e),
                Err(e) => panic!("POST {} failed: {}", url, e),
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("POST {} never connected within 5s; last error: {:?}", url, last_err);
    }
}

pub fn post_json(url: &str, body: &str) -> impl Future<Output = reqwest::Response> + Send + 'static {
    post(url, body, Vec::new())
}

/// Wait until the listener answers a verification challenge.
pub async fn wait_ready(url: &str) {
    let res = post_json(url, r#"{"type":"url_verification","challenge":"ready"}"#).await;
    assert_eq!(res.status(), 200, "listener not ready");
}
