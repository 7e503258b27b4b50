//! Bot session: token check, webhook listener lifecycle and cached lookups.
//!
//! ```no_run
//! # async fn demo(config: widget::config::Config) -> anyhow::Result<()> {
//! use widget::{Bot, Incoming};
//!
//! let (bot, mut events) = Bot::connect(&config).await?;
//! while let Some(Incoming::Event(event)) = events.recv().await {
//!     log::info!("{} event", event.event_type());
//! }
//! bot.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::cache::{Resolved, Resolver};
use crate::config::{self, Config, ConfigError, ListenAddr};
use crate::events::MessageEvent;
use crate::listener::{self, EventStream, ListenerState};
use crate::platform::{Channel, Identity, PlatformClient, PlatformError, SlackClient, User};
use crate::signature::RequestVerifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("identity check failed: {0}")]
    Auth(#[source] PlatformError),
}

/// Where and how the webhook listener runs.
#[derive(Clone)]
pub struct ListenOptions {
    /// `scheme://host:port/path`.
    pub url: String,
    pub verifier: Arc<dyn RequestVerifier>,
    /// See `listener.handoffTimeoutSecs`.
    pub handoff_timeout: Option<Duration>,
}

impl ListenOptions {
    pub fn new(url: impl Into<String>, verifier: Arc<dyn RequestVerifier>) -> Self {
        Self {
            url: url.into(),
            verifier,
            handoff_timeout: None,
        }
    }

    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = Some(timeout);
        self
    }

    /// Listen URL, verifier and timeout from config (env overrides applied).
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config::resolve_listen_url(config),
            verifier: config::resolve_verifier(config)?,
            handoff_timeout: config.listener.handoff_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// A running bot. Dropping it shuts the listener down.
pub struct Bot {
    client: Arc<dyn PlatformClient>,
    identity: Identity,
    resolver: Resolver,
    addr: ListenAddr,
    shutdown: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    listener: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    /// Build a Slack client from config and start. Fails without a bot token.
    pub async fn connect(config: &Config) -> Result<(Self, EventStream), StartError> {
        let token = config::resolve_bot_token(config).ok_or(ConfigError::MissingToken)?;
        let options = ListenOptions::from_config(config)?;
        let client = SlackClient::with_base_url(token, config::resolve_api_base_url(config));
        Self::start(options, Arc::new(client)).await
    }

    /// Check the token, then start the listener in the background and return at once.
    ///
    /// A bad listen URL or a failed identity check is returned here and no listener is
    /// started. Bind or serve failures show up later as
    /// [`Incoming::Stopped`](crate::Incoming::Stopped) on the returned stream.
    pub async fn start(
        options: ListenOptions,
        client: Arc<dyn PlatformClient>,
    ) -> Result<(Self, EventStream), StartError> {
        let addr = ListenAddr::parse(&options.url)?;
        let identity = client.auth_test().await.map_err(StartError::Auth)?;
        log::info!(
            "authenticated as {} ({}) on {}",
            identity.user,
            identity.user_id,
            identity.team
        );

        let (sink, events, stopped_tx) = listener::event_channel(options.handoff_timeout);
        let state = ListenerState::new(sink, options.verifier);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let serve_addr = addr.clone();
        let handle = tokio::spawn(async move {
            let reason = listener::serve(serve_addr, state, shutdown_rx).await;
            let _ = stopped_tx.send(reason);
        });

        let bot = Self {
            resolver: Resolver::new(client.clone()),
            client,
            identity,
            addr,
            shutdown: std::sync::Mutex::new(Some(shutdown_tx)),
            listener: tokio::sync::Mutex::new(Some(handle)),
        };
        Ok((bot, events))
    }

    /// The bot's own user id.
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Direct platform access for calls the bot does not wrap.
    pub fn client(&self) -> &Arc<dyn PlatformClient> {
        &self.client
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn listen_addr(&self) -> &ListenAddr {
        &self.addr
    }

    /// True for messages the bot itself wrote (by user id or bot id).
    pub fn is_own_message(&self, msg: &MessageEvent) -> bool {
        msg.user.as_deref() == Some(self.identity.user_id.as_str())
            || (msg.bot_id.is_some() && msg.bot_id == self.identity.bot_id)
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
        self.client.post_message(channel, text).await
    }

    /// Post `text` to the message's channel unless the bot wrote the message.
    /// Returns whether a reply was posted.
    pub async fn reply_to(&self, msg: &MessageEvent, text: &str) -> Result<bool, PlatformError> {
        if self.is_own_message(msg) {
            log::debug!("not replying to own message {} in {}", msg.ts, msg.channel);
            return Ok(false);
        }
        self.post_message(&msg.channel, text).await?;
        Ok(true)
    }

    pub async fn user(&self, id: &str) -> Option<User> {
        self.resolver.user(id).await
    }

    pub async fn user_name(&self, id: &str) -> String {
        self.resolver.user_name(id).await
    }

    pub async fn try_user(&self, id: &str) -> Result<Resolved<User>, PlatformError> {
        self.resolver.try_user(id).await
    }

    pub async fn channel(&self, id: &str) -> Option<Channel> {
        self.resolver.channel(id).await
    }

    pub async fn channel_name(&self, id: &str) -> String {
        self.resolver.channel_name(id).await
    }

    pub async fn try_channel(&self, id: &str) -> Result<Resolved<Channel>, PlatformError> {
        self.resolver.try_channel(id).await
    }

    /// Ask the listener to shut down gracefully without waiting for it. Requests still
    /// handing events over need the stream to keep being read until `Stopped` arrives.
    pub fn shutdown(&self) {
        let tx = match self.shutdown.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    /// Shut down and wait for in-flight requests to finish. No deadline.
    pub async fn stop(&self) {
        self.shutdown();
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("webhook listener task ended abnormally: {}", e);
            }
        }
    }
}
