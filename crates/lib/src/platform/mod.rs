//! Platform client: identity check, user/channel info and posting.
//!
//! The bot core only talks to Slack through [`PlatformClient`]; [`SlackClient`] is the
//! Web API implementation. Lookups are read-only and idempotent, so callers may retry
//! or duplicate them freely.

mod slack;
mod types;

pub use slack::SlackClient;
pub use types::{Channel, Identity, User};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack rejected the token: {0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("slack api error: {0}")]
    Api(String),
}

impl PlatformError {
    /// True when the platform answered that the id does not exist (as opposed to a
    /// transport or auth failure).
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

/// Authenticated calls the bot makes against the messaging platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Verify the token and return the identity it belongs to.
    async fn auth_test(&self) -> Result<Identity, PlatformError>;
    async fn user_info(&self, id: &str) -> Result<User, PlatformError>;
    async fn channel_info(&self, id: &str) -> Result<Channel, PlatformError>;
    /// Post a plain-text message to a channel.
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError>;
}
