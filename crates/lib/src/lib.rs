//! Widget: a small Slack bot adapter.
//!
//! Checks the bot token, serves one Events API webhook endpoint and hands callback
//! events to the application through an [`EventStream`]. User and channel lookups are
//! cached per id for the life of the process.

pub mod bot;
pub mod cache;
pub mod config;
pub mod events;
pub mod init;
pub mod listener;
pub mod platform;
pub mod signature;

pub use bot::{Bot, ListenOptions, StartError};
pub use listener::{EventStream, Incoming, StopReason};
