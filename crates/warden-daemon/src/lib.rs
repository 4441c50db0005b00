//! Pixel Warden daemon library
//!
//! This crate wires the monitor into a long-running service:
//! - configuration loading and validation
//! - the Discord REST notifier and inbound command poller
//! - the operator REST API
//! - server lifecycle and graceful shutdown

pub mod api;
pub mod config;
pub mod discord;
pub mod error;
pub mod inbound;
pub mod server;

pub use config::DaemonConfig;
pub use discord::DiscordClient;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use inbound::{CommandPoller, InboundMessage, MessageSource};
pub use server::{RunOptions, Server};
