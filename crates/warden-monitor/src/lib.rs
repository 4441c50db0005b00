//! # Pixel Warden Monitor
//!
//! Guards a region of a collaborative pixel canvas against a reference
//! template and keeps a ledger of the users whose pixels break it.
//!
//! ## Pipeline
//!
//! Every tick the [`MonitorLoop`]:
//!
//! 1. loads the template ([`TemplateStore`]) and fetches the tile ([`TileSource`])
//! 2. diffs them ([`diff::compare`]), skipping transparent template pixels
//! 3. on new mismatches, attributes every mismatch to its painter
//!    ([`AttributionService`]) and merges the new ones into the ledger
//!    ([`StatsStore`])
//! 4. notifies the configured channels ([`Notifier`])
//!
//! The [`CommandRouter`] answers leaderboard, error-pixel and pardon commands
//! while the loop runs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_monitor::{
//!     CanvasEndpoints, HttpCanvasClient, JsonFileBackend, LogNotifier, MonitorConfig,
//!     MonitorLoop, StatsStore, TemplateStore,
//! };
//! use warden_types::{PixelOffset, TileRegion};
//!
//! # async fn example() -> warden_monitor::MonitorResult<()> {
//! let config = MonitorConfig::new(TileRegion::new(1676, 816), PixelOffset::new(120, 40));
//! let canvas = Arc::new(HttpCanvasClient::new(CanvasEndpoints::default())?);
//! let stats = Arc::new(StatsStore::open(Arc::new(JsonFileBackend::new("user_stats.json"))).await?);
//!
//! let monitor = MonitorLoop::new(
//!     config,
//!     Arc::new(TemplateStore::from_path("template.png")),
//!     canvas.clone(),
//!     canvas,
//!     stats,
//!     Arc::new(LogNotifier::new(vec!["123".into()])),
//! )?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! monitor.run(shutdown_rx).await;
//! # Ok(())
//! # }
//! ```

pub mod attribution;
pub mod canvas;
pub mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod monitor;
pub mod notifier;
pub mod report;
pub mod stats;
pub mod template;

// Re-export main types
pub use attribution::{Attribution, AttributionService};
pub use canvas::{CanvasEndpoints, HttpCanvasClient, OwnerLookup, TileSource};
pub use commands::{Command, CommandRouter};
pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use monitor::{
    BaselineState, CycleOutcome, CyclePhase, MismatchView, MonitorHandle, MonitorLoop,
    MonitorStatus,
};
pub use notifier::{broadcast_image, broadcast_text, LogNotifier, Notifier, OutgoingImage};
pub use stats::{
    JsonFileBackend, Ledger, MemoryBackend, MergeSummary, PardonOutcome, StatsBackend, StatsStore,
};
pub use template::TemplateStore;
