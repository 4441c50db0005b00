//! Application state for API handlers

use std::sync::Arc;

use warden_monitor::{CommandRouter, MonitorHandle, StatsStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Offender ledger
    pub stats: Arc<StatsStore>,

    /// Observer handle on the monitor loop
    pub monitor: MonitorHandle,

    /// Chat command router
    pub commands: CommandRouter,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(stats: Arc<StatsStore>, monitor: MonitorHandle, commands: CommandRouter) -> Self {
        Self {
            stats,
            monitor,
            commands,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        format_uptime((chrono::Utc::now() - self.started_at).num_seconds())
    }
}

fn format_uptime(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(7260), "2h 1m");
        assert_eq!(format_uptime(90000), "1d 1h");
    }
}
