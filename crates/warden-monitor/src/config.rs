//! Configuration for the monitoring pipeline.

use std::time::Duration;

use warden_types::{PixelOffset, TileRegion};

use crate::error::{MonitorError, MonitorResult};

/// Settings for one watched canvas region.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Tile that contains the template.
    pub region: TileRegion,

    /// Template position inside the tile.
    pub offset: PixelOffset,

    /// Time between cycle starts.
    pub tick_interval: Duration,

    /// Budget for every external call (tile fetch, ownership lookup).
    pub request_timeout: Duration,

    /// Maximum ownership lookups in flight at once.
    pub lookup_concurrency: usize,

    /// Treat the first cycle with mismatches as a baseline and skip merging
    /// its counts into the ledger.
    pub suppress_first_cycle: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            region: TileRegion::new(0, 0),
            offset: PixelOffset::default(),
            tick_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            lookup_concurrency: 8,
            suppress_first_cycle: true,
        }
    }
}

impl MonitorConfig {
    pub fn new(region: TileRegion, offset: PixelOffset) -> Self {
        Self {
            region,
            offset,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.tick_interval.is_zero() {
            return Err(MonitorError::Config(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(MonitorError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.lookup_concurrency == 0 {
            return Err(MonitorError::Config(
                "lookup concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
