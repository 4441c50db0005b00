//! Attribution of mismatched pixels to the users who painted them.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};
use warden_types::{ErrorPixelSet, NewUserStats, OffenderTally, TileRegion};

use crate::canvas::OwnerLookup;
use crate::error::MonitorError;

/// Result of attributing one cycle's mismatches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribution {
    /// Every successfully resolved mismatch, per user.
    pub totals: OffenderTally,

    /// Mismatches absent from the previous cycle, per user.
    pub new: NewUserStats,

    /// Lookups that failed and were skipped.
    pub failed: usize,
}

/// Resolves pixel owners with a bounded number of concurrent lookups.
pub struct AttributionService {
    lookup: Arc<dyn OwnerLookup>,
    region: TileRegion,
    concurrency: usize,
    timeout: Duration,
}

impl AttributionService {
    pub fn new(
        lookup: Arc<dyn OwnerLookup>,
        region: TileRegion,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            region,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Attribute every coordinate in `mismatches`, classifying those absent
    /// from `previous` as new.
    ///
    /// A failed or timed out lookup skips only its own coordinate. Results are
    /// folded on this task, so concurrent lookups resolving to the same user
    /// never race on the tallies.
    #[instrument(skip_all, fields(region = %self.region, mismatches = mismatches.len()))]
    pub async fn attribute(
        &self,
        mismatches: &ErrorPixelSet,
        previous: &ErrorPixelSet,
    ) -> Attribution {
        let timeout_ms = self.timeout.as_millis() as u64;

        let mut lookups = stream::iter(mismatches.sorted())
            .map(|coordinate| async move {
                let outcome =
                    match tokio::time::timeout(self.timeout, self.lookup.lookup(self.region, coordinate))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(MonitorError::Timeout {
                            operation: "ownership lookup",
                            timeout_ms,
                        }),
                    };
                (coordinate, outcome)
            })
            .buffer_unordered(self.concurrency);

        let mut attribution = Attribution::default();
        while let Some((coordinate, outcome)) = lookups.next().await {
            match outcome {
                Ok(owner) => match owner.and_then(|info| info.user_id().map(|id| (id, info))) {
                    Some((id, info)) => {
                        if !previous.contains(&coordinate) {
                            attribution.new.record(id.clone(), info.clone());
                        }
                        attribution.totals.record_owner(id, info);
                    }
                    None => attribution.totals.record_unknown(),
                },
                Err(e) => {
                    warn!(%coordinate, error = %e, "Skipping pixel after failed ownership lookup");
                    attribution.failed += 1;
                }
            }
        }

        debug!(
            attributed = attribution.totals.total(),
            new = attribution.new.total(),
            failed = attribution.failed,
            "Attribution finished"
        );
        attribution
    }
}
