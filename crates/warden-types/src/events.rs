//! Events emitted by the monitor loop.

use serde::{Deserialize, Serialize};

/// Observable transitions of the monitor loop, one or more per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A tick began.
    CycleStarted { cycle: u64 },

    /// A tick was abandoned; stored state is untouched.
    CycleFailed { cycle: u64, reason: String },

    /// Nothing new to report.
    NoChange { cycle: u64, mismatches: usize },

    /// Mismatches appeared that were not present last cycle.
    NewErrors {
        cycle: u64,
        mismatches: usize,
        new_errors: usize,
        offenders: usize,
        merged: bool,
    },

    /// Every previously mismatched pixel is correct again.
    ErrorsCleared { cycle: u64 },

    /// The first cycle with mismatches was recorded as the baseline.
    Baselined { cycle: u64 },
}

impl MonitorEvent {
    pub fn cycle(&self) -> u64 {
        match self {
            MonitorEvent::CycleStarted { cycle }
            | MonitorEvent::CycleFailed { cycle, .. }
            | MonitorEvent::NoChange { cycle, .. }
            | MonitorEvent::NewErrors { cycle, .. }
            | MonitorEvent::ErrorsCleared { cycle }
            | MonitorEvent::Baselined { cycle } => *cycle,
        }
    }
}
