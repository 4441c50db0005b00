//! Pixel Warden Types - shared data model for canvas guarding
//!
//! Pixel Warden watches a region of a collaborative pixel canvas, compares it
//! against a reference template and attributes every deviating pixel to the
//! user who last painted it.
//!
//! ## Key Concepts
//!
//! - **Coordinate**: tile-local pixel position, the unit of a mismatch
//! - **ErrorPixelSet**: the set of mismatched coordinates seen in one cycle
//! - **PixelOwnerInfo**: who painted a pixel, as reported by the canvas
//! - **UserErrorRecord**: per-user error count plus last known profile
//! - **OffenderTally / NewUserStats**: cycle-scoped attribution results
//! - **MonitorEvent**: observability stream emitted by the monitor loop

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod offender;
pub mod pixel;

// Re-export main types
pub use events::MonitorEvent;
pub use ids::{ChannelId, RawUserId, UserId};
pub use offender::{rank_records, NewUserStats, OffenderTally, PixelOwnerInfo, UserErrorRecord};
pub use pixel::{Coordinate, ErrorPixelSet, PixelOffset, TileRegion};
