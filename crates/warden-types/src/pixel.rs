//! Canvas geometry: coordinates, mismatch sets, regions and offsets.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

/// Tile-local pixel position on the remote canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(u32, u32)> for Coordinate {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

/// Set of mismatched coordinates observed in a single cycle.
///
/// Set semantics: no duplicates and no meaningful order. [`ErrorPixelSet::sorted`]
/// gives a stable order for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPixelSet(HashSet<Coordinate>);

impl ErrorPixelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coordinate: Coordinate) -> bool {
        self.0.insert(coordinate)
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.0.contains(coordinate)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.0.iter()
    }

    /// Coordinates present here but not in `previous`.
    pub fn difference(&self, previous: &ErrorPixelSet) -> ErrorPixelSet {
        self.0.difference(&previous.0).copied().collect()
    }

    /// Coordinates ordered by (x, y).
    pub fn sorted(&self) -> Vec<Coordinate> {
        let mut coordinates: Vec<_> = self.0.iter().copied().collect();
        coordinates.sort_unstable();
        coordinates
    }
}

impl FromIterator<Coordinate> for ErrorPixelSet {
    fn from_iter<I: IntoIterator<Item = Coordinate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ErrorPixelSet {
    type Item = Coordinate;
    type IntoIter = std::collections::hash_set::IntoIter<Coordinate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for ErrorPixelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sorted().serialize(serializer)
    }
}

/// Tile address of the watched canvas region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    pub x: u32,
    pub y: u32,
}

impl TileRegion {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile:{}/{}", self.x, self.y)
    }
}

/// Position of the template's top-left pixel inside the tile.
///
/// Any value is allowed; pixels mapped outside the tile are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelOffset {
    pub x: i64,
    pub y: i64,
}

impl PixelOffset {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}
