//! Offender identity and error accounting types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::ids::{RawUserId, UserId};

/// Profile of the user who last painted a pixel.
///
/// Only `id`, `name` and `allianceName` are interpreted. Any other field the
/// canvas reports is carried along untouched, and `id` and `allianceName` keep
/// their received JSON form (number or string, `null` or absent), so a
/// persisted ledger survives a load/save cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelOwnerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RawUserId>,

    #[serde(default)]
    pub name: String,

    /// Outer `None` when the field was absent, inner `None` for `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub alliance_name: Option<Option<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PixelOwnerInfo {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: Some(RawUserId::from(id.into())),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_alliance(mut self, alliance: impl Into<String>) -> Self {
        self.alliance_name = Some(Some(alliance.into()));
        self
    }

    /// Canonical id of the painter, if the canvas reported one.
    pub fn user_id(&self) -> Option<UserId> {
        self.id.as_ref().map(RawUserId::user_id)
    }

    /// Alliance name, treating an empty string as no alliance.
    pub fn alliance(&self) -> Option<&str> {
        self.alliance_name
            .as_ref()
            .and_then(|name| name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Display name, falling back to `Unknown`.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown"
        } else {
            &self.name
        }
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Per-user aggregate: an error count and the most recently seen profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserErrorRecord {
    pub count: u64,
    pub info: PixelOwnerInfo,
}

impl UserErrorRecord {
    pub fn new(count: u64, info: PixelOwnerInfo) -> Self {
        Self { count, info }
    }
}

/// Sort records by count descending, breaking ties by user id ascending.
pub fn rank_records<'a, I>(records: I) -> Vec<(UserId, UserErrorRecord)>
where
    I: IntoIterator<Item = (&'a UserId, &'a UserErrorRecord)>,
{
    let mut ranked: Vec<_> = records
        .into_iter()
        .map(|(id, record)| (id.clone(), record.clone()))
        .collect();
    ranked.sort_by(|(a_id, a), (b_id, b)| b.count.cmp(&a.count).then_with(|| a_id.cmp(b_id)));
    ranked
}

fn bump(users: &mut HashMap<UserId, UserErrorRecord>, id: UserId, info: PixelOwnerInfo) {
    users
        .entry(id)
        .and_modify(|record| {
            record.count += 1;
            record.info = info.clone();
        })
        .or_insert_with(|| UserErrorRecord::new(1, info));
}

/// Attribution of every mismatched pixel in one cycle.
///
/// Pixels whose owner could not be identified land in the `unknown` bucket,
/// which only counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffenderTally {
    pub users: HashMap<UserId, UserErrorRecord>,
    pub unknown: u64,
}

impl OffenderTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_owner(&mut self, id: UserId, info: PixelOwnerInfo) {
        bump(&mut self.users, id, info);
    }

    pub fn record_unknown(&mut self) {
        self.unknown += 1;
    }

    /// Number of attributed pixels, unknown bucket included.
    pub fn total(&self) -> u64 {
        self.users.values().map(|r| r.count).sum::<u64>() + self.unknown
    }

    /// Number of distinct offenders, counting the unknown bucket as one.
    pub fn offender_count(&self) -> usize {
        self.users.len() + usize::from(self.unknown > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.unknown == 0
    }

    pub fn ranked(&self) -> Vec<(UserId, UserErrorRecord)> {
        rank_records(&self.users)
    }
}

/// Per-user counts of mismatches that first appeared this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUserStats {
    pub users: HashMap<UserId, UserErrorRecord>,
}

impl NewUserStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: UserId, info: PixelOwnerInfo) {
        bump(&mut self.users, id, info);
    }

    pub fn total(&self) -> u64 {
        self.users.values().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &UserErrorRecord)> {
        self.users.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_info_preserves_unknown_fields() {
        let raw = r#"{"id":7,"name":"alice","allianceName":"","discord":"alice#1","picture":null}"#;
        let info: PixelOwnerInfo = serde_json::from_str(raw).unwrap();

        assert_eq!(info.user_id(), Some(UserId::new("7")));
        assert_eq!(info.alliance(), None);
        assert_eq!(info.extra["discord"], "alice#1");

        let reparsed: PixelOwnerInfo =
            serde_json::from_str(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(reparsed, info);
    }

    #[test]
    fn test_owner_info_reserializes_unchanged() {
        for raw in [
            r#"{"id":123,"name":"x","allianceName":null}"#,
            r#"{"id":"9","name":"nine","allianceName":"Blue"}"#,
            r#"{"id":5,"name":"no alliance"}"#,
        ] {
            let info: PixelOwnerInfo = serde_json::from_str(raw).unwrap();
            let before: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(serde_json::to_value(&info).unwrap(), before, "{}", raw);
        }
    }

    #[test]
    fn test_null_alliance_is_no_alliance() {
        let info: PixelOwnerInfo =
            serde_json::from_str(r#"{"id":123,"name":"x","allianceName":null}"#).unwrap();
        assert_eq!(info.alliance(), None);
        assert_eq!(info.user_id(), Some(UserId::new("123")));
    }

    #[test]
    fn test_tally_carries_latest_profile() {
        let mut tally = OffenderTally::new();
        tally.record_owner(UserId::new("1"), PixelOwnerInfo::new("1", "old"));
        tally.record_owner(UserId::new("1"), PixelOwnerInfo::new("1", "renamed"));
        tally.record_unknown();

        let record = &tally.users[&UserId::new("1")];
        assert_eq!(record.count, 2);
        assert_eq!(record.info.name, "renamed");
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.offender_count(), 2);
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let mut users = HashMap::new();
        users.insert(UserId::new("b"), UserErrorRecord::new(3, PixelOwnerInfo::default()));
        users.insert(UserId::new("a"), UserErrorRecord::new(3, PixelOwnerInfo::default()));
        users.insert(UserId::new("c"), UserErrorRecord::new(9, PixelOwnerInfo::default()));

        let order: Vec<_> = rank_records(&users)
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(order, ["c", "a", "b"]);
    }
}
