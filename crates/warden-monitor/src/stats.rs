//! Cumulative per-user error ledger.
//!
//! The ledger is the only state that outlives a process. Every mutation
//! persists the complete mapping while the write lock is still held, so
//! readers never observe a half-applied update and a crash loses at most the
//! mutation in progress.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};
use warden_types::{rank_records, NewUserStats, UserErrorRecord, UserId};

use crate::error::{MonitorError, MonitorResult};

/// Persisted mapping from user id to cumulative record.
pub type Ledger = BTreeMap<UserId, UserErrorRecord>;

/// Storage substrate for the ledger.
#[async_trait]
pub trait StatsBackend: Send + Sync {
    /// Load the full ledger. A ledger that was never saved is empty.
    async fn load(&self) -> MonitorResult<Ledger>;

    /// Durably replace the stored ledger.
    async fn save(&self, ledger: &Ledger) -> MonitorResult<()>;
}

/// JSON file backend.
///
/// Layout: `{"<userId>": {"count": n, "info": {"id", "name", "allianceName", ...}}}`.
/// Writes go to a sibling temporary file which is synced and then renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl StatsBackend for JsonFileBackend {
    async fn load(&self) -> MonitorResult<Ledger> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No stats file yet, starting with an empty ledger");
                return Ok(Ledger::new());
            }
            Err(e) => {
                return Err(MonitorError::Persistence(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Ledger::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            MonitorError::Persistence(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, ledger: &Ledger) -> MonitorResult<()> {
        let json = serde_json::to_vec_pretty(ledger)?;
        let temp = self.temp_path();

        let write_err = |e: std::io::Error| {
            MonitorError::Persistence(format!("cannot write {}: {}", temp.display(), e))
        };

        // Contents must be on disk before the rename makes them the ledger.
        let mut file = tokio::fs::File::create(&temp).await.map_err(write_err)?;
        file.write_all(&json).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            MonitorError::Persistence(format!("cannot replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

/// Volatile backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    ledger: Mutex<Ledger>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Last saved ledger.
    pub async fn saved(&self) -> Ledger {
        self.ledger.lock().await.clone()
    }
}

#[async_trait]
impl StatsBackend for MemoryBackend {
    async fn load(&self) -> MonitorResult<Ledger> {
        Ok(self.ledger.lock().await.clone())
    }

    async fn save(&self, ledger: &Ledger) -> MonitorResult<()> {
        *self.ledger.lock().await = ledger.clone();
        Ok(())
    }
}

/// Summary of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub users_updated: usize,
    pub users_created: usize,
    pub errors_added: u64,
}

/// Outcome of a pardon request.
#[derive(Debug, Clone, PartialEq)]
pub enum PardonOutcome {
    /// The record was removed.
    Pardoned(UserErrorRecord),
    /// No record exists for the id.
    NotFound,
}

/// Shared cumulative ledger.
pub struct StatsStore {
    ledger: RwLock<Ledger>,
    backend: Arc<dyn StatsBackend>,
}

impl StatsStore {
    /// Open the store, loading the persisted ledger.
    pub async fn open(backend: Arc<dyn StatsBackend>) -> MonitorResult<Self> {
        let ledger = backend.load().await?;
        info!(users = ledger.len(), "Loaded offender ledger");

        Ok(Self {
            ledger: RwLock::new(ledger),
            backend,
        })
    }

    /// Add the cycle's new-error counts to the lifetime counts.
    ///
    /// Users without a record are created with the supplied profile; existing
    /// records keep their stored profile. On a persistence failure the merge
    /// still stands in memory and the next mutation retries the save.
    #[instrument(skip_all, fields(users = new.users.len()))]
    pub async fn merge(&self, new: &NewUserStats) -> MonitorResult<MergeSummary> {
        let mut ledger = self.ledger.write().await;
        let mut summary = MergeSummary {
            users_updated: 0,
            users_created: 0,
            errors_added: 0,
        };

        for (id, record) in new.iter() {
            summary.errors_added += record.count;
            match ledger.get_mut(id) {
                Some(existing) => {
                    existing.count += record.count;
                    summary.users_updated += 1;
                }
                None => {
                    ledger.insert(id.clone(), record.clone());
                    summary.users_created += 1;
                }
            }
        }

        self.persist(&ledger).await?;
        info!(
            updated = summary.users_updated,
            created = summary.users_created,
            errors_added = summary.errors_added,
            "Merged new errors into ledger"
        );
        Ok(summary)
    }

    /// Remove a user's record entirely.
    #[instrument(skip(self))]
    pub async fn pardon(&self, id: &UserId) -> MonitorResult<PardonOutcome> {
        let mut ledger = self.ledger.write().await;
        let Some(record) = ledger.remove(id) else {
            return Ok(PardonOutcome::NotFound);
        };

        self.persist(&ledger).await?;
        info!(user = %id, name = %record.info.display_name(), "Pardoned user");
        Ok(PardonOutcome::Pardoned(record))
    }

    /// Records ranked by count descending, ties broken by user id ascending.
    pub async fn leaderboard(&self) -> Vec<(UserId, UserErrorRecord)> {
        rank_records(self.ledger.read().await.iter())
    }

    pub async fn get(&self, id: &UserId) -> Option<UserErrorRecord> {
        self.ledger.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.ledger.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ledger.read().await.is_empty()
    }

    /// Sum of every user's lifetime count.
    pub async fn total_errors(&self) -> u64 {
        self.ledger.read().await.values().map(|r| r.count).sum()
    }

    pub async fn snapshot(&self) -> Ledger {
        self.ledger.read().await.clone()
    }

    async fn persist(&self, ledger: &Ledger) -> MonitorResult<()> {
        self.backend.save(ledger).await.map_err(|e| {
            warn!(error = %e, "Ledger save failed; in-memory state kept");
            e
        })
    }
}
