//! Chat command surface: leaderboard, error pixel listing and pardons.

use std::sync::Arc;

use tracing::{error, info};
use warden_types::UserId;

use crate::monitor::MismatchView;
use crate::report;
use crate::stats::{PardonOutcome, StatsStore};

pub const DEFAULT_PREFIX: &str = "!";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `rank`: full lifetime leaderboard.
    Leaderboard,
    /// `errorPixels`: current mismatch coordinates.
    ErrorPixels,
    /// `rm <userId>`: remove a user's record.
    Pardon(UserId),
}

impl Command {
    /// Parse `text`, returning `None` for anything that is not a command.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let body = text.trim().strip_prefix(prefix)?;
        let mut words = body.split_whitespace();

        match words.next()? {
            "rank" => Some(Command::Leaderboard),
            "errorPixels" => Some(Command::ErrorPixels),
            "rm" => words.next().map(|id| Command::Pardon(UserId::new(id))),
            _ => None,
        }
    }
}

/// Executes commands against the ledger and the live mismatch set.
#[derive(Clone)]
pub struct CommandRouter {
    stats: Arc<StatsStore>,
    mismatches: MismatchView,
    prefix: String,
}

impl CommandRouter {
    pub fn new(stats: Arc<StatsStore>, mismatches: MismatchView, prefix: impl Into<String>) -> Self {
        Self {
            stats,
            mismatches,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reply text for `text`, or `None` when it is not a command.
    pub async fn handle(&self, text: &str) -> Option<String> {
        let command = Command::parse(text, &self.prefix)?;
        info!(?command, "Handling command");
        Some(self.execute(command).await)
    }

    pub async fn execute(&self, command: Command) -> String {
        match command {
            Command::Leaderboard => report::leaderboard_text(&self.stats.leaderboard().await),
            Command::ErrorPixels => report::error_pixel_table(&self.mismatches.snapshot().await),
            Command::Pardon(id) => match self.stats.pardon(&id).await {
                Ok(PardonOutcome::Pardoned(record)) => report::pardon_confirmation(&id, &record),
                Ok(PardonOutcome::NotFound) => report::pardon_not_found(&id),
                Err(e) => {
                    error!(user = %id, error = %e, "Pardon not persisted");
                    format!("Pardoned user {}, but the ledger could not be saved: {}", id, e)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryBackend;
    use warden_types::{NewUserStats, PixelOwnerInfo};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("!rank", "!"), Some(Command::Leaderboard));
        assert_eq!(Command::parse("  !errorPixels ", "!"), Some(Command::ErrorPixels));
        assert_eq!(
            Command::parse("!rm 4242", "!"),
            Some(Command::Pardon(UserId::new("4242")))
        );
        assert_eq!(Command::parse("!rm", "!"), None);
        assert_eq!(Command::parse("rank", "!"), None);
        assert_eq!(Command::parse("!ranking", "!"), None);
        assert_eq!(Command::parse("hello", "!"), None);
        assert_eq!(Command::parse("?rank", "?"), Some(Command::Leaderboard));
    }

    #[tokio::test]
    async fn test_router_pardon_flow() {
        let stats = Arc::new(StatsStore::open(Arc::new(MemoryBackend::new())).await.unwrap());
        let mut new = NewUserStats::new();
        new.record(UserId::new("9"), PixelOwnerInfo::new("9", "nine"));
        stats.merge(&new).await.unwrap();

        let router = CommandRouter::new(stats.clone(), MismatchView::default(), DEFAULT_PREFIX);

        assert_eq!(router.handle("!rm 9").await.unwrap(), "Pardoned user 9 nine");
        assert_eq!(
            router.handle("!rm 9").await.unwrap(),
            "No offender record for user 9"
        );
        assert_eq!(
            router.handle("!rank").await.unwrap(),
            "No offender statistics yet."
        );
        assert_eq!(
            router.handle("!errorPixels").await.unwrap(),
            "No error pixels right now."
        );
        assert!(router.handle("good morning").await.is_none());
    }
}
