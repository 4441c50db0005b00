//! Text rendering for alerts, summaries and command replies.

use warden_types::{ErrorPixelSet, OffenderTally, UserErrorRecord, UserId};

/// Maximum length of a single Discord message, in characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

pub const ALERT_IMAGE_NAME: &str = "cropped_image.png";

pub const CLEARED_NOTICE: &str = "✅ All error pixels have been cleared!";

/// Broadcast caption sent with the alert image.
pub fn alert_caption(mismatches: usize) -> String {
    format!(
        "@everyone\n\n{} error pixels on the canvas, tallying the offenders...",
        mismatches
    )
}

/// Ranked offenders of the current cycle, unknown painters included.
pub fn offender_summary(tally: &OffenderTally) -> String {
    if tally.is_empty() {
        return "No error pixels found, or their painters could not be identified.".to_string();
    }

    let mut rows: Vec<(String, String, Option<String>, u64)> = tally
        .users
        .iter()
        .map(|(id, record)| {
            (
                id.to_string(),
                record.info.display_name().to_string(),
                record.info.alliance().map(str::to_string),
                record.count,
            )
        })
        .collect();
    if tally.unknown > 0 {
        rows.push(("unknown".to_string(), "Unknown".to_string(), None, tally.unknown));
    }
    rows.sort_by(|a, b| b.3.cmp(&a.3).then_with(|| a.0.cmp(&b.0)));

    let mut text = format!("Caught {} offenders:\n\n", rows.len());
    for (rank, (id, name, alliance, count)) in rows.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} (ID: {}) - {} error pixels",
            rank + 1,
            name,
            id,
            count
        ));
        if let Some(alliance) = alliance {
            text.push_str(&format!(" [alliance: {}]", alliance));
        }
        text.push('\n');
    }
    text
}

/// Lifetime leaderboard, already ranked.
pub fn leaderboard_text(entries: &[(UserId, UserErrorRecord)]) -> String {
    if entries.is_empty() {
        return "No offender statistics yet.".to_string();
    }

    let mut text = String::from("**Offender Leaderboard**\n");
    for (rank, (id, record)) in entries.iter().enumerate() {
        let name = record.info.display_name();
        match record.info.alliance() {
            Some(alliance) => text.push_str(&format!(
                "{:2}. {} (ID: {}) - {} - {} error pixels\n",
                rank + 1,
                name,
                id,
                alliance,
                record.count
            )),
            None => text.push_str(&format!(
                "{:2}. {} (ID: {}) - {} error pixels\n",
                rank + 1,
                name,
                id,
                record.count
            )),
        }
    }
    text
}

/// Markdown table of the current error pixels.
pub fn error_pixel_table(pixels: &ErrorPixelSet) -> String {
    if pixels.is_empty() {
        return "No error pixels right now.".to_string();
    }

    let mut text = String::from("**Error Pixel Coordinates**\n| PxX | PxY |\n|----|----|\n");
    for coordinate in pixels.sorted() {
        text.push_str(&format!("| {} | {} |\n", coordinate.x, coordinate.y));
    }
    text
}

pub fn pardon_confirmation(id: &UserId, record: &UserErrorRecord) -> String {
    format!("Pardoned user {} {}", id, record.info.display_name())
}

pub fn pardon_not_found(id: &UserId) -> String {
    format!("No offender record for user {}", id)
}

/// Split `text` into chunks of at most `limit` characters, preferring line
/// boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(limit).map(|piece| piece.iter().collect::<String>()));
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
