//! Clipboard history model and persistence
//!
//! Every distinct piece of content maps to exactly one [`ClipboardItem`],
//! keyed by the SHA-256 of its text. The [`HistoryStore`] owns the rows and
//! the [`ChangeObserver`] turns its change signal into live snapshots.

pub mod database;
pub mod observer;

pub use database::{HistoryStore, StorageError, StoreOptions};
pub use observer::{ChangeObserver, Subscription};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clipboard::ContentType;

/// Maximum preview length in characters, before the ellipsis
pub const PREVIEW_MAX_LEN: usize = 100;

/// Fixed-width timestamp layout used in the database
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A persisted clipboard entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardItem {
    /// Row identifier assigned on insert
    pub id: i64,
    /// The full clipboard text
    pub content: String,
    /// Classification recorded when the row was created
    pub content_type: ContentType,
    /// Single-line summary derived from `content`
    pub preview: String,
    /// Whether the user pinned this entry
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of `content`
    pub content_hash: String,
}

impl ClipboardItem {
    /// Compute the dedup key for `content`
    pub fn hash_of(content: &str) -> String {
        hex::encode(Sha256::digest(content.as_bytes()))
    }

    /// Build the single-line preview for `content`.
    ///
    /// All whitespace runs (newlines included) collapse to one space; the
    /// result is cut to [`PREVIEW_MAX_LEN`] characters with `...` appended
    /// when something was cut.
    pub fn preview_of(content: &str) -> String {
        let single_line = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if single_line.chars().count() <= PREVIEW_MAX_LEN {
            return single_line;
        }
        let mut truncated: String = single_line.chars().take(PREVIEW_MAX_LEN).collect();
        truncated.push_str("...");
        truncated
    }

    /// Case-insensitive match against content and preview
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.content.to_lowercase().contains(&query) || self.preview.to_lowercase().contains(&query)
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = ClipboardItem::hash_of("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(hash, ClipboardItem::hash_of("hello "));
    }

    #[test]
    fn test_preview_collapses_whitespace() {
        assert_eq!(
            ClipboardItem::preview_of("  first line\n\n   second\tline  \n"),
            "first line second line"
        );
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        let long = "é".repeat(150);
        let preview = ClipboardItem::preview_of(&long);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_LEN + 3);
        assert!(preview.ends_with("..."));

        let exact = "a".repeat(PREVIEW_MAX_LEN);
        assert_eq!(ClipboardItem::preview_of(&exact), exact);
    }

    #[test]
    fn test_timestamp_round_trip_keeps_microseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::microseconds(42);
        let raw = format_timestamp(&ts);
        assert_eq!(raw, "2024-03-09 07:05:01.000042");
        assert_eq!(parse_timestamp(&raw), Some(ts));
        assert!(parse_timestamp("not a date").is_none());
    }
}
