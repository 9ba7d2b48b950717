//! # ClipStash
//!
//! Clipboard history engine: detects new clipboard content, keeps a
//! deduplicated and size-bounded history in SQLite, pushes live snapshots to
//! observers, and converts rich text to Markdown.
//!
//! The pieces, leaf first:
//!
//! - [`clipboard::classify`] labels text as plain text or a URL
//! - [`markdown`] turns styled runs (from a [`markdown::RichTextParser`]) into Markdown
//! - [`history::HistoryStore`] is the content-addressed store
//! - [`history::ChangeObserver`] delivers snapshots after each write
//! - [`clipboard::ChangeDetector`] polls a [`clipboard::ClipboardSource`]
//! - [`engine::AppContext`] ties them together for an application

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod engine;
pub mod history;
pub mod markdown;

pub use config::Config;
pub use engine::AppContext;

/// Result type alias for ClipStash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipStash operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// History storage error
    #[error("Storage error: {0}")]
    Storage(#[from] history::StorageError),

    /// Rich-text parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] markdown::ParseError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
