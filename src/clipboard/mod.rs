//! Clipboard abstraction layer
//!
//! The history engine never talks to the OS clipboard directly. It needs a
//! monotonically increasing change counter, the current text, and a way to
//! write text back; anything implementing [`ClipboardSource`] will do.
//! [`SystemClipboard`] is the `arboard`-backed implementation used by the
//! binary and [`MemoryClipboard`] is a headless one for tests and tooling.

use thiserror::Error;

pub mod classify;
pub mod memory;
pub mod monitor;
pub mod system;

pub use classify::{classify, ContentType};
pub use memory::MemoryClipboard;
pub use monitor::{ChangeDetector, MIN_POLL_PERIOD};
pub use system::SystemClipboard;

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// No content available
    #[error("No clipboard content available")]
    NoContent,
}

/// Minimal clipboard surface required by the history engine
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardSource: Send + Sync {
    /// Counter that changes whenever the clipboard content changes
    fn change_count(&self) -> Result<u64, ClipboardError>;

    /// Current clipboard text, if the clipboard holds any
    fn read_text(&self) -> Result<Option<String>, ClipboardError>;

    /// Replace the clipboard content with `text`
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Provider name
    fn name(&self) -> &str;
}
