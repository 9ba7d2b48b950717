//! In-process clipboard used by tests and headless tooling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ClipboardError, ClipboardSource};

#[derive(Debug, Default)]
struct MemoryState {
    text: Option<String>,
    change_count: u64,
}

/// Clipboard kept entirely in memory
///
/// Every [`MemoryClipboard::set_text`] or `write_text` bumps the change
/// counter by one, the same way a system pasteboard does.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content and bump the counter
    pub fn set_text(&self, text: impl Into<String>) {
        let mut state = self.lock();
        state.text = Some(text.into());
        state.change_count += 1;
    }

    /// Empty the clipboard and bump the counter
    pub fn clear(&self) {
        let mut state = self.lock();
        state.text = None;
        state.change_count += 1;
    }

    /// Make every subsequent read fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_failing(&self) -> Result<(), ClipboardError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClipboardError::Platform("simulated read failure".to_string()));
        }
        Ok(())
    }
}

impl ClipboardSource for MemoryClipboard {
    fn change_count(&self) -> Result<u64, ClipboardError> {
        self.check_failing()?;
        Ok(self.lock().change_count)
    }

    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        self.check_failing()?;
        Ok(self.lock().text.clone())
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.set_text(text);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
