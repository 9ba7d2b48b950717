//! System clipboard implementation using arboard
//!
//! arboard has no portable change counter, so one is synthesized: every
//! `change_count` call hashes the current text and bumps the counter when the
//! digest differs from the previous observation.

use std::sync::Mutex;

use arboard::Clipboard;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{ClipboardError, ClipboardSource};

struct SystemState {
    clipboard: Clipboard,
    last_digest: Option<[u8; 32]>,
    change_count: u64,
}

/// OS clipboard provider
pub struct SystemClipboard {
    state: Mutex<SystemState>,
}

impl SystemClipboard {
    /// Open the system clipboard
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard = Clipboard::new().map_err(|e| ClipboardError::Platform(e.to_string()))?;
        Ok(Self {
            state: Mutex::new(SystemState {
                clipboard,
                last_digest: None,
                change_count: 0,
            }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SystemState>, ClipboardError> {
        self.state
            .lock()
            .map_err(|e| ClipboardError::Platform(format!("clipboard lock poisoned: {}", e)))
    }
}

fn get_text(clipboard: &mut Clipboard) -> Result<Option<String>, ClipboardError> {
    match clipboard.get_text() {
        Ok(text) => Ok(Some(text)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(e) => Err(ClipboardError::Platform(e.to_string())),
    }
}

impl ClipboardSource for SystemClipboard {
    fn change_count(&self) -> Result<u64, ClipboardError> {
        let mut state = self.lock()?;
        let text = get_text(&mut state.clipboard)?;
        let digest: Option<[u8; 32]> = text.map(|t| Sha256::digest(t.as_bytes()).into());

        if digest != state.last_digest {
            state.last_digest = digest;
            state.change_count += 1;
            debug!("System clipboard changed (count {})", state.change_count);
        }

        Ok(state.change_count)
    }

    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        let mut state = self.lock()?;
        get_text(&mut state.clipboard)
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut state = self.lock()?;
        state
            .clipboard
            .set_text(text.to_owned())
            .map_err(|e| ClipboardError::Platform(e.to_string()))
    }

    fn name(&self) -> &str {
        "system"
    }
}
