//! Application context wiring the history components together
//!
//! [`AppContext`] is built once at startup and passed explicitly to whatever
//! drives the app (the CLI here, a UI shell elsewhere). It owns the settings,
//! the store and its observer, the clipboard detector and the Markdown
//! converter, and exposes the user-level actions on top of them.
//!
//! Detector callbacks never touch storage directly. They push captures onto
//! an unbounded channel drained by a single writer task, so saves apply in
//! capture order and a slow write never delays the next clipboard poll.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clipboard::{classify, ChangeDetector, ClipboardSource, ContentType};
use crate::config::Config;
use crate::history::{ChangeObserver, ClipboardItem, HistoryStore, StorageError, Subscription};
use crate::markdown::MarkdownConverter;
use crate::{Error, Result};

/// Content captured by the detector, waiting to be saved
#[derive(Debug)]
struct Capture {
    content: String,
    content_type: ContentType,
}

/// Explicit application context
pub struct AppContext {
    settings: Arc<RwLock<Config>>,
    store: Arc<HistoryStore>,
    observer: ChangeObserver,
    detector: ChangeDetector,
    clipboard: Arc<dyn ClipboardSource>,
    converter: MarkdownConverter,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Open the configured database and build the context around it.
    ///
    /// Uses the HTML parser for rich-text conversion. Must be called from
    /// within a Tokio runtime.
    pub fn open(settings: Config, clipboard: Arc<dyn ClipboardSource>) -> Result<Self> {
        let store = HistoryStore::open(&settings.database_path, settings.store_options())?;
        let converter = MarkdownConverter::html()?;
        Ok(Self::new(settings, Arc::new(store), clipboard, converter))
    }

    /// Build a context from already constructed parts.
    ///
    /// Spawns the writer task, so this must be called from within a Tokio
    /// runtime. The detector is left stopped until [`AppContext::start`].
    pub fn new(
        settings: Config,
        store: Arc<HistoryStore>,
        clipboard: Arc<dyn ClipboardSource>,
        converter: MarkdownConverter,
    ) -> Self {
        store.set_options(settings.store_options());

        let settings = Arc::new(RwLock::new(settings));
        let (captures, queue) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(
            queue,
            Arc::clone(&store),
            Arc::clone(&settings),
        ));

        let detector = ChangeDetector::new(Arc::clone(&clipboard));
        detector.set_callback(move |content, content_type| {
            if captures
                .send(Capture {
                    content,
                    content_type,
                })
                .is_err()
            {
                debug!("Dropping clipboard capture, writer has stopped");
            }
        });

        Self {
            observer: ChangeObserver::new(Arc::clone(&store)),
            settings,
            store,
            detector,
            clipboard,
            converter,
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Start clipboard monitoring at the configured interval
    pub fn start(&self) {
        self.detector.start(self.settings().polling_duration());
    }

    /// Stop monitoring and the writer task. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.detector.stop();
        if let Some(writer) = self.writer_handle().take() {
            writer.abort();
            info!("History writer stopped");
        }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn converter(&self) -> &MarkdownConverter {
        &self.converter
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> Config {
        read_settings(&self.settings).clone()
    }

    /// Replace the settings and apply them to the running components
    pub async fn apply_settings(&self, settings: Config) -> Result<()> {
        settings.validate_config()?;

        let max_items = settings.max_items;
        self.store.set_options(settings.store_options());
        match self.settings.write() {
            Ok(mut slot) => *slot = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }

        self.update_monitoring_state();
        let evicted = self.store.enforce_capacity(max_items).await?;
        if evicted > 0 {
            info!("Evicted {} items after lowering max_items to {}", evicted, max_items);
        }
        Ok(())
    }

    /// Restart polling with the current interval if monitoring is active
    pub fn update_monitoring_state(&self) {
        if self.detector.is_running() {
            self.detector.restart(self.settings().polling_duration());
        }
    }

    /// Pin whatever text the clipboard holds now.
    ///
    /// Returns `None` when the clipboard has no usable text.
    pub async fn pin_current_clipboard(&self) -> Result<Option<ClipboardItem>> {
        match self.clipboard.read_text()? {
            Some(text) if !text.trim().is_empty() => self.pin_text(&text).await.map(Some),
            _ => {
                debug!("Nothing to pin, clipboard holds no text");
                Ok(None)
            }
        }
    }

    /// Pin `text`, classifying it first
    pub async fn pin_text(&self, text: &str) -> Result<ClipboardItem> {
        let item = self.store.pin(text, classify(text)).await?;
        self.enforce_capacity().await?;
        info!("Pinned clipboard item {}", item.id);
        Ok(item)
    }

    /// Save captured content if automatic monitoring is enabled.
    ///
    /// Returns `None` when monitoring is disabled and nothing was written.
    pub async fn auto_save(
        &self,
        content: &str,
        content_type: ContentType,
    ) -> Result<Option<ClipboardItem>> {
        auto_save(&self.store, &self.settings, content, content_type)
            .await
            .map_err(Error::from)
    }

    /// Write `item` back to the clipboard
    pub fn copy_to_clipboard(&self, item: &ClipboardItem) -> Result<()> {
        self.clipboard.write_text(&item.content)?;
        debug!("Copied item {} to clipboard", item.id);
        Ok(())
    }

    /// Write the item with the given id back to the clipboard
    pub async fn copy_by_id(&self, id: i64) -> Result<ClipboardItem> {
        let item = self.item(id).await?;
        self.copy_to_clipboard(&item)?;
        Ok(item)
    }

    /// Copy `item` as plain text.
    ///
    /// Text and URL items carry no markup, so their content is written
    /// unchanged.
    pub fn copy_as_plain_text(&self, item: &ClipboardItem) -> Result<String> {
        let plain = match item.content_type {
            ContentType::Text | ContentType::Url => item.content.clone(),
        };
        self.clipboard.write_text(&plain)?;
        debug!("Copied item {} as plain text", item.id);
        Ok(plain)
    }

    /// Copy `item` as Markdown.
    ///
    /// Plain text is already valid Markdown, so text and URL items are written
    /// unchanged. Use [`AppContext::converter`] to convert rich text explicitly.
    pub fn copy_as_markdown(&self, item: &ClipboardItem) -> Result<String> {
        let markdown = match item.content_type {
            ContentType::Text | ContentType::Url => item.content.clone(),
        };
        self.clipboard.write_text(&markdown)?;
        debug!("Copied item {} as Markdown", item.id);
        Ok(markdown)
    }

    pub async fn delete_item(&self, id: i64) -> Result<()> {
        if !self.store.delete_by_id(id).await? {
            return Err(StorageError::NotFound(id).into());
        }
        info!("Deleted clipboard item {}", id);
        Ok(())
    }

    /// Remove every item; returns how many were removed
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self.store.delete_all().await?;
        info!("Cleared {} clipboard items", removed);
        Ok(removed)
    }

    /// Remove every pinned item
    pub async fn clear_pinned(&self) -> Result<usize> {
        let removed = self.store.delete_all_pinned().await?;
        info!("Cleared {} pinned clipboard items", removed);
        Ok(removed)
    }

    /// Items matching `query`, up to `max_items`. An empty query lists all.
    pub async fn search(&self, query: &str) -> Result<Vec<ClipboardItem>> {
        let limit = self.settings().max_items;
        let items = if query.is_empty() {
            self.store.fetch_all(limit).await?
        } else {
            self.store.search(query, limit).await?
        };
        Ok(items)
    }

    /// Live snapshots of the newest `max_items` rows
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Vec<ClipboardItem>) + Send + Sync + 'static,
    {
        self.observer.subscribe(self.settings().max_items, callback)
    }

    async fn item(&self, id: i64) -> Result<ClipboardItem> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id).into())
    }

    async fn enforce_capacity(&self) -> Result<()> {
        let max_items = self.settings().max_items;
        let evicted = self.store.enforce_capacity(max_items).await?;
        if evicted > 0 {
            debug!("Evicted {} items over capacity {}", evicted, max_items);
        }
        Ok(())
    }

    fn writer_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_settings(settings: &RwLock<Config>) -> std::sync::RwLockReadGuard<'_, Config> {
    match settings.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn auto_save(
    store: &HistoryStore,
    settings: &RwLock<Config>,
    content: &str,
    content_type: ContentType,
) -> std::result::Result<Option<ClipboardItem>, StorageError> {
    let (enabled, max_items) = {
        let settings = read_settings(settings);
        (settings.auto_monitor_enabled, settings.max_items)
    };
    if !enabled {
        return Ok(None);
    }

    let item = store.save(content, content_type).await?;
    store.enforce_capacity(max_items).await?;
    debug!("Auto-saved clipboard item {}", item.id);
    Ok(Some(item))
}

async fn run_writer(
    mut queue: mpsc::UnboundedReceiver<Capture>,
    store: Arc<HistoryStore>,
    settings: Arc<RwLock<Config>>,
) {
    debug!("History writer started");
    while let Some(capture) = queue.recv().await {
        match auto_save(&store, &settings, &capture.content, capture.content_type).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!("Auto-save disabled, ignoring capture"),
            Err(e) => error!("Auto-save failed: {}", e),
        }
    }
    warn!("Clipboard capture channel closed");
}
