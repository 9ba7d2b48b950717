//! Polling clipboard change detector
//!
//! Clipboards expose a change counter but no push notification, so the
//! detector samples the counter on a fixed interval. The cheap path (counter
//! unchanged) reads nothing else. A changed counter is recorded before the
//! callback runs, so a tick can never redeliver a counter value that an
//! earlier tick already handled.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{classify, ClipboardSource, ContentType};

/// Shortest polling period the detector accepts
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Callback invoked with newly captured content and its classification
pub type ContentCallback = Arc<dyn Fn(String, ContentType) + Send + Sync>;

#[derive(Debug, Default)]
struct DetectorState {
    last_seen: u64,
    current_content: Option<String>,
}

struct Poller {
    source: Arc<dyn ClipboardSource>,
    state: Mutex<DetectorState>,
    callback: RwLock<Option<ContentCallback>>,
}

impl Poller {
    fn state(&self) -> MutexGuard<'_, DetectorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn callback(&self) -> Option<ContentCallback> {
        match self.callback.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_baseline(&self) {
        let count = match self.source.change_count() {
            Ok(count) => count,
            Err(e) => {
                debug!("Failed to read baseline change count: {}", e);
                0
            }
        };
        let text = self.source.read_text().ok().flatten();

        let mut state = self.state();
        state.last_seen = count;
        state.current_content = text;
    }

    fn tick(&self) -> bool {
        let count = match self.source.change_count() {
            Ok(count) => count,
            Err(e) => {
                debug!("Clipboard change count unavailable: {}", e);
                return false;
            }
        };

        {
            let mut state = self.state();
            if count == state.last_seen {
                return false;
            }
            state.last_seen = count;
        }

        let text = match self.source.read_text() {
            Ok(Some(text)) => text,
            Ok(None) => return false,
            Err(e) => {
                debug!("Clipboard read failed after change {}: {}", count, e);
                return false;
            }
        };

        if text.trim().is_empty() {
            return false;
        }

        self.state().current_content = Some(text.clone());

        let content_type = classify(&text);
        debug!(
            "Clipboard change {} captured ({} chars, {})",
            count,
            text.chars().count(),
            content_type
        );

        if let Some(callback) = self.callback() {
            callback(text, content_type);
        }

        true
    }
}

/// Periodic clipboard change detector
pub struct ChangeDetector {
    poller: Arc<Poller>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeDetector {
    /// Create a stopped detector reading from `source`
    pub fn new(source: Arc<dyn ClipboardSource>) -> Self {
        Self {
            poller: Arc::new(Poller {
                source,
                state: Mutex::new(DetectorState::default()),
                callback: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Register the callback for new content, replacing any previous one
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(String, ContentType) + Send + Sync + 'static,
    {
        let mut slot = match self.poller.callback.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(callback));
    }

    /// Start polling every `period`.
    ///
    /// Periods below [`MIN_POLL_PERIOD`] are raised to it. Does nothing if
    /// already running. Must be called from within a Tokio runtime.
    pub fn start(&self, period: Duration) {
        let mut task = self.task();
        if task.is_some() {
            return;
        }

        let period = if period < MIN_POLL_PERIOD {
            warn!(
                "Polling period {:?} is below {:?}, using the minimum",
                period, MIN_POLL_PERIOD
            );
            MIN_POLL_PERIOD
        } else {
            period
        };

        self.poller.record_baseline();

        let poller = Arc::clone(&self.poller);
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the baseline already covers it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                poller.tick();
            }
        }));

        info!("Clipboard monitoring started ({:?} interval)", period);
    }

    /// Stop polling and clear detector state. Safe to call repeatedly.
    pub fn stop(&self) {
        let handle = self.task().take();
        if let Some(handle) = handle {
            handle.abort();
            *self.poller.state() = DetectorState::default();
            info!("Clipboard monitoring stopped");
        }
    }

    /// Stop, then start again with a new period
    pub fn restart(&self, period: Duration) {
        self.stop();
        self.start(period);
    }

    /// Run one detection pass immediately.
    ///
    /// Returns true when the callback was invoked. Hosts that drive their own
    /// scheduler can call this instead of [`ChangeDetector::start`].
    pub fn poll(&self) -> bool {
        self.poller.tick()
    }

    pub fn is_running(&self) -> bool {
        self.task().is_some()
    }

    /// Most recently observed non-empty clipboard text
    pub fn current_content(&self) -> Option<String> {
        self.poller.state().current_content.clone()
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardError, MockClipboardSource};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source replaying a scripted counter sequence with fixed text
    struct ScriptedSource {
        counts: Mutex<VecDeque<u64>>,
        text: Option<String>,
    }

    impl ScriptedSource {
        fn new(counts: &[u64], text: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                counts: Mutex::new(counts.iter().copied().collect()),
                text: text.map(str::to_string),
            })
        }
    }

    impl ClipboardSource for ScriptedSource {
        fn change_count(&self) -> Result<u64, ClipboardError> {
            let mut counts = self.counts.lock().unwrap();
            if counts.len() > 1 {
                Ok(counts.pop_front().unwrap())
            } else {
                counts.front().copied().ok_or(ClipboardError::NoContent)
            }
        }

        fn read_text(&self) -> Result<Option<String>, ClipboardError> {
            Ok(self.text.clone())
        }

        fn write_text(&self, _text: &str) -> Result<(), ClipboardError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn counting_detector(source: Arc<dyn ClipboardSource>) -> (ChangeDetector, Arc<AtomicUsize>) {
        let detector = ChangeDetector::new(source);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        detector.set_callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (detector, calls)
    }

    #[tokio::test]
    async fn test_one_callback_per_counter_change() {
        let source = ScriptedSource::new(&[5, 5, 5, 6, 6, 7], Some("copied"));
        let (detector, calls) = counting_detector(source);

        // Baseline consumes the first 5; the timer never fires within the test.
        detector.start(Duration::from_secs(3600));
        for _ in 0..5 {
            detector.poll();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        detector.stop();
    }

    #[tokio::test]
    async fn test_unchanged_counter_never_fires() {
        let source = ScriptedSource::new(&[3, 3, 3, 3], Some("copied"));
        let (detector, calls) = counting_detector(source);

        detector.start(Duration::from_secs(3600));
        for _ in 0..3 {
            assert!(!detector.poll());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_and_blank_text_suppressed() {
        for text in [None, Some(""), Some("  \n\t ")] {
            let source = ScriptedSource::new(&[1, 2], text);
            let (detector, calls) = counting_detector(source);
            detector.start(Duration::from_secs(3600));
            assert!(!detector.poll());
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_read_failure_is_no_change() {
        let mut source = MockClipboardSource::new();
        source
            .expect_change_count()
            .returning(|| Err(ClipboardError::Platform("boom".to_string())));
        source.expect_read_text().never();

        let (detector, calls) = counting_detector(Arc::new(source));
        assert!(!detector.poll());
        assert!(!detector.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_text_read_failure_still_consumes_counter() {
        let mut source = MockClipboardSource::new();
        source.expect_change_count().returning(|| Ok(9));
        source
            .expect_read_text()
            .times(1)
            .returning(|| Err(ClipboardError::NoContent));

        let (detector, calls) = counting_detector(Arc::new(source));
        assert!(!detector.poll());
        // Counter 9 is already recorded, so the text is not read again.
        assert!(!detector.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_receives_classified_content() {
        let source = ScriptedSource::new(&[1], Some("  https://example.com/x "));
        let detector = ChangeDetector::new(source);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        detector.set_callback(move |content, content_type| {
            sink.lock().unwrap().push((content, content_type));
        });

        assert!(detector.poll());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, ContentType::Url);
        assert_eq!(detector.current_content().as_deref(), Some("  https://example.com/x "));
    }

    #[tokio::test]
    async fn test_start_stop_restart_idempotent() {
        let source = ScriptedSource::new(&[1], Some("x"));
        let detector = ChangeDetector::new(source);

        assert!(!detector.is_running());
        detector.start(Duration::from_millis(100));
        detector.start(Duration::from_millis(100));
        assert!(detector.is_running());

        detector.stop();
        detector.stop();
        assert!(!detector.is_running());

        detector.restart(Duration::from_millis(50));
        assert!(detector.is_running());
        detector.stop();
    }
}
