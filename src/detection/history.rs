use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

/// Samples kept per camera
pub const HISTORY_CAPACITY: usize = 10;

/// One scored cycle as remembered for temporal persistence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub primary_confidence: f64,
    pub total_confidence: f64,
}

/// Per-camera bounded FIFO of recent confidence samples.
///
/// One mutex covers every camera's buffer; all operations are short and
/// never perform I/O while holding it.
pub struct FrameHistoryStore {
    cameras: Mutex<HashMap<String, VecDeque<FrameHistoryEntry>>>,
    capacity: usize,
    stats: FrameHistoryStats,
}

/// Counters for history activity
#[derive(Debug)]
pub struct FrameHistoryStats {
    pub entries_appended: AtomicU64,
    pub entries_evicted: AtomicU64,
    pub timestamps_clamped: AtomicU64,
}

/// Snapshot of history counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHistoryStatsSnapshot {
    pub entries_appended: u64,
    pub entries_evicted: u64,
    pub timestamps_clamped: u64,
}

impl FrameHistoryStats {
    fn new() -> Self {
        Self {
            entries_appended: AtomicU64::new(0),
            entries_evicted: AtomicU64::new(0),
            timestamps_clamped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> FrameHistoryStatsSnapshot {
        FrameHistoryStatsSnapshot {
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            entries_evicted: self.entries_evicted.load(Ordering::Relaxed),
            timestamps_clamped: self.timestamps_clamped.load(Ordering::Relaxed),
        }
    }
}

impl FrameHistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("Frame history capacity must be greater than 0");
        }

        Self {
            cameras: Mutex::new(HashMap::new()),
            capacity,
            stats: FrameHistoryStats::new(),
        }
    }

    /// Append an entry, evicting the oldest once over capacity.
    ///
    /// Timestamps older than the newest stored entry are clamped forward so
    /// each buffer stays in non-decreasing order.
    pub fn append(&self, camera_id: &str, mut entry: FrameHistoryEntry) {
        let requested = entry.timestamp;
        let (clamped_to, len) = {
            let mut cameras = self.cameras.lock();
            let history = cameras
                .entry(camera_id.to_string())
                .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));

            let clamped_to = match history.back() {
                Some(last) if entry.timestamp < last.timestamp => {
                    entry.timestamp = last.timestamp;
                    self.stats.timestamps_clamped.fetch_add(1, Ordering::Relaxed);
                    Some(last.timestamp)
                }
                _ => None,
            };

            history.push_back(entry);
            self.stats.entries_appended.fetch_add(1, Ordering::Relaxed);

            while history.len() > self.capacity {
                history.pop_front();
                self.stats.entries_evicted.fetch_add(1, Ordering::Relaxed);
            }

            (clamped_to, history.len())
        };

        if let Some(last) = clamped_to {
            warn!(
                "Out-of-order history entry for camera '{}' ({} < {}), clamping",
                camera_id, requested, last
            );
        }
        trace!(
            "Camera '{}' history: {} entries (primary {:.1})",
            camera_id,
            len,
            entry.primary_confidence
        );
    }

    /// Copy of a camera's history, oldest first
    pub fn snapshot(&self, camera_id: &str) -> Vec<FrameHistoryEntry> {
        self.cameras
            .lock()
            .get(camera_id)
            .map(|history| history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, camera_id: &str) -> usize {
        self.cameras.lock().get(camera_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, camera_id: &str) -> bool {
        self.len(camera_id) == 0
    }

    /// Drop one camera's history
    pub fn clear_camera(&self, camera_id: &str) {
        self.cameras.lock().remove(camera_id);
    }

    pub fn clear(&self) {
        self.cameras.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> FrameHistoryStatsSnapshot {
        self.stats.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.cameras.is_locked()
    }
}

impl Default for FrameHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn entry(at: DateTime<Utc>, primary: f64) -> FrameHistoryEntry {
        FrameHistoryEntry {
            timestamp: at,
            primary_confidence: primary,
            total_confidence: primary,
        }
    }

    #[test]
    fn test_history_starts_empty() {
        let store = FrameHistoryStore::new();
        assert!(store.is_empty("box"));
        assert!(store.snapshot("box").is_empty());
        assert_eq!(store.capacity(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let store = FrameHistoryStore::new();
        let start = Utc::now();

        for i in 0..15 {
            store.append("box", entry(start + Duration::seconds(i), i as f64));
        }

        let history = store.snapshot("box");
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.first().unwrap().primary_confidence, 5.0);
        assert_eq!(history.last().unwrap().primary_confidence, 14.0);

        let stats = store.stats();
        assert_eq!(stats.entries_appended, 15);
        assert_eq!(stats.entries_evicted, 5);
    }

    #[test]
    fn test_cameras_are_independent() {
        let store = FrameHistoryStore::with_capacity(3);
        let now = Utc::now();

        store.append("a", entry(now, 10.0));
        store.append("b", entry(now, 20.0));
        store.append("b", entry(now, 30.0));

        assert_eq!(store.len("a"), 1);
        assert_eq!(store.len("b"), 2);

        store.clear_camera("b");
        assert!(store.is_empty("b"));
        assert_eq!(store.len("a"), 1);
    }

    #[test]
    fn test_out_of_order_timestamp_is_clamped() {
        let store = FrameHistoryStore::new();
        let now = Utc::now();

        store.append("box", entry(now, 50.0));
        store.append("box", entry(now - Duration::seconds(30), 60.0));

        let history = store.snapshot("box");
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[1].timestamp, now);
        assert_eq!(store.stats().timestamps_clamped, 1);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        let _ = FrameHistoryStore::with_capacity(0);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let store = Arc::new(FrameHistoryStore::new());
        let mut handles = Vec::new();

        for task in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store.append(&format!("cam{}", task % 2), entry(Utc::now(), i as f64));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len("cam0"), HISTORY_CAPACITY);
        assert_eq!(store.len("cam1"), HISTORY_CAPACITY);
        assert_eq!(store.stats().entries_appended, 100);
    }

    #[test]
    fn test_append_logs_outside_lock() {
        use std::sync::atomic::AtomicUsize;
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        struct HeldLockCounter {
            store: Arc<FrameHistoryStore>,
            events: Arc<AtomicUsize>,
            under_lock: Arc<AtomicUsize>,
        }

        impl<S: tracing::Subscriber> Layer<S> for HeldLockCounter {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.events.fetch_add(1, Ordering::SeqCst);
                if self.store.is_locked() {
                    self.under_lock.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let store = Arc::new(FrameHistoryStore::new());
        let events = Arc::new(AtomicUsize::new(0));
        let under_lock = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(HeldLockCounter {
            store: Arc::clone(&store),
            events: Arc::clone(&events),
            under_lock: Arc::clone(&under_lock),
        });

        let start = Utc::now();
        tracing::subscriber::with_default(subscriber, || {
            store.append("box", entry(start, 10.0));
            // Out of order: clamped with a warning
            store.append("box", entry(start - Duration::seconds(5), 20.0));
        });

        assert!(events.load(Ordering::SeqCst) >= 3);
        assert_eq!(under_lock.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot("box")[1].timestamp, start);
    }
}
