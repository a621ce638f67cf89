use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::db::{AnalyticsEvent, AnalyticsStore};

/// Events buffered before a forced flush
const BATCH_SIZE: usize = 100;
/// Periodic flush interval for partially filled batches
const FLUSH_INTERVAL: Duration = Duration::from_secs(30);
/// Queue capacity; events beyond this are dropped, not blocked on
const CHANNEL_CAPACITY: usize = 1024;
/// Delay before the single retry of a failed batch insert
const RETRY_DELAY: Duration = Duration::from_millis(500);

const EVENT_VERSION: &str = "1.0.0";

/// Fire-and-forget analytics pipeline
///
/// `track_event` enqueues onto a bounded channel and returns immediately; a
/// background task batch-inserts on size or timer. Analytics must never slow
/// down or fail a recommendation, so a full queue drops the event with a log
/// and a failed batch is retried once, then dropped.
#[derive(Clone)]
pub struct AnalyticsService {
    event_tx: mpsc::Sender<AnalyticsEvent>,
}

/// Handle for gracefully shutting down the analytics writer
pub struct AnalyticsWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl AnalyticsWriterHandle {
    /// Signals the writer to flush everything buffered and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Analytics writer shutdown signal sent");
    }
}

impl AnalyticsService {
    /// Creates the service and spawns its background writer task
    pub fn new(store: Arc<dyn AnalyticsStore>) -> (Self, AnalyticsWriterHandle) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::writer_task(store, event_rx, shutdown_rx).await;
        });

        (
            Self { event_tx },
            AnalyticsWriterHandle { shutdown_tx },
        )
    }

    /// Enqueues one event; never blocks and never fails the caller
    pub fn track_event(&self, mut event: AnalyticsEvent) {
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }
        if event.version.is_none() {
            event.version = Some(EVENT_VERSION.to_string());
        }

        if let Err(e) = self.event_tx.try_send(event) {
            tracing::warn!(error = %e, "Analytics queue full, dropping event");
        }
    }

    /// Background task batching events into the store
    async fn writer_task(
        store: Arc<dyn AnalyticsStore>,
        mut event_rx: mpsc::Receiver<AnalyticsEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Analytics writer task started");

        let mut batch: Vec<AnalyticsEvent> = Vec::with_capacity(BATCH_SIZE);
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        // The first tick completes immediately; consume it so the timer
        // branch only fires after a full interval
        interval.tick().await;

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    batch.push(event);
                    if batch.len() >= BATCH_SIZE {
                        Self::flush(&store, &mut batch).await;
                    }
                }
                _ = interval.tick() => {
                    Self::flush(&store, &mut batch).await;
                }
                _ = shutdown_rx.recv() => {
                    // Drain whatever is still queued before the final flush
                    while let Ok(event) = event_rx.try_recv() {
                        batch.push(event);
                    }
                    Self::flush(&store, &mut batch).await;
                    tracing::info!("Analytics writer task stopped");
                    break;
                }
            }
        }
    }

    /// Inserts the batch, retrying once before dropping it
    async fn flush(store: &Arc<dyn AnalyticsStore>, batch: &mut Vec<AnalyticsEvent>) {
        if batch.is_empty() {
            return;
        }

        let events = std::mem::take(batch);

        if let Err(first) = store.insert_events(&events).await {
            tracing::warn!(
                count = events.len(),
                error = %first,
                "Analytics batch insert failed, retrying"
            );
            tokio::time::sleep(RETRY_DELAY).await;

            if let Err(second) = store.insert_events(&events).await {
                tracing::error!(
                    count = events.len(),
                    error = %second,
                    "Analytics batch dropped after retry"
                );
                return;
            }
        }

        tracing::debug!(count = events.len(), "Flushed analytics events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryAnalyticsStore {
        events: Mutex<Vec<AnalyticsEvent>>,
        fail_first: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalyticsStore for MemoryAnalyticsStore {
        async fn insert_events(&self, events: &[AnalyticsEvent]) -> AppResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first.load(Ordering::SeqCst) {
                return Err(AppError::Internal("insert failed".to_string()));
            }
            self.events.lock().unwrap().extend_from_slice(events);
            Ok(())
        }
    }

    fn event(event_type: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type: event_type.to_string(),
            cache_hit: false,
            response_time_ms: 12,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_events() {
        let store = Arc::new(MemoryAnalyticsStore::default());
        let (service, handle) = AnalyticsService::new(store.clone());

        service.track_event(event("template_recommendation_served"));
        service.track_event(event("layer_variations_requested"));

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let events = store.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        // Defaults were stamped at enqueue time
        assert!(events[0].timestamp.is_some());
        assert_eq!(events[0].version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let store = Arc::new(MemoryAnalyticsStore::default());
        let (service, _handle) = AnalyticsService::new(store.clone());

        for _ in 0..BATCH_SIZE {
            service.track_event(event("template_recommendation_served"));
        }

        // Size-triggered flush happens without any shutdown signal
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.events.lock().unwrap().len(), BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_once() {
        let store = Arc::new(MemoryAnalyticsStore::default());
        store.fail_first.store(1, Ordering::SeqCst);
        let (service, handle) = AnalyticsService::new(store.clone());

        service.track_event(event("template_recommendation_served"));
        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(800)).await;

        // First insert failed, retry succeeded; nothing duplicated
        assert_eq!(store.events.lock().unwrap().len(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_dropped_after_second_failure() {
        let store = Arc::new(MemoryAnalyticsStore::default());
        store.fail_first.store(2, Ordering::SeqCst);
        let (service, handle) = AnalyticsService::new(store.clone());

        service.track_event(event("template_recommendation_served"));
        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(800)).await;

        // Both attempts failed: the batch is gone, not requeued forever
        assert_eq!(store.events.lock().unwrap().len(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
