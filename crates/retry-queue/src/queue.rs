use crate::item::QueuedItem;
use async_trait::async_trait;
use model::RetryConfig;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Attempts to deliver one queued payload to the secondary engine.
#[async_trait]
pub trait RetryProcessor<T>: Send + Sync {
    async fn process(&self, payload: &T) -> Result<(), String>;
}

/// Invoked once a payload has exhausted its retry budget. Spec §4.1: errors
/// raised here are caught and logged, never allowed to take down the
/// worker — callers that need stronger guarantees should make their own
/// handler infallible.
#[async_trait]
pub trait ExhaustionHandler<T>: Send + Sync {
    async fn on_max_retries_exceeded(&self, item: QueuedItem<T>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryQueueCounters {
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
}

struct Inner<T> {
    config: RetryConfig,
    queue: Mutex<VecDeque<QueuedItem<T>>>,
    notify: Notify,
    pending: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    hard_cancel: CancellationToken,
    soft_stop: AtomicBool,
}

/// Bounded, single-consumer, in-memory retry channel with exponential
/// backoff (spec §4.1). One instance lives per entity for as long as the
/// owning [`MigrationDatabase`](../migration_core/struct.MigrationDatabase.html)
/// is connected.
pub struct RetryQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RetryQueue<T> {
    fn clone(&self) -> Self {
        RetryQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> RetryQueue<T> {
    pub fn new(config: RetryConfig) -> Self {
        RetryQueue {
            inner: Arc::new(Inner {
                config,
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                pending: AtomicU64::new(0),
                success: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                worker: Mutex::new(None),
                hard_cancel: CancellationToken::new(),
                soft_stop: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueues `payload` for retry. Never blocks: if the queue is already
    /// at `max_queue_size`, the oldest item is dropped (and its slot in
    /// `pending` released) so a slow or wedged secondary can never make the
    /// primary write path pay for it.
    pub async fn enqueue(&self, payload: T) {
        let item = QueuedItem::first_attempt(payload);
        let mut queue = self.inner.queue.lock().await;
        queue.push_back(item);
        self.inner.pending.fetch_add(1, Ordering::Relaxed);

        if queue.len() > self.inner.config.max_queue_size {
            queue.pop_front();
            self.inner.pending.fetch_sub(1, Ordering::Relaxed);
            warn!(
                max_queue_size = self.inner.config.max_queue_size,
                "retry queue full, dropping oldest item"
            );
        }
        drop(queue);
        self.inner.notify.notify_one();
    }

    pub fn counters(&self) -> RetryQueueCounters {
        RetryQueueCounters {
            pending: self.inner.pending.load(Ordering::Relaxed),
            success: self.inner.success.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    pub fn pending_count(&self) -> u64 {
        self.inner.pending.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.inner.success.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Launches the single worker task. Idempotent: calling `start` while a
    /// worker is already running is a no-op.
    pub async fn start<P, H>(&self, processor: P, on_exhausted: H)
    where
        P: RetryProcessor<T> + 'static,
        H: ExhaustionHandler<T> + 'static,
    {
        let mut worker = self.inner.worker.lock().await;
        if worker.is_some() {
            warn!("retry queue worker already running, ignoring start()");
            return;
        }

        self.inner.soft_stop.store(false, Ordering::Release);
        let inner = self.inner.clone();
        let processor = Arc::new(processor);
        let on_exhausted = Arc::new(on_exhausted);
        *worker = Some(tokio::spawn(async move {
            run_worker(inner, processor, on_exhausted).await;
        }));
    }

    /// Cancels the worker immediately; any in-flight `processor` call is
    /// dropped and queued items are discarded without being retried again.
    pub async fn stop(&self) {
        self.inner.hard_cancel.cancel();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            handle.abort();
        }
        self.inner.queue.lock().await.clear();
    }

    /// Signals the worker to stop after finishing whatever it is currently
    /// processing, then awaits its exit.
    pub async fn stop_gracefully(&self) {
        self.inner.soft_stop.store(true, Ordering::Release);
        self.inner.notify.notify_one();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run_worker<T, P, H>(inner: Arc<Inner<T>>, processor: Arc<P>, on_exhausted: Arc<H>)
where
    T: Send + 'static,
    P: RetryProcessor<T> + 'static,
    H: ExhaustionHandler<T> + 'static,
{
    loop {
        if inner.soft_stop.load(Ordering::Acquire) {
            return;
        }

        let next_wake = {
            let queue = inner.queue.lock().await;
            queue.front().map(|item| item.next_attempt_at)
        };

        match next_wake {
            None => {
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = inner.hard_cancel.cancelled() => return,
                }
                continue;
            }
            Some(wake_at) => {
                let now = Instant::now();
                if wake_at > now {
                    tokio::select! {
                        _ = tokio::time::sleep_until(wake_at) => {}
                        _ = inner.notify.notified() => continue,
                        _ = inner.hard_cancel.cancelled() => return,
                    }
                }
            }
        }

        let item = {
            let mut queue = inner.queue.lock().await;
            match queue.pop_front() {
                Some(item) => item,
                None => continue,
            }
        };

        match processor.process(&item.payload).await {
            Ok(()) => {
                inner.pending.fetch_sub(1, Ordering::Relaxed);
                inner.success.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                if item.attempt_count >= inner.config.max_retries {
                    inner.pending.fetch_sub(1, Ordering::Relaxed);
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    let exhausted = QueuedItem {
                        payload: item.payload,
                        attempt_count: item.attempt_count,
                        last_error: Some(err),
                        next_attempt_at: item.next_attempt_at,
                    };
                    on_exhausted.on_max_retries_exceeded(exhausted).await;
                } else {
                    let delay = backoff_delay(&inner.config, item.attempt_count);
                    let mut queue = inner.queue.lock().await;
                    queue.push_back(QueuedItem {
                        payload: item.payload,
                        attempt_count: item.attempt_count + 1,
                        last_error: Some(err),
                        next_attempt_at: Instant::now() + delay,
                    });
                }
            }
        }

        if inner.soft_stop.load(Ordering::Acquire) {
            return;
        }
    }
}

fn backoff_delay(config: &RetryConfig, attempt_count: u32) -> std::time::Duration {
    let factor = 1u64 << attempt_count.min(20);
    let delay_ms = config.initial_delay_ms.saturating_mul(factor);
    std::time::Duration::from_millis(delay_ms.min(config.max_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FlakyProcessor {
        fail_times: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl RetryProcessor<u32> for FlakyProcessor {
        async fn process(&self, _payload: &u32) -> Result<(), String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                Err("transient".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysFailProcessor;

    #[async_trait]
    impl RetryProcessor<u32> for AlwaysFailProcessor {
        async fn process(&self, _payload: &u32) -> Result<(), String> {
            Err("permanent".to_string())
        }
    }

    struct RecordingExhaustionHandler {
        calls: Arc<Mutex<Vec<QueuedItem<u32>>>>,
    }

    #[async_trait]
    impl ExhaustionHandler<u32> for RecordingExhaustionHandler {
        async fn on_max_retries_exceeded(&self, item: QueuedItem<u32>) {
            self.calls.lock().await.push(item);
        }
    }

    struct NoopExhaustionHandler;

    #[async_trait]
    impl ExhaustionHandler<u32> for NoopExhaustionHandler {
        async fn on_max_retries_exceeded(&self, _item: QueuedItem<u32>) {}
    }

    #[tokio::test]
    async fn retries_transient_failure_then_succeeds() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            max_queue_size: 100,
        };
        let queue = RetryQueue::new(config);
        queue
            .start(
                FlakyProcessor {
                    fail_times: 2,
                    attempts: AtomicUsize::new(0),
                },
                NoopExhaustionHandler,
            )
            .await;

        queue.enqueue(1).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(queue.success_count(), 1);
        assert_eq!(queue.failed_count(), 0);
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            max_queue_size: 100,
        };
        let queue = RetryQueue::new(config);
        let calls = Arc::new(Mutex::new(Vec::new()));
        queue
            .start(
                AlwaysFailProcessor,
                RecordingExhaustionHandler {
                    calls: calls.clone(),
                },
            )
            .await;

        queue.enqueue(42).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(queue.failed_count(), 1);
        assert_eq!(queue.success_count(), 0);
        let calls = calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].attempt_count, 3);
    }

    #[tokio::test]
    async fn drops_oldest_when_over_capacity() {
        let config = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 10_000,
            max_delay_ms: 10_000,
            max_queue_size: 2,
        };
        let queue: RetryQueue<u32> = RetryQueue::new(config);
        queue.enqueue(1).await;
        queue.enqueue(2).await;
        queue.enqueue(3).await;

        assert_eq!(queue.pending_count(), 2);
    }

    #[tokio::test]
    async fn stop_gracefully_awaits_worker_exit() {
        let config = RetryConfig::default();
        let queue = RetryQueue::new(config);
        queue.start(AlwaysFailProcessor, NoopExhaustionHandler).await;
        queue.stop_gracefully().await;
        assert!(queue.inner.worker.lock().await.is_none());
    }
}
