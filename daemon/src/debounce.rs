//! Debounce coordinator: collapses a burst of hotplug events into one run.
//!
//! Two states. Idle: no timer armed. Armed: exactly one timer task sleeping
//! toward its deadline. Every event aborts the pending timer and arms a fresh
//! one. When a timer wakes it re-checks, under the same lock, that it is still
//! the armed one; a timer that lost the race to a later event or to `cancel`
//! exits without running anything.
//!
//! The handler runs on the timer's own task after the slot has been released,
//! so later events never interrupt a run already in progress. Two runs can
//! therefore overlap when an event lands while a previous run is still busy.
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Work performed once a burst has gone quiet.
pub trait HotplugHandler: Send + Sync + 'static {
    fn handle(&self) -> impl Future<Output = ()> + Send;
}

struct PendingTimer {
    id: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    pending: Option<PendingTimer>,
    next_id: u64,
}

pub struct Debouncer<H> {
    delay: Duration,
    handler: Arc<H>,
    slot: Arc<Mutex<Slot>>,
}

impl<H: HotplugHandler> Debouncer<H> {
    pub fn new(delay: Duration, handler: Arc<H>) -> Self {
        Self {
            delay,
            handler,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restarts the quiet period. Must be called from within a tokio runtime.
    pub fn trigger(&self) {
        let mut slot = lock(&self.slot);

        if let Some(previous) = slot.pending.take() {
            previous.task.abort();
            tracing::debug!("Debounce timer restarted");
        }

        let id = slot.next_id;
        slot.next_id = slot.next_id.wrapping_add(1);

        let delay = self.delay;
        let handler = Arc::clone(&self.handler);
        let timer_slot = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut slot = lock(&timer_slot);
                match &slot.pending {
                    Some(pending) if pending.id == id => slot.pending = None,
                    _ => return,
                }
            }

            tracing::debug!("Debounce period elapsed, handling hotplug");
            handler.handle().await;
        });

        // The lock is still held, so the new task cannot observe an empty slot.
        slot.pending = Some(PendingTimer { id, task });
    }

    /// Disarms the pending timer, if any. Runs already in progress are left alone.
    pub fn cancel(&self) -> bool {
        match lock(&self.slot).pending.take() {
            Some(pending) => {
                pending.task.abort();
                tracing::debug!("Pending debounce timer cancelled");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }
}

/// The slot holds no invariants a panic could break halfway, so poisoning is ignored.
fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    /// Counts runs and records when each one started.
    #[derive(Default)]
    struct Recorder {
        runs: AtomicUsize,
        started: Mutex<Vec<Instant>>,
        busy_for: Duration,
    }

    impl Recorder {
        fn busy(busy_for: Duration) -> Arc<Self> {
            Arc::new(Self {
                busy_for,
                ..Self::default()
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl HotplugHandler for Recorder {
        async fn handle(&self) {
            self.started.lock().unwrap().push(Instant::now());
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.busy_for.is_zero() {
                sleep(self.busy_for).await;
            }
        }
    }

    fn debouncer(delay_ms: u64) -> (Debouncer<Recorder>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Debouncer::new(Duration::from_millis(delay_ms), Arc::clone(&recorder)),
            recorder,
        )
    }

    // ── coalescing ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn burst_inside_delay_runs_once_after_last_event() {
        let (debouncer, recorder) = debouncer(100);
        let start = Instant::now();

        debouncer.trigger();
        sleep(Duration::from_millis(50)).await;
        debouncer.trigger();
        sleep(Duration::from_millis(30)).await;
        debouncer.trigger();

        sleep(Duration::from_millis(500)).await;

        assert_eq!(recorder.runs(), 1);
        let fired_at = recorder.started.lock().unwrap()[0] - start;
        assert!(fired_at >= Duration::from_millis(180), "fired at {fired_at:?}");
        assert!(fired_at < Duration::from_millis(200), "fired at {fired_at:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn many_rapid_events_coalesce() {
        let (debouncer, recorder) = debouncer(100);
        for _ in 0..20 {
            debouncer.trigger();
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(300)).await;
        assert_eq!(recorder.runs(), 1);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_events_each_run() {
        let (debouncer, recorder) = debouncer(100);
        for _ in 0..4 {
            debouncer.trigger();
            sleep(Duration::from_millis(250)).await;
        }
        assert_eq!(recorder.runs(), 4);
    }

    // ── state ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn armed_until_expiry_then_idle() {
        let (debouncer, _recorder) = debouncer(100);
        assert!(!debouncer.is_armed());
        debouncer.trigger();
        assert!(debouncer.is_armed());
        sleep(Duration::from_millis(150)).await;
        assert!(!debouncer.is_armed());
    }

    // ── cancellation ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn cancel_before_expiry_prevents_run() {
        let (debouncer, recorder) = debouncer(100);
        debouncer.trigger();
        sleep(Duration::from_millis(50)).await;

        assert!(debouncer.cancel());
        sleep(Duration::from_millis(500)).await;

        assert_eq!(recorder.runs(), 0);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_when_idle_reports_nothing() {
        let (debouncer, _recorder) = debouncer(100);
        assert!(!debouncer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn event_during_run_does_not_interrupt_it() {
        let recorder = Recorder::busy(Duration::from_secs(2));
        let debouncer = Debouncer::new(Duration::from_millis(100), Arc::clone(&recorder));

        debouncer.trigger();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(recorder.runs(), 1);

        // First run is still busy; a new event arms a second, overlapping run.
        debouncer.trigger();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(recorder.runs(), 2);

        // Cancelling now only affects armed timers, not in-flight runs.
        assert!(!debouncer.cancel());
        sleep(Duration::from_secs(3)).await;
        assert_eq!(recorder.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_still_runs_once() {
        let (debouncer, recorder) = debouncer(0);
        debouncer.trigger();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.runs(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_arm_a_single_timer() {
        let (debouncer, recorder) = debouncer(250);
        let debouncer = Arc::new(debouncer);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let debouncer = Arc::clone(&debouncer);
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    debouncer.trigger();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        sleep(Duration::from_millis(750)).await;
        assert_eq!(recorder.runs(), 1);
    }
}
