use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::models::{Job, Notification};

/// Async fetch closure producing the next full collection snapshot.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, ApiError>> + Send + Sync>;

/// The latest locally-cached view of a server-owned collection.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub data: Vec<T>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

struct ViewState<T> {
    data: Vec<T>,
    is_loading: bool,
    last_error: Option<String>,
    /// Sequence number handed to the next fetch.
    next_seq: u64,
    /// Sequence number of the last fetch whose result was applied.
    applied_seq: u64,
    /// Fetches currently outstanding.
    in_flight: usize,
    stopped: bool,
}

impl<T> ViewState<T> {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            is_loading: false,
            last_error: None,
            next_seq: 0,
            applied_seq: 0,
            in_flight: 0,
            stopped: false,
        }
    }
}

/// Balances the in-flight increment on drop. `stop()` aborts the polling
/// task, which can cancel a fetch at any await point; dropping the guard
/// still decrements the counter, so a stopped view never wedges with a
/// phantom outstanding fetch and can be restarted.
struct FetchGuard<T> {
    state: Arc<Mutex<ViewState<T>>>,
}

impl<T> Drop for FetchGuard<T> {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            s.in_flight -= 1;
            if s.in_flight == 0 {
                s.is_loading = false;
            }
        }
    }
}

/// Generic periodic-refresh cache for a server-owned collection.
///
/// One fetch runs per interval tick; ticks that land while a fetch is still
/// outstanding are skipped. Forced refreshes (mutation settlement) may overlap
/// an in-flight tick fetch - every fetch carries a sequence number and a
/// response is discarded if a later-issued fetch already applied, so a slow
/// stale response can never overwrite a fresher snapshot.
///
/// Fetch failures leave the previous data in place (stale-but-present), set
/// `last_error`, and do not stop the polling loop. `stop()` is idempotent,
/// cancels the timer, and prevents in-flight results from landing.
pub struct PollingView<T> {
    state: Arc<Mutex<ViewState<T>>>,
    fetch: Fetcher<T>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<T> Clone for PollingView<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            fetch: Arc::clone(&self.fetch),
            task: Arc::clone(&self.task),
        }
    }
}

impl<T: Clone + Send + 'static> PollingView<T> {
    pub fn new(fetch: Fetcher<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewState::new())),
            fetch,
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start polling on a fixed interval. The first fetch runs immediately.
    /// No-op if the view is already running.
    pub fn start(&self, interval: Duration) {
        let mut task = self.task.lock().expect("poll task lock poisoned");
        if task.is_some() {
            return;
        }
        self.state.lock().expect("view state lock poisoned").stopped = false;

        let state = Arc::clone(&self.state);
        let fetch = Arc::clone(&self.fetch);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let skip = {
                    let s = state.lock().expect("view state lock poisoned");
                    if s.stopped {
                        break;
                    }
                    // No unbounded queuing: a tick during an outstanding
                    // fetch is dropped, not deferred.
                    s.in_flight > 0
                };
                if skip {
                    debug!("Polling tick skipped, fetch still outstanding");
                    continue;
                }
                Self::run_fetch(Arc::clone(&state), Arc::clone(&fetch)).await;
            }
        }));
    }

    /// Stop polling and discard any in-flight result. Idempotent.
    pub fn stop(&self) {
        self.state.lock().expect("view state lock poisoned").stopped = true;
        if let Some(handle) = self.task.lock().expect("poll task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Run one fetch to completion, outside the tick schedule.
    pub async fn refresh(&self) {
        Self::run_fetch(Arc::clone(&self.state), Arc::clone(&self.fetch)).await;
    }

    /// Fire-and-forget refresh, used on mutation settlement.
    pub fn force_refresh(&self) {
        let view = self.clone();
        tokio::spawn(async move {
            view.refresh().await;
        });
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        let s = self.state.lock().expect("view state lock poisoned");
        Snapshot {
            data: s.data.clone(),
            is_loading: s.is_loading,
            last_error: s.last_error.clone(),
        }
    }

    async fn run_fetch(state: Arc<Mutex<ViewState<T>>>, fetch: Fetcher<T>) {
        let seq = {
            let mut s = state.lock().expect("view state lock poisoned");
            if s.stopped {
                return;
            }
            s.next_seq += 1;
            s.in_flight += 1;
            s.is_loading = true;
            s.next_seq
        };
        let _in_flight = FetchGuard {
            state: Arc::clone(&state),
        };

        let result = fetch().await;

        let mut s = state.lock().expect("view state lock poisoned");
        if s.stopped {
            return;
        }
        if seq <= s.applied_seq {
            debug!(seq, applied = s.applied_seq, "Discarding stale fetch result");
            return;
        }
        s.applied_seq = seq;
        match result {
            Ok(data) => {
                s.data = data;
                s.last_error = None;
            }
            Err(e) => {
                // Keep the previous data; the next tick tries again.
                s.last_error = Some(e.to_string());
            }
        }
    }
}

impl PollingView<Job> {
    /// View over `/jobs/my`.
    pub fn jobs(api: ApiClient) -> Self {
        Self::new(Arc::new(move || {
            let api = api.clone();
            async move { api.fetch_jobs().await }.boxed()
        }))
    }
}

impl PollingView<Notification> {
    /// View over `/notifications`.
    pub fn notifications(api: ApiClient) -> Self {
        Self::new(Arc::new(move || {
            let api = api.clone();
            async move { api.fetch_notifications().await }.boxed()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_fetcher(
        counter: Arc<AtomicUsize>,
        results: Vec<Result<Vec<&'static str>, String>>,
        delay: Duration,
    ) -> Fetcher<&'static str> {
        let results = Arc::new(results);
        Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let results = Arc::clone(&results);
            async move {
                tokio::time::sleep(delay).await;
                match results.get(n.min(results.len() - 1)).expect("scripted result") {
                    Ok(data) => Ok(data.clone()),
                    Err(msg) => Err(ApiError::ServerError(msg.clone())),
                }
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_replaces_snapshot_wholesale() {
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![Ok(vec!["a", "b"]), Ok(vec!["c"])],
            Duration::from_millis(1),
        ));

        view.refresh().await;
        assert_eq!(view.snapshot().data, vec!["a", "b"]);

        view.refresh().await;
        let snap = view.snapshot();
        assert_eq!(snap.data, vec!["c"]);
        assert!(snap.last_error.is_none());
        assert!(!snap.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_never_overwrites_later_one() {
        // Fetch A is issued first but resolves after fetch B.
        let counter = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(vec![vec!["old"], vec!["new"]]);
        let delays = [Duration::from_millis(100), Duration::from_millis(10)];
        let fetch: Fetcher<&'static str> = {
            let results = Arc::clone(&results);
            Arc::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let results = Arc::clone(&results);
                let delay = delays[n.min(1)];
                async move {
                    tokio::time::sleep(delay).await;
                    Ok(results[n.min(1)].clone())
                }
                .boxed()
            })
        };
        let view = PollingView::new(fetch);

        let a = tokio::spawn({
            let view = view.clone();
            async move { view.refresh().await }
        });
        tokio::task::yield_now().await;
        let b = tokio::spawn({
            let view = view.clone();
            async move { view.refresh().await }
        });

        a.await.expect("fetch A");
        b.await.expect("fetch B");

        assert_eq!(view.snapshot().data, vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_keeps_stale_data_and_polling_continues() {
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![
                Ok(vec!["a"]),
                Err("boom".to_string()),
                Ok(vec!["b"]),
            ],
            Duration::from_millis(1),
        ));

        view.refresh().await;
        assert_eq!(view.snapshot().data, vec!["a"]);

        view.refresh().await;
        let snap = view.snapshot();
        assert_eq!(snap.data, vec!["a"], "data must remain stale-but-present");
        assert!(snap.last_error.as_deref().unwrap_or("").contains("boom"));

        view.refresh().await;
        let snap = view.snapshot();
        assert_eq!(snap.data, vec!["b"]);
        assert!(snap.last_error.is_none(), "success clears the error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_skipped_while_fetch_outstanding() {
        // Each fetch takes 12s against a 5s interval: at most one fetch may
        // be in flight, so ticks at 5s and 10s are dropped.
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![Ok(vec!["x"])],
            Duration::from_secs(12),
        ));

        view.start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(30)).await;
        view.stop();

        // 30s window: fetches start at ~0s, ~15s (the first tick after the
        // 12s fetch completes), and ~30s at most.
        let fetches = counter.load(Ordering::SeqCst);
        assert!(fetches >= 2, "polling loop must keep running");
        assert!(fetches <= 3, "overlapping tick fetches must be skipped, got {}", fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_result() {
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![Ok(vec!["late"])],
            Duration::from_secs(10),
        ));

        let pending = tokio::spawn({
            let view = view.clone();
            async move { view.refresh().await }
        });
        tokio::task::yield_now().await;

        view.stop();
        view.stop(); // idempotent

        pending.await.expect("fetch task");
        assert!(view.snapshot().data.is_empty(), "stopped view must not apply results");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_fetch_then_restart_fetches_again() {
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![Ok(vec!["x"])],
            Duration::from_secs(10),
        ));

        view.start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1, "first fetch must be in flight");
        view.stop();

        // Cancellation mid-fetch must release the outstanding-fetch count.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!view.snapshot().is_loading);

        view.start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(60)).await;
        view.stop();

        assert!(
            counter.load(Ordering::SeqCst) >= 2,
            "restarted view must fetch again"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let view = PollingView::new(counted_fetcher(
            Arc::clone(&counter),
            vec![Ok(vec!["a"]), Ok(vec!["b"])],
            Duration::from_millis(1),
        ));

        view.start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(1)).await;
        view.stop();

        view.start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(1)).await;
        view.stop();

        assert!(counter.load(Ordering::SeqCst) >= 2);
        assert!(!view.snapshot().data.is_empty());
    }
}
