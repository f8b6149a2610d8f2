use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::api::ApiError;

/// Outcome of a renewal request against the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// This caller performed the renewal.
    Refreshed,
    /// Another caller already renewed for the same generation; the fresh
    /// credential is in the store.
    Reused,
}

/// Single-flight guard for credential renewal.
///
/// Callers snapshot `generation()` when they issue a request. If the request
/// comes back 401, they call `renew` with that snapshot: whichever caller
/// acquires the lock first performs the renewal and advances the generation;
/// everyone else who observed the old generation sees the bump and reuses the
/// renewed credential instead of issuing a duplicate renewal call.
///
/// A failed renewal leaves the generation unchanged, so the next caller that
/// observed the same generation is allowed to try again.
pub struct RenewalGate {
    generation: AtomicU64,
    lock: Mutex<()>,
}

impl RenewalGate {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Snapshot taken alongside the access token when a request is issued.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn renew<F, Fut>(&self, observed: u64, renew_fn: F) -> Result<Renewal, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        let _guard = self.lock.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            debug!("Credential already renewed by a concurrent caller");
            return Ok(Renewal::Reused);
        }

        renew_fn().await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(Renewal::Refreshed)
    }
}

impl Default for RenewalGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_renewal() {
        let gate = Arc::new(RenewalGate::new());
        let renewals = Arc::new(AtomicUsize::new(0));

        // All callers observe the generation before any renewal happens,
        // as they would when their requests were issued with the old token.
        let observed = gate.generation();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let renewals = Arc::clone(&renewals);
            handles.push(tokio::spawn(async move {
                gate.renew(observed, || {
                    let renewals = Arc::clone(&renewals);
                    async move {
                        renewals.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await
            }));
        }

        let mut refreshed = 0;
        let mut reused = 0;
        for handle in handles {
            match handle.await.expect("task").expect("renewal") {
                Renewal::Refreshed => refreshed += 1,
                Renewal::Reused => reused += 1,
            }
        }

        assert_eq!(renewals.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed, 1);
        assert_eq!(reused, 7);
    }

    #[tokio::test]
    async fn test_distinct_generations_renew_independently() {
        let gate = RenewalGate::new();
        let renewals = AtomicUsize::new(0);

        let first = gate.generation();
        gate.renew(first, || async {
            renewals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .expect("first renewal");

        // A later 401 observes the new generation and renews again.
        let second = gate.generation();
        assert_ne!(first, second);
        gate.renew(second, || async {
            renewals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .expect("second renewal");

        assert_eq!(renewals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_renewal_does_not_advance_generation() {
        let gate = RenewalGate::new();
        let observed = gate.generation();

        let result = gate
            .renew(observed, || async { Err(ApiError::Unauthorized) })
            .await;
        assert!(result.is_err());
        assert_eq!(gate.generation(), observed);

        // The next caller with the same snapshot may retry the renewal.
        let outcome = gate
            .renew(observed, || async { Ok(()) })
            .await
            .expect("retry renewal");
        assert_eq!(outcome, Renewal::Refreshed);
    }
}
