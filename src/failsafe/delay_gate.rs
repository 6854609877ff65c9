//! Bounded admission for simulated slow responses

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DelayConfig;
use crate::metrics;
use crate::{Error, Result};

/// How a granted delay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// Slept for the full duration
    Completed,
    /// Woken early by shutdown
    Interrupted,
}

/// Limits how many requests may sleep at once.
///
/// Saturation is rejected, never queued: a caller that finds no free slot
/// gets [`Error::TooManyConcurrentDelays`] straight away. Slots are
/// semaphore permits, so a slot is returned however the delay ends,
/// including when the request future is dropped mid-sleep.
pub struct DelayGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    max_delay: Duration,
    shutdown: CancellationToken,
    rejected: AtomicU64,
}

impl DelayGate {
    /// Create a gate that is never interrupted
    #[must_use]
    pub fn new(config: &DelayConfig) -> Self {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Create a gate whose sleeps end early once `shutdown` is cancelled
    #[must_use]
    pub fn with_shutdown(config: &DelayConfig, shutdown: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.capacity)),
            capacity: config.capacity,
            max_delay: config.max_delay,
            shutdown,
            rejected: AtomicU64::new(0),
        }
    }

    /// Sleep for `seconds` while holding a slot.
    ///
    /// Fails with [`Error::InvalidDelay`] for negative delays or delays not
    /// below the configured maximum, and with
    /// [`Error::TooManyConcurrentDelays`] when every slot is held. Neither
    /// failure consumes a slot.
    #[tracing::instrument(skip(self), fields(capacity = self.capacity))]
    pub async fn delay(&self, seconds: i64) -> Result<DelayOutcome> {
        let duration = self.validate(seconds)?;

        let _slot = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Slot {
                _permit: permit,
                gate: self,
            },
            Err(TryAcquireError::NoPermits) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_delay_rejected("saturated");
                warn!(in_flight = self.in_flight(), "No delay slot available");
                return Err(Error::TooManyConcurrentDelays {
                    capacity: self.capacity,
                });
            }
            Err(TryAcquireError::Closed) => {
                return Err(Error::Internal("delay gate closed".to_string()));
            }
        };

        metrics::record_delay_admitted(self.in_flight());
        debug!(in_flight = self.in_flight(), "Delay slot acquired");

        let outcome = tokio::select! {
            () = tokio::time::sleep(duration) => DelayOutcome::Completed,
            () = self.shutdown.cancelled() => {
                warn!("Simulated delay interrupted by shutdown");
                DelayOutcome::Interrupted
            }
        };

        Ok(outcome)
    }

    fn validate(&self, seconds: i64) -> Result<Duration> {
        let max = self.max_delay.as_secs();
        match u64::try_from(seconds) {
            Ok(secs) if secs < max => Ok(Duration::from_secs(secs)),
            _ => {
                metrics::record_delay_rejected("invalid");
                Err(Error::InvalidDelay { seconds, max })
            }
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Slots currently held by sleeping requests
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Calls turned away because the gate was full
    pub fn rejected_total(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Token that interrupts running delays
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// A held slot; reports the release when dropped
struct Slot<'a> {
    _permit: OwnedSemaphorePermit,
    gate: &'a DelayGate,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        // the permit field is released after this runs
        let in_flight = self.gate.in_flight().saturating_sub(1);
        metrics::record_delay_released(in_flight);
        debug!(in_flight, "Delay slot released");
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::JoinHandle;

    use super::*;

    fn gate(capacity: usize) -> Arc<DelayGate> {
        Arc::new(DelayGate::new(&DelayConfig {
            capacity,
            max_delay: Duration::from_secs(60),
        }))
    }

    fn spawn_delay(gate: &Arc<DelayGate>, seconds: i64) -> JoinHandle<Result<DelayOutcome>> {
        let gate = Arc::clone(gate);
        tokio::spawn(async move { gate.delay(seconds).await })
    }

    async fn wait_for_in_flight(gate: &DelayGate, expected: usize) {
        for _ in 0..100 {
            if gate.in_flight() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {expected} in flight, got {}", gate.in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_second_delay_completes() {
        let gate = gate(1);
        assert_eq!(gate.delay(0).await.unwrap(), DelayOutcome::Completed);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_requested_duration() {
        let gate = gate(1);
        let start = tokio::time::Instant::now();
        gate.delay(5).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn sixty_seconds_is_invalid() {
        let gate = gate(1);
        let err = gate.delay(60).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDelay { seconds: 60, max: 60 }));
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_delay_is_invalid() {
        let gate = gate(1);
        assert!(matches!(
            gate.delay(-1).await,
            Err(Error::InvalidDelay { seconds: -1, .. })
        ));
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_when_saturated() {
        let gate = gate(2);
        let first = spawn_delay(&gate, 5);
        let second = spawn_delay(&gate, 5);
        wait_for_in_flight(&gate, 2).await;

        let err = gate.delay(5).await.unwrap_err();
        assert!(matches!(err, Error::TooManyConcurrentDelays { capacity: 2 }));
        assert_eq!(gate.rejected_total(), 1);

        assert_eq!(first.await.unwrap().unwrap(), DelayOutcome::Completed);
        assert_eq!(second.await.unwrap().unwrap(), DelayOutcome::Completed);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn released_slot_admits_new_call() {
        let gate = gate(1);
        let first = spawn_delay(&gate, 1);
        wait_for_in_flight(&gate, 1).await;
        assert!(gate.delay(1).await.is_err());

        first.await.unwrap().unwrap();
        assert_eq!(gate.delay(1).await.unwrap(), DelayOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_delay_does_not_count_as_rejection() {
        let gate = gate(1);
        let _ = gate.delay(120).await;
        assert_eq!(gate.rejected_total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_future_releases_slot() {
        let gate = gate(1);
        let sleeper = spawn_delay(&gate, 30);
        wait_for_in_flight(&gate, 1).await;

        sleeper.abort();
        assert!(sleeper.await.unwrap_err().is_cancelled());
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.delay(0).await.unwrap(), DelayOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_and_releases() {
        let token = CancellationToken::new();
        let gate = Arc::new(DelayGate::with_shutdown(
            &DelayConfig {
                capacity: 1,
                max_delay: Duration::from_secs(60),
            },
            token.clone(),
        ));
        let sleeper = spawn_delay(&gate, 59);
        wait_for_in_flight(&gate, 1).await;

        token.cancel();
        assert_eq!(sleeper.await.unwrap().unwrap(), DelayOutcome::Interrupted);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_max_delay_bounds_requests() {
        let gate = DelayGate::new(&DelayConfig {
            capacity: 1,
            max_delay: Duration::from_secs(10),
        });
        assert!(gate.delay(9).await.is_ok());
        assert!(matches!(
            gate.delay(10).await,
            Err(Error::InvalidDelay { max: 10, .. })
        ));
    }
}
