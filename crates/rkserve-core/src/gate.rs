//! Admission control for the single inference resource.
//!
//! The NPU runs one generation at a time. Every request must hold an
//! [`AdmissionPermit`] from rendering until its generator is fully consumed
//! or abandoned; the permit releases the slot when dropped.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::ports::ReadinessProbe;
use crate::settings::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};

/// The resource is occupied and the caller should retry later.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Server is busy, please try again later")]
pub struct BusyError {
    /// How long the caller waited before giving up.
    pub waited: Duration,
}

impl BusyError {
    const fn immediate() -> Self {
        Self {
            waited: Duration::ZERO,
        }
    }
}

/// Bounded retry schedule for [`AdmissionGate::acquire_polling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the total wait.
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            DEFAULT_POLL_ATTEMPTS,
        )
    }
}

/// How a protocol adapter admits requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Fail immediately if the engine is not ready or the slot is taken.
    NonBlocking,
    /// Retry on a fixed schedule before failing.
    BoundedPoll(PollPolicy),
}

/// Serializes access to the inference engine.
///
/// Clones share the same slot.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slot: Arc<Semaphore>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Acquire the slot according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns `BusyError` when the slot could not be acquired.
    pub async fn admit(
        &self,
        policy: &AdmissionPolicy,
        readiness: &dyn ReadinessProbe,
    ) -> Result<AdmissionPermit, BusyError> {
        match policy {
            AdmissionPolicy::NonBlocking => {
                if !readiness.is_ready() {
                    debug!("Engine not ready, rejecting request");
                    return Err(BusyError::immediate());
                }
                self.try_acquire()
            }
            AdmissionPolicy::BoundedPoll(poll) => self.acquire_polling(poll, readiness).await,
        }
    }

    /// Acquire the slot without waiting.
    ///
    /// # Errors
    ///
    /// Returns `BusyError` if another request holds the slot.
    pub fn try_acquire(&self) -> Result<AdmissionPermit, BusyError> {
        Arc::clone(&self.slot)
            .try_acquire_owned()
            .map(AdmissionPermit::new)
            .map_err(|_| BusyError::immediate())
    }

    /// Wait up to `timeout` for the slot.
    ///
    /// # Errors
    ///
    /// Returns `BusyError` if the slot is still held when the timeout expires.
    pub async fn acquire_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<AdmissionPermit, BusyError> {
        match tokio::time::timeout(timeout, Arc::clone(&self.slot).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(AdmissionPermit::new(permit)),
            // The semaphore is never closed; treat it like a timeout anyway.
            Ok(Err(_)) | Err(_) => Err(BusyError { waited: timeout }),
        }
    }

    /// Retry until the engine is ready and the slot is free.
    ///
    /// Each attempt waits at most one interval, so the total wait is bounded
    /// by [`PollPolicy::ceiling`].
    ///
    /// # Errors
    ///
    /// Returns `BusyError` after `max_attempts` unsuccessful attempts.
    pub async fn acquire_polling(
        &self,
        policy: &PollPolicy,
        readiness: &dyn ReadinessProbe,
    ) -> Result<AdmissionPermit, BusyError> {
        let started = Instant::now();

        for attempt in 1..=policy.max_attempts {
            if readiness.is_ready() {
                if let Ok(permit) = self.acquire_with_timeout(policy.interval).await {
                    if attempt > 1 {
                        debug!(
                            attempt,
                            waited_ms = started.elapsed().as_millis(),
                            "Admitted after polling"
                        );
                    }
                    return Ok(permit);
                }
            } else {
                tokio::time::sleep(policy.interval).await;
            }
        }

        let waited = started.elapsed();
        debug!(
            attempts = policy.max_attempts,
            waited_ms = waited.as_millis(),
            "Gave up waiting for admission"
        );
        Err(BusyError { waited })
    }

    /// True while a request holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the inference slot.
///
/// Dropping the guard releases the slot, on every exit path.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    acquired_at: Instant,
}

impl AdmissionPermit {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        debug!("Inference slot acquired");
        Self {
            _permit: permit,
            acquired_at: Instant::now(),
        }
    }

    /// Time since the slot was acquired.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        debug!(held_ms = self.held_for().as_millis(), "Inference slot released");
    }
}
