//! Two-tier request admission
//!
//! A global interval limiter caps aggregate requests per second, and a
//! per-registrable-domain semaphore caps concurrent requests to any one
//! target. Robots `Crawl-delay` spacing is layered on the per-host tier.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Global interval limiter
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// until it, so N callers are spread `1 / rps` apart regardless of how many
/// arrive at once.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the next slot; returns false if cancelled while waiting
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        let wait = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot - now
        };

        if wait.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

/// Permit for one in-flight request against a host
///
/// Dropping it frees the host slot.
#[derive(Debug)]
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}

struct HostSlot {
    semaphore: Arc<Semaphore>,
    state: HostState,
}

/// Per-registrable-domain concurrency cap with optional request spacing
pub struct HostLimiter {
    per_host: usize,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostLimiter {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host: per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires a slot for `domain`, honouring `crawl_delay` between starts
    ///
    /// Returns None if cancelled while waiting.
    pub async fn acquire(
        &self,
        domain: &str,
        crawl_delay: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Option<HostPermit> {
        let semaphore = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = hosts.entry(domain.to_string()).or_insert_with(|| HostSlot {
                semaphore: Arc::new(Semaphore::new(self.per_host)),
                state: HostState::new(),
            });
            Arc::clone(&slot.semaphore)
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => return None,
            permit = semaphore.acquire_owned() => permit.ok()?,
        };

        let wait = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            match hosts.get_mut(domain) {
                Some(slot) => slot
                    .state
                    .reserve(Instant::now().into_std(), crawl_delay.unwrap_or_default()),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            tracing::debug!("Crawl-delay: waiting {:?} before next request to {}", wait, domain);
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        Some(HostPermit { _permit: permit })
    }

    /// Requests started so far against `domain`
    pub fn request_count(&self, domain: &str) -> u64 {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(domain).map_or(0, |slot| slot.state.request_count)
    }

    /// Free slots for `domain` right now
    pub fn available(&self, domain: &str) -> usize {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .get(domain)
            .map_or(self.per_host, |slot| slot.semaphore.available_permits())
    }
}
