//! Shared crawl frontier with an outstanding-work barrier
//!
//! The queue, the discovered/visited sets and the outstanding counter live
//! under one lock. The counter goes up when a URL is enqueued and down when
//! its processing finishes, so "counter is zero" means no entry is queued and
//! no worker can still produce one. An empty queue on its own means nothing.

use crate::ReconError;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: String,

    /// Link distance from the target (target is 0)
    pub depth: u32,

    /// Page the link was found on
    pub parent: Option<String>,
}

#[derive(Debug)]
struct Queued {
    entry: FrontierEntry,
    seq: u64,
}

// BinaryHeap pops the greatest element: shallower entries first, then
// earlier insertions
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .depth
            .cmp(&self.entry.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Enqueued,
    /// Already discovered earlier in this scan
    Duplicate,
    /// `max_pages` reached; discovery is soft-stopped
    CapReached,
}

/// Outcome of a bounded pop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    Entry(FrontierEntry),
    /// Nothing arrived within the wait; poll again
    Idle,
    /// No queued or in-flight work remains
    Drained,
    Cancelled,
}

#[derive(Debug, Default)]
struct Inner {
    queue: BinaryHeap<Queued>,
    discovered: HashSet<String>,
    visited: HashSet<String>,
    outstanding: usize,
    next_seq: u64,
}

/// Frontier shared by all workers of one scan
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    max_pages: usize,
    work_available: Notify,
    drained: Notify,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_pages,
            work_available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues the scan target at depth 0
    pub fn seed(&self, url: &str) -> Offer {
        self.offer(url, 0, None)
    }

    /// Marks `url` discovered and enqueues it, unless it was seen before or
    /// the discovered set is full
    pub fn offer(&self, url: &str, depth: u32, parent: Option<&str>) -> Offer {
        {
            let mut inner = self.lock();

            if inner.discovered.contains(url) {
                return Offer::Duplicate;
            }
            if inner.discovered.len() >= self.max_pages {
                return Offer::CapReached;
            }

            inner.discovered.insert(url.to_string());
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.outstanding += 1;
            inner.queue.push(Queued {
                entry: FrontierEntry {
                    url: url.to_string(),
                    depth,
                    parent: parent.map(str::to_string),
                },
                seq,
            });
        }

        self.work_available.notify_one();
        Offer::Enqueued
    }

    /// Takes the next entry, waiting at most `wait` for one to appear
    ///
    /// Every `Pop::Entry` must be matched by exactly one [`Frontier::complete`].
    pub async fn pop(&self, wait: Duration, cancel: &CancellationToken) -> Pop {
        if cancel.is_cancelled() {
            return Pop::Cancelled;
        }

        let notified = self.work_available.notified();
        {
            let mut inner = self.lock();
            if let Some(queued) = inner.queue.pop() {
                return Pop::Entry(queued.entry);
            }
            if inner.outstanding == 0 {
                return Pop::Drained;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => Pop::Cancelled,
            _ = notified => {
                let mut inner = self.lock();
                match inner.queue.pop() {
                    Some(queued) => Pop::Entry(queued.entry),
                    None if inner.outstanding == 0 => Pop::Drained,
                    None => Pop::Idle,
                }
            }
            _ = tokio::time::sleep(wait) => Pop::Idle,
        }
    }

    /// Records that a popped entry is fully processed
    ///
    /// Fails if there is no outstanding work to complete, which means the
    /// enqueue/complete pairing is broken and the drain signal can no longer
    /// be trusted.
    pub fn complete(&self) -> Result<(), ReconError> {
        let drained = {
            let mut inner = self.lock();
            if inner.outstanding == 0 {
                return Err(ReconError::Barrier(
                    "completion recorded with no outstanding work".to_string(),
                ));
            }
            inner.outstanding -= 1;
            inner.outstanding == 0 && inner.queue.is_empty()
        };

        if drained {
            self.drained.notify_waiters();
            self.work_available.notify_waiters();
        }
        Ok(())
    }

    /// Resolves once the outstanding counter reaches zero
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    /// Marks `url` visited; returns false if it already was
    pub fn mark_visited(&self, url: &str) -> bool {
        self.lock().visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.lock().visited.contains(url)
    }

    pub fn is_discovered(&self, url: &str) -> bool {
        self.lock().discovered.contains(url)
    }

    pub fn is_drained(&self) -> bool {
        self.lock().outstanding == 0
    }

    pub fn discovered_count(&self) -> usize {
        self.lock().discovered.len()
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}
