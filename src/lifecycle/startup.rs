//! Start-up barrier.
//!
//! Every start-runner arrives at the latch before calling `start`, so the
//! coordinator can tell when all of them are running. This is a scheduling
//! guarantee only: arriving says nothing about a component being ready.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Countdown latch released after `count` arrivals.
#[derive(Debug)]
pub struct StartLatch {
    remaining: AtomicUsize,
    released: Notify,
}

impl StartLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            released: Notify::new(),
        }
    }

    /// Record one arrival. Extra arrivals past zero are ignored.
    pub fn arrive(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.released.notify_waiters();
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Wait until every expected arrival happened. Returns at once for zero.
    pub async fn wait(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}
