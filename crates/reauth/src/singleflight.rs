// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight execution: concurrent callers needing the same operation
//! share one run of it.
//!
//! The slot is installed and inspected inside one short critical section that
//! never spans an await, so two callers can never both observe an empty slot
//! and start their own run. The work itself runs on a spawned task: dropping
//! a waiting caller does not cancel it. The task vacates the slot as its last
//! step, so every waiter resumes only after the work (including whatever
//! state it applies) has finished.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// Completion shared by every caller of one flight. `None` if the task
/// panicked.
type Completion<T> = Shared<BoxFuture<'static, Option<T>>>;

struct Flight<T> {
    id: u64,
    done: Completion<T>,
}

/// Vacates the slot when the flight's task finishes, including by panic.
struct Release<T> {
    slot: Arc<Mutex<Option<Flight<T>>>>,
    id: u64,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}

/// Result of [`SingleFlight::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined<T> {
    pub outcome: Option<T>,
    /// True for the caller whose call started the flight.
    pub leader: bool,
}

pub struct SingleFlight<T> {
    slot: Arc<Mutex<Option<Flight<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { slot: Arc::new(Mutex::new(None)), next_id: AtomicU64::new(0) }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a flight is currently running.
    pub fn in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Join the running flight, or start one from `start` if none is running.
    ///
    /// `start` is only invoked when this call becomes the leader.
    pub async fn run<F, Fut>(&self, start: F) -> Joined<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (done, leader) = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(flight) => (flight.done.clone(), false),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let work = start();
                    let release = Arc::clone(&self.slot);
                    // The slot lock is held until the flight is installed, so
                    // the task cannot vacate it before it is occupied.
                    let handle = tokio::spawn(async move {
                        let _release = Release { slot: release, id };
                        work.await
                    });
                    let done: Completion<T> = async move { handle.await.ok() }.boxed().shared();
                    *slot = Some(Flight { id, done: done.clone() });
                    (done, true)
                }
            }
        };

        Joined { outcome: done.await, leader }
    }
}

#[cfg(test)]
#[path = "singleflight_tests.rs"]
mod tests;
