// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-slot admission control (spec §4.2.1): a bounded pool of worker
//! slots plus a bounded FIFO wait queue. Mirrors the reservation-counting
//! idiom the teacher uses for its own pipeline concurrency gate, generalized
//! from a single global limit to an explicit `{max_workers, max_open_queue}`
//! pair with an oldest-waiter-resumes-first release order.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::SupervisorError;

struct AdmissionState {
    reserved: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// A held reservation; releasing it (drop or explicit `release`) frees the
/// slot and, if anyone is waiting, hands it straight to the oldest waiter.
/// Holds an owning `Arc` rather than a borrow so it can live inside a
/// session handle stored alongside the `Admission` it came from.
pub struct Reservation {
    admission: Arc<Admission>,
    released: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.released {
            self.admission.release();
        }
    }
}

impl Reservation {
    pub fn release(mut self) {
        self.released = true;
        self.admission.release();
    }
}

pub struct Admission {
    max_workers: usize,
    max_queue: usize,
    state: Mutex<AdmissionState>,
}

impl Admission {
    pub fn new(max_workers: usize, max_queue: usize) -> Arc<Self> {
        Arc::new(Self {
            max_workers,
            max_queue,
            state: Mutex::new(AdmissionState {
                reserved: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    pub fn current_workers(&self) -> usize {
        self.state.lock().reserved
    }

    pub fn queue_depth(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Acquire a slot, waiting in FIFO order if the pool is saturated.
    /// Rejects immediately (without enqueueing) if the wait queue is
    /// already at `max_open_queue`.
    pub async fn acquire(self: &Arc<Self>) -> Result<Reservation, SupervisorError> {
        let rx = {
            let mut state = self.state.lock();
            if state.reserved < self.max_workers {
                state.reserved += 1;
                None
            } else if state.waiters.len() >= self.max_queue {
                return Err(SupervisorError::WorkerLimit {
                    max: self.max_workers,
                    current: state.reserved,
                    depth: state.waiters.len(),
                    max_depth: self.max_queue,
                });
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            rx.await.map_err(|_| SupervisorError::AdmissionCancelled)?;
        }

        Ok(Reservation {
            admission: self.clone(),
            released: false,
        })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if let Some(next) = state.waiters.pop_front() {
            // Hand the slot straight to the oldest waiter; `reserved` count
            // is unchanged since the slot never actually became free.
            let _ = next.send(());
        } else {
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_up_to_capacity_then_rejects() {
        let admission = Admission::new(1, 0);
        let first = admission.acquire().await.expect("first slot");
        assert_eq!(admission.current_workers(), 1);
        let err = admission.acquire().await.unwrap_err();
        assert!(matches!(err, SupervisorError::WorkerLimit { .. }));
        drop(first);
        assert_eq!(admission.current_workers(), 0);
    }

    #[tokio::test]
    async fn waiter_resumes_on_release_without_changing_reserved_count() {
        let admission = Admission::new(1, 4);
        let first = admission.acquire().await.expect("first slot");

        let waiter_admission = admission.clone();
        let waiter = tokio::spawn(async move { waiter_admission.acquire().await });

        tokio::task::yield_now().await;
        assert_eq!(admission.queue_depth(), 1);

        first.release();
        let second = waiter.await.expect("join").expect("acquired");
        assert_eq!(admission.current_workers(), 1);
        assert_eq!(admission.queue_depth(), 0);
        drop(second);
        assert_eq!(admission.current_workers(), 0);
    }

    #[tokio::test]
    async fn full_queue_rejects_immediately() {
        let admission = Admission::new(1, 1);
        let _first = admission.acquire().await.expect("first slot");

        let waiter_admission = admission.clone();
        let waiter = tokio::spawn(async move { waiter_admission.acquire().await });
        tokio::task::yield_now().await;

        let err = admission.acquire().await.unwrap_err();
        assert!(matches!(err, SupervisorError::WorkerLimit { .. }));
        waiter.abort();
    }
}
