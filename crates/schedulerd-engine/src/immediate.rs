//! Immediate-run queue: job IDs enqueued via the control plane's
//! `run_immediate` endpoint, drained by the Poll Loop each tick.
//!
//! Two pieces of shared state: a FIFO queue of requested IDs, and an
//! in-flight set guarding against a second run of a job whose previous
//! run hasn't finished yet. A request against an in-flight job is
//! dropped, not queued — the caller already gets "accepted", dropping
//! here just avoids a pile-up of runs for a slow job.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::Mutex;

const MAX_DRAIN: usize = 50;

#[derive(Clone)]
pub struct ImmediateQueue {
    pending: Arc<Mutex<VecDeque<i64>>>,
    in_flight: Arc<DashSet<i64>>,
}

impl ImmediateQueue {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Accept a run-now request. Always succeeds from the caller's point
    /// of view; the request is silently dropped only if the queue already
    /// holds it or its job is currently executing.
    pub async fn enqueue(&self, job_id: i64) {
        if self.in_flight.contains(&job_id) {
            tracing::info!(job_id, "immediate run request skipped, job already inflight");
            return;
        }
        let mut pending = self.pending.lock().await;
        if pending.contains(&job_id) {
            return;
        }
        pending.push_back(job_id);
    }

    /// Drain up to `MAX_DRAIN` queued IDs that are not currently
    /// in-flight, marking each as in-flight as it's handed out. IDs that
    /// are in-flight are dropped rather than re-queued — the caller will
    /// get another chance to request a run once the earlier one clears.
    pub async fn drain(&self) -> Vec<i64> {
        let mut pending = self.pending.lock().await;
        let mut out = Vec::new();
        while out.len() < MAX_DRAIN {
            let Some(job_id) = pending.pop_front() else {
                break;
            };
            if self.in_flight.contains(&job_id) {
                tracing::info!(job_id, "dropping queued immediate run, job already inflight");
                continue;
            }
            self.in_flight.insert(job_id);
            out.push(job_id);
        }
        out
    }

    pub fn mark_done(&self, job_id: i64) {
        self.in_flight.remove(&job_id);
    }

    pub fn is_in_flight(&self, job_id: i64) -> bool {
        self.in_flight.contains(&job_id)
    }
}

impl Default for ImmediateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_skips_inflight_and_marks_drained_as_inflight() {
        let queue = ImmediateQueue::new();
        queue.enqueue(1).await;
        queue.enqueue(2).await;

        let drained = queue.drain().await;
        assert_eq!(drained, vec![1, 2]);
        assert!(queue.is_in_flight(1));
        assert!(queue.is_in_flight(2));
    }

    #[tokio::test]
    async fn repeated_enqueue_while_inflight_yields_one_more_execution() {
        let queue = ImmediateQueue::new();
        queue.enqueue(1).await;
        let drained = queue.drain().await;
        assert_eq!(drained, vec![1]);

        // three more requests arrive while job 1 is still running
        queue.enqueue(1).await;
        queue.enqueue(1).await;
        queue.enqueue(1).await;

        // none are queued, because enqueue() checks in-flight first
        let drained_again = queue.drain().await;
        assert!(drained_again.is_empty());

        queue.mark_done(1);
        queue.enqueue(1).await;
        let drained_third = queue.drain().await;
        assert_eq!(drained_third, vec![1]);
    }

    #[tokio::test]
    async fn duplicate_queued_requests_collapse_to_one_entry() {
        let queue = ImmediateQueue::new();
        queue.enqueue(7).await;
        queue.enqueue(7).await;
        let drained = queue.drain().await;
        assert_eq!(drained, vec![7]);
    }

    #[tokio::test]
    async fn drain_caps_at_max_drain_per_tick() {
        let queue = ImmediateQueue::new();
        for id in 0..60 {
            queue.enqueue(id).await;
        }
        let drained = queue.drain().await;
        assert_eq!(drained.len(), MAX_DRAIN);
    }
}
