//! Poll Loop: the engine's only consumer of wall-clock time. Each tick
//! fetches due jobs, drains the immediate-run queue, dispatches both
//! through the same procedure, and sleeps until the next tick or a
//! shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use schedulerd_core::shutdown::ShutdownReceiver;
use schedulerd_store::{Job, JobStore};

use crate::immediate::ImmediateQueue;
use crate::resolver::resolve_next_run;
use crate::sender::Sender;

pub struct PollLoop<S: JobStore> {
    store: Arc<S>,
    sender: Arc<Sender>,
    queue: ImmediateQueue,
    default_tz: String,
    poll_interval: Duration,
    batch: u32,
}

impl<S: JobStore> PollLoop<S> {
    pub fn new(
        store: Arc<S>,
        sender: Arc<Sender>,
        queue: ImmediateQueue,
        default_tz: String,
        poll_interval: Duration,
        batch: u32,
    ) -> Self {
        Self {
            store,
            sender,
            queue,
            default_tz,
            poll_interval,
            batch,
        }
    }

    pub fn queue(&self) -> ImmediateQueue {
        self.queue.clone()
    }

    /// Run ticks until `shutdown` fires.
    pub async fn run(&self, mut shutdown: ShutdownReceiver) {
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "poll tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("poll loop shutting down");
                    return;
                }
            }
        }
    }

    async fn tick(&self) -> schedulerd_core::Result<()> {
        let immediate_ids = self.queue.drain().await;
        for job_id in immediate_ids {
            match self.store.fetch_by_id(job_id).await {
                Ok(Some(job)) => self.dispatch(job).await,
                Ok(None) => tracing::warn!(job_id, "immediate run requested for unknown job"),
                Err(e) => tracing::error!(job_id, error = %e, "failed to fetch immediate job"),
            }
            self.queue.mark_done(job_id);
        }

        let due = self.store.fetch_due(self.batch).await?;
        for job in due {
            self.dispatch(job).await;
        }

        Ok(())
    }

    /// The common dispatch procedure: send, log, and advance or retry
    /// the schedule depending on outcome.
    async fn dispatch(&self, job: Job) {
        let destination = match job.channel_upper().as_str() {
            "HTTP" => job.http_url.clone().unwrap_or_default(),
            "MQTT" => job.mqtt_topic.clone().unwrap_or_default(),
            _ => String::new(),
        };
        let payload_preview = truncate_preview(job.payload.as_deref().unwrap_or(""), 120);

        tracing::info!(
            job_id = job.id,
            name = %job.name,
            channel = %job.channel,
            planned_instant = ?job.next_run_at,
            destination = %destination,
            payload = %payload_preview,
            "dispatching job"
        );

        let outcome = self.sender.send(&job).await;

        if outcome.ok {
            tracing::info!(
                job_id = job.id,
                code = outcome.code,
                detail = %outcome.detail,
                "SUCCESS"
            );
            self.advance_after_success(&job).await;
        } else {
            tracing::warn!(
                job_id = job.id,
                code = outcome.code,
                detail = %outcome.detail,
                "FAILED"
            );
            self.advance_after_failure(&job).await;
        }
    }

    async fn advance_after_success(&self, job: &Job) {
        // Re-read the row before deciding anything: an operator may have
        // edited the schedule mid-dispatch, and both the ONCE-vs-recurring
        // branch and the recomputed next run must reflect that, not the
        // pre-dispatch snapshot.
        let fresh = self.refetch(job).await;

        if fresh.schedule_type_upper() == "ONCE" {
            if let Err(e) = self.store.mark_success(job.id, None, true).await {
                tracing::error!(job_id = job.id, error = %e, "failed to disable exhausted ONCE job");
            }
            tracing::info!(job_id = job.id, "PAUSED (ONCE job exhausted)");
            return;
        }

        let next = resolve_next_run(&fresh, Utc::now(), &self.default_tz);
        self.apply_next_run(job.id, next).await;
    }

    async fn advance_after_failure(&self, job: &Job) {
        if job.max_retries > 0 {
            let retry_at = Utc::now().naive_utc()
                + chrono::Duration::seconds(job.retry_backoff_sec.max(0));
            if let Err(e) = self.store.schedule_retry(job.id, retry_at).await {
                tracing::error!(job_id = job.id, error = %e, "failed to schedule retry");
            }
            tracing::info!(job_id = job.id, next_run_at = %retry_at, "Retry scheduled at");
            return;
        }

        let fresh = self.refetch(job).await;
        let next = resolve_next_run(&fresh, Utc::now(), &self.default_tz);
        self.apply_next_run(job.id, next).await;
    }

    async fn refetch(&self, job: &Job) -> Job {
        match self.store.fetch_by_id(job.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => job.clone(),
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "refetch before resolve failed, using stale row");
                job.clone()
            }
        }
    }

    async fn apply_next_run(&self, job_id: i64, next: Option<NaiveDateTime>) {
        match next {
            Some(at) => tracing::info!(job_id, next_run_at = %at, "Next"),
            None => tracing::info!(job_id, "PAUSED"),
        }
        if let Err(e) = self.store.mark_success(job_id, next, false).await {
            tracing::error!(job_id, error = %e, "failed to record next run");
        }
    }
}

/// Truncate a payload preview for the dispatch header log line. Not the
/// same 500-byte cap the Sender applies to response bodies — this is
/// just enough to identify the message in a log without flooding it.
fn truncate_preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect::<String>() + "…"
}
