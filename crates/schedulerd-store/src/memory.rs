//! In-memory `JobStore` fake for tests that don't need a live MySQL
//! instance — the Poll Loop, the Resolver integration tests, and the
//! control-plane interlock tests all run against this.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use schedulerd_core::error::Result;

use crate::gateway::JobStore;
use crate::job::Job;

pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
        }
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch_due(&self, batch: u32) -> Result<Vec<Job>> {
        let now = chrono::Local::now().naive_local();
        let mut due: Vec<Job> = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.enabled && j.next_run_at.map(|t| t <= now).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        due.truncate(batch as usize);
        Ok(due)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<Job>> {
        Ok(self.jobs.lock().iter().find(|j| j.id == id).cloned())
    }

    async fn mark_success(
        &self,
        id: i64,
        next_run_at: Option<NaiveDateTime>,
        disable: bool,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.last_run_at = Some(chrono::Local::now().naive_local());
            if disable {
                job.enabled = false;
            } else if let Some(next) = next_run_at {
                job.next_run_at = Some(next);
                job.enabled = true;
            } else {
                job.enabled = false;
            }
        }
        Ok(())
    }

    async fn schedule_retry(&self, id: i64, at: NaiveDateTime) -> Result<()> {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.next_run_at = Some(at);
            job.last_run_at = Some(chrono::Local::now().naive_local());
        }
        Ok(())
    }
}
