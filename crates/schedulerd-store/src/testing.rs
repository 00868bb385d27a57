//! Builder for constructing `Job` fixtures in tests without repeating all
//! twenty-odd fields every time.

use chrono::NaiveDateTime;

use crate::job::Job;

pub fn job_fixture(id: i64) -> Job {
    Job {
        id,
        name: format!("job-{id}"),
        enabled: true,
        schedule_type: "DAILY".to_string(),
        run_at: None,
        times_of_day: None,
        time_of_day: None,
        days_of_week: None,
        timezone: None,
        channel: "HTTP".to_string(),
        http_url: Some("http://example.invalid/webhook".to_string()),
        http_method: "POST".to_string(),
        http_headers_json: None,
        content_type: "text/plain".to_string(),
        payload: Some("ping".to_string()),
        mqtt_topic: None,
        qos: 0,
        retained: false,
        timeout_sec: 10,
        max_retries: 0,
        retry_backoff_sec: 60,
        next_run_at: None,
        last_run_at: None,
    }
}

pub trait JobFixtureExt {
    fn with_next_run_at(self, at: NaiveDateTime) -> Self;
    fn with_schedule_type(self, t: &str) -> Self;
    fn with_times_of_day(self, csv: &str) -> Self;
    fn with_days_of_week(self, csv: &str) -> Self;
    fn with_timezone(self, tz: &str) -> Self;
    fn with_max_retries(self, n: i64) -> Self;
}

impl JobFixtureExt for Job {
    fn with_next_run_at(mut self, at: NaiveDateTime) -> Self {
        self.next_run_at = Some(at);
        self
    }

    fn with_schedule_type(mut self, t: &str) -> Self {
        self.schedule_type = t.to_string();
        self
    }

    fn with_times_of_day(mut self, csv: &str) -> Self {
        self.times_of_day = Some(csv.to_string());
        self
    }

    fn with_days_of_week(mut self, csv: &str) -> Self {
        self.days_of_week = Some(csv.to_string());
        self
    }

    fn with_timezone(mut self, tz: &str) -> Self {
        self.timezone = Some(tz.to_string());
        self
    }

    fn with_max_retries(mut self, n: i64) -> Self {
        self.max_retries = n;
        self
    }
}
