//! The persisted `schedule_jobs` row and its well-typed view.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row of `schedule_jobs`.
///
/// Enum-like text columns (`schedule_type`, `channel`, `http_method`) are
/// kept as raw strings here and normalized (uppercased, matched
/// case-insensitively) by the Resolver and Sender — the row-mapping layer
/// never rejects a row for an unrecognized value.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub schedule_type: String,
    pub run_at: Option<NaiveDateTime>,
    pub times_of_day: Option<String>,
    pub time_of_day: Option<String>,
    pub days_of_week: Option<String>,
    pub timezone: Option<String>,
    pub channel: String,
    pub http_url: Option<String>,
    pub http_method: String,
    pub http_headers_json: Option<String>,
    pub content_type: String,
    pub payload: Option<String>,
    pub mqtt_topic: Option<String>,
    pub qos: i32,
    pub retained: bool,
    pub timeout_sec: i64,
    pub max_retries: i64,
    pub retry_backoff_sec: i64,
    pub next_run_at: Option<NaiveDateTime>,
    pub last_run_at: Option<NaiveDateTime>,
}

impl Job {
    pub fn schedule_type_upper(&self) -> String {
        self.schedule_type.trim().to_uppercase()
    }

    pub fn channel_upper(&self) -> String {
        self.channel.trim().to_uppercase()
    }

    pub fn http_method_upper(&self) -> String {
        self.http_method.trim().to_uppercase()
    }
}
