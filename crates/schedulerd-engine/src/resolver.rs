//! Recurrence Resolver: a pure function from `(job row, now, default
//! timezone name)` to the next firing instant, or `None`.
//!
//! No ambient clock, no ambient zone, no store access — everything the
//! computation needs comes in as an argument, so it can be exhaustively
//! property-tested with a synthetic `now`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use schedulerd_store::Job;
use std::str::FromStr;

const DAILY_SEARCH_DAYS: i64 = 14;
const WEEKLY_SEARCH_DAYS: i64 = 366;

/// Resolve the next firing instant for `job`, given the true instant
/// `now_utc` and the engine's configured default timezone name. Returns
/// `None` when the job has no resolvable next firing (malformed
/// schedule fields, exhausted ONCE, or no matching weekday within the
/// search window) — callers interpret `None` as "pause this job".
pub fn resolve_next_run(job: &Job, now_utc: DateTime<Utc>, default_tz_name: &str) -> Option<NaiveDateTime> {
    let default_tz = parse_tz(default_tz_name).unwrap_or(chrono_tz::UTC);
    let job_tz_name = job
        .timezone
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_tz_name);
    let job_tz = parse_tz(job_tz_name).unwrap_or(default_tz);

    let now_job = now_utc.with_timezone(&job_tz);

    match job.schedule_type_upper().as_str() {
        "ONCE" => resolve_once(job, now_job, job_tz, default_tz),
        "DAILY" => {
            let times = parse_times(job);
            if times.is_empty() {
                return None;
            }
            resolve_daily(&times, now_job, job_tz, default_tz)
        }
        "WEEKLY" => {
            let times = parse_times(job);
            if times.is_empty() {
                return None;
            }
            let days = parse_days(job.days_of_week.as_deref());
            if days.is_empty() {
                return None;
            }
            resolve_weekly(&times, &days, now_job, job_tz, default_tz)
        }
        _ => None,
    }
}

fn parse_tz(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Tz::from_str(name).ok()
}

fn resolve_once(
    job: &Job,
    now_job: DateTime<Tz>,
    job_tz: Tz,
    default_tz: Tz,
) -> Option<NaiveDateTime> {
    let run_at = job.run_at?;
    let run = job_tz.from_local_datetime(&run_at).single()?;
    if run <= now_job {
        return None;
    }
    Some(run.with_timezone(&default_tz).naive_local())
}

fn resolve_daily(
    times: &[NaiveTime],
    now_job: DateTime<Tz>,
    job_tz: Tz,
    default_tz: Tz,
) -> Option<NaiveDateTime> {
    let today = now_job.date_naive();
    for day_offset in 0..DAILY_SEARCH_DAYS {
        let date = today + Duration::days(day_offset);
        for time in times {
            if let Some(candidate) = local_datetime(job_tz, date, *time) {
                if candidate > now_job {
                    return Some(candidate.with_timezone(&default_tz).naive_local());
                }
            }
        }
    }
    None
}

fn resolve_weekly(
    times: &[NaiveTime],
    days: &[Weekday],
    now_job: DateTime<Tz>,
    job_tz: Tz,
    default_tz: Tz,
) -> Option<NaiveDateTime> {
    let today = now_job.date_naive();
    for day_offset in 0..WEEKLY_SEARCH_DAYS {
        let date = today + Duration::days(day_offset);
        if !days.contains(&date.weekday()) {
            continue;
        }
        let mut best: Option<DateTime<Tz>> = None;
        for time in times {
            if let Some(candidate) = local_datetime(job_tz, date, *time) {
                if candidate > now_job && best.map(|b| candidate < b).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }
        if let Some(candidate) = best {
            return Some(candidate.with_timezone(&default_tz).naive_local());
        }
    }
    None
}

fn local_datetime(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(time)).single()
}

/// Parse `times_of_day` (preferred) or `time_of_day` (legacy fallback)
/// into a deduplicated, ascending-sorted list. Accepts `HH:MM` or
/// `HH:MM:SS`; a bare `HH:MM` token is zero-padded to `HH:MM:00`.
fn parse_times(job: &Job) -> Vec<NaiveTime> {
    let mut raw: Vec<&str> = Vec::new();
    if let Some(csv) = job.times_of_day.as_deref() {
        let trimmed = csv.trim();
        if !trimmed.is_empty() {
            raw.extend(trimmed.split(',').map(str::trim).filter(|s| !s.is_empty()));
        }
    }
    if raw.is_empty() {
        if let Some(single) = job.time_of_day.as_deref() {
            let trimmed = single.trim();
            if !trimmed.is_empty() {
                raw.push(trimmed);
            }
        }
    }

    let mut times: Vec<NaiveTime> = raw.iter().filter_map(|s| parse_time_of_day(s)).collect();
    times.sort();
    times.dedup();
    times
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    let normalized = if s.len() == 5 {
        format!("{s}:00")
    } else {
        s.to_string()
    };
    NaiveTime::parse_from_str(&normalized, "%H:%M:%S").ok()
}

/// Parse `days_of_week` — a CSV of weekday tokens, accepting both
/// three-letter short forms and full English names, case-insensitively.
/// Unknown tokens are dropped silently.
fn parse_days(raw: Option<&str>) -> Vec<Weekday> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut days: Vec<Weekday> = raw
        .split(',')
        .filter_map(|token| weekday_from_token(token.trim()))
        .collect();
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    days
}

fn weekday_from_token(token: &str) -> Option<Weekday> {
    if token.is_empty() {
        return None;
    }
    match token.to_uppercase().as_str() {
        "MON" | "MONDAY" => Some(Weekday::Mon),
        "TUE" | "TUESDAY" => Some(Weekday::Tue),
        "WED" | "WEDNESDAY" => Some(Weekday::Wed),
        "THU" | "THURSDAY" => Some(Weekday::Thu),
        "FRI" | "FRIDAY" => Some(Weekday::Fri),
        "SAT" | "SATURDAY" => Some(Weekday::Sat),
        "SUN" | "SUNDAY" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedulerd_store::testing::{job_fixture, JobFixtureExt};

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn resolver_is_pure() {
        let job = job_fixture(1)
            .with_schedule_type("DAILY")
            .with_times_of_day("08:00,20:00");
        let now = utc(2026, 1, 1, 0, 0, 0);
        let a = resolve_next_run(&job, now, "UTC");
        let b = resolve_next_run(&job, now, "UTC");
        assert_eq!(a, b);
    }

    #[test]
    fn resolved_instant_is_strictly_after_now() {
        let job = job_fixture(1)
            .with_schedule_type("DAILY")
            .with_times_of_day("08:00,20:00");
        let now = utc(2026, 1, 1, 7, 59, 30);
        let next = resolve_next_run(&job, now, "UTC").unwrap();
        assert!(next > now.naive_utc());
    }

    #[test]
    fn daily_two_slots_fires_the_earlier_then_later_one() {
        let job = job_fixture(1)
            .with_schedule_type("DAILY")
            .with_times_of_day("08:00,20:00")
            .with_timezone("UTC");
        let now = utc(2026, 1, 1, 7, 59, 30);
        let next = resolve_next_run(&job, now, "UTC").unwrap();
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn weekly_picks_next_matching_weekday() {
        let job = job_fixture(1)
            .with_schedule_type("WEEKLY")
            .with_days_of_week("Mon,Wed,Fri")
            .with_times_of_day("10:00")
            .with_timezone("UTC");
        // Tuesday 2026-01-06 11:00 UTC
        let now = utc(2026, 1, 6, 11, 0, 0);
        let next = resolve_next_run(&job, now, "UTC").unwrap();
        // Next Wednesday 2026-01-07 10:00
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 1, 7).unwrap().and_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn weekly_timezone_conversion_across_midnight() {
        // Friday 23:59:59 Asia/Taipei, job wants Saturday 09:00 Asia/Taipei.
        let job = job_fixture(1)
            .with_schedule_type("WEEKLY")
            .with_days_of_week("Sat")
            .with_times_of_day("09:00")
            .with_timezone("Asia/Taipei");
        // Friday 2026-01-02 23:59:59 Asia/Taipei == Friday 15:59:59 UTC.
        let now = utc(2026, 1, 2, 15, 59, 59);
        let next = resolve_next_run(&job, now, "Asia/Taipei").unwrap();
        // Saturday 2026-01-03 09:00 Asia/Taipei == 01:00 UTC, and the
        // default/engine tz here is Asia/Taipei too, so the stored naive
        // value is in Taipei local time.
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 1, 3).unwrap().and_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn once_job_exhausted_yields_none() {
        let job = job_fixture(1).with_schedule_type("ONCE");
        let mut job = job;
        job.run_at = Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
        let now = utc(2026, 1, 1, 0, 0, 0);
        assert_eq!(resolve_next_run(&job, now, "UTC"), None);
    }

    #[test]
    fn daily_with_empty_times_yields_none() {
        let job = job_fixture(1).with_schedule_type("DAILY");
        let now = utc(2026, 1, 1, 0, 0, 0);
        assert_eq!(resolve_next_run(&job, now, "UTC"), None);
    }

    #[test]
    fn weekly_with_no_matching_weekday_yields_none() {
        let job = job_fixture(1)
            .with_schedule_type("WEEKLY")
            .with_times_of_day("10:00")
            .with_days_of_week("Xyz");
        let now = utc(2026, 1, 1, 0, 0, 0);
        assert_eq!(resolve_next_run(&job, now, "UTC"), None);
    }

    #[test]
    fn time_of_day_legacy_fallback_is_used_when_times_of_day_empty() {
        let mut job = job_fixture(1).with_schedule_type("DAILY");
        job.time_of_day = Some("08:00".to_string());
        let now = utc(2026, 1, 1, 0, 0, 0);
        let next = resolve_next_run(&job, now, "UTC").unwrap();
        assert_eq!(next.time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn days_of_week_accepts_mixed_case_and_full_names() {
        let days = parse_days(Some("monday, WED, Fri"));
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    }

    #[test]
    fn unknown_weekday_tokens_are_dropped_silently() {
        let days = parse_days(Some("Mon,Blursday,Fri"));
        assert_eq!(days, vec![Weekday::Mon, Weekday::Fri]);
    }
}
