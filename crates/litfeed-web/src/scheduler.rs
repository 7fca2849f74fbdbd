//! Cron-style scheduler driving unattended feed runs.
//!
//! The loop re-reads the live configuration every cycle, so schedule changes
//! made through the config endpoint take effect without a restart. The cron
//! expression is the classic 5-field form: minute hour day-of-month month
//! day-of-week, supporting `*`, numbers, comma lists, ranges and `*/n` steps.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use tracing::{info, warn};

use litfeed_common::CancelFlag;
use litfeed_ingestion::pipeline::{run_feed, SearchJob};
use litfeed_ingestion::sources::pubmed::PubMedClient;
use litfeed_llm::{ContentGenerator, OpenAiCompatibleBackend, QueryGenerator};
use litfeed_report::ReportAssembler;

use crate::state::SharedState;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

// ── Cron expression ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CronField {
    any: bool,
    values: BTreeSet<u32>,
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        self.any || self.values.contains(&value)
    }
}

#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: CronField, // 0-59
    hour: CronField,   // 0-23
    dom: CronField,    // 1-31
    month: CronField,  // 1-12
    dow: CronField,    // 0-6, Sunday = 0 (7 accepted as Sunday)
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 cron fields, got {}", fields.len()));
        }
        Ok(Self {
            minute: parse_field(fields[0], 0, 59, false)?,
            hour: parse_field(fields[1], 0, 23, false)?,
            dom: parse_field(fields[2], 1, 31, false)?,
            month: parse_field(fields[3], 1, 12, false)?,
            dow: parse_field(fields[4], 0, 7, true)?,
        })
    }

    pub fn matches(&self, t: NaiveDateTime) -> bool {
        if !self.minute.contains(t.minute())
            || !self.hour.contains(t.hour())
            || !self.month.contains(t.month())
        {
            return false;
        }
        let dom_ok = self.dom.contains(t.day());
        let dow_ok = self.dow.contains(t.weekday().num_days_from_sunday());
        // Standard cron: when both day fields are restricted, either matching
        // day fires the job.
        match (self.dom.any, self.dow.any) {
            (false, false) => dom_ok || dow_ok,
            (false, true) => dom_ok,
            (true, false) => dow_ok,
            (true, true) => true,
        }
    }

    /// First matching minute strictly after `from`, searched up to a year out.
    pub fn next_after(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = from
            .with_second(0)?
            .with_nanosecond(0)?
            + chrono::Duration::minutes(1);
        for _ in 0..(366 * 24 * 60) {
            if self.matches(t) {
                return Some(t);
            }
            t += chrono::Duration::minutes(1);
        }
        None
    }
}

fn parse_field(spec: &str, min: u32, max: u32, is_dow: bool) -> Result<CronField, String> {
    if spec == "*" {
        return Ok(CronField { any: true, values: BTreeSet::new() });
    }
    let mut values = BTreeSet::new();
    for part in spec.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| format!("bad step in {part:?}"))?;
                if step == 0 {
                    return Err(format!("zero step in {part:?}"));
                }
                (r, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let a: u32 = a.parse().map_err(|_| format!("bad range in {part:?}"))?;
            let b: u32 = b.parse().map_err(|_| format!("bad range in {part:?}"))?;
            (a, b)
        } else {
            let v: u32 = range_part.parse().map_err(|_| format!("bad value in {part:?}"))?;
            (v, v)
        };
        if start < min || end > max || start > end {
            return Err(format!("value out of range in {part:?} ({min}-{max})"));
        }
        let mut v = start;
        while v <= end {
            // dow 7 is an alias for Sunday
            values.insert(if is_dow && v == 7 { 0 } else { v });
            v += step;
        }
    }
    Ok(CronField { any: false, values })
}

// ── Scheduler loop ────────────────────────────────────────────────────────────

/// Run until cancelled. Sleeps in short cycles so config edits and shutdown
/// are picked up promptly.
pub async fn run_scheduler(state: SharedState, cancel: CancelFlag) {
    info!("Scheduler started");
    while !cancel.is_cancelled() {
        let schedule = state.config.read().await.pubmed.schedule.clone();
        let Some(expr) = schedule.filter(|s| !s.trim().is_empty()) else {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        };
        let cron = match CronSchedule::parse(&expr) {
            Ok(cron) => cron,
            Err(e) => {
                warn!(expr = %expr, error = %e, "Invalid cron expression, scheduler idle");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let now = Local::now().naive_local();
        let Some(next) = cron.next_after(now) else {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        };
        let until = (next - now).to_std().unwrap_or_default();

        if until <= POLL_INTERVAL {
            tokio::time::sleep(until).await;
            if cancel.is_cancelled() {
                break;
            }
            info!(schedule = %expr, "Running scheduled search");
            if let Err(e) = run_scheduled_feed(&state, &cancel).await {
                warn!(error = %e, "Scheduled search failed");
            }
        } else {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
    info!("Scheduler stopped");
}

async fn run_scheduled_feed(state: &SharedState, cancel: &CancelFlag) -> litfeed_common::Result<()> {
    let config = state.config.read().await.clone();
    if config.interests.is_empty() {
        info!("No interests configured, skipping scheduled run");
        return Ok(());
    }

    let job = SearchJob {
        interests: config.interests.clone(),
        raw_query: None,
        since_days: config.pubmed.clamped_days(),
        max_results: config.pubmed.clamped_max_results(),
    };
    let backend = Arc::new(OpenAiCompatibleBackend::from_config(&config.llm));
    let querygen = QueryGenerator::new(backend.clone());
    let content = ContentGenerator::new(backend);
    let client = PubMedClient::from_config(&config.pubmed);
    let assembler = ReportAssembler::new(&config.storage.reports_dir);

    let (outcome, report) = run_feed(
        &job,
        &state.store,
        &querygen,
        &content,
        &client,
        &assembler,
        cancel,
        Some(&state.event_tx),
    )
    .await?;

    info!(
        total_found = outcome.total_found,
        new = outcome.new_articles.len(),
        report_id = report.as_ref().map(|r| r.id.as_str()).unwrap_or("none"),
        "Scheduled run complete"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_at_seven() {
        let cron = CronSchedule::parse("0 7 * * *").unwrap();
        let next = cron.next_after(at(2026, 8, 7, 6, 30)).unwrap();
        assert_eq!(next, at(2026, 8, 7, 7, 0));
        // Already past 07:00, rolls to the next day
        let next = cron.next_after(at(2026, 8, 7, 7, 0)).unwrap();
        assert_eq!(next, at(2026, 8, 8, 7, 0));
    }

    #[test]
    fn test_step_field() {
        let cron = CronSchedule::parse("*/15 * * * *").unwrap();
        assert!(cron.matches(at(2026, 8, 7, 10, 0)));
        assert!(cron.matches(at(2026, 8, 7, 10, 45)));
        assert!(!cron.matches(at(2026, 8, 7, 10, 7)));
    }

    #[test]
    fn test_range_and_list() {
        let cron = CronSchedule::parse("0 9-17 * * 1,3,5").unwrap();
        // 2026-08-07 is a Friday (dow 5)
        assert!(cron.matches(at(2026, 8, 7, 9, 0)));
        assert!(!cron.matches(at(2026, 8, 7, 18, 0)));
        // 2026-08-08 is a Saturday
        assert!(!cron.matches(at(2026, 8, 8, 9, 0)));
    }

    #[test]
    fn test_dow_seven_is_sunday() {
        let cron = CronSchedule::parse("0 0 * * 7").unwrap();
        // 2026-08-09 is a Sunday
        assert!(cron.matches(at(2026, 8, 9, 0, 0)));
    }

    #[test]
    fn test_invalid_expressions_rejected() {
        assert!(CronSchedule::parse("0 7 * *").is_err());
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
    }

    #[test]
    fn test_next_after_skips_to_month() {
        let cron = CronSchedule::parse("0 0 1 9 *").unwrap();
        let next = cron.next_after(at(2026, 8, 7, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 9, 1, 0, 0));
    }
}
