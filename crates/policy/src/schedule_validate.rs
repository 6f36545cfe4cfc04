// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule-intent validation and next-fire computation (spec §4.5.5).
//! Cron expressions are parsed with the `cron` crate; `time_zone` (when set)
//! must resolve to a valid IANA zone via `chrono-tz`.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use gwd_core::intent::IntentSchedule;

#[derive(Debug, Error)]
pub enum ScheduleValidationError {
    #[error("invalid cron expression {expression:?}: {source}")]
    InvalidCron {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
    #[error("unknown IANA time zone {0:?}")]
    UnknownTimeZone(String),
}

/// Validate an [`IntentSchedule`] without computing a fire time. Used when
/// an intent is created or updated (spec §4.5.1 `IntentCreated`/
/// `IntentUpdated`), so a malformed schedule is rejected before it is
/// written to the event log.
pub fn validate(schedule: &IntentSchedule) -> Result<(), ScheduleValidationError> {
    match schedule {
        IntentSchedule::RunAt { .. } => Ok(()),
        IntentSchedule::Cron {
            expression,
            time_zone,
        } => {
            parse_cron(expression)?;
            if let Some(tz) = time_zone {
                resolve_tz(tz)?;
            }
            Ok(())
        }
    }
}

/// The next fire time strictly after `after_ms`, or `None` if the schedule
/// will never fire again (a `RunAt` schedule already in the past).
pub fn next_fire_at_ms(
    schedule: &IntentSchedule,
    after_ms: i64,
) -> Result<Option<i64>, ScheduleValidationError> {
    match schedule {
        IntentSchedule::RunAt { run_at_ms } => {
            Ok((*run_at_ms > after_ms).then_some(*run_at_ms))
        }
        IntentSchedule::Cron {
            expression,
            time_zone,
        } => {
            let parsed = parse_cron(expression)?;
            let tz = match time_zone {
                Some(tz) => resolve_tz(tz)?,
                None => Tz::UTC,
            };

            let after: DateTime<Tz> = tz
                .from_utc_datetime(&naive_from_millis(after_ms));
            let next = parsed.after(&after).next();
            Ok(next.map(|dt| dt.with_timezone(&Utc).timestamp_millis()))
        }
    }
}

fn parse_cron(expression: &str) -> Result<cron::Schedule, ScheduleValidationError> {
    cron::Schedule::from_str(expression).map_err(|source| ScheduleValidationError::InvalidCron {
        expression: expression.to_string(),
        source,
    })
}

fn resolve_tz(time_zone: &str) -> Result<Tz, ScheduleValidationError> {
    Tz::from_str(time_zone).map_err(|_| ScheduleValidationError::UnknownTimeZone(time_zone.to_string()))
}

fn naive_from_millis(ms: i64) -> chrono::NaiveDateTime {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is valid"))
        .naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_at_in_the_future_fires_once() {
        let schedule = IntentSchedule::RunAt { run_at_ms: 10_000 };
        assert_eq!(next_fire_at_ms(&schedule, 0).expect("ok"), Some(10_000));
        assert_eq!(next_fire_at_ms(&schedule, 20_000).expect("ok"), None);
    }

    #[test]
    fn valid_cron_expression_computes_next_fire() {
        let schedule = IntentSchedule::Cron {
            expression: "0 0 * * * *".to_string(),
            time_zone: None,
        };
        validate(&schedule).expect("valid");
        let next = next_fire_at_ms(&schedule, 0).expect("ok");
        assert!(next.is_some());
    }

    #[test]
    fn malformed_cron_expression_is_rejected() {
        let schedule = IntentSchedule::Cron {
            expression: "not a cron expr".to_string(),
            time_zone: None,
        };
        assert!(matches!(
            validate(&schedule),
            Err(ScheduleValidationError::InvalidCron { .. })
        ));
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let schedule = IntentSchedule::Cron {
            expression: "0 0 * * * *".to_string(),
            time_zone: Some("Not/AZone".to_string()),
        };
        assert!(matches!(
            validate(&schedule),
            Err(ScheduleValidationError::UnknownTimeZone(_))
        ));
    }

    #[test]
    fn named_time_zone_resolves() {
        let schedule = IntentSchedule::Cron {
            expression: "0 0 12 * * *".to_string(),
            time_zone: Some("America/New_York".to_string()),
        };
        validate(&schedule).expect("valid");
    }
}
