//! Trial bookkeeping: parsing the stored trial end and computing the
//! countdown shown on the profile page.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// Parse the `trial_ends_at` text of a profile.
///
/// Accepts RFC 3339, Postgres-style `YYYY-MM-DD HH:MM:SS+00`, naive
/// `YYYY-MM-DDTHH:MM:SS` (read as UTC) and bare dates (UTC midnight).
pub fn parse_trial_end(raw: &str) -> ResultEngine<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(EngineError::MalformedRow(format!(
        "invalid trial_ends_at: {raw}"
    )))
}

/// Snapshot of a user's trial and subscription standing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStatus {
    pub is_trial_active: bool,
    pub is_subscription_active: bool,
    pub is_admin: bool,
    pub has_access: bool,
    pub days_remaining: i64,
    pub hours_remaining: i64,
    pub minutes_remaining: i64,
    pub trial_ends_at: DateTime<Utc>,
}

impl TrialStatus {
    pub fn compute(
        trial_ends_at: DateTime<Utc>,
        is_admin: bool,
        is_subscription_active: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let is_trial_active = trial_ends_at > now;
        let remaining = if is_trial_active {
            trial_ends_at - now
        } else {
            chrono::Duration::zero()
        };

        Self {
            is_trial_active,
            is_subscription_active,
            is_admin,
            has_access: is_admin || is_subscription_active || is_trial_active,
            days_remaining: remaining.num_days(),
            hours_remaining: remaining.num_hours() % 24,
            minutes_remaining: remaining.num_minutes() % 60,
            trial_ends_at,
        }
    }
}
