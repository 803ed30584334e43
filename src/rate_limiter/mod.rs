//! Rate Limiter (C11): per-user daily caps on automated submissions,
//! reset at UTC midnight. `Assisted` mode is never limited — the human
//! is already in the loop for every action.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::model::ExecutionMode;

#[derive(Debug, Error)]
#[error("rate limit exceeded: {limit} applications per day ({period}), resets at {reset_at}")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub period: &'static str,
    pub reset_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DailyCounts {
    day: Option<NaiveDate>,
    total_automated: u32,
    auto_only: u32,
}

impl DailyCounts {
    fn rolled_over(self, today: NaiveDate) -> Self {
        if self.day == Some(today) {
            self
        } else {
            Self { day: Some(today), total_automated: 0, auto_only: 0 }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageReport {
    pub total_automated_today: u32,
    pub max_automated_per_day: u32,
    pub auto_mode_today: u32,
    pub max_auto_per_day: u32,
    pub resets_at: chrono::DateTime<Utc>,
}

/// Enforces `max_applications_per_day` (SemiAuto + Auto combined) and
/// `max_auto_applications_per_day` (Auto only), per user, lock-free via
/// `DashMap`.
pub struct RateLimiter {
    counts: DashMap<Uuid, DailyCounts>,
    max_applications_per_day: u32,
    max_auto_applications_per_day: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_applications_per_day: u32, max_auto_applications_per_day: u32) -> Self {
        Self { counts: DashMap::new(), max_applications_per_day, max_auto_applications_per_day }
    }

    fn tomorrow_start() -> chrono::DateTime<Utc> {
        let today = Utc::now().date_naive();
        (today + chrono::Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc()
    }

    /// Check whether `user_id` may submit another application in `mode`
    /// right now, without recording anything.
    pub fn check(&self, user_id: Uuid, mode: ExecutionMode) -> Result<(), RateLimitExceeded> {
        if mode == ExecutionMode::Assisted {
            return Ok(());
        }
        let today = Utc::now().date_naive();
        let counts = self.counts.entry(user_id).or_default().rolled_over(today);

        if counts.total_automated >= self.max_applications_per_day {
            return Err(RateLimitExceeded {
                limit: self.max_applications_per_day,
                period: "day",
                reset_at: Self::tomorrow_start(),
            });
        }
        if mode == ExecutionMode::Auto && counts.auto_only >= self.max_auto_applications_per_day {
            return Err(RateLimitExceeded {
                limit: self.max_auto_applications_per_day,
                period: "day (auto mode)",
                reset_at: Self::tomorrow_start(),
            });
        }
        Ok(())
    }

    /// Record one submitted application against today's count. Call only
    /// after a successful submission — checking and recording are
    /// separate so the pipeline can retry without double-counting.
    pub fn record_submission(&self, user_id: Uuid, mode: ExecutionMode) {
        if mode == ExecutionMode::Assisted {
            return;
        }
        let today = Utc::now().date_naive();
        let mut entry = self.counts.entry(user_id).or_default();
        *entry = entry.rolled_over(today);
        entry.total_automated += 1;
        if mode == ExecutionMode::Auto {
            entry.auto_only += 1;
        }
    }

    #[must_use]
    pub fn usage(&self, user_id: Uuid) -> UsageReport {
        let today = Utc::now().date_naive();
        let counts = self.counts.get(&user_id).map(|c| c.rolled_over(today)).unwrap_or_default();
        UsageReport {
            total_automated_today: counts.total_automated,
            max_automated_per_day: self.max_applications_per_day,
            auto_mode_today: counts.auto_only,
            max_auto_per_day: self.max_auto_applications_per_day,
            resets_at: Self::tomorrow_start(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assisted_mode_is_never_limited() {
        let limiter = RateLimiter::new(1, 1);
        let user = Uuid::new_v4();
        limiter.record_submission(user, ExecutionMode::Assisted);
        limiter.record_submission(user, ExecutionMode::Assisted);
        assert!(limiter.check(user, ExecutionMode::Assisted).is_ok());
    }

    #[test]
    fn combined_daily_cap_blocks_semi_auto_after_limit() {
        let limiter = RateLimiter::new(2, 5);
        let user = Uuid::new_v4();
        limiter.record_submission(user, ExecutionMode::SemiAuto);
        limiter.record_submission(user, ExecutionMode::SemiAuto);
        assert!(limiter.check(user, ExecutionMode::SemiAuto).is_err());
    }

    #[test]
    fn auto_only_cap_is_tighter_than_combined_cap() {
        let limiter = RateLimiter::new(10, 1);
        let user = Uuid::new_v4();
        limiter.record_submission(user, ExecutionMode::Auto);
        assert!(limiter.check(user, ExecutionMode::Auto).is_err());
        assert!(limiter.check(user, ExecutionMode::SemiAuto).is_ok());
    }
}
