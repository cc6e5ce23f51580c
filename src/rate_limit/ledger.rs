//! Persisted request log and the window arithmetic over it.

use serde::{Deserialize, Serialize};

use super::{LimitType, PerTier, RateLimitConfig, RateLimitStatus, TierLimit, UsageStats};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// One attempted outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub endpoint: String,
}

/// Append-only request log plus the instant the daily window rolls over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitLedger {
    pub requests: Vec<RequestLog>,
    pub daily_reset_timestamp: i64,
}

impl RateLimitLedger {
    /// Empty ledger whose daily window ends one window after `now`.
    pub fn new(now: i64, daily_window_ms: i64) -> Self {
        Self { requests: Vec::new(), daily_reset_timestamp: now.saturating_add(daily_window_ms) }
    }

    /// Fixed-window daily rollover. Returns `true` if the log was reset.
    pub fn roll_daily(&mut self, now: i64, daily_window_ms: i64) -> bool {
        if now < self.daily_reset_timestamp {
            return false;
        }
        self.requests.clear();
        self.daily_reset_timestamp = now.saturating_add(daily_window_ms);
        true
    }

    /// Drop entries at or before `now - window_ms`. Returns `true` if anything was removed.
    pub fn prune(&mut self, now: i64, window_ms: i64) -> bool {
        let cutoff = now.saturating_sub(window_ms);
        let before = self.requests.len();
        self.requests.retain(|r| r.timestamp > cutoff);
        self.requests.len() != before
    }

    /// Append an entry at `now`.
    pub fn push(&mut self, now: i64, endpoint: &str) {
        self.requests.push(RequestLog { timestamp: now, endpoint: endpoint.to_string() });
    }

    fn within(&self, now: i64, window_ms: i64) -> impl Iterator<Item = &RequestLog> {
        let cutoff = now.saturating_sub(window_ms);
        self.requests.iter().filter(move |r| r.timestamp > cutoff)
    }

    /// Entries strictly newer than `now - window_ms`.
    pub fn count_within(&self, now: i64, window_ms: i64) -> usize {
        self.within(now, window_ms).count()
    }

    fn oldest_within(&self, now: i64, window_ms: i64) -> Option<i64> {
        self.within(now, window_ms).map(|r| r.timestamp).min()
    }

    /// Evaluate every tier, treating `in_flight` admitted-but-unrecorded calls as made at `now`.
    ///
    /// Tiers are checked burst, then short-term, then daily; the first exhausted one decides the
    /// denial so the caller sees the most immediately actionable wait.
    pub fn evaluate(&self, config: &RateLimitConfig, now: i64, in_flight: usize) -> RateLimitStatus {
        let sliding = |limit: TierLimit| {
            let window = limit.window_ms();
            let count = self.count_within(now, window) + in_flight;
            let oldest = self.oldest_within(now, window).or((in_flight > 0).then_some(now));
            let reset = oldest.map(|t| t.saturating_add(window)).unwrap_or(0);
            (count, reset)
        };

        let (burst_count, burst_reset) = sliding(config.burst());
        let (short_count, short_reset) = sliding(config.short_term());
        let daily_count = self.count_within(now, config.daily().window_ms()) + in_flight;

        let counts = PerTier { burst: burst_count, short_term: short_count, daily: daily_count };
        let reset_times = PerTier {
            burst: burst_reset,
            short_term: short_reset,
            daily: self.daily_reset_timestamp,
        };
        let limits = PerTier {
            burst: config.burst().max_requests,
            short_term: config.short_term().max_requests,
            daily: config.daily().max_requests,
        };
        let remaining = |tier: LimitType| {
            let used = u32::try_from(counts.get(tier)).unwrap_or(u32::MAX);
            limits.get(tier).saturating_sub(used)
        };

        let limit_type = [LimitType::Burst, LimitType::ShortTerm, LimitType::Daily]
            .into_iter()
            .find(|tier| counts.get(*tier) >= limits.get(*tier) as usize);

        let next_reset_time = match limit_type {
            Some(tier) => reset_times.get(tier),
            None => [reset_times.burst, reset_times.short_term, reset_times.daily]
                .into_iter()
                .filter(|t| *t > 0)
                .min()
                .unwrap_or(0),
        };

        RateLimitStatus {
            can_make_request: limit_type.is_none(),
            limit_type,
            remaining_requests: PerTier {
                burst: remaining(LimitType::Burst),
                short_term: remaining(LimitType::ShortTerm),
                daily: remaining(LimitType::Daily),
            },
            reset_times,
            next_reset_time,
            checked_at: now,
        }
    }

    /// Today/hour/minute counts and a per-day average over the whole log.
    pub fn usage(&self, now: i64, daily_window_ms: i64) -> UsageStats {
        let oldest = self.requests.iter().map(|r| r.timestamp).min().unwrap_or(now);
        let days = (now.saturating_sub(oldest) as f64 / daily_window_ms.max(1) as f64).max(1.0);
        let average = self.requests.len() as f64 / days;

        UsageStats {
            total_requests_today: self.count_within(now, daily_window_ms),
            requests_in_last_hour: self.count_within(now, HOUR_MS),
            requests_in_last_minute: self.count_within(now, MINUTE_MS),
            average_requests_per_day: (average * 100.0).round() / 100.0,
        }
    }
}
