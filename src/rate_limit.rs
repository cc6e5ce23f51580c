//! Client-side rate limiting for outbound chat calls.
//!
//! This module provides the building blocks:
//! - [`RateLimiter`]: the seam the gateway middleware talks to.
//! - [`TieredRateLimiter`]: three overlapping windows (burst, short-term, daily) evaluated in
//!   severity order, backed by a ledger persisted through a [`KeyValueStore`](crate::kv::KeyValueStore).
//! - [`RateLimitLayer`]: Tower middleware that checks, times out, calls, and records.
//!
//! # Accounting
//!
//! Burst and short-term tiers are sliding windows over the request log. The daily tier is a
//! fixed window that rolls over at a stored instant: once `now` reaches it the log is emptied
//! and the next rollover is scheduled a full window later.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RateLimitError, StoreError};

pub mod config;
pub mod ledger;
pub mod middleware;
pub mod tiered;

pub use config::{RateLimitConfig, TierLimit};
pub use ledger::{RateLimitLedger, RequestLog};
pub use middleware::{RateLimitLayer, RateLimitService};
pub use tiered::TieredRateLimiter;

/// Endpoint used when callers do not name one.
pub const DEFAULT_ENDPOINT: &str = "/chat";

/// Which window refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// Seconds-scale window.
    Burst,
    /// Minute-scale window.
    ShortTerm,
    /// Fixed daily window.
    Daily,
}

impl LimitType {
    /// Wire name (`burst`, `short_term`, `daily`).
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Burst => "burst",
            LimitType::ShortTerm => "short_term",
            LimitType::Daily => "daily",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTier<T> {
    pub burst: T,
    pub short_term: T,
    pub daily: T,
}

impl<T: Copy> PerTier<T> {
    /// Value for a given tier.
    pub fn get(&self, tier: LimitType) -> T {
        match tier {
            LimitType::Burst => self.burst,
            LimitType::ShortTerm => self.short_term,
            LimitType::Daily => self.daily,
        }
    }
}

/// Snapshot of quota state, rendered by the UI whether or not a call is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub can_make_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_type: Option<LimitType>,
    pub remaining_requests: PerTier<u32>,
    /// Unix milliseconds; 0 for a sliding tier with nothing in its window.
    pub reset_times: PerTier<i64>,
    pub next_reset_time: i64,
    /// Clock reading the status was computed at.
    #[serde(skip)]
    pub checked_at: i64,
}

/// Usage analytics derived from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_requests_today: usize,
    pub requests_in_last_hour: usize,
    pub requests_in_last_minute: usize,
    pub average_requests_per_day: f64,
}

/// A slot held for a request that has been admitted but not yet recorded.
///
/// While a permit is alive it counts against every tier, so concurrent callers cannot all be
/// admitted on the same headroom. Dropping a permit without recording it releases the slot.
#[derive(Debug)]
pub struct Permit {
    endpoint: String,
    in_flight: Arc<AtomicUsize>,
}

impl Permit {
    pub(crate) fn new(endpoint: &str, in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { endpoint: endpoint.to_string(), in_flight }
    }

    /// Endpoint this permit was issued for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The decision returned by [`RateLimiter::acquire`].
#[derive(Debug)]
pub enum Decision {
    /// The request may proceed; record it with the permit once the call completes.
    Allowed {
        permit: Permit,
        status: RateLimitStatus,
    },
    /// The request is refused and must not be recorded.
    Denied(RateLimitError),
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Core interface for quota enforcement.
///
/// Decouples the gateway middleware from the windowing math and from where the ledger lives.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Evaluate quota without admitting anything.
    async fn check(&self, endpoint: &str) -> Result<RateLimitStatus, StoreError>;

    /// Check and, when admitted, reserve a slot in one step.
    async fn acquire(&self, endpoint: &str) -> Result<Decision, StoreError>;

    /// Record an admitted request (successful or failed) against the quota.
    async fn record(&self, permit: Permit) -> Result<(), StoreError>;
}

/// User-facing explanation for a denial, chosen purely by the refusing tier.
pub fn denial_message(
    limit_type: LimitType,
    time_remaining: &str,
    daily_remaining: u32,
    daily_max: u32,
) -> String {
    match limit_type {
        LimitType::Burst => format!(
            "Too many requests in a short time. Please wait {} before trying again.",
            time_remaining
        ),
        LimitType::ShortTerm => format!(
            "Rate limit exceeded. You can make {} more requests today. Please wait {} before trying again.",
            daily_remaining, time_remaining
        ),
        LimitType::Daily => format!(
            "Daily limit of {} requests reached. Your quota will reset in {}.",
            daily_max, time_remaining
        ),
    }
}

impl RateLimitError {
    /// Build the typed error for a denied status; `None` when the status admits.
    pub fn from_status(status: &RateLimitStatus, daily_max: u32) -> Option<Self> {
        let limit_type = status.limit_type?;
        let now = status.checked_at;
        let reset_time = status.next_reset_time;
        let remaining_ms = u64::try_from(reset_time.saturating_sub(now)).unwrap_or(0);
        let message = denial_message(
            limit_type,
            &format_time_remaining(reset_time, now),
            status.remaining_requests.daily,
            daily_max,
        );
        Some(RateLimitError {
            limit_type,
            reset_time,
            remaining_time: Duration::from_millis(remaining_ms),
            message,
        })
    }
}

/// Format the time left until `reset_time` for display.
pub fn format_time_remaining(reset_time: i64, now: i64) -> String {
    let remaining = reset_time.saturating_sub(now).max(0);
    if remaining == 0 {
        return "Now available".to_string();
    }

    let seconds = remaining.saturating_add(999) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_remaining_buckets() {
        assert_eq!(format_time_remaining(1_000, 1_000), "Now available");
        assert_eq!(format_time_remaining(1_000, 5_000), "Now available");
        assert_eq!(format_time_remaining(2_001, 0), "3s");
        assert_eq!(format_time_remaining(90_000, 0), "1m 30s");
        assert_eq!(format_time_remaining(3_600_000 + 5 * 60_000, 0), "1h 5m");
    }

    #[test]
    fn limit_type_wire_names() {
        assert_eq!(serde_json::to_string(&LimitType::ShortTerm).unwrap(), "\"short_term\"");
        assert_eq!(LimitType::Daily.to_string(), "daily");
    }

    #[test]
    fn permit_releases_slot_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let permit = Permit::new("/chat", counter.clone());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(permit.endpoint(), "/chat");
        drop(permit);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    fn denied(limit_type: LimitType, next_reset_time: i64, daily: u32) -> RateLimitStatus {
        RateLimitStatus {
            can_make_request: false,
            limit_type: Some(limit_type),
            remaining_requests: PerTier { burst: 0, short_term: 0, daily },
            reset_times: PerTier::default(),
            next_reset_time,
            checked_at: 1_000,
        }
    }

    #[test]
    fn denial_message_depends_only_on_tier() {
        let burst = denial_message(LimitType::Burst, "4s", 90, 100);
        assert_eq!(burst, "Too many requests in a short time. Please wait 4s before trying again.");
        let short = denial_message(LimitType::ShortTerm, "30s", 90, 100);
        assert!(short.contains("90 more requests today"));
        let daily = denial_message(LimitType::Daily, "3h 0m", 0, 100);
        assert!(daily.starts_with("Daily limit of 100 requests reached"));
    }

    #[test]
    fn error_from_status_carries_countdown() {
        let err = RateLimitError::from_status(&denied(LimitType::Burst, 5_000, 97), 100)
            .expect("denied status");
        assert_eq!(err.limit_type, LimitType::Burst);
        assert_eq!(err.reset_time, 5_000);
        assert_eq!(err.remaining_time, Duration::from_millis(4_000));
        assert!(err.message.contains("wait 4s"));

        let mut admitted = denied(LimitType::Burst, 0, 100);
        admitted.can_make_request = true;
        admitted.limit_type = None;
        assert!(RateLimitError::from_status(&admitted, 100).is_none());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = RateLimitStatus {
            can_make_request: true,
            limit_type: None,
            remaining_requests: PerTier { burst: 3, short_term: 10, daily: 100 },
            reset_times: PerTier { burst: 0, short_term: 0, daily: 86_400_000 },
            next_reset_time: 86_400_000,
            checked_at: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["canMakeRequest"], true);
        assert_eq!(json["remainingRequests"]["shortTerm"], 10);
        assert!(json.get("limitType").is_none());
    }
}
