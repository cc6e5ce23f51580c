use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

const BURST_MAX: u32 = 3;
const BURST_WINDOW: Duration = Duration::from_secs(10);
const SHORT_TERM_MAX: u32 = 10;
const SHORT_TERM_WINDOW: Duration = Duration::from_secs(60);
const DAILY_MAX: u32 = 100;
const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Admission threshold for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimit {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length.
    #[serde(rename = "windowMs", with = "duration_millis")]
    pub window: Duration,
}

impl TierLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Window length in milliseconds, saturating at `i64::MAX`.
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Validated limits for the three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    burst: TierLimit,
    short_term: TierLimit,
    daily: TierLimit,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRateLimitConfig {
    burst: TierLimit,
    short_term: TierLimit,
    daily: TierLimit,
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self, Self::Error> {
        RateLimitConfig::new(raw.burst, raw.short_term, raw.daily)
    }
}

impl Default for RateLimitConfig {
    /// 3 per 10 s, 10 per minute, 100 per day.
    fn default() -> Self {
        Self {
            burst: TierLimit::new(BURST_MAX, BURST_WINDOW),
            short_term: TierLimit::new(SHORT_TERM_MAX, SHORT_TERM_WINDOW),
            daily: TierLimit::new(DAILY_MAX, DAILY_WINDOW),
        }
    }
}

impl RateLimitConfig {
    /// Create a config with validation.
    ///
    /// Every tier needs a non-zero maximum and window, and windows must not shrink from burst
    /// to daily: the daily window is the pruning horizon for the whole log.
    pub fn new(
        burst: TierLimit,
        short_term: TierLimit,
        daily: TierLimit,
    ) -> Result<Self, ConfigError> {
        for (tier, limit) in [("burst", burst), ("short_term", short_term), ("daily", daily)] {
            if limit.max_requests == 0 {
                return Err(ConfigError::InvalidTier { tier, reason: "max_requests must be > 0" });
            }
            if limit.window.is_zero() {
                return Err(ConfigError::InvalidTier { tier, reason: "window must be > 0" });
            }
        }
        if short_term.window < burst.window {
            return Err(ConfigError::InvalidTier {
                tier: "short_term",
                reason: "window must not be shorter than the burst window",
            });
        }
        if daily.window < short_term.window {
            return Err(ConfigError::InvalidTier {
                tier: "daily",
                reason: "window must not be shorter than the short_term window",
            });
        }
        Ok(Self { burst, short_term, daily })
    }

    pub fn burst(&self) -> TierLimit {
        self.burst
    }

    pub fn short_term(&self) -> TierLimit {
        self.short_term
    }

    pub fn daily(&self) -> TierLimit {
        self.daily
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
