use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{RateLimitError, StoreError};
use crate::kv::{self, keys, KeyValueStore};
use crate::rate_limit::{
    Decision, Permit, RateLimitConfig, RateLimitLedger, RateLimitStatus, RateLimiter, UsageStats,
    DEFAULT_ENDPOINT,
};

/// Burst / short-term / daily limiter whose ledger lives in a [`KeyValueStore`].
///
/// All state is owned by the instance: the last ledger seen is cached for cheap inspection via
/// [`snapshot`](Self::snapshot), but every check and record re-reads the stored ledger while
/// holding the instance lock, so concurrent callers on one instance never act on a stale copy.
///
/// Reading is best-effort: a missing, unreadable or corrupt ledger starts over empty (and is
/// logged). Writing a recorded request is not: [`record`](RateLimiter::record) reports the
/// failure.
pub struct TieredRateLimiter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    cache: Mutex<Option<RateLimitLedger>>,
    in_flight: Arc<AtomicUsize>,
}

impl<S> std::fmt::Debug for TieredRateLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredRateLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<S> TieredRateLimiter<S>
where
    S: KeyValueStore + 'static,
{
    /// Create a limiter with the default tiers, backed by `store`.
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Create a limiter sharing an existing store handle.
    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: RateLimitConfig::default(),
            cache: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the tiers.
    pub fn with_config(mut self, config: RateLimitConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Active tiers.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Requests admitted but not yet recorded.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Quota status for the default endpoint, for UI polling.
    pub async fn status(&self) -> Result<RateLimitStatus, StoreError> {
        self.check(DEFAULT_ENDPOINT).await
    }

    /// Append an entry unconditionally, without a permit.
    pub async fn record_request(&self, endpoint: &str) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        self.append_locked(&mut cache, endpoint).await
    }

    /// Today/hour/minute counts and the average per day.
    pub async fn usage_stats(&self) -> UsageStats {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now_millis();
        let ledger = self.refresh_locked(&mut cache, now).await;
        ledger.usage(now, self.config.daily().window_ms())
    }

    /// Delete the stored ledger and forget the cached copy.
    ///
    /// Only quota telemetry is affected; flashcards and decks live under other keys.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        kv::remove_key(&*self.store, keys::RATE_LIMIT).await?;
        *cache = None;
        info!("rate limit ledger cleared");
        Ok(())
    }

    /// The ledger as of the last check or record, without touching storage.
    pub async fn snapshot(&self) -> Option<RateLimitLedger> {
        self.cache.lock().await.clone()
    }

    /// Reload the ledger from storage now.
    pub async fn refresh(&self) -> RateLimitLedger {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now_millis();
        self.refresh_locked(&mut cache, now).await
    }

    /// Forget the cached ledger; the next operation reads storage again.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// Ledger for a read path: a backend failure yields a fresh ledger that must not be written.
    async fn load(&self, now: i64) -> (RateLimitLedger, bool) {
        match self.load_stored(now).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "failed to load rate limit ledger");
                (RateLimitLedger::new(now, self.config.daily().window_ms()), false)
            }
        }
    }

    /// Stored ledger, or a fresh one (flagged dirty) when missing or corrupt.
    async fn load_stored(&self, now: i64) -> Result<(RateLimitLedger, bool), StoreError> {
        let daily = self.config.daily().window_ms();
        Ok(match kv::get_raw(&*self.store, keys::RATE_LIMIT).await? {
            Some(raw) => match kv::decode::<RateLimitLedger>(keys::RATE_LIMIT, &raw) {
                Ok(ledger) => (ledger, false),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable rate limit ledger");
                    (RateLimitLedger::new(now, daily), true)
                }
            },
            None => (RateLimitLedger::new(now, daily), true),
        })
    }

    async fn refresh_locked(
        &self,
        cache: &mut Option<RateLimitLedger>,
        now: i64,
    ) -> RateLimitLedger {
        let daily = self.config.daily().window_ms();
        let (mut ledger, mut dirty) = self.load(now).await;

        if ledger.roll_daily(now, daily) {
            info!(next_reset = ledger.daily_reset_timestamp, "daily rate limit window rolled over");
            dirty = true;
        }
        dirty |= ledger.prune(now, daily);

        if dirty {
            if let Err(e) = kv::put_json(&*self.store, keys::RATE_LIMIT, &ledger).await {
                warn!(error = %e, "failed to persist rate limit ledger");
            }
        }
        *cache = Some(ledger.clone());
        ledger
    }

    async fn append_locked(
        &self,
        cache: &mut Option<RateLimitLedger>,
        endpoint: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        let daily = self.config.daily().window_ms();
        // A ledger we failed to read is never replaced.
        let (mut ledger, _) = self.load_stored(now).await?;
        ledger.roll_daily(now, daily);
        ledger.push(now, endpoint);
        ledger.prune(now, daily);

        kv::put_json(&*self.store, keys::RATE_LIMIT, &ledger).await?;
        debug!(endpoint, logged = ledger.requests.len(), "request recorded");
        *cache = Some(ledger);
        Ok(())
    }

    fn evaluate(&self, ledger: &RateLimitLedger, now: i64) -> RateLimitStatus {
        ledger.evaluate(&self.config, now, self.in_flight.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl<S> RateLimiter for TieredRateLimiter<S>
where
    S: KeyValueStore + 'static,
{
    async fn check(&self, endpoint: &str) -> Result<RateLimitStatus, StoreError> {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now_millis();
        let ledger = self.refresh_locked(&mut cache, now).await;
        let status = self.evaluate(&ledger, now);
        if let Some(limit) = status.limit_type {
            debug!(endpoint, %limit, next_reset = status.next_reset_time, "rate limit reached");
        }
        Ok(status)
    }

    async fn acquire(&self, endpoint: &str) -> Result<Decision, StoreError> {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now_millis();
        let ledger = self.refresh_locked(&mut cache, now).await;
        let status = self.evaluate(&ledger, now);

        match RateLimitError::from_status(&status, self.config.daily().max_requests) {
            Some(err) => {
                debug!(endpoint, limit = %err.limit_type, "request denied by rate limiter");
                Ok(Decision::Denied(err))
            }
            None => {
                let permit = Permit::new(endpoint, self.in_flight.clone());
                Ok(Decision::Allowed { permit, status })
            }
        }
    }

    async fn record(&self, permit: Permit) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        let result = self.append_locked(&mut cache, permit.endpoint()).await;
        // Release the slot only once the entry is in the log.
        drop(permit);
        result
    }
}
