//! Convenient re-exports for common Flashdeck types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    error::{
        ConfigError, GatewayError, RateLimitError, StorageError, StoreError, TransportError,
        ValidationError,
    },
    gateway::{ChatGateway, ChatRequest, ChatResponse, GatewayConfig},
    kv::{InMemoryStore, KeyValueStore},
    rate_limit::{
        Decision, LimitType, Permit, RateLimitConfig, RateLimitLayer, RateLimitStatus,
        RateLimiter, TierLimit, TieredRateLimiter, UsageStats,
    },
    storage::{
        Deck, DeckDeletion, DeckStats, DeckUpdate, Flashcard, FlashcardDeckAssociation,
        MigrationReport, Storage, CURRENT_STORAGE_VERSION,
    },
    timeout::TimeoutPolicy,
};
