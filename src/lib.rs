#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Flashdeck
//!
//! Local data and chat-gateway layer for a flashcard study app.
//!
//! ## Features
//!
//! - **Flashcard and deck storage** over any async key-value store, with many-to-many
//!   deck membership and cascade-on-delete
//! - **Versioned migrations** that upgrade older layouts in place and seed first-run data
//! - **Tiered rate limiting** (burst, minute, hour, day) persisted across restarts
//! - **Chat gateway** as a tower middleware: limit, time out, then call the remote service
//!
//! ## Quick Start
//!
//! ```rust
//! use flashdeck::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     let storage = Storage::new(InMemoryStore::new());
//!     storage.initialize_storage().await?;
//!
//!     let deck = storage.save_deck("Travel", None, None).await?;
//!     storage.save_flashcard_to_deck("el tren", "the train", &deck.id).await?;
//!     assert_eq!(storage.get_deck_stats(&deck.id).await.card_count, 1);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod prelude;
pub mod rate_limit;
pub mod storage;
pub mod timeout;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ConfigError, GatewayError, RateLimitError, StorageError, StoreError, TransportError,
    ValidationError,
};
pub use gateway::{ChatGateway, ChatRequest, ChatResponse, GatewayConfig};
pub use kv::{InMemoryStore, KeyValueStore};
pub use rate_limit::{
    LimitType, RateLimitConfig, RateLimitLayer, RateLimitStatus, RateLimiter, TieredRateLimiter,
    UsageStats,
};
pub use storage::{Deck, Flashcard, FlashcardDeckAssociation, MigrationReport, Storage};
pub use timeout::TimeoutPolicy;
