//! Infrastructure layer - storage, price provider and notification transports

pub mod notify;
pub mod provider;
pub mod storage;

pub use notify::{LogSink, NotificationSink, WebhookSink};
pub use provider::{CoinbaseClient, PriceProvider};
pub use storage::SqliteStore;
