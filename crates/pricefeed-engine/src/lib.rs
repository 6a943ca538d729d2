//! # Pricefeed Engine
//!
//! The price subscription broker for Pricefeed.
//!
//! This crate provides:
//! - [`PriceUpdateBroker`]: Multiplexes consumer subscriptions onto per-currency pollers
//! - [`Poller`]: Fixed-cadence fetch loop for one currency, with forced out-of-band polls
//! - [`SubscriptionHandle`]: Consumer side of a subscription, as a queue or a stream
//! - [`InMemoryPriceCache`]: Default last-known-price store
//! - [`BrokerBuilder`]: Wires config, fetcher and cache together
//!
//! ## Architecture
//!
//! ```text
//! subscribe ─┬─> Subject (per key) ──────────────────────────┐
//!            │                                               │ filtered batches
//!            └─> Poller (per currency) ─> PriceFetcher       │
//!                     │                                      │
//!                     └─ result ─> PriceCache ─> publish ────┴─> SubscriptionHandle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let broker = BrokerBuilder::new()
//!     .with_config(BrokerConfig::from_file("pricefeed.toml")?)
//!     .with_fetcher(fetcher)
//!     .build()?;
//!
//! let mut handle = broker.subscribe(["BTC", "ETH"], "USD")?;
//! while let Some(update) = handle.recv().await {
//!     println!("{:?}", update?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod poller;
pub mod subscription;

mod subject;

// Re-exports
pub use broker::{BrokerStats, PriceUpdateBroker};
pub use builder::BrokerBuilder;
pub use cache::InMemoryPriceCache;
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use key::SubscriptionKey;
pub use poller::{PollDriver, PollSchedule, PollTrigger, Poller, PollerId, PollerInfo, PollerState};
pub use subject::HandleId;
pub use subscription::{PriceStream, SubscriptionHandle};
