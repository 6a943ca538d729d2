//! # Pricefeed Traits
//!
//! Collaborator traits for the Pricefeed subscription broker.
//!
//! This crate contains the shared data types and the two interfaces the broker
//! consumes but does not implement. Implementations live in separate crates.
//!
//! ## Module Structure
//!
//! - [`ids`]: Identifier newtypes (assets, currencies)
//! - [`market_data`]: Price points, price batches, and the [`PriceFetcher`]
//!   and [`PriceCache`] traits
//! - [`error`]: Errors reported by collaborators
//!
//! ## Dependency Injection
//!
//! The broker receives its collaborators explicitly:
//!
//! ```ignore
//! BrokerBuilder::new()
//!     .with_fetcher(Arc::new(impl PriceFetcher))
//!     .with_cache(Arc::new(impl PriceCache))
//!     .build()
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;
pub mod market_data;

// Re-export commonly used types
pub use error::SourceError;
pub use ids::*;
pub use market_data::{PriceBatch, PriceCache, PriceFetcher, PricePoint};
