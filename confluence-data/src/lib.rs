//! Confluence Data - venue integrations for the confluence signal pipeline
//!
//! Each venue implements [`Venue`], which extends the core
//! [`MarketDataProvider`](confluence_core::MarketDataProvider) with prices, 24h tickers,
//! live kline streams and credential checks. Use [`create_venue`] to construct the venue
//! named by a [`VenueConfig`].

/// Binance spot REST and kline WebSocket integration.
pub mod binance;

/// All errors generated in `confluence-data`.
pub mod error;

/// [`Venue`] interface, configuration and factory.
pub mod venue;

pub use binance::Binance;
pub use error::VenueError;
pub use venue::{
    KlineSubscription, SubscriptionId, Ticker24h, Venue, VenueConfig, VenueName, create_venue,
};
