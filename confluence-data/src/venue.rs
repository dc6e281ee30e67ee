use crate::{binance::Binance, error::VenueError};
use async_trait::async_trait;
use confluence_core::{Candle, MarketDataProvider, Timeframe};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tokio::sync::mpsc;

/// Venues ("brokers") a signal may be requested for.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum VenueName {
    #[display("BINANCE")]
    Binance,
    #[display("BYBIT")]
    Bybit,
    #[display("KRAKEN")]
    Kraken,
    #[display("OKX")]
    Okx,
}

impl VenueName {
    pub const ALL: [VenueName; 4] = [
        VenueName::Binance,
        VenueName::Bybit,
        VenueName::Kraken,
        VenueName::Okx,
    ];

    /// Human readable name, eg/ "Binance".
    pub fn display_name(&self) -> &'static str {
        match self {
            VenueName::Binance => "Binance",
            VenueName::Bybit => "Bybit",
            VenueName::Kraken => "Kraken",
            VenueName::Okx => "OKX",
        }
    }
}

impl FromStr for VenueName {
    type Err = VenueError;

    /// Case-insensitive parse of a venue name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        VenueName::ALL
            .into_iter()
            .find(|venue| venue.to_string() == upper)
            .ok_or_else(|| VenueError::UnknownVenue(s.to_string()))
    }
}

/// Venue connection configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct VenueConfig {
    pub name: VenueName,
    pub api_key: String,
    pub api_secret: String,
    /// Use the venue's test network endpoints
    pub testnet: bool,
}

impl fmt::Debug for VenueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("testnet", &self.testnet)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self::new(VenueName::Binance)
    }
}

impl VenueConfig {
    /// Create a configuration for `name` without credentials.
    pub fn new(name: VenueName) -> Self {
        Self {
            name,
            api_key: String::new(),
            api_secret: String::new(),
            testnet: false,
        }
    }

    /// Set API credentials
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = api_key.into();
        self.api_secret = api_secret.into();
        self
    }

    /// Set testnet mode
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// True if both key and secret are configured.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Rolling 24 hour statistics for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub price: f64,
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    #[serde(rename = "high24h")]
    pub high_24h: f64,
    #[serde(rename = "low24h")]
    pub low_24h: f64,
    pub change_percent: f64,
}

/// Identifier of a live kline subscription, eg/ "BTCUSDT:1m:3".
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, From, Deserialize, Serialize)]
pub struct SubscriptionId(pub String);

/// Live kline subscription: updates arrive on `candles` until it is unsubscribed.
#[derive(Debug)]
pub struct KlineSubscription {
    pub id: SubscriptionId,
    pub candles: mpsc::UnboundedReceiver<Candle>,
}

/// Market data venue: historical candles via [`MarketDataProvider`] plus prices, live
/// kline streams and credential checks.
#[async_trait]
pub trait Venue: MarketDataProvider {
    fn name(&self) -> VenueName;

    /// Latest traded price of `symbol`.
    async fn price(&self, symbol: &str) -> Result<f64, VenueError>;

    /// Rolling 24h statistics of `symbol`.
    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h, VenueError>;

    /// Stream kline updates for `symbol` on `timeframe`. Provisional updates carry
    /// `is_final == false`.
    async fn subscribe_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<KlineSubscription, VenueError>;

    /// Close a subscription, returning `false` if it was unknown.
    fn unsubscribe(&self, id: &SubscriptionId) -> bool;

    /// True if any subscription currently has an open connection.
    fn is_connected(&self) -> bool;

    /// Check the configured credentials against an authenticated endpoint.
    async fn validate_credentials(&self) -> bool;

    /// View this venue as the pipeline's candle source.
    fn into_provider(self: Arc<Self>) -> Arc<dyn MarketDataProvider>;
}

/// Construct the [`Venue`] described by `config`.
pub fn create_venue(config: &VenueConfig) -> Result<Arc<dyn Venue>, VenueError> {
    match config.name {
        VenueName::Binance => Ok(Arc::new(Binance::new(config)?)),
        unsupported @ (VenueName::Bybit | VenueName::Kraken | VenueName::Okx) => Err(
            VenueError::NotSupported(unsupported.display_name().to_string()),
        ),
    }
}
