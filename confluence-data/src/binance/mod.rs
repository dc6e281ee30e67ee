use self::{
    model::{BinanceApiError, Binance24hTicker, BinanceKline, BinancePriceTicker, KlinesRequest},
    stream::{KlineStreamConfig, run_kline_loop},
};
use crate::{
    error::VenueError,
    venue::{KlineSubscription, SubscriptionId, Ticker24h, Venue, VenueConfig, VenueName},
};
use async_trait::async_trait;
use chrono::Utc;
use confluence_core::{Candle, MarketDataProvider, ProviderError, Timeframe};
use fnv::FnvHashMap;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

/// Binance REST and WebSocket data models.
pub mod model;

/// Kline WebSocket stream loop.
pub mod stream;

/// [`Binance`] spot REST base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/general-api-information>
pub const BASE_URL_BINANCE_REST: &str = "https://api.binance.com/api/v3";

/// [`Binance`] spot testnet REST base url.
pub const BASE_URL_BINANCE_REST_TESTNET: &str = "https://testnet.binance.vision/api/v3";

/// [`Binance`] spot WebSocket base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams>
pub const BASE_URL_BINANCE_WS: &str = "wss://stream.binance.com:9443/ws";

/// [`Binance`] spot testnet WebSocket base url.
pub const BASE_URL_BINANCE_WS_TESTNET: &str = "wss://stream.testnet.binance.vision:9443/ws";

/// Maximum number of klines Binance returns per request.
pub const MAX_KLINES_LIMIT: usize = 1000;

/// Header carrying the API key on authenticated requests.
pub const HEADER_API_KEY: &str = "X-MBX-APIKEY";

/// Window in which a signed request remains valid.
pub const RECV_WINDOW_MS: u64 = 5000;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Live kline stream owned by a [`Binance`] venue.
#[derive(Debug)]
struct StreamHandle {
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Binance spot venue.
#[derive(Debug)]
pub struct Binance {
    http: reqwest::Client,
    rest_url: &'static str,
    ws_url: &'static str,
    api_secret: String,
    has_credentials: bool,
    streams: Mutex<FnvHashMap<SubscriptionId, StreamHandle>>,
    next_stream: AtomicU64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedParams {
    timestamp: i64,
    recv_window: u64,
}

#[derive(Debug, Serialize)]
struct SymbolParam<'a> {
    symbol: &'a str,
}

impl Binance {
    /// Construct a [`Binance`] venue. The API key, when configured, is sent as a default
    /// header on every request.
    pub fn new(config: &VenueConfig) -> Result<Self, VenueError> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let mut api_key = HeaderValue::from_str(&config.api_key)
                .map_err(|error| VenueError::Http(format!("invalid API key header: {error}")))?;
            api_key.set_sensitive(true);
            headers.insert(HEADER_API_KEY, api_key);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        let (rest_url, ws_url) = if config.testnet {
            (BASE_URL_BINANCE_REST_TESTNET, BASE_URL_BINANCE_WS_TESTNET)
        } else {
            (BASE_URL_BINANCE_REST, BASE_URL_BINANCE_WS)
        };

        Ok(Self {
            http,
            rest_url,
            ws_url,
            api_secret: config.api_secret.clone(),
            has_credentials: config.has_credentials(),
            streams: Mutex::new(FnvHashMap::default()),
            next_stream: AtomicU64::new(0),
        })
    }

    /// Fetch up to `limit` klines for `symbol`, oldest first.
    pub async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        let url = self.klines_url(symbol, timeframe, limit)?;
        let klines: Vec<BinanceKline> = self.get(url).await?;

        let now = Utc::now();
        klines
            .into_iter()
            .map(|kline| kline.into_candle(now))
            .collect()
    }

    fn klines_url(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<String, VenueError> {
        let symbol = symbol.to_uppercase();
        let query = encode(&KlinesRequest {
            symbol: &symbol,
            interval: timeframe.label(),
            limit: limit.min(MAX_KLINES_LIMIT),
        })?;
        Ok(format!("{}/klines?{query}", self.rest_url))
    }

    fn symbol_url(&self, path: &str, symbol: &str) -> Result<String, VenueError> {
        let symbol = symbol.to_uppercase();
        let query = encode(&SymbolParam { symbol: &symbol })?;
        Ok(format!("{}/{path}?{query}", self.rest_url))
    }

    fn stream_url(&self, symbol: &str, timeframe: Timeframe) -> Result<Url, VenueError> {
        let url = format!(
            "{}/{}@kline_{}",
            self.ws_url,
            symbol.to_lowercase(),
            timeframe.label()
        );
        Url::parse(&url).map_err(|error| VenueError::Parse(format!("stream url {url}: {error}")))
    }

    /// Query string and signature of a signed request issued at `timestamp`.
    fn signed_query(&self, timestamp: i64) -> Result<String, VenueError> {
        let query = encode(&SignedParams {
            timestamp,
            recv_window: RECV_WINDOW_MS,
        })?;
        let signature = sign(&self.api_secret, &query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn get<T>(&self, url: String) -> Result<T, VenueError>
    where
        T: DeserializeOwned,
    {
        debug!(%url, "sending Binance request");
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BinanceApiError>(&body)
                .map(|error| error.msg)
                .unwrap_or(body);
            return Err(VenueError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    fn next_subscription_id(&self, symbol: &str, timeframe: Timeframe) -> SubscriptionId {
        let sequence = self.next_stream.fetch_add(1, Ordering::Relaxed);
        SubscriptionId(format!(
            "{}:{}:{sequence}",
            symbol.to_uppercase(),
            timeframe.label()
        ))
    }
}

impl Drop for Binance {
    fn drop(&mut self) {
        for (_, stream) in self.streams.lock().drain() {
            stream.task.abort();
        }
    }
}

/// Drop handles whose stream task has exited, e.g. after its receiver was dropped.
fn prune_finished(streams: &mut FnvHashMap<SubscriptionId, StreamHandle>) {
    streams.retain(|id, stream| {
        let finished = stream.task.is_finished();
        if finished {
            debug!(subscription = %id, "removing finished Binance kline stream");
        }
        !finished
    });
}

fn encode<T: Serialize>(params: &T) -> Result<String, VenueError> {
    serde_urlencoded::to_string(params).map_err(|error| VenueError::Parse(error.to_string()))
}

/// Hex encoded HMAC-SHA256 of `query` keyed with `secret`.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/endpoint-security-type#signed-trade-and-user_data-endpoint-security>
pub fn sign(secret: &str, query: &str) -> Result<String, VenueError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|error| VenueError::Parse(format!("invalid signing key: {error}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl MarketDataProvider for Binance {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.klines(symbol, timeframe, limit)
            .await
            .map_err(|error| error.into_provider_error(timeframe))
    }
}

#[async_trait]
impl Venue for Binance {
    fn name(&self) -> VenueName {
        VenueName::Binance
    }

    async fn price(&self, symbol: &str) -> Result<f64, VenueError> {
        let url = self.symbol_url("ticker/price", symbol)?;
        let ticker: BinancePriceTicker = self.get(url).await?;
        Ok(ticker.price)
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h, VenueError> {
        let url = self.symbol_url("ticker/24hr", symbol)?;
        let ticker: Binance24hTicker = self.get(url).await?;
        Ok(Ticker24h {
            price: ticker.last_price,
            volume_24h: ticker.volume,
            high_24h: ticker.high_price,
            low_24h: ticker.low_price,
            change_percent: ticker.price_change_percent,
        })
    }

    async fn subscribe_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<KlineSubscription, VenueError> {
        let config = KlineStreamConfig::new(self.stream_url(symbol, timeframe)?);
        let id = self.next_subscription_id(symbol, timeframe);
        let (candle_tx, candles) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_kline_loop(config, candle_tx, Arc::clone(&connected)));
        let mut streams = self.streams.lock();
        prune_finished(&mut streams);
        streams.insert(id.clone(), StreamHandle { connected, task });
        drop(streams);

        info!(subscription = %id, "subscribed to Binance klines");
        Ok(KlineSubscription { id, candles })
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        match self.streams.lock().remove(id) {
            Some(stream) => {
                stream.task.abort();
                info!(subscription = %id, "unsubscribed from Binance klines");
                true
            }
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        let mut streams = self.streams.lock();
        prune_finished(&mut streams);
        streams
            .values()
            .any(|stream| stream.connected.load(Ordering::Acquire))
    }

    async fn validate_credentials(&self) -> bool {
        if !self.has_credentials {
            warn!("Binance credentials are not configured");
            return false;
        }

        let url = match self.signed_query(Utc::now().timestamp_millis()) {
            Ok(query) => format!("{}/account?{query}", self.rest_url),
            Err(error) => {
                warn!(%error, "failed to sign Binance account request");
                return false;
            }
        };

        match self.get::<serde_json::Value>(url).await {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, "Binance credential validation failed");
                false
            }
        }
    }

    fn into_provider(self: Arc<Self>) -> Arc<dyn MarketDataProvider> {
        self
    }
}
