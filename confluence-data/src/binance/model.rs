use crate::error::VenueError;
use chrono::{DateTime, Utc};
use confluence_core::Candle;
use serde::{Deserialize, Serialize};

/// [`Binance`](super::Binance) REST kline row.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#klinecandlestick-data>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceKline(
    pub i64,    // 0: Open time
    pub String, // 1: Open
    pub String, // 2: High
    pub String, // 3: Low
    pub String, // 4: Close
    pub String, // 5: Volume
    pub i64,    // 6: Close time
    pub String, // 7: Quote asset volume
    pub u64,    // 8: Number of trades
    pub String, // 9: Taker buy base asset volume
    pub String, // 10: Taker buy quote asset volume
    pub String, // 11: Ignore
);

impl BinanceKline {
    /// Convert into a [`Candle`], measuring volume in the quote asset.
    ///
    /// A kline whose close time has not yet passed at `now` is still forming.
    pub fn into_candle(self, now: DateTime<Utc>) -> Result<Candle, VenueError> {
        Ok(Candle {
            time: self.0,
            open: parse_f64("open", &self.1)?,
            high: parse_f64("high", &self.2)?,
            low: parse_f64("low", &self.3)?,
            close: parse_f64("close", &self.4)?,
            volume: parse_f64("quote volume", &self.7)?,
            is_final: self.6 < now.timestamp_millis(),
        })
    }
}

/// [`Binance`](super::Binance) kline WebSocket event.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#klinecandlestick-streams-for-utc>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: BinanceKlineData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceKlineData {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", deserialize_with = "de_str_f64")]
    pub open: f64,
    #[serde(rename = "h", deserialize_with = "de_str_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "de_str_f64")]
    pub low: f64,
    #[serde(rename = "c", deserialize_with = "de_str_f64")]
    pub close: f64,
    #[serde(rename = "q", deserialize_with = "de_str_f64")]
    pub quote_volume: f64,
    /// Is this kline closed?
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl From<BinanceKlineData> for Candle {
    fn from(kline: BinanceKlineData) -> Self {
        Candle {
            time: kline.open_time,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.quote_volume,
            is_final: kline.is_closed,
        }
    }
}

/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#symbol-price-ticker>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePriceTicker {
    pub symbol: String,
    #[serde(deserialize_with = "de_str_f64")]
    pub price: f64,
}

/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#24hr-ticker-price-change-statistics>
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binance24hTicker {
    #[serde(deserialize_with = "de_str_f64")]
    pub last_price: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub volume: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub high_price: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub low_price: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub price_change_percent: f64,
}

/// Error body returned with non-2xx responses, eg/ `{"code":-1121,"msg":"Invalid symbol."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    pub msg: String,
}

/// Query parameters of `GET /klines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KlinesRequest<'a> {
    pub symbol: &'a str,
    pub interval: &'a str,
    pub limit: usize,
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, VenueError> {
    value
        .parse::<f64>()
        .map_err(|error| VenueError::Parse(format!("kline {field} '{value}': {error}")))
}

/// Deserialize a numeric string as an f64.
fn de_str_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let raw: &str = Deserialize::deserialize(deserializer)?;
    raw.parse::<f64>().map_err(serde::de::Error::custom)
}
