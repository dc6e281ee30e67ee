//! Order flow estimated from candles.
//!
//! Candles carry no trade-side information, so each bar's delta is estimated from its body:
//! a bullish bar contributes `+volume × (0.5 + body%/100)`, a bearish bar the negated
//! amount and a doji nothing. CVD, buy/sell volume, imbalance and aggression derive from
//! those per-bar deltas.

use crate::{
    analysis::calc::{mean, tail},
    candle::Candle,
    error::AnalysisError,
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize, Serializer};

/// CVD beyond which aggression may be `BUY`/`SELL`.
const CVD_THRESHOLD: f64 = 10_000.0;

/// CVD beyond which aggression may be `STRONG_BUY`/`STRONG_SELL`.
const CVD_STRONG_THRESHOLD: f64 = 20_000.0;

/// Recent three-bar volume must exceed this multiple of the mean bar volume to count as a surge.
const SURGE_MULTIPLIER: f64 = 1.5;

/// Aggression level derived from CVD and the last three bars.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggression {
    #[display("STRONG_BUY")]
    StrongBuy,
    #[display("BUY")]
    Buy,
    #[display("NEUTRAL")]
    Neutral,
    #[display("SELL")]
    Sell,
    #[display("STRONG_SELL")]
    StrongSell,
}

/// Recent (last 5 bars) volume relative to the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeCluster {
    AboveAverage,
    Average,
    BelowAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrintSide {
    Buy,
    Sell,
}

/// Estimated delta of the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AggressivePrint {
    #[serde(rename = "type")]
    pub side: PrintSide,
    pub volume: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Order flow snapshot for one candle sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFlowData {
    /// Rounded cumulative volume delta, serialised with an explicit sign
    #[serde(serialize_with = "serialize_signed")]
    pub cvd: i64,
    /// buy / (buy + sell), 0.5 when there is no directional volume
    pub delta_imbalance: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub aggression: Aggression,
    pub volume_cluster: VolumeCluster,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_aggressive_print: Option<AggressivePrint>,
}

impl OrderFlowData {
    /// Analyse `candles`, failing on an empty sequence.
    pub fn analyze(candles: &[Candle]) -> Result<Self, AnalysisError> {
        if candles.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "no candles provided for order flow analysis".to_string(),
            ));
        }

        let deltas: Vec<f64> = candles.iter().map(estimate_delta).collect();

        let cvd = deltas.iter().sum::<f64>().round() as i64;
        let buy_volume = deltas.iter().filter(|d| **d > 0.0).sum::<f64>().round();
        let sell_volume = deltas
            .iter()
            .filter(|d| **d < 0.0)
            .map(|d| d.abs())
            .sum::<f64>()
            .round();

        Ok(Self {
            cvd,
            delta_imbalance: delta_imbalance(buy_volume, sell_volume),
            buy_volume,
            sell_volume,
            aggression: aggression(cvd, candles),
            volume_cluster: volume_cluster(candles),
            last_aggressive_print: last_aggressive_print(candles, &deltas),
        })
    }

    /// CVD rendered with an explicit sign, e.g. `+1200`.
    pub fn cvd_display(&self) -> String {
        signed(self.cvd)
    }

    /// Net buying: positive CVD.
    pub fn is_cvd_bullish(&self) -> bool {
        self.cvd > 0
    }
}

/// Estimated buy-minus-sell volume of one bar.
pub fn estimate_delta(candle: &Candle) -> f64 {
    let body_percent = if candle.open != 0.0 {
        (candle.close - candle.open).abs() / candle.open.abs() * 100.0
    } else {
        0.0
    };
    let magnitude = candle.volume * (0.5 + body_percent / 100.0);

    if candle.is_bullish() {
        magnitude
    } else if candle.is_bearish() {
        -magnitude
    } else {
        0.0
    }
}

/// buy / (buy + sell), 0.5 with no volume on either side.
pub fn delta_imbalance(buy_volume: f64, sell_volume: f64) -> f64 {
    let total = buy_volume + sell_volume;
    if total > 0.0 {
        (buy_volume / total).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn volume_cluster(candles: &[Candle]) -> VolumeCluster {
    let average = mean(candles.iter().map(|c| c.volume)).unwrap_or(0.0);
    let recent = mean(tail(candles, 5).iter().map(|c| c.volume)).unwrap_or(0.0);

    if recent > average * 1.2 {
        VolumeCluster::AboveAverage
    } else if recent < average * 0.8 {
        VolumeCluster::BelowAverage
    } else {
        VolumeCluster::Average
    }
}

fn aggression(cvd: i64, candles: &[Candle]) -> Aggression {
    let recent = tail(candles, 3);
    let bullish = recent.iter().filter(|c| c.is_bullish()).count();
    let bearish = recent.iter().filter(|c| c.is_bearish()).count();
    let recent_volume: f64 = recent.iter().map(|c| c.volume).sum();
    let average = mean(candles.iter().map(|c| c.volume)).unwrap_or(0.0);

    let surge = recent_volume > average * SURGE_MULTIPLIER;
    let bullish_surge = surge && bullish >= 2;
    let bearish_surge = surge && bearish >= 2;
    let cvd = cvd as f64;

    if bullish_surge && cvd > CVD_STRONG_THRESHOLD {
        Aggression::StrongBuy
    } else if bullish_surge && cvd > CVD_THRESHOLD {
        Aggression::Buy
    } else if bearish_surge && cvd < -CVD_STRONG_THRESHOLD {
        Aggression::StrongSell
    } else if bearish_surge && cvd < -CVD_THRESHOLD {
        Aggression::Sell
    } else {
        Aggression::Neutral
    }
}

fn last_aggressive_print(candles: &[Candle], deltas: &[f64]) -> Option<AggressivePrint> {
    let (candle, delta) = candles.last().zip(deltas.last())?;
    if *delta == 0.0 {
        return None;
    }

    Some(AggressivePrint {
        side: if *delta > 0.0 {
            PrintSide::Buy
        } else {
            PrintSide::Sell
        },
        volume: delta.abs().round(),
        price: candle.close,
        timestamp: DateTime::from_timestamp_millis(candle.time).unwrap_or_default(),
    })
}

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn serialize_signed<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&signed(*value))
}
