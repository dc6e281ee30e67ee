//! Tiered support / resistance levels.
//!
//! Levels are collected from four independent tiers (daily bar, 4h swing points, the 1h
//! volume profile and the 5m range), sorted by price and deduplicated within
//! [`DEDUPE_TOLERANCE`].

use crate::{
    analysis::{
        calc::{highest_high, lowest_low},
        volume_profile::VolumeProfile,
    },
    candle::{Candle, CandleSet, Timeframe},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Relative distance under which two levels are considered the same level.
pub const DEDUPE_TOLERANCE: f64 = 0.005;

/// Bars on each side a 4h swing point must dominate.
const SWING_LOOKBACK: usize = 5;

/// Minimum 5m candles before the 5m range is used.
const MIN_5M_CANDLES: usize = 10;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum KeyLevelKind {
    #[display("DAILY_HIGH")]
    #[serde(rename = "DAILY_HIGH")]
    DailyHigh,
    #[display("DAILY_LOW")]
    #[serde(rename = "DAILY_LOW")]
    DailyLow,
    #[display("DAILY_OPEN")]
    #[serde(rename = "DAILY_OPEN")]
    DailyOpen,
    #[display("4H_SWING_HIGH")]
    #[serde(rename = "4H_SWING_HIGH")]
    SwingHigh4h,
    #[display("4H_SWING_LOW")]
    #[serde(rename = "4H_SWING_LOW")]
    SwingLow4h,
    #[display("POC")]
    #[serde(rename = "POC")]
    Poc,
    #[display("HVN")]
    #[serde(rename = "HVN")]
    Hvn,
    #[display("LVN")]
    #[serde(rename = "LVN")]
    Lvn,
    #[display("5M_RESISTANCE")]
    #[serde(rename = "5M_RESISTANCE")]
    Resistance5m,
    #[display("5M_SUPPORT")]
    #[serde(rename = "5M_SUPPORT")]
    Support5m,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KeyLevel {
    pub price: f64,
    #[serde(rename = "type")]
    pub kind: KeyLevelKind,
    pub timeframe: Timeframe,
    /// 1 (weak) to 5 (strong)
    pub significance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touches: Option<u32>,
}

impl KeyLevel {
    fn new(price: f64, kind: KeyLevelKind, timeframe: Timeframe, significance: u8) -> Self {
        Self {
            price,
            kind,
            timeframe,
            significance,
            touches: None,
        }
    }
}

/// Price sorted, deduplicated key levels.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct KeyLevels(Vec<KeyLevel>);

impl KeyLevels {
    /// Detect key levels from the 1h volume profile and the raw candles.
    pub fn detect(profile: &VolumeProfile, candles: &CandleSet) -> Self {
        let mut levels = Vec::new();

        if let Some(daily) = candles.last(Timeframe::D1) {
            levels.extend([
                KeyLevel::new(daily.high, KeyLevelKind::DailyHigh, Timeframe::D1, 5),
                KeyLevel::new(daily.low, KeyLevelKind::DailyLow, Timeframe::D1, 5),
                KeyLevel::new(daily.open, KeyLevelKind::DailyOpen, Timeframe::D1, 4),
            ]);
        }

        levels.extend(swing_points(candles.get(Timeframe::H4), SWING_LOOKBACK));

        levels.push(KeyLevel::new(
            profile.poc.price,
            KeyLevelKind::Poc,
            Timeframe::H1,
            3,
        ));
        levels.extend(
            profile
                .hvn
                .iter()
                .take(3)
                .map(|bin| KeyLevel::new(bin.price_level, KeyLevelKind::Hvn, Timeframe::H1, 3)),
        );
        levels.extend(
            profile
                .lvn
                .iter()
                .take(2)
                .map(|bin| KeyLevel::new(bin.price_level, KeyLevelKind::Lvn, Timeframe::H1, 2)),
        );

        let five_minute = candles.get(Timeframe::M5);
        if five_minute.len() >= MIN_5M_CANDLES {
            if let Some(high) = highest_high(five_minute) {
                levels.push(KeyLevel::new(high, KeyLevelKind::Resistance5m, Timeframe::M5, 2));
            }
            if let Some(low) = lowest_low(five_minute) {
                levels.push(KeyLevel::new(low, KeyLevelKind::Support5m, Timeframe::M5, 2));
            }
        }

        Self::from_unsorted(levels)
    }

    /// Sort ascending by price and drop levels within [`DEDUPE_TOLERANCE`] of a kept level.
    pub fn from_unsorted(mut levels: Vec<KeyLevel>) -> Self {
        levels.retain(|level| level.price.is_finite());
        levels.sort_by(|a, b| a.price.total_cmp(&b.price));

        let mut kept: Vec<KeyLevel> = Vec::with_capacity(levels.len());
        for level in levels {
            let duplicate = kept
                .iter()
                .any(|k| (k.price - level.price).abs() / k.price.abs() < DEDUPE_TOLERANCE);
            if !duplicate {
                kept.push(level);
            }
        }

        Self(kept)
    }

    /// Levels strictly below `price` (nearest first) and strictly above (nearest first).
    pub fn supports_resistances(&self, price: f64) -> (Vec<KeyLevel>, Vec<KeyLevel>) {
        let supports = self.0.iter().rev().filter(|l| l.price < price).copied().collect();
        let resistances = self.0.iter().filter(|l| l.price > price).copied().collect();
        (supports, resistances)
    }

    /// First `n` levels in price order.
    pub fn top(&self, n: usize) -> Vec<KeyLevel> {
        self.0.iter().take(n).copied().collect()
    }

    pub fn as_slice(&self) -> &[KeyLevel] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A bar is a swing high if its high is >= every high in the `lookback` bars on each
/// side; a swing low mirrors that with lows.
fn swing_points(candles: &[Candle], lookback: usize) -> Vec<KeyLevel> {
    if candles.len() < lookback * 2 + 1 {
        return Vec::new();
    }

    let mut swings = Vec::new();
    for index in lookback..candles.len() - lookback {
        let candle = &candles[index];
        let before = &candles[index - lookback..index];
        let after = &candles[index + 1..=index + lookback];

        let swing_high = before.iter().chain(after).all(|c| candle.high >= c.high);
        if swing_high {
            swings.push(KeyLevel {
                touches: Some(1),
                ..KeyLevel::new(candle.high, KeyLevelKind::SwingHigh4h, Timeframe::H4, 4)
            });
        }

        let swing_low = before.iter().chain(after).all(|c| candle.low <= c.low);
        if swing_low {
            swings.push(KeyLevel {
                touches: Some(1),
                ..KeyLevel::new(candle.low, KeyLevelKind::SwingLow4h, Timeframe::H4, 4)
            });
        }
    }

    swings
}
