//! Candle data model shared by every engine.
//!
//! A [`CandleSet`] always carries all five [`Timeframe`]s. A timeframe that could not be
//! fetched maps to an empty sequence, which downstream engines read as "unavailable".

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    /// Open time in epoch milliseconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// `false` while the bar is still forming
    pub is_final: bool,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            is_final: true,
        }
    }

    /// Close above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close below open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Supported candle timeframes.
///
/// Declaration order is the analysis priority order (`1d, 4h, 1h, 5m, 1m`), so ordered
/// collections keyed by `Timeframe` iterate in that order.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum Timeframe {
    #[display("1d")]
    #[serde(rename = "1d")]
    D1,
    #[display("4h")]
    #[serde(rename = "4h")]
    H4,
    #[display("1h")]
    #[serde(rename = "1h")]
    H1,
    #[display("5m")]
    #[serde(rename = "5m")]
    M5,
    #[display("1m")]
    #[serde(rename = "1m")]
    M1,
}

impl Timeframe {
    /// All timeframes in priority order.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::D1,
        Timeframe::H4,
        Timeframe::H1,
        Timeframe::M5,
        Timeframe::M1,
    ];

    /// Venue interval label (e.g. "4h").
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::D1 => "1d",
            Timeframe::H4 => "4h",
            Timeframe::H1 => "1h",
            Timeframe::M5 => "5m",
            Timeframe::M1 => "1m",
        }
    }

    /// Number of candles requested from a venue for this timeframe.
    pub fn fetch_limit(&self) -> usize {
        match self {
            Timeframe::D1 | Timeframe::H4 | Timeframe::H1 => 100,
            Timeframe::M5 => 200,
            Timeframe::M1 => 300,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|timeframe| timeframe.label() == s)
            .ok_or_else(|| format!("unsupported timeframe: {s}"))
    }
}

/// Ordered candles for every [`Timeframe`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSet {
    series: BTreeMap<Timeframe, Vec<Candle>>,
}

impl Default for CandleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleSet {
    /// Create a set where every timeframe is present and empty.
    pub fn new() -> Self {
        Self {
            series: Timeframe::ALL
                .into_iter()
                .map(|timeframe| (timeframe, Vec::new()))
                .collect(),
        }
    }

    /// Builder style insert of a full sequence.
    pub fn with(mut self, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.insert(timeframe, candles);
        self
    }

    /// Replace the sequence for `timeframe`.
    pub fn insert(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series.insert(timeframe, candles);
    }

    /// Candles for `timeframe`, empty when unavailable.
    pub fn get(&self, timeframe: Timeframe) -> &[Candle] {
        self.series
            .get(&timeframe)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// True if `timeframe` has no candles.
    pub fn is_unavailable(&self, timeframe: Timeframe) -> bool {
        self.get(timeframe).is_empty()
    }

    /// Most recent candle for `timeframe`.
    pub fn last(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.get(timeframe).last()
    }

    /// Iterate `(timeframe, candles)` in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &[Candle])> {
        self.series
            .iter()
            .map(|(timeframe, candles)| (*timeframe, candles.as_slice()))
    }

    /// Apply a streamed candle update.
    ///
    /// A provisional last candle with the same open time is replaced in place, a newer
    /// candle is appended, and anything touching finalised history is ignored. Returns
    /// `true` if the series changed.
    pub fn apply_update(&mut self, timeframe: Timeframe, candle: Candle) -> bool {
        let series = self.series.entry(timeframe).or_default();

        match series.last_mut() {
            None => {
                series.push(candle);
                true
            }
            Some(last) if candle.time > last.time => {
                series.push(candle);
                true
            }
            Some(last) if candle.time == last.time && !last.is_final => {
                *last = candle;
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64, is_final: bool) -> Candle {
        Candle {
            is_final,
            ..Candle::new(time, close, close, close, close, 1.0)
        }
    }

    #[test]
    fn test_candle_set_has_every_timeframe() {
        let set = CandleSet::new();
        for timeframe in Timeframe::ALL {
            assert!(set.is_unavailable(timeframe));
        }
        assert_eq!(set.iter().count(), 5);
    }

    #[test]
    fn test_candle_set_iterates_in_priority_order() {
        let set = CandleSet::new().with(Timeframe::M1, vec![candle(1, 1.0, true)]);
        let order: Vec<_> = set.iter().map(|(timeframe, _)| timeframe.label()).collect();
        assert_eq!(order, vec!["1d", "4h", "1h", "5m", "1m"]);
    }

    #[test]
    fn test_apply_update() {
        let mut set = CandleSet::new().with(
            Timeframe::H1,
            vec![candle(1_000, 100.0, true), candle(2_000, 101.0, false)],
        );

        // Provisional candle replaced in place
        assert!(set.apply_update(Timeframe::H1, candle(2_000, 102.0, true)));
        assert_eq!(set.get(Timeframe::H1).len(), 2);
        assert_eq!(set.last(Timeframe::H1).map(|c| c.close), Some(102.0));

        // Finalised history is immutable
        assert!(!set.apply_update(Timeframe::H1, candle(2_000, 99.0, false)));
        assert!(!set.apply_update(Timeframe::H1, candle(1_000, 99.0, true)));
        assert_eq!(set.last(Timeframe::H1).map(|c| c.close), Some(102.0));

        // Newer candle appended
        assert!(set.apply_update(Timeframe::H1, candle(3_000, 103.0, false)));
        assert_eq!(set.get(Timeframe::H1).len(), 3);
    }

    #[test]
    fn test_timeframe_labels_round_trip() {
        for timeframe in Timeframe::ALL {
            assert_eq!(timeframe.label().parse::<Timeframe>(), Ok(timeframe));
            assert_eq!(timeframe.to_string(), timeframe.label());
        }
        assert!("15m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_fetch_limits() {
        let limits: Vec<_> = Timeframe::ALL.iter().map(Timeframe::fetch_limit).collect();
        assert_eq!(limits, vec![100, 100, 100, 200, 300]);
    }
}
