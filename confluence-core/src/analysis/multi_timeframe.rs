use crate::{
    analysis::calc::{mean, sma_close, tail},
    candle::{Candle, CandleSet, Timeframe},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trailing window used for the simple moving average.
pub const SMA_PERIOD: usize = 200;

/// Candles required before a trend or structure is classified.
const TREND_WINDOW: usize = 5;

/// Trailing window used for trend confidence.
const CONFIDENCE_WINDOW: usize = 10;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    #[display("UP")]
    Up,
    #[display("DOWN")]
    Down,
    #[display("NEUTRAL")]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Structure {
    HigherLows,
    LowerHighs,
    DoubleTop,
    DoubleBottom,
    Consolidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DominantTrend {
    Up,
    Down,
    Mixed,
}

/// Trend classification of a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub trend: Trend,
    pub bias: Bias,
    pub confidence: f64,
    pub sma_alignment: bool,
    pub structure: Structure,
}

impl TimeframeAnalysis {
    /// Analyse one non-empty candle sequence.
    pub fn analyze(timeframe: Timeframe, candles: &[Candle]) -> Option<Self> {
        let last_close = candles.last()?.close;
        let sma = sma_close(candles, SMA_PERIOD)?;
        let trend = trend(candles);
        let sma_alignment = sma_aligned(last_close, sma, trend);

        Some(Self {
            timeframe,
            trend,
            bias: bias(trend, sma_alignment, last_close, sma),
            confidence: confidence(candles, trend),
            sma_alignment,
            structure: structure(candles),
        })
    }
}

/// Cross-timeframe trend summary.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTimeframeAnalysis {
    /// Only timeframes with at least one candle, in priority order
    pub analyses: BTreeMap<Timeframe, TimeframeAnalysis>,
    pub conflict_count: u32,
    pub confluence_score: f64,
    pub dominant_trend: DominantTrend,
}

impl MultiTimeframeAnalysis {
    /// Analyse every available timeframe of `candles`.
    pub fn analyze(candles: &CandleSet) -> Self {
        let analyses: BTreeMap<_, _> = candles
            .iter()
            .filter_map(|(timeframe, series)| {
                TimeframeAnalysis::analyze(timeframe, series).map(|analysis| (timeframe, analysis))
            })
            .collect();

        Self {
            conflict_count: conflict_count(&analyses),
            confluence_score: confluence_score(&analyses),
            dominant_trend: dominant_trend(&analyses),
            analyses,
        }
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&TimeframeAnalysis> {
        self.analyses.get(&timeframe)
    }
}

fn trend(candles: &[Candle]) -> Trend {
    if candles.len() < TREND_WINDOW {
        return Trend::Neutral;
    }

    let window = tail(candles, TREND_WINDOW);
    let (prior, latest) = match window.split_last() {
        Some((latest, prior)) => (prior, latest),
        None => return Trend::Neutral,
    };
    let average_close = mean(window.iter().map(|c| c.close)).unwrap_or(latest.close);

    let prior_max_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let prior_max_low = prior.iter().map(|c| c.low).fold(f64::NEG_INFINITY, f64::max);
    if latest.high > prior_max_high && latest.low > prior_max_low && latest.close > average_close
    {
        return Trend::Up;
    }

    let prior_min_high = prior.iter().map(|c| c.high).fold(f64::INFINITY, f64::min);
    let prior_min_low = prior.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    if latest.high < prior_min_high && latest.low < prior_min_low && latest.close < average_close
    {
        return Trend::Down;
    }

    Trend::Neutral
}

fn sma_aligned(last_close: f64, sma: f64, trend: Trend) -> bool {
    match trend {
        Trend::Up => last_close > sma,
        Trend::Down => last_close < sma,
        Trend::Neutral => (last_close - sma).abs() < sma * 0.01,
    }
}

/// A neutral trend leans towards the side of the SMA the close sits on, provided it
/// is SMA aligned.
fn bias(trend: Trend, sma_alignment: bool, last_close: f64, sma: f64) -> Bias {
    match trend {
        Trend::Up => Bias::Bullish,
        Trend::Down => Bias::Bearish,
        Trend::Neutral if sma_alignment && last_close > sma => Bias::Bullish,
        Trend::Neutral if sma_alignment && last_close < sma => Bias::Bearish,
        Trend::Neutral => Bias::Neutral,
    }
}

fn confidence(candles: &[Candle], trend: Trend) -> f64 {
    let recent = tail(candles, CONFIDENCE_WINDOW);
    let agreeing = match trend {
        Trend::Neutral => return 0.3,
        Trend::Up => recent.iter().filter(|c| c.is_bullish()).count(),
        Trend::Down => recent.iter().filter(|c| c.is_bearish()).count(),
    };

    let percent = agreeing as f64 / recent.len() as f64 * 100.0;
    match percent {
        p if p >= 80.0 => 0.9,
        p if p >= 70.0 => 0.85,
        p if p >= 60.0 => 0.75,
        p if p >= 50.0 => 0.65,
        _ => 0.5,
    }
}

fn structure(candles: &[Candle]) -> Structure {
    if candles.len() < TREND_WINDOW {
        return Structure::Consolidation;
    }

    let window = tail(candles, TREND_WINDOW);
    let (first, previous, latest) = (&window[0], &window[3], &window[4]);

    let higher_low = latest.low > previous.low;
    let lower_high = latest.high < previous.high;

    if higher_low && !lower_high {
        Structure::HigherLows
    } else if lower_high && !higher_low {
        Structure::LowerHighs
    } else if (first.high - latest.high).abs() < first.high * 0.01 {
        Structure::DoubleTop
    } else if (first.low - latest.low).abs() < first.low * 0.01 {
        Structure::DoubleBottom
    } else {
        Structure::Consolidation
    }
}

fn trend_counts(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> (usize, usize) {
    analyses
        .values()
        .fold((0, 0), |(up, down), analysis| match analysis.trend {
            Trend::Up => (up + 1, down),
            Trend::Down => (up, down + 1),
            Trend::Neutral => (up, down),
        })
}

fn dominant_trend(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> DominantTrend {
    let (up, down) = trend_counts(analyses);
    match up.cmp(&down) {
        std::cmp::Ordering::Greater => DominantTrend::Up,
        std::cmp::Ordering::Less => DominantTrend::Down,
        std::cmp::Ordering::Equal => DominantTrend::Mixed,
    }
}

/// Share of analysed timeframes agreeing with the majority trend.
///
/// Neutral timeframes contribute 0.5; with no majority every timeframe contributes 0.5.
fn confluence_score(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> f64 {
    if analyses.is_empty() {
        return 0.0;
    }

    let majority = match dominant_trend(analyses) {
        DominantTrend::Up => Trend::Up,
        DominantTrend::Down => Trend::Down,
        DominantTrend::Mixed => return 0.5,
    };

    let aligned: f64 = analyses
        .values()
        .map(|analysis| match analysis.trend {
            Trend::Neutral => 0.5,
            trend if trend == majority => 1.0,
            _ => 0.0,
        })
        .sum();

    aligned / analyses.len() as f64
}

/// 1 when the daily and 4h trends point in strictly opposite directions.
fn conflict_count(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> u32 {
    let daily = analyses.get(&Timeframe::D1).map(|a| a.trend);
    let four_hour = analyses.get(&Timeframe::H4).map(|a| a.trend);

    match (daily, four_hour) {
        (Some(Trend::Up), Some(Trend::Down)) | (Some(Trend::Down), Some(Trend::Up)) => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Five bullish bars each stepping 1% higher.
    fn rising(start: f64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = start * (1.0 + 0.01 * i as f64);
                Candle::new(i as i64, base, base * 1.006, base * 0.998, base * 1.005, 10.0)
            })
            .collect()
    }

    fn falling(start: f64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = start * (1.0 - 0.01 * i as f64);
                Candle::new(i as i64, base, base * 1.002, base * 0.994, base * 0.995, 10.0)
            })
            .collect()
    }

    fn flat(price: f64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle::new(i as i64, price, price + 1.0, price - 1.0, price, 10.0))
            .collect()
    }

    #[test]
    fn test_rising_series_is_bullish_up_trend() {
        let analysis = TimeframeAnalysis::analyze(Timeframe::D1, &rising(100.0, 12)).unwrap();

        assert_eq!(analysis.trend, Trend::Up);
        assert_eq!(analysis.bias, Bias::Bullish);
        assert!(analysis.sma_alignment);
        assert_eq!(analysis.confidence, 0.9);
        assert_eq!(analysis.structure, Structure::HigherLows);
    }

    #[test]
    fn test_falling_series_is_bearish_down_trend() {
        let analysis = TimeframeAnalysis::analyze(Timeframe::H4, &falling(100.0, 12)).unwrap();

        assert_eq!(analysis.trend, Trend::Down);
        assert_eq!(analysis.bias, Bias::Bearish);
        assert_eq!(analysis.structure, Structure::LowerHighs);
    }

    #[test]
    fn test_short_series_is_neutral_consolidation() {
        let analysis = TimeframeAnalysis::analyze(Timeframe::H1, &rising(100.0, 4)).unwrap();

        assert_eq!(analysis.trend, Trend::Neutral);
        assert_eq!(analysis.confidence, 0.3);
        assert_eq!(analysis.structure, Structure::Consolidation);
    }

    #[test]
    fn test_flat_series_is_double_top() {
        let analysis = TimeframeAnalysis::analyze(Timeframe::H1, &flat(100.0, 10)).unwrap();

        assert_eq!(analysis.trend, Trend::Neutral);
        // Close sits on the SMA: aligned, but no lean either way
        assert!(analysis.sma_alignment);
        assert_eq!(analysis.bias, Bias::Neutral);
        assert_eq!(analysis.structure, Structure::DoubleTop);
    }

    #[test]
    fn test_neutral_bias_leans_with_sma() {
        struct TestCase {
            input: (bool, f64, f64),
            expected: Bias,
        }

        let tests = vec![
            TestCase {
                // TC0: aligned and above the SMA
                input: (true, 100.5, 100.0),
                expected: Bias::Bullish,
            },
            TestCase {
                // TC1: aligned and below the SMA
                input: (true, 99.5, 100.0),
                expected: Bias::Bearish,
            },
            TestCase {
                // TC2: not aligned
                input: (false, 105.0, 100.0),
                expected: Bias::Neutral,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (aligned, close, sma) = test.input;
            let actual = bias(Trend::Neutral, aligned, close, sma);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_empty_timeframes_are_skipped() {
        let candles = CandleSet::new().with(Timeframe::H1, rising(100.0, 10));
        let analysis = MultiTimeframeAnalysis::analyze(&candles);

        assert_eq!(analysis.analyses.len(), 1);
        assert!(analysis.get(Timeframe::D1).is_none());
        assert_eq!(analysis.dominant_trend, DominantTrend::Up);
        assert_eq!(analysis.confluence_score, 1.0);
        assert_eq!(analysis.conflict_count, 0);
    }

    #[test]
    fn test_no_timeframes_is_mixed_with_zero_confluence() {
        let analysis = MultiTimeframeAnalysis::analyze(&CandleSet::new());

        assert!(analysis.analyses.is_empty());
        assert_eq!(analysis.dominant_trend, DominantTrend::Mixed);
        assert_eq!(analysis.confluence_score, 0.0);
    }

    #[test]
    fn test_confluence_and_conflicts() {
        // 1d up, 4h down, 1h up, 5m neutral: majority up
        let candles = CandleSet::new()
            .with(Timeframe::D1, rising(100.0, 10))
            .with(Timeframe::H4, falling(100.0, 10))
            .with(Timeframe::H1, rising(100.0, 10))
            .with(Timeframe::M5, flat(100.0, 10));
        let analysis = MultiTimeframeAnalysis::analyze(&candles);

        assert_eq!(analysis.dominant_trend, DominantTrend::Up);
        assert_eq!(analysis.conflict_count, 1);
        // (1 + 0 + 1 + 0.5) / 4
        assert!((analysis.confluence_score - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_tied_majority_scores_half() {
        let candles = CandleSet::new()
            .with(Timeframe::D1, rising(100.0, 10))
            .with(Timeframe::H4, falling(100.0, 10));
        let analysis = MultiTimeframeAnalysis::analyze(&candles);

        assert_eq!(analysis.dominant_trend, DominantTrend::Mixed);
        assert_eq!(analysis.confluence_score, 0.5);
    }
}
