//! Numeric helpers shared by the analysis engines and strategy evaluators.
//!
//! All functions are pure and operate on candle slices.

use crate::candle::Candle;

/// Arithmetic mean, `None` for an empty input.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count > 0 {
        Some(sum / count as f64)
    } else {
        None
    }
}

/// Last `n` candles (fewer if the slice is shorter).
pub fn tail(candles: &[Candle], n: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(n)..]
}

/// Simple moving average of closes over the trailing `period` candles.
///
/// Uses every available candle when fewer than `period` exist.
pub fn sma_close(candles: &[Candle], period: usize) -> Option<f64> {
    mean(tail(candles, period).iter().map(|c| c.close))
}

/// Highest high of the slice.
pub fn highest_high(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.high).reduce(f64::max)
}

/// Lowest low of the slice.
pub fn lowest_low(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.low).reduce(f64::min)
}

/// True Range = max(H-L, |H-PrevClose|, |L-PrevClose|)
pub fn true_range(prev: &Candle, current: &Candle) -> f64 {
    (current.high - current.low)
        .max((current.high - prev.close).abs())
        .max((current.low - prev.close).abs())
}

/// Average True Range over the trailing `period` true ranges.
///
/// Needs `period + 1` candles; returns `None` otherwise.
pub fn average_true_range(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    mean(
        tail(candles, period + 1)
            .windows(2)
            .map(|pair| true_range(&pair[0], &pair[1])),
    )
}

/// Reward / risk for a trade plan, `0.0` when there is no risk distance.
pub fn risk_reward(entry: f64, stop_loss: f64, target: f64) -> f64 {
    let risk = (entry - stop_loss).abs();
    let reward = (target - entry).abs();

    if risk > 0.0 { reward / risk } else { 0.0 }
}

/// Volume profile price bin size for an instrument trading at `price`.
pub fn bin_size_for_price(price: f64) -> f64 {
    if price > 1000.0 {
        10.0
    } else if price > 1.0 {
        0.1
    } else if price > 0.01 {
        0.001
    } else {
        0.00001
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, open, high, low, close, 1.0)
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(vec![1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_sma_uses_available_candles() {
        let candles = vec![bar(1.0, 1.0, 1.0, 1.0), bar(3.0, 3.0, 3.0, 3.0)];
        assert_eq!(sma_close(&candles, 200), Some(2.0));
        assert_eq!(sma_close(&candles, 1), Some(3.0));
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let prev = bar(100.0, 101.0, 99.0, 100.0);
        let gap_up = bar(104.0, 105.0, 103.0, 104.5);
        assert_eq!(true_range(&prev, &gap_up), 5.0);
    }

    #[test]
    fn test_average_true_range() {
        let candles: Vec<_> = (0..15).map(|_| bar(100.0, 101.0, 99.0, 100.0)).collect();
        assert_eq!(average_true_range(&candles, 14), Some(2.0));
        assert_eq!(average_true_range(&candles[..14], 14), None);
    }

    #[test]
    fn test_risk_reward() {
        assert!((risk_reward(100.0, 98.0, 104.0) - 2.0).abs() < 1e-12);
        assert_eq!(risk_reward(100.0, 100.0, 104.0), 0.0);
    }

    #[test]
    fn test_bin_size_for_price() {
        struct TestCase {
            input: f64,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: BTC-like
                input: 65_000.0,
                expected: 10.0,
            },
            TestCase {
                // TC1: boundary is exclusive
                input: 1000.0,
                expected: 0.1,
            },
            TestCase {
                // TC2: sub-dollar
                input: 0.5,
                expected: 0.001,
            },
            TestCase {
                // TC3: micro-cap
                input: 0.000_5,
                expected: 0.000_01,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = bin_size_for_price(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
