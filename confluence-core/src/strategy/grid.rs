use crate::{
    analysis::{
        calc::{average_true_range, highest_high, lowest_low},
        multi_timeframe::Structure,
        order_flow::VolumeCluster,
    },
    candle::Timeframe,
    strategy::{
        AnalysisBundle, MarketState, Setup, SignalSide, Strategy, StrategyError, StrategyId,
        StrategyResult,
    },
};

const MIN_CANDLES: usize = 20;
const ATR_PERIOD: usize = 14;

/// ATR (as a percentage of price) above which the range is too wide for a grid.
const MAX_ATR_PERCENT: f64 = 2.0;

/// Confluence above which a non-consolidating market is treated as trending.
const MAX_CONFLUENCE: f64 = 0.6;

const GRID_CONFIDENCE: f64 = 0.7;

/// Fades the edges of a quiet 1h range.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridTrading;

impl Strategy for GridTrading {
    fn id(&self) -> StrategyId {
        StrategyId::Grid
    }

    fn evaluate(&self, input: &AnalysisBundle) -> Result<StrategyResult, StrategyError> {
        let Some(hourly_analysis) = input.multi_timeframe.get(Timeframe::H1) else {
            return Ok(self.flat(input, "1H data not available for grid analysis".to_string()));
        };

        if hourly_analysis.structure != Structure::Consolidation
            && input.multi_timeframe.confluence_score > MAX_CONFLUENCE
        {
            return Ok(self.flat(
                input,
                "Market not in consolidation - grid trading not ideal".to_string(),
            ));
        }

        let candles = input.candles.get(Timeframe::H1);
        if candles.len() < MIN_CANDLES {
            return Ok(self.flat(input, "Insufficient 1H data for grid analysis".to_string()));
        }

        let current = input.require_current_price()?;
        let (Some(high), Some(low)) = (highest_high(candles), lowest_low(candles)) else {
            return Err(StrategyError::MissingData(Timeframe::H1));
        };
        let range = high - low;
        if range <= 0.0 {
            return Err(StrategyError::Degenerate(format!(
                "1h range is empty at {high}"
            )));
        }

        let atr = average_true_range(candles, ATR_PERIOD)
            .ok_or(StrategyError::MissingData(Timeframe::H1))?;
        let atr_percent = atr / current * 100.0;
        if atr_percent > MAX_ATR_PERCENT {
            return Ok(self.flat(
                input,
                format!("ATR {atr_percent:.2}% too high for grid trading"),
            ));
        }

        let position = (current - low) / range;
        let quiet = input.order_flow.volume_cluster == VolumeCluster::BelowAverage;

        let (signal, stop_loss, target) = match position {
            p if quiet && p < 0.5 => (SignalSide::Long, low * 0.98, high * 0.99),
            p if quiet && p > 0.5 => (SignalSide::Short, high * 1.02, low * 1.01),
            _ => return Ok(self.flat(input, "Position not ideal for grid trading".to_string())),
        };

        Ok(StrategyResult {
            strategy: self.id(),
            signal,
            confidence: GRID_CONFIDENCE,
            entry: current,
            stop_loss,
            target,
            reason: format!(
                "Grid trading setup: price at {:.0}% of range, ATR {atr_percent:.2}%, consolidation detected",
                position * 100.0
            ),
            setup: Setup::GridTrading,
            market_state: MarketState::Balanced,
        })
    }
}

impl GridTrading {
    fn flat(&self, input: &AnalysisBundle, reason: String) -> StrategyResult {
        StrategyResult::flat(self.id(), input, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        candle::{Candle, CandleSet},
        strategy::test_utils::{bundle, ranging},
    };

    /// 15 loud bars then 5 quiet ones, inside a 1% range ending at the lower quartile.
    fn quiet_range() -> Vec<Candle> {
        let mut candles = ranging(100.0, 101.0, 20, 100.0);
        candles[15..].iter_mut().for_each(|c| c.volume = 10.0);
        candles
    }

    #[test]
    fn test_quiet_range_lower_half_is_long() {
        let input = bundle(CandleSet::new().with(Timeframe::H1, quiet_range()));
        let result = GridTrading.generate(&input);

        assert_eq!(result.signal, SignalSide::Long);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.entry, 100.25);
        assert!((result.stop_loss - 98.0).abs() < 1e-9);
        assert!((result.target - 99.99).abs() < 1e-9);
        assert_eq!(result.setup, Setup::GridTrading);
        assert_eq!(
            result.reason,
            "Grid trading setup: price at 25% of range, ATR 1.00%, consolidation detected"
        );
    }

    #[test]
    fn test_upper_half_is_short() {
        let mut candles = quiet_range();
        candles.pop();
        candles.insert(0, ranging(100.0, 101.0, 1, 100.0)[0]);
        // Last bar is now bullish, closing at the upper quartile
        let input = bundle(CandleSet::new().with(Timeframe::H1, candles));
        let result = GridTrading.generate(&input);

        assert_eq!(result.signal, SignalSide::Short);
        assert!((result.stop_loss - 103.02).abs() < 1e-9);
        assert!((result.target - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_loud_range_is_flat() {
        let input = bundle(CandleSet::new().with(Timeframe::H1, ranging(100.0, 101.0, 20, 100.0)));
        let result = GridTrading.generate(&input);

        assert_eq!(result.signal, SignalSide::Flat);
        assert_eq!(result.reason, "Position not ideal for grid trading");
    }

    #[test]
    fn test_wide_atr_is_flat() {
        let input = bundle(CandleSet::new().with(Timeframe::H1, ranging(100.0, 105.0, 20, 100.0)));
        let result = GridTrading.generate(&input);

        assert_eq!(result.signal, SignalSide::Flat);
        assert!(result.reason.starts_with("ATR "));
    }

    #[test]
    fn test_insufficient_candles_is_flat() {
        let input = bundle(CandleSet::new().with(Timeframe::H1, ranging(100.0, 101.0, 19, 100.0)));
        let result = GridTrading.generate(&input);

        assert_eq!(result.reason, "Insufficient 1H data for grid analysis");
    }

    #[test]
    fn test_empty_range_is_strategy_error() {
        let candles = vec![Candle::new(0, 100.0, 100.0, 100.0, 100.0, 1.0); 20];
        let input = bundle(CandleSet::new().with(Timeframe::H1, candles));
        let result = GridTrading.generate(&input);

        assert_eq!(result.signal, SignalSide::Flat);
        assert!(result.reason.starts_with("Strategy error: degenerate input"));
    }
}
