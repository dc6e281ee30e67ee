use crate::{
    analysis::{
        calc::{highest_high, lowest_low, tail},
        order_flow::VolumeCluster,
    },
    candle::{Candle, Timeframe},
    strategy::{
        AnalysisBundle, MarketState, Setup, SignalSide, Strategy, StrategyError, StrategyId,
        StrategyResult,
    },
};
use derive_more::Display;

const MIN_CANDLES: usize = 20;

/// Size of both the breakout window and the reference window before it.
const BREAKOUT_WINDOW: usize = 5;

/// Window the reversion support / resistance is taken from.
const RANGE_WINDOW: usize = 10;

const MAX_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutDirection {
    #[display("UP")]
    Up,
    #[display("DOWN")]
    Down,
}

/// A breakout beyond the reference window that closed back inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailedBreakout {
    pub direction: BreakoutDirection,
    /// Near 1.0 for a marginal overshoot, falling to 0.0 as the overshoot grows
    pub strength: f64,
}

/// Fades failed 1h breakouts back into the prior range.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanReversion;

impl Strategy for MeanReversion {
    fn id(&self) -> StrategyId {
        StrategyId::MeanReversion
    }

    fn evaluate(&self, input: &AnalysisBundle) -> Result<StrategyResult, StrategyError> {
        if input.multi_timeframe.get(Timeframe::H1).is_none() {
            return Ok(StrategyResult::flat(self.id(), input, "1H data not available"));
        }

        let candles = input.candles.get(Timeframe::H1);
        if candles.len() < MIN_CANDLES {
            return Ok(StrategyResult::flat(self.id(), input, "Insufficient 1H data"));
        }

        let Some(breakout) = detect_failed_breakout(candles) else {
            return Ok(StrategyResult::flat(self.id(), input, "No failed breakout detected"));
        };

        let signal = match breakout.direction {
            BreakoutDirection::Up => SignalSide::Short,
            BreakoutDirection::Down => SignalSide::Long,
        };

        let mut confidence = 0.65 + 0.2 * breakout.strength;
        if input.order_flow.volume_cluster == VolumeCluster::AboveAverage {
            confidence *= 0.7;
        }

        let recent = tail(candles, RANGE_WINDOW);
        let (Some(support), Some(resistance)) = (lowest_low(recent), highest_high(recent)) else {
            return Err(StrategyError::MissingData(Timeframe::H1));
        };
        let poc = input.volume_profile.poc.price;

        let (entry, stop_loss, target) = match signal {
            SignalSide::Long => (support.max(poc), support * 0.98, resistance * 1.01),
            _ => (resistance.min(poc), resistance * 1.02, support * 0.99),
        };

        let rejected = match breakout.direction {
            BreakoutDirection::Up => "resistance",
            BreakoutDirection::Down => "support",
        };

        Ok(StrategyResult {
            strategy: self.id(),
            signal,
            confidence: confidence.min(MAX_CONFIDENCE),
            entry,
            stop_loss,
            target,
            reason: format!(
                "Failed {} breakout detected. Price rejecting {rejected} with {:.0}% strength.",
                breakout.direction,
                breakout.strength * 100.0
            ),
            setup: Setup::MeanReversion,
            market_state: MarketState::Balanced,
        })
    }
}

/// Compare the last five bars against the five before them.
///
/// Upward breakouts are checked first. Strength measures how far the latest bar still
/// reaches past the broken level: `1 - overshoot / (2% of the level + 1)`, floored at
/// zero. A latest bar already back inside the range scores above 1.
pub fn detect_failed_breakout(candles: &[Candle]) -> Option<FailedBreakout> {
    if candles.len() < BREAKOUT_WINDOW * 2 {
        return None;
    }

    let recent = tail(candles, BREAKOUT_WINDOW);
    let older = &candles[candles.len() - BREAKOUT_WINDOW * 2..candles.len() - BREAKOUT_WINDOW];
    let latest = recent.last()?;
    let strength = |overshoot: f64, level: f64| (1.0 - overshoot / (level * 0.02 + 1.0)).max(0.0);

    let old_high = highest_high(older)?;
    if highest_high(recent)? > old_high && latest.close < old_high {
        return Some(FailedBreakout {
            direction: BreakoutDirection::Up,
            strength: strength(latest.high - old_high, old_high),
        });
    }

    let old_low = lowest_low(older)?;
    if lowest_low(recent)? < old_low && latest.close > old_low {
        return Some(FailedBreakout {
            direction: BreakoutDirection::Down,
            strength: strength(old_low - latest.low, old_low),
        });
    }

    None
}
