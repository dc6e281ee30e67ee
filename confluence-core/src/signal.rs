use crate::{
    analysis::{key_levels::KeyLevel, multi_timeframe::TimeframeAnalysis, order_flow::OrderFlowData},
    candle::Timeframe,
    strategy::{
        AnalysisBundle, MarketState, Setup, SignalSide, StrategyId, StrategyResult,
    },
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Number of key levels attached to a [`TradingSignal`].
pub const TOP_KEY_LEVELS: usize = 10;

/// Confidence of a signal without a Long or Short majority.
pub const NO_MAJORITY_CONFIDENCE: f64 = 0.3;

const MAX_CONFIDENCE: f64 = 0.95;

/// Final, immutable output of one signal generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingSignal {
    pub signal_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub broker: String,
    pub timeframes: Vec<Timeframe>,
    pub market_state: MarketState,
    pub setup: Setup,
    pub signal: SignalSide,
    pub reason: String,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub confidence: f64,
    pub strategy_used: StrategyId,
    /// Raw vote of every evaluator in declaration order
    pub strategies_consensus: IndexMap<StrategyId, SignalSide>,
    pub key_levels: Vec<KeyLevel>,
    pub timeframe_analysis: BTreeMap<Timeframe, TimeframeAnalysis>,
    pub order_flow: OrderFlowData,
}

/// Outcome of the majority vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub signal: SignalSide,
    pub confidence: f64,
    /// Evaluator whose trade plan is adopted
    pub primary: StrategyResult,
}

/// Majority vote over evaluator results.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalSynthesizer;

impl SignalSynthesizer {
    /// Decide the winning side, its primary evaluator and the adjusted confidence.
    ///
    /// Long or Short wins with at least two votes. The primary evaluator is the most
    /// confident one voting for the outcome (declaration order breaks ties), which for a
    /// Flat outcome means the most confident Flat voter. Returns `None` for no results.
    pub fn decide(results: &[StrategyResult]) -> Option<Decision> {
        let votes = |side: SignalSide| results.iter().filter(|r| r.signal == side).count();
        let (long, short) = (votes(SignalSide::Long), votes(SignalSide::Short));

        let (signal, votes) = if long >= 2 {
            (SignalSide::Long, long)
        } else if short >= 2 {
            (SignalSide::Short, short)
        } else {
            (SignalSide::Flat, 0)
        };

        // Without a majority the primary is the most confident Flat voter, so the signal
        // still names the evaluator whose plan it carries. Falls back to the first result
        // when nobody voted Flat.
        let primary = results
            .iter()
            .filter(|r| r.signal == signal)
            .reduce(|best, r| {
                let better = r.confidence > best.confidence
                    || (r.confidence == best.confidence && r.strategy < best.strategy);
                if better { r } else { best }
            })
            .or_else(|| results.first())?
            .clone();

        let confidence = match votes {
            3.. => (primary.confidence * 1.1).min(MAX_CONFIDENCE),
            2 => primary.confidence * 0.9,
            _ => NO_MAJORITY_CONFIDENCE,
        };

        Some(Decision {
            signal,
            confidence,
            primary,
        })
    }

    /// Build the [`TradingSignal`] for `input` from the evaluator `results`.
    pub fn synthesize(input: &AnalysisBundle, results: &[StrategyResult]) -> TradingSignal {
        let decision = Self::decide(results).unwrap_or_else(|| Decision {
            signal: SignalSide::Flat,
            confidence: NO_MAJORITY_CONFIDENCE,
            primary: StrategyResult::flat(
                StrategyId::TrendFollowing,
                input,
                "No strategy produced a result",
            ),
        });

        let strategies_consensus = StrategyId::ALL
            .into_iter()
            .map(|id| {
                let vote = results
                    .iter()
                    .find(|r| r.strategy == id)
                    .map_or(SignalSide::Flat, |r| r.signal);
                (id, vote)
            })
            .collect();

        let Decision {
            signal,
            confidence,
            primary,
        } = decision;

        TradingSignal {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: input.symbol.clone(),
            broker: input.venue.clone(),
            timeframes: Timeframe::ALL.to_vec(),
            market_state: primary.market_state,
            setup: primary.setup,
            signal,
            reason: primary.reason,
            entry: primary.entry,
            stop_loss: primary.stop_loss,
            target: primary.target,
            confidence,
            strategy_used: primary.strategy,
            strategies_consensus,
            key_levels: input.key_levels.top(TOP_KEY_LEVELS),
            timeframe_analysis: input.multi_timeframe.analyses.clone(),
            order_flow: input.order_flow.clone(),
        }
    }
}
