use crate::{
    analysis::{
        calc::bin_size_for_price, key_levels::KeyLevels, multi_timeframe::MultiTimeframeAnalysis,
        order_flow::OrderFlowData, volume_profile::VolumeProfile,
    },
    candle::{CandleSet, Timeframe},
    error::AnalysisError,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Grid evaluator for range bound markets.
pub mod grid;

/// Failed breakout reversal evaluator.
pub mod mean_reversion;

/// Daily / 4h trend-following evaluator.
pub mod trend;

pub use grid::GridTrading;
pub use mean_reversion::MeanReversion;
pub use trend::TrendFollowing;

/// Confidence of every Flat fallback result.
pub const FLAT_CONFIDENCE: f64 = 0.1;

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    #[display("trend_following")]
    TrendFollowing,
    #[display("grid")]
    Grid,
    #[display("mean_reversion")]
    MeanReversion,
}

impl StrategyId {
    /// Evaluator declaration order, used to break confidence ties.
    pub const ALL: [StrategyId; 3] = [
        StrategyId::TrendFollowing,
        StrategyId::Grid,
        StrategyId::MeanReversion,
    ];
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SignalSide {
    Long,
    Short,
    Flat,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MarketState {
    Balanced,
    #[display("Out of Balance")]
    #[serde(rename = "Out of Balance")]
    OutOfBalance,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Setup {
    #[display("Trend Model")]
    #[serde(rename = "Trend Model")]
    TrendModel,
    #[display("Grid Trading")]
    #[serde(rename = "Grid Trading")]
    GridTrading,
    #[display("Mean Reversion")]
    #[serde(rename = "Mean Reversion")]
    MeanReversion,
    None,
}

/// Independent directional recommendation of one evaluator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyResult {
    pub strategy: StrategyId,
    pub signal: SignalSide,
    pub confidence: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub reason: String,
    pub setup: Setup,
    pub market_state: MarketState,
}

impl StrategyResult {
    /// Flat fallback: entry is the last 1h close (0 when unavailable), no stop or target.
    pub fn flat<S>(strategy: StrategyId, input: &AnalysisBundle, reason: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            strategy,
            signal: SignalSide::Flat,
            confidence: FLAT_CONFIDENCE,
            entry: input.current_price().unwrap_or(0.0),
            stop_loss: 0.0,
            target: 0.0,
            reason: reason.into(),
            setup: Setup::None,
            market_state: MarketState::Balanced,
        }
    }

    /// Reject results carrying NaN or infinite prices.
    pub fn ensure_finite(self) -> Result<Self, StrategyError> {
        let fields = [
            ("confidence", self.confidence),
            ("entry", self.entry),
            ("stop_loss", self.stop_loss),
            ("target", self.target),
        ];

        match fields.into_iter().find(|(_, value)| !value.is_finite()) {
            Some((field, _)) => Err(StrategyError::NonFinite(field)),
            None => Ok(self),
        }
    }
}

/// Faults raised inside an evaluator. Never escape [`Strategy::generate`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum StrategyError {
    #[error("computed {0} is not a finite number")]
    NonFinite(&'static str),

    #[error("no {0} candles available")]
    MissingData(Timeframe),

    #[error("degenerate input: {0}")]
    Degenerate(String),
}

/// Shared, immutable input of every evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisBundle {
    pub symbol: String,
    pub venue: String,
    pub candles: CandleSet,
    pub volume_profile: VolumeProfile,
    pub order_flow: OrderFlowData,
    pub multi_timeframe: MultiTimeframeAnalysis,
    pub key_levels: KeyLevels,
}

impl AnalysisBundle {
    /// Run every analysis engine over `candles`.
    ///
    /// Fails with [`AnalysisError::InvalidInput`] when the 1h timeframe is empty, since
    /// both the volume profile and the order flow require it.
    pub fn build<S, V>(symbol: S, venue: V, candles: CandleSet) -> Result<Self, AnalysisError>
    where
        S: Into<String>,
        V: Into<String>,
    {
        let hourly = candles.get(Timeframe::H1);
        let latest_close = hourly.last().map(|c| c.close).ok_or_else(|| {
            AnalysisError::InvalidInput("no 1h candles available for analysis".to_string())
        })?;

        let volume_profile = VolumeProfile::calculate(hourly, bin_size_for_price(latest_close))?;
        let order_flow = OrderFlowData::analyze(hourly)?;
        let multi_timeframe = MultiTimeframeAnalysis::analyze(&candles);
        let key_levels = KeyLevels::detect(&volume_profile, &candles);

        Ok(Self {
            symbol: symbol.into(),
            venue: venue.into(),
            candles,
            volume_profile,
            order_flow,
            multi_timeframe,
            key_levels,
        })
    }

    /// Last 1h close.
    pub fn current_price(&self) -> Option<f64> {
        self.candles.last(Timeframe::H1).map(|c| c.close)
    }

    /// Last 1h close, as an evaluator fault when missing.
    pub fn require_current_price(&self) -> Result<f64, StrategyError> {
        self.current_price()
            .ok_or(StrategyError::MissingData(Timeframe::H1))
    }
}

/// A side-effect free evaluator producing one [`StrategyResult`] per call.
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    /// Evaluate the bundle. Insufficient data is answered with a Flat result; an `Err`
    /// is reserved for faults.
    fn evaluate(&self, input: &AnalysisBundle) -> Result<StrategyResult, StrategyError>;

    /// Evaluate, converting any fault into a Flat result carrying the fault text.
    fn generate(&self, input: &AnalysisBundle) -> StrategyResult {
        match self.evaluate(input).and_then(StrategyResult::ensure_finite) {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    strategy = %self.id(),
                    symbol = %input.symbol,
                    %error,
                    "strategy evaluation failed, falling back to Flat"
                );
                StrategyResult::flat(self.id(), input, format!("Strategy error: {error}"))
            }
        }
    }
}

/// The three evaluators in declaration order.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(TrendFollowing),
        Box::new(GridTrading),
        Box::new(MeanReversion),
    ]
}
