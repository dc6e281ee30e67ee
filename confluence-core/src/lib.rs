/// Confluence Core - multi-timeframe signal analysis
///
/// Turns a set of candles across five timeframes (1d, 4h, 1h, 5m, 1m) into a single
/// `TradingSignal`:
/// - analysis engines: volume profile, order flow, trend per timeframe, key levels
/// - three independent strategy evaluators (trend-following, grid, mean-reversion)
/// - a majority vote synthesiser producing the final signal
///
/// Market data is supplied through the `MarketDataProvider` interface; venue
/// integrations live in `confluence-data`.
pub mod analysis;

/// Candle, [`Timeframe`] and [`CandleSet`] data model.
pub mod candle;

/// All errors generated in the confluence-core crate.
pub mod error;

/// End-to-end pipeline entry point.
pub mod generator;

/// [`MarketDataProvider`] interface and the concurrent multi-timeframe fetch.
pub mod provider;

/// Majority vote synthesis and the [`TradingSignal`] output.
pub mod signal;

/// Strategy evaluators and their shared input bundle.
pub mod strategy;

pub use candle::{Candle, CandleSet, Timeframe};
pub use error::{AnalysisError, ProviderError, SignalError};
pub use generator::SignalGenerator;
pub use provider::{MarketDataProvider, fetch_candle_set};
pub use signal::{SignalSynthesizer, TradingSignal};
pub use strategy::{
    AnalysisBundle, MarketState, Setup, SignalSide, Strategy, StrategyError, StrategyId,
    StrategyResult,
};
