/// Numeric helpers shared by the engines and evaluators.
pub mod calc;

/// Support / resistance levels from every timeframe.
pub mod key_levels;

/// Per-timeframe trend classification and cross-timeframe confluence.
pub mod multi_timeframe;

/// Candle based order flow estimation.
pub mod order_flow;

/// Volume at price distribution of the 1h timeframe.
pub mod volume_profile;
