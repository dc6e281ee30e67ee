use crate::candle::Timeframe;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the analysis engines when a hard input requirement is violated.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failure to obtain candles for one [`Timeframe`] from a
/// [`MarketDataProvider`](crate::provider::MarketDataProvider).
///
/// Never aborts a signal generation: the fetch step substitutes an empty sequence.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum ProviderError {
    #[error("market data unavailable for {timeframe}: {reason}")]
    Unavailable { timeframe: Timeframe, reason: String },
}

/// All errors surfaced by [`SignalGenerator::generate_signal`](crate::generator::SignalGenerator).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum SignalError {
    #[error("signal analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("symbol is required")]
    MissingSymbol,
}

impl SignalError {
    /// Determine if the error was caused by the caller rather than the market data.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SignalError::MissingSymbol)
    }
}
