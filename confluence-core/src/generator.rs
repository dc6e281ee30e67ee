use crate::{
    candle::CandleSet,
    error::SignalError,
    provider::{MarketDataProvider, fetch_candle_set},
    signal::{SignalSynthesizer, TradingSignal},
    strategy::{AnalysisBundle, Strategy, StrategyResult, default_strategies},
};
use std::{fmt, sync::Arc};
use tracing::{debug, info};

/// Runs the full analysis pipeline for a symbol: fetch, analyse, evaluate, synthesise.
///
/// Holds no per-call state, so one generator may serve concurrent requests.
pub struct SignalGenerator {
    provider: Arc<dyn MarketDataProvider>,
    strategies: Vec<Box<dyn Strategy>>,
}

impl fmt::Debug for SignalGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGenerator")
            .field("strategies", &self.strategies.iter().map(|s| s.id()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SignalGenerator {
    /// Construct a generator using the default evaluators.
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            strategies: default_strategies(),
        }
    }

    /// Fetch candles for every timeframe and generate a [`TradingSignal`].
    ///
    /// Timeframes the provider fails to deliver degrade the signal rather than failing it;
    /// only missing 1h data is an error.
    pub async fn generate_signal(
        &self,
        symbol: &str,
        venue: &str,
    ) -> Result<TradingSignal, SignalError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(SignalError::MissingSymbol);
        }

        let candles = fetch_candle_set(self.provider.as_ref(), symbol).await;
        self.generate_from_candles(symbol, venue, candles)
    }

    /// Generate a [`TradingSignal`] from an already fetched [`CandleSet`].
    pub fn generate_from_candles(
        &self,
        symbol: &str,
        venue: &str,
        candles: CandleSet,
    ) -> Result<TradingSignal, SignalError> {
        let input = AnalysisBundle::build(symbol, venue, candles)?;

        let results: Vec<StrategyResult> = self
            .strategies
            .iter()
            .map(|strategy| {
                let result = strategy.generate(&input);
                debug!(
                    %symbol,
                    strategy = %result.strategy,
                    signal = %result.signal,
                    confidence = result.confidence,
                    "strategy evaluated"
                );
                result
            })
            .collect();

        let signal = SignalSynthesizer::synthesize(&input, &results);

        info!(
            %symbol,
            %venue,
            signal = %signal.signal,
            confidence = signal.confidence,
            strategy = %signal.strategy_used,
            "signal generated"
        );

        Ok(signal)
    }
}
