use crate::{
    candle::{Candle, CandleSet, Timeframe},
    error::ProviderError,
};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

/// Source of historical candles for one symbol.
///
/// Each timeframe is fetched independently: a failure for one timeframe must not affect
/// the others.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch up to `limit` candles for `symbol`, ordered oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;
}

/// Fetch every [`Timeframe`] concurrently using its default limit.
///
/// A failed timeframe is logged and left empty in the returned [`CandleSet`].
pub async fn fetch_candle_set<P>(provider: &P, symbol: &str) -> CandleSet
where
    P: MarketDataProvider + ?Sized,
{
    let fetches = Timeframe::ALL.into_iter().map(|timeframe| async move {
        let result = provider
            .fetch_candles(symbol, timeframe, timeframe.fetch_limit())
            .await;
        (timeframe, result)
    });

    join_all(fetches)
        .await
        .into_iter()
        .fold(CandleSet::new(), |set, (timeframe, result)| match result {
            Ok(candles) => {
                debug!(%symbol, %timeframe, count = candles.len(), "fetched candles");
                set.with(timeframe, candles)
            }
            Err(error) => {
                warn!(%symbol, %timeframe, %error, "failed to fetch candles, continuing without them");
                set
            }
        })
}
