use crate::{
    analysis::{
        calc::{highest_high, lowest_low, risk_reward},
        multi_timeframe::{Bias, DominantTrend, TimeframeAnalysis, Trend},
        order_flow::{OrderFlowData, VolumeCluster},
    },
    candle::Timeframe,
    strategy::{
        AnalysisBundle, MarketState, Setup, SignalSide, Strategy, StrategyError, StrategyId,
        StrategyResult,
    },
};

/// Minimum acceptable reward / risk before the confidence is penalised.
const MIN_RISK_REWARD: f64 = 1.5;

/// Confluence above which a trending market is considered out of balance.
const OUT_OF_BALANCE_CONFLUENCE: f64 = 0.7;

const MAX_CONFIDENCE: f64 = 0.95;

/// Trades in the direction of the daily trend when the 4h timeframe confirms it,
/// penalising setups that order flow, the volume profile or the reward / risk do not
/// back up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendFollowing;

impl Strategy for TrendFollowing {
    fn id(&self) -> StrategyId {
        StrategyId::TrendFollowing
    }

    fn evaluate(&self, input: &AnalysisBundle) -> Result<StrategyResult, StrategyError> {
        let mtf = &input.multi_timeframe;

        let Some(daily) = mtf.get(Timeframe::D1) else {
            return Ok(self.flat(input, "Daily timeframe data not available"));
        };
        let Some(four_hour) = mtf.get(Timeframe::H4) else {
            return Ok(self.flat(input, "4H timeframe data not available"));
        };
        if mtf.get(Timeframe::H1).is_none() {
            return Ok(self.flat(input, "1H timeframe data not available"));
        }

        let Some(side) = direction(daily, four_hour) else {
            return Ok(self.flat(
                input,
                "Daily and 4H trends do not align for trading signal",
            ));
        };

        let mut confidence = daily.confidence * 0.7 + four_hour.confidence * 0.3;

        if !order_flow_confirms(&input.order_flow, side) {
            confidence *= 0.7;
        }
        if !input.volume_profile.has_volume_nodes() {
            confidence *= 0.6;
        }

        let (entry, stop_loss, target) = price_targets(input, side)?;
        if risk_reward(entry, stop_loss, target) < MIN_RISK_REWARD {
            confidence *= 0.7;
        }

        let confidence =
            (confidence * (0.5 + 0.5 * mtf.confluence_score)).clamp(0.0, MAX_CONFIDENCE);

        let setup = match mtf.dominant_trend {
            DominantTrend::Mixed => Setup::MeanReversion,
            DominantTrend::Up | DominantTrend::Down => Setup::TrendModel,
        };
        let market_state = if mtf.confluence_score > OUT_OF_BALANCE_CONFLUENCE
            && mtf.dominant_trend != DominantTrend::Mixed
        {
            MarketState::OutOfBalance
        } else {
            MarketState::Balanced
        };

        Ok(StrategyResult {
            strategy: self.id(),
            signal: side,
            confidence,
            entry,
            stop_loss,
            target,
            reason: reason(input, daily, four_hour),
            setup,
            market_state,
        })
    }
}

impl TrendFollowing {
    fn flat(&self, input: &AnalysisBundle, reason: &str) -> StrategyResult {
        StrategyResult::flat(self.id(), input, reason)
    }
}

/// Long when the daily timeframe leans up and the 4h either agrees or is bullish.
fn direction(daily: &TimeframeAnalysis, four_hour: &TimeframeAnalysis) -> Option<SignalSide> {
    let confirmed = daily.trend == four_hour.trend && daily.trend != Trend::Neutral;

    let daily_up =
        daily.trend == Trend::Up || (daily.trend == Trend::Neutral && daily.bias == Bias::Bullish);
    let daily_down = daily.trend == Trend::Down
        || (daily.trend == Trend::Neutral && daily.bias == Bias::Bearish);

    if daily_up {
        (confirmed || four_hour.bias == Bias::Bullish).then_some(SignalSide::Long)
    } else if daily_down {
        (confirmed || four_hour.bias == Bias::Bearish).then_some(SignalSide::Short)
    } else {
        None
    }
}

/// Order flow agrees when CVD and delta imbalance point the same way on above average volume.
fn order_flow_confirms(flow: &OrderFlowData, side: SignalSide) -> bool {
    let heavy = flow.volume_cluster == VolumeCluster::AboveAverage;
    match side {
        SignalSide::Long => flow.is_cvd_bullish() && flow.delta_imbalance > 0.5 && heavy,
        SignalSide::Short => !flow.is_cvd_bullish() && flow.delta_imbalance < 0.5 && heavy,
        SignalSide::Flat => false,
    }
}

/// Entry at the current price; stop beyond the 5m extreme or the nearest level on the
/// stop side, whichever is further; target at the nearest level on the target side.
fn price_targets(
    input: &AnalysisBundle,
    side: SignalSide,
) -> Result<(f64, f64, f64), StrategyError> {
    let current = input.require_current_price()?;
    let five_minute = input.candles.get(Timeframe::M5);
    let (supports, resistances) = input.key_levels.supports_resistances(current);
    let nearest_support = supports.first().map(|level| level.price);
    let nearest_resistance = resistances.first().map(|level| level.price);

    match side {
        SignalSide::Long => {
            let low = lowest_low(five_minute).unwrap_or(current);
            let stop = nearest_support.map_or(low, |support| support.min(low));
            let target = nearest_resistance.unwrap_or(current * 1.02);
            Ok((current, stop * 0.99, target * 1.01))
        }
        SignalSide::Short => {
            let high = highest_high(five_minute).unwrap_or(current);
            let stop = nearest_resistance.map_or(high, |resistance| resistance.max(high));
            let target = nearest_support.unwrap_or(current * 0.98);
            Ok((current, stop * 1.01, target * 0.99))
        }
        SignalSide::Flat => Err(StrategyError::Degenerate(
            "price targets requested for a Flat signal".to_string(),
        )),
    }
}

fn reason(
    input: &AnalysisBundle,
    daily: &TimeframeAnalysis,
    four_hour: &TimeframeAnalysis,
) -> String {
    format!(
        "Multi-timeframe analysis: Daily {}, 4H {}, confluence score {:.0}%. Volume: POC at {}. Order flow: CVD {}, {}.",
        daily.trend,
        four_hour.trend,
        input.multi_timeframe.confluence_score * 100.0,
        input.volume_profile.poc.price,
        input.order_flow.cvd_display(),
        input.order_flow.aggression,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            key_levels::{KeyLevel, KeyLevelKind, KeyLevels},
            multi_timeframe::Structure,
        },
        candle::{Candle, CandleSet},
        strategy::test_utils::bundle,
    };

    /// Bullish bars stepping 1% higher each, with a firm close.
    fn rising(start: f64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = start * (1.0 + 0.01 * i as f64);
                Candle::new(i as i64, base, base * 1.006, base * 0.998, base * 1.005, 10.0)
            })
            .collect()
    }

    /// Bearish bars stepping 1% lower each, with a weak close.
    fn falling(start: f64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = start * (1.0 - 0.01 * i as f64);
                Candle::new(i as i64, base, base * 1.002, base * 0.994, base * 0.995, 10.0)
            })
            .collect()
    }

    fn level(price: f64, kind: KeyLevelKind) -> KeyLevel {
        KeyLevel {
            price,
            kind,
            timeframe: Timeframe::D1,
            significance: 3,
            touches: None,
        }
    }

    fn uptrend_bundle() -> AnalysisBundle {
        bundle(
            CandleSet::new()
                .with(Timeframe::D1, rising(100.0, 12))
                .with(Timeframe::H4, rising(100.0, 12))
                .with(Timeframe::H1, rising(100.0, 12)),
        )
    }

    fn analysis(trend: Trend, bias: Bias) -> TimeframeAnalysis {
        TimeframeAnalysis {
            timeframe: Timeframe::D1,
            trend,
            bias,
            confidence: 0.9,
            sma_alignment: true,
            structure: Structure::Consolidation,
        }
    }

    #[test]
    fn test_direction() {
        struct TestCase {
            input: (TimeframeAnalysis, TimeframeAnalysis),
            expected: Option<SignalSide>,
        }

        let tests = vec![
            TestCase {
                // TC0: daily and 4h both up
                input: (analysis(Trend::Up, Bias::Bullish), analysis(Trend::Up, Bias::Bullish)),
                expected: Some(SignalSide::Long),
            },
            TestCase {
                // TC1: daily neutral leaning bullish, 4h bullish
                input: (
                    analysis(Trend::Neutral, Bias::Bullish),
                    analysis(Trend::Neutral, Bias::Bullish),
                ),
                expected: Some(SignalSide::Long),
            },
            TestCase {
                // TC2: daily up, 4h down
                input: (analysis(Trend::Up, Bias::Bullish), analysis(Trend::Down, Bias::Bearish)),
                expected: None,
            },
            TestCase {
                // TC3: daily and 4h both down
                input: (analysis(Trend::Down, Bias::Bearish), analysis(Trend::Down, Bias::Bearish)),
                expected: Some(SignalSide::Short),
            },
            TestCase {
                // TC4: no lean at all
                input: (
                    analysis(Trend::Neutral, Bias::Neutral),
                    analysis(Trend::Up, Bias::Bullish),
                ),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = direction(&test.input.0, &test.input.1);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_missing_daily_is_flat() {
        let result = TrendFollowing.generate(&bundle(
            CandleSet::new().with(Timeframe::H1, rising(100.0, 12)),
        ));

        assert_eq!(result.signal, SignalSide::Flat);
        assert_eq!(result.reason, "Daily timeframe data not available");
        assert_eq!(result.confidence, 0.1);
    }

    #[test]
    fn test_aligned_uptrend_is_long() {
        let candles = CandleSet::new()
            .with(Timeframe::D1, rising(100.0, 12))
            .with(Timeframe::H4, rising(100.0, 12))
            .with(Timeframe::H1, rising(100.0, 12));
        let input = bundle(candles);
        let result = TrendFollowing.generate(&input);

        assert_eq!(result.signal, SignalSide::Long);
        assert_eq!(result.setup, Setup::TrendModel);
        assert_eq!(result.market_state, MarketState::OutOfBalance);
        assert!(result.confidence > 0.0 && result.confidence <= MAX_CONFIDENCE);
        assert!(result.stop_loss < result.entry);
        assert!(result.target > result.entry);
        assert!(result.reason.starts_with(
            "Multi-timeframe analysis: Daily UP, 4H UP, confluence score 100%."
        ));
    }

    #[test]
    fn test_long_price_targets_use_nearest_levels() {
        let candles = CandleSet::new()
            .with(Timeframe::D1, rising(100.0, 12))
            .with(Timeframe::H4, rising(100.0, 12))
            .with(Timeframe::H1, rising(100.0, 12));
        let mut input = bundle(candles);
        input.key_levels = crate::analysis::key_levels::KeyLevels::from_unsorted(vec![]);

        // No levels and no 5m data: stop at the current price, target +2%
        let current = input.current_price().unwrap();
        let (entry, stop, target) = price_targets(&input, SignalSide::Long).unwrap();

        assert_eq!(entry, current);
        assert!((stop - current * 0.99).abs() < 1e-9);
        assert!((target - current * 1.02 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_policy() {
        struct TestCase {
            daily_confidence: f64,
            four_hour_confidence: f64,
            flow_confirms: bool,
            volume_nodes: bool,
            /// Nearest resistance as a multiple of the current price
            resistance: f64,
            confluence: f64,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: weighted timeframe confidence, nothing penalised
                daily_confidence: 0.8,
                four_hour_confidence: 0.6,
                flow_confirms: true,
                volume_nodes: true,
                resistance: 1.05,
                confluence: 1.0,
                expected: 0.74,
            },
            TestCase {
                // TC1: order flow does not confirm
                daily_confidence: 0.8,
                four_hour_confidence: 0.6,
                flow_confirms: false,
                volume_nodes: true,
                resistance: 1.05,
                confluence: 1.0,
                expected: 0.74 * 0.7,
            },
            TestCase {
                // TC2: no high or low volume nodes
                daily_confidence: 0.8,
                four_hour_confidence: 0.6,
                flow_confirms: true,
                volume_nodes: false,
                resistance: 1.05,
                confluence: 1.0,
                expected: 0.74 * 0.6,
            },
            TestCase {
                // TC3: reward / risk below 1.5
                daily_confidence: 0.8,
                four_hour_confidence: 0.6,
                flow_confirms: true,
                volume_nodes: true,
                resistance: 1.01,
                confluence: 1.0,
                expected: 0.74 * 0.7,
            },
            TestCase {
                // TC4: every penalty, scaled by a 50% confluence
                daily_confidence: 0.8,
                four_hour_confidence: 0.6,
                flow_confirms: false,
                volume_nodes: false,
                resistance: 1.01,
                confluence: 0.5,
                expected: 0.74 * 0.7 * 0.6 * 0.7 * 0.75,
            },
            TestCase {
                // TC5: capped
                daily_confidence: 1.0,
                four_hour_confidence: 1.0,
                flow_confirms: true,
                volume_nodes: true,
                resistance: 1.05,
                confluence: 1.0,
                expected: MAX_CONFIDENCE,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut input = uptrend_bundle();
            let current = input.current_price().unwrap();

            let analyses = &mut input.multi_timeframe.analyses;
            if let Some(daily) = analyses.get_mut(&Timeframe::D1) {
                daily.confidence = test.daily_confidence;
            }
            if let Some(four_hour) = analyses.get_mut(&Timeframe::H4) {
                four_hour.confidence = test.four_hour_confidence;
            }
            input.multi_timeframe.confluence_score = test.confluence;

            input.order_flow.cvd = 1_000;
            input.order_flow.delta_imbalance = 0.6;
            input.order_flow.volume_cluster = if test.flow_confirms {
                VolumeCluster::AboveAverage
            } else {
                VolumeCluster::Average
            };

            input.volume_profile.lvn.clear();
            input.volume_profile.hvn = if test.volume_nodes {
                input.volume_profile.bins[..1].to_vec()
            } else {
                Vec::new()
            };

            // Stop 0.98 * 0.99 below entry, target `resistance` * 1.01 above it
            input.key_levels = KeyLevels::from_unsorted(vec![
                level(current * 0.98, KeyLevelKind::DailyLow),
                level(current * test.resistance, KeyLevelKind::DailyHigh),
            ]);

            let actual = TrendFollowing.generate(&input);
            assert_eq!(actual.signal, SignalSide::Long, "TC{} failed", index);
            assert!(
                (actual.confidence - test.expected).abs() < 1e-9,
                "TC{} failed: {} != {}",
                index,
                actual.confidence,
                test.expected
            );
        }
    }

    #[test]
    fn test_aligned_downtrend_is_short() {
        let input = bundle(
            CandleSet::new()
                .with(Timeframe::D1, falling(100.0, 12))
                .with(Timeframe::H4, falling(100.0, 12))
                .with(Timeframe::H1, falling(100.0, 12)),
        );
        let result = TrendFollowing.generate(&input);

        assert_eq!(result.signal, SignalSide::Short);
        assert_eq!(result.setup, Setup::TrendModel);
        assert_eq!(result.market_state, MarketState::OutOfBalance);
        assert!(result.stop_loss > result.entry);
        assert!(result.target < result.entry);
        assert!(result.reason.starts_with("Multi-timeframe analysis: Daily DOWN, 4H DOWN"));
    }

    #[test]
    fn test_short_price_targets() {
        struct TestCase {
            /// (support, resistance) as multiples of the current price
            levels: Option<(f64, f64)>,
            /// Highest 5m high as a multiple of the current price
            five_minute_high: Option<f64>,
            expected_stop: f64,
            expected_target: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: 5m high beyond the nearest resistance
                levels: Some((0.97, 1.02)),
                five_minute_high: Some(1.03),
                expected_stop: 1.03 * 1.01,
                expected_target: 0.97 * 0.99,
            },
            TestCase {
                // TC1: nearest resistance beyond the 5m high
                levels: Some((0.97, 1.04)),
                five_minute_high: Some(1.03),
                expected_stop: 1.04 * 1.01,
                expected_target: 0.97 * 0.99,
            },
            TestCase {
                // TC2: no levels and no 5m data
                levels: None,
                five_minute_high: None,
                expected_stop: 1.01,
                expected_target: 0.98 * 0.99,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let hourly = falling(100.0, 12);
            let current = hourly[hourly.len() - 1].close;

            let mut candles = CandleSet::new()
                .with(Timeframe::D1, falling(100.0, 12))
                .with(Timeframe::H4, falling(100.0, 12))
                .with(Timeframe::H1, hourly);
            if let Some(high) = test.five_minute_high {
                let five_minute = Candle::new(0, current, current * high, current, current, 10.0);
                candles.insert(Timeframe::M5, vec![five_minute]);
            }

            let mut input = bundle(candles);
            input.key_levels = match test.levels {
                Some((support, resistance)) => KeyLevels::from_unsorted(vec![
                    level(current * support, KeyLevelKind::DailyLow),
                    level(current * resistance, KeyLevelKind::DailyHigh),
                ]),
                None => KeyLevels::from_unsorted(vec![]),
            };

            let (entry, stop, target) = price_targets(&input, SignalSide::Short).unwrap();
            assert_eq!(entry, current, "TC{} failed", index);
            assert!((stop - current * test.expected_stop).abs() < 1e-9, "TC{} failed", index);
            assert!((target - current * test.expected_target).abs() < 1e-9, "TC{} failed", index);
        }
    }
}
