//! Volume profile: traded volume distributed over fixed-width price bins.
//!
//! Identifies the POC (Point of Control), HVN (High Volume Nodes), LVN (Low Volume Nodes)
//! and the value area enclosing 70% of the traded volume.

use crate::{candle::Candle, error::AnalysisError};
use serde::{Deserialize, Serialize};

/// Fraction of total volume the value area must enclose.
pub const VALUE_AREA_PERCENT: f64 = 70.0;

/// Bins above this multiple of the mean bin volume are HVN.
const HVN_THRESHOLD: f64 = 1.5;

/// Bins below this multiple of the mean bin volume are LVN.
const LVN_THRESHOLD: f64 = 0.5;

/// One price bin of the profile.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct VolumeBin {
    /// Lower edge of the bin
    pub price_level: f64,
    pub volume: f64,
    /// Share of total profile volume (0-100)
    pub percent_of_total: f64,
}

/// Most traded price bin.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PointOfControl {
    pub price: f64,
    pub volume: f64,
}

/// Contiguous bin range around the POC enclosing [`VALUE_AREA_PERCENT`] of the volume.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ValueArea {
    pub high: f64,
    pub low: f64,
    pub volume_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeProfile {
    pub poc: PointOfControl,
    /// High volume nodes in ascending price order
    pub hvn: Vec<VolumeBin>,
    /// Low volume nodes in ascending price order
    pub lvn: Vec<VolumeBin>,
    pub value_area: ValueArea,
    pub total_volume: f64,
    pub bin_size: f64,
    /// Every bin from the floored minimum to the ceiled maximum price
    #[serde(skip)]
    pub bins: Vec<VolumeBin>,
}

impl VolumeProfile {
    /// Calculate the profile of `candles` using bins of width `bin_size`.
    ///
    /// Each candle's volume is spread uniformly over `[low, high]`; a candle with
    /// `high == low` puts its whole volume in the bin containing that price.
    pub fn calculate(candles: &[Candle], bin_size: f64) -> Result<Self, AnalysisError> {
        if candles.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "no candles provided for volume profile".to_string(),
            ));
        }
        if !bin_size.is_finite() || bin_size <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "volume profile bin size must be positive, got {bin_size}"
            )));
        }

        let candles: Vec<&Candle> = candles.iter().filter(|c| is_usable(c)).collect();
        if candles.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "no candles with finite prices for volume profile".to_string(),
            ));
        }

        let min_price = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let max_price = candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);

        // Integer bin indices keep edges free of accumulated float drift
        let first_index = (min_price / bin_size).floor() as i64;
        let last_index = (max_price / bin_size).ceil() as i64;
        let bin_count = (last_index - first_index).max(1) as usize;
        let bin_of = |price: f64| -> usize {
            let index = (price / bin_size).floor() as i64 - first_index;
            index.clamp(0, bin_count as i64 - 1) as usize
        };

        let mut volumes = vec![0.0; bin_count];
        for candle in candles {
            let volume = candle.volume.max(0.0);

            if candle.high <= candle.low {
                volumes[bin_of(candle.low)] += volume;
                continue;
            }

            let density = volume / (candle.high - candle.low);
            for index in bin_of(candle.low)..=bin_of(candle.high) {
                let bin_low = (first_index + index as i64) as f64 * bin_size;
                let bin_high = bin_low + bin_size;
                let overlap = candle.high.min(bin_high) - candle.low.max(bin_low);
                if overlap > 0.0 {
                    volumes[index] += density * overlap;
                }
            }
        }

        let total_volume: f64 = volumes.iter().sum();
        let bins: Vec<VolumeBin> = volumes
            .iter()
            .enumerate()
            .map(|(index, &volume)| VolumeBin {
                price_level: (first_index + index as i64) as f64 * bin_size,
                volume,
                percent_of_total: if total_volume > 0.0 {
                    volume / total_volume * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        // First maximum in ascending price order wins ties
        let poc_index = bins
            .iter()
            .enumerate()
            .fold(0, |best, (index, bin)| {
                if bin.volume > bins[best].volume { index } else { best }
            });

        let mean_volume = total_volume / bins.len() as f64;
        let hvn = bins
            .iter()
            .filter(|bin| bin.volume > mean_volume * HVN_THRESHOLD)
            .copied()
            .collect();
        let lvn = bins
            .iter()
            .filter(|bin| bin.volume < mean_volume * LVN_THRESHOLD)
            .copied()
            .collect();

        let (low_index, high_index) = value_area_bounds(&bins, poc_index, total_volume);

        Ok(Self {
            poc: PointOfControl {
                price: bins[poc_index].price_level,
                volume: bins[poc_index].volume,
            },
            hvn,
            lvn,
            value_area: ValueArea {
                high: bins[high_index].price_level,
                low: bins[low_index].price_level,
                volume_percent: VALUE_AREA_PERCENT,
            },
            total_volume,
            bin_size,
            bins,
        })
    }

    /// True if the profile has any HVN or LVN.
    pub fn has_volume_nodes(&self) -> bool {
        !self.hvn.is_empty() || !self.lvn.is_empty()
    }
}

fn is_usable(candle: &Candle) -> bool {
    candle.low.is_finite() && candle.high.is_finite() && candle.volume.is_finite()
}

/// Greedy expansion outward from the POC, taking the heavier adjacent bin each step
/// (up on ties) until the target volume is enclosed or both sides are exhausted.
fn value_area_bounds(bins: &[VolumeBin], poc_index: usize, total_volume: f64) -> (usize, usize) {
    let target = total_volume * VALUE_AREA_PERCENT / 100.0;
    let (mut low, mut high) = (poc_index, poc_index);
    let mut enclosed = bins[poc_index].volume;

    while enclosed < target {
        let up = bins.get(high + 1).map(|bin| bin.volume);
        let down = low.checked_sub(1).map(|index| bins[index].volume);

        match (up, down) {
            (Some(up), Some(down)) if up >= down => {
                high += 1;
                enclosed += up;
            }
            (_, Some(down)) => {
                low -= 1;
                enclosed += down;
            }
            (Some(up), None) => {
                high += 1;
                enclosed += up;
            }
            (None, None) => break,
        }
    }

    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(low: f64, high: f64, volume: f64) -> Candle {
        Candle::new(0, low, high, low, high, volume)
    }

    #[test]
    fn test_empty_candles_is_invalid_input() {
        let result = VolumeProfile::calculate(&[], 10.0);
        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_bins_sum_to_total_volume() {
        let candles = vec![
            bar(100.0, 105.0, 10.0),
            bar(102.5, 108.3, 25.0),
            bar(99.1, 101.7, 7.5),
            bar(104.0, 104.0, 3.0),
        ];

        let profile = VolumeProfile::calculate(&candles, 1.0).unwrap();
        let bin_sum: f64 = profile.bins.iter().map(|bin| bin.volume).sum();

        assert!((bin_sum - 45.5).abs() < 1e-9);
        assert!((profile.total_volume - 45.5).abs() < 1e-9);
        assert!(profile.bins.iter().all(|bin| profile.poc.volume >= bin.volume));
    }

    #[test]
    fn test_bins_cover_floored_and_ceiled_range() {
        let profile = VolumeProfile::calculate(&[bar(101.3, 104.2, 1.0)], 1.0).unwrap();

        assert_eq!(profile.bins.len(), 4);
        assert_eq!(profile.bins.first().map(|bin| bin.price_level), Some(101.0));
        assert_eq!(profile.bins.last().map(|bin| bin.price_level), Some(104.0));
    }

    #[test]
    fn test_poc_prefers_lowest_price_on_ties() {
        let candles = vec![bar(100.0, 101.0, 5.0), bar(102.0, 103.0, 5.0)];
        let profile = VolumeProfile::calculate(&candles, 1.0).unwrap();

        assert_eq!(profile.poc.price, 100.0);
        assert_eq!(profile.poc.volume, 5.0);
    }

    #[test]
    fn test_hvn_and_lvn_are_disjoint() {
        let candles = vec![
            bar(100.0, 101.0, 50.0),
            bar(101.0, 102.0, 10.0),
            bar(102.0, 103.0, 1.0),
            bar(103.0, 104.0, 10.0),
        ];
        let profile = VolumeProfile::calculate(&candles, 1.0).unwrap();

        assert_eq!(profile.hvn.len(), 1);
        assert_eq!(profile.hvn[0].price_level, 100.0);
        assert_eq!(profile.lvn.len(), 1);
        assert_eq!(profile.lvn[0].price_level, 102.0);
        assert!(profile.has_volume_nodes());
    }

    #[test]
    fn test_value_area_expands_towards_heavier_side() {
        // Bins: 100:10, 101:35 (POC), 102:30, 103:5, 104:20
        let candles = vec![
            bar(100.0, 101.0, 10.0),
            bar(101.0, 102.0, 35.0),
            bar(102.0, 103.0, 30.0),
            bar(103.0, 104.0, 5.0),
            bar(104.0, 105.0, 20.0),
        ];
        let profile = VolumeProfile::calculate(&candles, 1.0).unwrap();

        // 35 -> +30 up (65) -> +10 down beats 5 up (75) >= 70
        assert_eq!(profile.poc.price, 101.0);
        assert_eq!(profile.value_area.low, 100.0);
        assert_eq!(profile.value_area.high, 102.0);
        assert_eq!(profile.value_area.volume_percent, 70.0);
    }

    #[test]
    fn test_value_area_prefers_up_on_ties() {
        let candles = vec![
            bar(100.0, 101.0, 20.0),
            bar(101.0, 102.0, 40.0),
            bar(102.0, 103.0, 20.0),
        ];
        let profile = VolumeProfile::calculate(&candles, 1.0).unwrap();

        // Target 56: 40 + 20 taken upwards on the tie
        assert_eq!(profile.value_area.low, 101.0);
        assert_eq!(profile.value_area.high, 102.0);
    }

    #[test]
    fn test_zero_volume_profile_is_well_formed() {
        let profile = VolumeProfile::calculate(&[bar(100.0, 102.0, 0.0)], 1.0).unwrap();

        assert_eq!(profile.total_volume, 0.0);
        assert!(profile.hvn.is_empty());
        assert!(profile.lvn.is_empty());
        assert!(profile.bins.iter().all(|bin| bin.percent_of_total == 0.0));
    }
}
