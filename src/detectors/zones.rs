//! Zone detectors: Order Block, Fair Value Gap, Balanced Range, Volume Imbalance

use serde::{Deserialize, Serialize};

use super::helpers::{highest_high, lowest_low, pct_change, sample_std};
use crate::{
    params::{ParamOverrides, ParamSpec, Tunable},
    BalancedRange, Direction, FairValueGap, IndexRange, OHLCVExt, OrderBlock, PatternDetector,
    PatternKind, PatternOccurrence, Period, PriceBand, Ratio, Result, VolumeImbalance, OHLCV,
};

impl_with_defaults!(
    OrderBlockDetector,
    FairValueGapDetector,
    BalancedRangeDetector,
    VolumeImbalanceDetector,
);

// ============================================================
// ORDER BLOCK
// ============================================================

/// Last opposite-colored bar before a displacement close.
///
/// For each bar `i >= lookback` whose close-to-close move exceeds the threshold, scans
/// back from `i - 1` (bar `i - lookback` excluded) for the nearest bar of the opposite
/// color and records its high/low as the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBlockDetector {
    pub lookback: Period,
    pub displacement_threshold: Ratio,
}

impl Default for OrderBlockDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            displacement_threshold: Ratio::new_const(0.015),
        }
    }
}

impl OrderBlockDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<OrderBlock> {
        let lookback = self.lookback.get();
        let threshold = self.displacement_threshold.get();
        let mut out = Vec::new();

        for i in lookback..bars.len() {
            let change = pct_change(bars[i - 1].close(), bars[i].close());
            let displacement = change.abs();
            if displacement <= threshold {
                continue;
            }

            let direction = if change > 0.0 {
                Direction::Bullish
            } else {
                Direction::Bearish
            };

            let block = (i + 1 - lookback..i).rev().find(|&j| match direction {
                Direction::Bullish => bars[j].is_bearish(),
                _ => bars[j].is_bullish(),
            });

            if let Some(j) = block {
                out.push(OrderBlock {
                    direction,
                    index_range: IndexRange { start: j, end: i },
                    band: PriceBand::new(bars[j].low(), bars[j].high()),
                    strength: displacement,
                });
            }
        }
        out
    }
}

impl PatternDetector for OrderBlockDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::OrderBlock
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::OrderBlock)
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.lookback.get() < 2 {
            return Err(crate::IctError::InvalidConfig(
                "order block lookback must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

const ORDER_BLOCK_PARAMS: &[ParamSpec] = &[
    ParamSpec::period(
        "lookback",
        20.0,
        (5.0, 60.0, 5.0),
        "Bars scanned back for the opposite-colored bar",
    ),
    ParamSpec::ratio(
        "displacement_threshold",
        0.015,
        (0.005, 0.05, 0.005),
        "Minimum close-to-close move that qualifies as displacement",
    ),
];

impl Tunable for OrderBlockDetector {
    const KIND: PatternKind = PatternKind::OrderBlock;
    const PARAMS: &'static [ParamSpec] = ORDER_BLOCK_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        let detector = Self {
            lookback: params.period("lookback", 20)?,
            displacement_threshold: params.ratio("displacement_threshold", 0.015)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }
}

// ============================================================
// FAIR VALUE GAP
// ============================================================

/// Three-bar imbalance between bar `i - 2` and bar `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairValueGapDetector;

impl FairValueGapDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<FairValueGap> {
        let mut out = Vec::new();
        for i in 2..bars.len() {
            let first = &bars[i - 2];
            let third = &bars[i];
            let index_range = IndexRange { start: i - 2, end: i };

            if third.low() > first.high() {
                out.push(FairValueGap {
                    direction: Direction::Bullish,
                    index_range,
                    gap: PriceBand::new(first.high(), third.low()),
                });
            } else if third.high() < first.low() {
                out.push(FairValueGap {
                    direction: Direction::Bearish,
                    index_range,
                    gap: PriceBand::new(third.high(), first.low()),
                });
            }
        }
        out
    }
}

impl PatternDetector for FairValueGapDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::FairValueGap
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::FairValueGap)
            .collect()
    }
}

// ============================================================
// BALANCED PRICE RANGE
// ============================================================

/// Congestion window where highs and lows both cluster tightly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancedRangeDetector {
    pub lookback: Period,
    /// Max stdev relative to the window extreme, for both sides
    pub tolerance: Ratio,
}

impl Default for BalancedRangeDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            tolerance: Ratio::new_const(0.005),
        }
    }
}

impl BalancedRangeDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<BalancedRange> {
        let lookback = self.lookback.get();
        let tolerance = self.tolerance.get();
        let mut out = Vec::new();

        for i in lookback..bars.len() {
            let window = &bars[i - lookback..i];
            let max_high = highest_high(window);
            let min_low = lowest_low(window);
            if max_high <= 0.0 || min_low <= 0.0 {
                continue;
            }

            let highs: Vec<f64> = window.iter().map(|b| b.high()).collect();
            let lows: Vec<f64> = window.iter().map(|b| b.low()).collect();
            let (Some(high_std), Some(low_std)) = (sample_std(&highs), sample_std(&lows)) else {
                continue;
            };

            if high_std / max_high < tolerance && low_std / min_low < tolerance {
                out.push(BalancedRange {
                    index_range: IndexRange {
                        start: i - lookback,
                        end: i,
                    },
                    band: PriceBand::new(min_low, max_high),
                });
            }
        }
        out
    }
}

impl PatternDetector for BalancedRangeDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::BalancedRange
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::BalancedRange)
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.lookback.get() < 2 {
            return Err(crate::IctError::InvalidConfig(
                "balanced range lookback must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

const BALANCED_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::period("lookback", 20.0, (10.0, 40.0, 5.0), "Window length"),
    ParamSpec::ratio(
        "tolerance",
        0.005,
        (0.001, 0.02, 0.001),
        "Max relative dispersion of highs and lows",
    ),
];

impl Tunable for BalancedRangeDetector {
    const KIND: PatternKind = PatternKind::BalancedRange;
    const PARAMS: &'static [ParamSpec] = BALANCED_RANGE_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        let detector = Self {
            lookback: params.period("lookback", 20)?,
            tolerance: params.ratio("tolerance", 0.005)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }
}

// ============================================================
// VOLUME IMBALANCE
// ============================================================

/// Single bar isolated from both neighbors by a price gap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeImbalanceDetector;

impl VolumeImbalanceDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<VolumeImbalance> {
        let mut out = Vec::new();
        if bars.len() < 3 {
            return out;
        }

        for i in 1..bars.len() - 1 {
            let (prev, curr, next) = (&bars[i - 1], &bars[i], &bars[i + 1]);

            if curr.low() > prev.high() && curr.low() > next.high() {
                out.push(VolumeImbalance {
                    direction: Direction::Bullish,
                    index: i,
                    gap: PriceBand::new(prev.high().max(next.high()), curr.low()),
                });
            } else if curr.high() < prev.low() && curr.high() < next.low() {
                out.push(VolumeImbalance {
                    direction: Direction::Bearish,
                    index: i,
                    gap: PriceBand::new(curr.high(), prev.low().min(next.low())),
                });
            }
        }
        out
    }
}

impl PatternDetector for VolumeImbalanceDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::VolumeImbalance
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::VolumeImbalance)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                Bar::new(start + Duration::hours(i as i64), o, h, l, c, 100.0).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_order_block_ignores_bar_at_lookback_edge() {
        // bar 0 is the only bearish bar; lookback 3 scans j in (0, 3)
        let data = bars(&[
            (101.0, 101.5, 99.5, 100.0),
            (100.0, 100.6, 99.8, 100.5),
            (100.5, 101.0, 100.2, 100.8),
            (100.8, 104.0, 100.7, 103.5),
        ]);
        let det = OrderBlockDetector {
            lookback: Period::new_const(3),
            ..Default::default()
        };
        assert!(det.scan(&data).is_empty());
    }

    #[test]
    fn test_bearish_order_block() {
        let data = bars(&[
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 101.0, 100.0, 100.8),
            (100.8, 101.0, 98.0, 98.5),
        ]);
        let det = OrderBlockDetector {
            lookback: Period::new_const(2),
            ..Default::default()
        };
        let found = det.scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].direction, Direction::Bearish);
        assert_eq!(found[0].index_range, IndexRange { start: 1, end: 2 });
        assert_eq!(found[0].band, PriceBand::new(100.0, 101.0));
    }

    #[test]
    fn test_bearish_fvg() {
        let data = bars(&[
            (106.0, 107.0, 105.0, 105.5),
            (105.5, 105.6, 101.0, 101.5),
            (101.5, 102.0, 99.0, 99.5),
        ]);
        let found = FairValueGapDetector.scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].direction, Direction::Bearish);
        assert_eq!(found[0].gap, PriceBand::new(102.0, 105.0));
    }

    #[test]
    fn test_volume_imbalance_gaps() {
        let data = bars(&[
            (100.0, 101.0, 99.0, 100.5),
            (102.5, 104.0, 102.0, 103.0),
            (101.0, 101.5, 100.0, 100.5),
        ]);
        let found = VolumeImbalanceDetector.scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].direction, Direction::Bullish);
        assert_eq!(found[0].gap, PriceBand::new(101.5, 102.0));
    }

    #[test]
    fn test_balanced_range_flat_market() {
        let flat: Vec<(f64, f64, f64, f64)> = (0..25).map(|_| (100.0, 100.2, 99.8, 100.1)).collect();
        let data = bars(&flat);
        let found = BalancedRangeDetector::default().scan(&data);
        assert_eq!(found.len(), 5);
        assert_eq!(found[0].index_range, IndexRange { start: 0, end: 20 });
        assert_eq!(found[0].band, PriceBand::new(99.8, 100.2));
    }

    #[test]
    fn test_order_block_from_overrides() {
        let params = ParamOverrides::new().set("lookback", 1.0);
        assert!(OrderBlockDetector::from_overrides(&params).is_err());
        let params = params.set("lookback", 10.0);
        assert_eq!(OrderBlockDetector::from_overrides(&params).unwrap().lookback.get(), 10);
    }
}
