//! Structure detectors: Market Structure (BOS), Change of Character (CHOCH),
//! Liquidity Sweep

use serde::{Deserialize, Serialize};

use super::helpers::{find_swings, highest_high, lowest_low, mean, pct_change};
use crate::{
    params::{ParamOverrides, ParamSpec, Tunable},
    Direction, IctError, LiquiditySweep, PatternDetector, PatternKind, PatternOccurrence, Period,
    Ratio, Result, StructureKind, StructureShift, OHLCV,
};

impl_with_defaults!(MarketStructureDetector, ChochDetector, LiquiditySweepDetector);

// ============================================================
// MARKET STRUCTURE (BOS)
// ============================================================

/// Break of structure: a close beyond an earlier confirmed swing high or low.
///
/// For every bar the first swing (in detection order) that the close breaks is
/// reported, once per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketStructureDetector {
    pub swing_length: Period,
}

impl Default for MarketStructureDetector {
    fn default() -> Self {
        Self {
            swing_length: Period::new_const(5),
        }
    }
}

impl MarketStructureDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<StructureShift> {
        let swings = find_swings(bars, self.swing_length.get());
        let mut out = Vec::new();

        for (i, bar) in bars.iter().enumerate() {
            let close = bar.close();

            if let Some(sh) = swings.highs.iter().find(|s| s.index < i && close > s.price) {
                out.push(StructureShift {
                    direction: Direction::Bullish,
                    index: i,
                    close,
                    broken_level: sh.price,
                    kind: StructureKind::Bos,
                    strength: pct_change(sh.price, close).abs(),
                });
            }

            if let Some(sl) = swings.lows.iter().find(|s| s.index < i && close < s.price) {
                out.push(StructureShift {
                    direction: Direction::Bearish,
                    index: i,
                    close,
                    broken_level: sl.price,
                    kind: StructureKind::Bos,
                    strength: pct_change(sl.price, close).abs(),
                });
            }
        }
        out
    }
}

impl PatternDetector for MarketStructureDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::MarketStructure
    }

    fn min_bars(&self) -> usize {
        2 * self.swing_length.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::StructureShift)
            .collect()
    }
}

const MARKET_STRUCTURE_PARAMS: &[ParamSpec] = &[ParamSpec::period(
    "swing_length",
    5.0,
    (2.0, 10.0, 1.0),
    "Bars on each side required to confirm a swing",
)];

impl Tunable for MarketStructureDetector {
    const KIND: PatternKind = PatternKind::MarketStructure;
    const PARAMS: &'static [ParamSpec] = MARKET_STRUCTURE_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        Ok(Self {
            swing_length: params.period("swing_length", 5)?,
        })
    }
}

// ============================================================
// CHANGE OF CHARACTER (CHOCH)
// ============================================================

/// Swing break on fading participation that reverses on the next bar.
///
/// A bar qualifies when its volume is below the trailing mean by more than
/// `volume_drop`, or its close-to-close momentum over `momentum_period` bars is below
/// `momentum_threshold`. Breaking below a swing low then closing higher on the next bar
/// is a bullish CHOCH; the mirror case is bearish. Needs two bars of lookahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChochDetector {
    pub swing_length: Period,
    pub lookback: Period,
    pub volume_period: Period,
    pub volume_drop: Ratio,
    pub momentum_period: Period,
    pub momentum_threshold: Ratio,
    /// Swings younger than this many bars are not considered broken
    pub min_swing_age: Period,
}

impl Default for ChochDetector {
    fn default() -> Self {
        Self {
            swing_length: Period::new_const(5),
            lookback: Period::new_const(50),
            volume_period: Period::new_const(5),
            volume_drop: Ratio::new_const(0.2),
            momentum_period: Period::new_const(3),
            momentum_threshold: Ratio::new_const(0.01),
            min_swing_age: Period::new_const(5),
        }
    }
}

impl ChochDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<StructureShift> {
        let lookback = self.lookback.get();
        let min_age = self.min_swing_age.get();
        let volume_period = self.volume_period.get();
        let momentum_period = self.momentum_period.get();
        let mut out = Vec::new();

        let swings = find_swings(bars, self.swing_length.get());
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume()).collect();

        for i in lookback..bars.len().saturating_sub(2) {
            let close = bars[i].close();

            let Some(recent_volume) = mean(&volumes[i - volume_period..i]) else {
                continue;
            };
            let volume_fading = volumes[i] < recent_volume * (1.0 - self.volume_drop.get());
            let momentum = pct_change(bars[i - momentum_period].close(), close).abs();
            if !(volume_fading || momentum < self.momentum_threshold.get()) {
                continue;
            }

            let in_window = |idx: usize| idx + min_age < i && idx + lookback > i;
            let next_close = bars[i + 1].close();

            if next_close > close {
                if let Some(sl) = swings
                    .lows
                    .iter()
                    .find(|s| in_window(s.index) && close < s.price)
                {
                    out.push(StructureShift {
                        direction: Direction::Bullish,
                        index: i,
                        close,
                        broken_level: sl.price,
                        kind: StructureKind::Choch,
                        strength: 1.0 - momentum,
                    });
                }
            } else if next_close < close {
                if let Some(sh) = swings
                    .highs
                    .iter()
                    .find(|s| in_window(s.index) && close > s.price)
                {
                    out.push(StructureShift {
                        direction: Direction::Bearish,
                        index: i,
                        close,
                        broken_level: sh.price,
                        kind: StructureKind::Choch,
                        strength: 1.0 - momentum,
                    });
                }
            }
        }
        out
    }
}

impl PatternDetector for ChochDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Choch
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::StructureShift)
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        let lookback = self.lookback.get();
        if self.volume_period.get() > lookback || self.momentum_period.get() > lookback {
            return Err(IctError::InvalidConfig(
                "CHOCH volume/momentum periods must not exceed lookback".into(),
            ));
        }
        if self.min_swing_age.get() >= lookback {
            return Err(IctError::InvalidConfig(
                "CHOCH min_swing_age must be below lookback".into(),
            ));
        }
        Ok(())
    }
}

const CHOCH_PARAMS: &[ParamSpec] = &[
    ParamSpec::period("swing_length", 5.0, (2.0, 10.0, 1.0), "Swing confirmation length"),
    ParamSpec::period("lookback", 50.0, (20.0, 100.0, 10.0), "Oldest swing age considered"),
    ParamSpec::period("volume_period", 5.0, (3.0, 20.0, 1.0), "Trailing volume window"),
    ParamSpec::ratio("volume_drop", 0.2, (0.05, 0.5, 0.05), "Volume fade vs trailing mean"),
    ParamSpec::period("momentum_period", 3.0, (1.0, 10.0, 1.0), "Momentum lookback"),
    ParamSpec::ratio(
        "momentum_threshold",
        0.01,
        (0.002, 0.03, 0.002),
        "Momentum below this counts as weak",
    ),
    ParamSpec::period("min_swing_age", 5.0, (1.0, 10.0, 1.0), "Minimum swing age in bars"),
];

impl Tunable for ChochDetector {
    const KIND: PatternKind = PatternKind::Choch;
    const PARAMS: &'static [ParamSpec] = CHOCH_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        let detector = Self {
            swing_length: params.period("swing_length", 5)?,
            lookback: params.period("lookback", 50)?,
            volume_period: params.period("volume_period", 5)?,
            volume_drop: params.ratio("volume_drop", 0.2)?,
            momentum_period: params.period("momentum_period", 3)?,
            momentum_threshold: params.ratio("momentum_threshold", 0.01)?,
            min_swing_age: params.period("min_swing_age", 5)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }
}

// ============================================================
// LIQUIDITY SWEEP
// ============================================================

/// Run beyond the trailing range extreme followed by a reversal close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquiditySweepDetector {
    pub lookback: Period,
    /// Fraction beyond the rolling extreme that counts as a sweep
    pub threshold: Ratio,
}

impl Default for LiquiditySweepDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(50),
            threshold: Ratio::new_const(0.001),
        }
    }
}

impl LiquiditySweepDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<LiquiditySweep> {
        let lookback = self.lookback.get();
        let threshold = self.threshold.get();
        let mut out = Vec::new();

        for i in lookback..bars.len().saturating_sub(1) {
            let window = &bars[i - lookback..i];
            let recent_high = highest_high(window);
            let recent_low = lowest_low(window);
            let (curr, next) = (&bars[i], &bars[i + 1]);

            if curr.high() > recent_high * (1.0 + threshold) && next.close() < curr.close() {
                out.push(LiquiditySweep {
                    index: i,
                    price: curr.high(),
                    reversal: Direction::Bearish,
                });
            }
            if curr.low() < recent_low * (1.0 - threshold) && next.close() > curr.close() {
                out.push(LiquiditySweep {
                    index: i,
                    price: curr.low(),
                    reversal: Direction::Bullish,
                });
            }
        }
        out
    }
}

impl PatternDetector for LiquiditySweepDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::LiquiditySweep
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 2
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::LiquiditySweep)
            .collect()
    }
}

const LIQUIDITY_SWEEP_PARAMS: &[ParamSpec] = &[
    ParamSpec::period("lookback", 50.0, (10.0, 100.0, 10.0), "Rolling range window"),
    ParamSpec::ratio(
        "threshold",
        0.001,
        (0.0005, 0.005, 0.0005),
        "Overshoot beyond the rolling extreme",
    ),
];

impl Tunable for LiquiditySweepDetector {
    const KIND: PatternKind = PatternKind::LiquiditySweep;
    const PARAMS: &'static [ParamSpec] = LIQUIDITY_SWEEP_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        Ok(Self {
            lookback: params.period("lookback", 50)?,
            threshold: params.ratio("threshold", 0.001)?,
        })
    }
}
