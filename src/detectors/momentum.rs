//! Momentum detectors: Displacement

use serde::{Deserialize, Serialize};

use super::helpers::{avg_range, pct_change};
use crate::{
    params::{ParamOverrides, ParamSpec, Tunable},
    Direction, Displacement, IctError, OHLCVExt, PatternDetector, PatternKind, PatternOccurrence,
    Period, Ratio, Result, OHLCV,
};

impl_with_defaults!(DisplacementDetector);

/// Wide, full-bodied bar with a large close-to-close move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementDetector {
    pub lookback: Period,
    /// Bar range must exceed the trailing average range times this factor
    pub range_factor: f64,
    pub min_body_ratio: Ratio,
    /// Minimum single-bar change
    pub threshold: Ratio,
}

impl Default for DisplacementDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(10),
            range_factor: 1.5,
            min_body_ratio: Ratio::new_const(0.7),
            threshold: Ratio::new_const(0.02),
        }
    }
}

impl DisplacementDetector {
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<Displacement> {
        let lookback = self.lookback.get();
        let mut out = Vec::new();

        for i in lookback..bars.len() {
            let avg = avg_range(&bars[i - lookback..i]);
            let bar = &bars[i];
            let range = bar.range();
            if range <= 0.0 || avg <= 0.0 {
                continue;
            }

            let body = bar.body();
            if range <= avg * self.range_factor || body / range <= self.min_body_ratio.get() {
                continue;
            }

            let change = pct_change(bars[i - 1].close(), bar.close());
            if change.abs() > self.threshold.get() {
                out.push(Displacement {
                    direction: if change > 0.0 {
                        Direction::Bullish
                    } else {
                        Direction::Bearish
                    },
                    index: i,
                    magnitude: change,
                    strength: body / avg,
                });
            }
        }
        out
    }
}

impl PatternDetector for DisplacementDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Displacement
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        self.scan(bars)
            .into_iter()
            .map(PatternOccurrence::Displacement)
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if !self.range_factor.is_finite() || self.range_factor <= 0.0 {
            return Err(IctError::InvalidConfig(
                "displacement range_factor must be finite and > 0".into(),
            ));
        }
        Ok(())
    }
}

const DISPLACEMENT_PARAMS: &[ParamSpec] = &[
    ParamSpec::period("lookback", 10.0, (5.0, 30.0, 5.0), "Average range window"),
    ParamSpec::factor("range_factor", 1.5, (1.0, 3.0, 0.25), "Range expansion vs average"),
    ParamSpec::ratio("min_body_ratio", 0.7, (0.5, 0.9, 0.05), "Minimum body/range"),
    ParamSpec::ratio("threshold", 0.02, (0.005, 0.05, 0.005), "Minimum close-to-close change"),
];

impl Tunable for DisplacementDetector {
    const KIND: PatternKind = PatternKind::Displacement;
    const PARAMS: &'static [ParamSpec] = DISPLACEMENT_PARAMS;

    fn from_checked(params: &ParamOverrides) -> Result<Self> {
        Ok(Self {
            lookback: params.period("lookback", 10)?,
            range_factor: params.factor("range_factor", 1.5)?,
            min_body_ratio: params.ratio("min_body_ratio", 0.7)?,
            threshold: params.ratio("threshold", 0.02)?,
        })
    }
}
