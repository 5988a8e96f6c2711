//! Higher-timeframe bias from rolling structure counts and a moving-average filter

use serde::{Deserialize, Serialize};

use crate::detectors::helpers::{highest_high, lowest_low, mean};
use crate::{Direction, IctError, Period, Result, OHLCV};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HtfBias {
    pub bias: Direction,
    /// 0..=100
    pub strength: u8,
    pub reasoning: String,
    /// `None` when there was not enough data to compute the average
    pub price_above_ma: Option<bool>,
}

impl HtfBias {
    fn insufficient() -> Self {
        Self {
            bias: Direction::Neutral,
            strength: 0,
            reasoning: "Insufficient HTF data".into(),
            price_above_ma: None,
        }
    }
}

/// Counts higher highs/lows against lower highs/lows over the last `window` bars, each
/// bar compared with the extremes of the `structure_period` bars before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtfBiasEstimator {
    pub min_bars: Period,
    pub window: Period,
    pub structure_period: Period,
}

impl Default for HtfBiasEstimator {
    fn default() -> Self {
        Self {
            min_bars: Period::new_const(20),
            window: Period::new_const(20),
            structure_period: Period::new_const(5),
        }
    }
}

impl HtfBiasEstimator {
    pub fn validate(&self) -> Result<()> {
        if self.structure_period >= self.window {
            return Err(IctError::InvalidConfig(
                "HTF structure_period must be shorter than window".into(),
            ));
        }
        Ok(())
    }

    pub fn estimate<T: OHLCV>(&self, bars: &[T]) -> HtfBias {
        if bars.len() < self.min_bars.get() {
            return HtfBias::insufficient();
        }

        let take = self.window.get().min(bars.len() - 1);
        let recent = &bars[bars.len() - take..];
        let period = self.structure_period.get();

        let (mut bullish, mut bearish) = (0u32, 0u32);
        for i in period..recent.len() {
            let prior = &recent[i - period..i];
            let (prev_high, prev_low) = (highest_high(prior), lowest_low(prior));
            let (high, low) = (recent[i].high(), recent[i].low());

            bullish += u32::from(high > prev_high) + u32::from(low > prev_low);
            bearish += u32::from(high < prev_high) + u32::from(low < prev_low);
        }

        let closes: Vec<f64> = recent.iter().map(|b| b.close()).collect();
        let (Some(ma), Some(&price)) = (mean(&closes), closes.last()) else {
            return HtfBias::insufficient();
        };
        let above = price > ma;
        let total = (bullish + bearish).max(1) as f64;

        if bullish > bearish && above {
            let strength = ((bullish as f64 / total) * 100.0).floor().min(100.0) as u8;
            HtfBias {
                bias: Direction::Bullish,
                strength,
                reasoning: format!(
                    "Higher highs/lows forming, price above MA ({strength}% bullish structure)"
                ),
                price_above_ma: Some(above),
            }
        } else if bearish > bullish && !above {
            let strength = ((bearish as f64 / total) * 100.0).floor().min(100.0) as u8;
            HtfBias {
                bias: Direction::Bearish,
                strength,
                reasoning: format!(
                    "Lower highs/lows forming, price below MA ({strength}% bearish structure)"
                ),
                price_above_ma: Some(above),
            }
        } else {
            HtfBias {
                bias: Direction::Neutral,
                strength: 50,
                reasoning: "Mixed signals - no clear HTF trend".into(),
                price_above_ma: Some(above),
            }
        }
    }
}
