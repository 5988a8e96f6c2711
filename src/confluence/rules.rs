//! Weighted rule table, adjustments and confidence tiers
//!
//! [`Scorecard`] accumulates rule points independently for both sides and
//! [`Scorecard::finalize`] applies the ordered adjustments. It has no knowledge of bars,
//! so the scoring arithmetic can be exercised directly.

use serde::{Deserialize, Serialize};

use super::signal::Signal;
use crate::context::Zone;
use crate::{Direction, IctError, Ratio, Result};

// ============================================================
// RULE TABLE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Choch,
    OrderBlockOteKillZone,
    OrderBlockOte,
    OrderBlock,
    FvgAligned,
    Fvg,
    LiquiditySweep,
    MarketStructure,
    Displacement,
}

/// Points and recency windows, evaluated in field order.
///
/// Order block and FVG recency use the evaluation lookback instead of a fixed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    pub choch_window: usize,
    pub choch_max: usize,
    pub choch_points: f64,

    pub order_block_candidates: usize,
    /// Proximity buffer as a fraction of both zone width and price (larger wins)
    pub order_block_proximity: Ratio,
    pub ote_tolerance: Ratio,
    pub order_block_ote_kill_zone_points: f64,
    pub order_block_ote_points: f64,
    pub order_block_points: f64,

    pub fvg_candidates: usize,
    /// Widening of the far gap edge when testing overlap
    pub fvg_overlap_margin: Ratio,
    pub fvg_aligned_points: f64,
    pub fvg_points: f64,

    pub sweep_window: usize,
    pub sweep_max: usize,
    pub sweep_points: f64,

    pub structure_window: usize,
    pub structure_points: f64,

    pub displacement_window: usize,
    pub displacement_points: f64,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            choch_window: 10,
            choch_max: 2,
            choch_points: 10.0,
            order_block_candidates: 2,
            order_block_proximity: Ratio::new_const(0.02),
            ote_tolerance: Ratio::new_const(0.015),
            order_block_ote_kill_zone_points: 12.0,
            order_block_ote_points: 9.0,
            order_block_points: 6.0,
            fvg_candidates: 2,
            fvg_overlap_margin: Ratio::new_const(0.05),
            fvg_aligned_points: 9.0,
            fvg_points: 4.0,
            sweep_window: 15,
            sweep_max: 2,
            sweep_points: 6.0,
            structure_window: 30,
            structure_points: 4.0,
            displacement_window: 10,
            displacement_points: 7.0,
        }
    }
}

impl RuleTable {
    pub fn validate(&self) -> Result<()> {
        let points = [
            ("choch_points", self.choch_points),
            ("order_block_ote_kill_zone_points", self.order_block_ote_kill_zone_points),
            ("order_block_ote_points", self.order_block_ote_points),
            ("order_block_points", self.order_block_points),
            ("fvg_aligned_points", self.fvg_aligned_points),
            ("fvg_points", self.fvg_points),
            ("sweep_points", self.sweep_points),
            ("structure_points", self.structure_points),
            ("displacement_points", self.displacement_points),
        ];
        for (name, value) in points {
            if !value.is_finite() || value < 0.0 {
                return Err(IctError::InvalidConfig(format!("{name} must be finite and >= 0")));
            }
        }
        Ok(())
    }
}

/// Ordered post-rule adjustments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    /// Reduction of the bullish score in PREMIUM / bearish score in DISCOUNT
    pub zone_penalty: Ratio,
    /// Minimum winning score for a directional verdict
    pub min_score: f64,
    pub htf_aligned_bonus: f64,
    pub htf_opposed_penalty: Ratio,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            zone_penalty: Ratio::new_const(0.3),
            min_score: 5.0,
            htf_aligned_bonus: 0.1,
            htf_opposed_penalty: Ratio::new_const(0.2),
        }
    }
}

impl Adjustments {
    pub fn validate(&self) -> Result<()> {
        if !self.min_score.is_finite() || self.min_score < 0.0 {
            return Err(IctError::InvalidConfig("min_score must be finite and >= 0".into()));
        }
        if !self.htf_aligned_bonus.is_finite() || self.htf_aligned_bonus < 0.0 {
            return Err(IctError::InvalidConfig(
                "htf_aligned_bonus must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Piecewise score -> confidence mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceTiers {
    pub weak_from: f64,
    pub moderate_from: f64,
    pub strong_from: f64,
    pub weak_base: f64,
    pub moderate_base: f64,
    pub strong_base: f64,
    /// Confidence per point below `weak_from`
    pub floor_slope: f64,
    pub weak_slope: f64,
    pub moderate_slope: f64,
}

impl Default for ConfidenceTiers {
    fn default() -> Self {
        Self {
            weak_from: 6.0,
            moderate_from: 13.0,
            strong_from: 21.0,
            weak_base: 30.0,
            moderate_base: 60.0,
            strong_base: 80.0,
            floor_slope: 6.0,
            weak_slope: 5.0,
            moderate_slope: 2.5,
        }
    }
}

impl ConfidenceTiers {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.weak_from,
            self.moderate_from,
            self.strong_from,
            self.weak_base,
            self.moderate_base,
            self.strong_base,
            self.floor_slope,
            self.weak_slope,
            self.moderate_slope,
        ];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(IctError::InvalidConfig("confidence tiers must be finite and >= 0".into()));
        }
        if !(self.weak_from < self.moderate_from && self.moderate_from < self.strong_from) {
            return Err(IctError::InvalidConfig("confidence tier bounds must increase".into()));
        }
        Ok(())
    }

    /// Confidence percentage for a winning score, capped at 100
    pub fn confidence(&self, score: f64) -> u8 {
        if score.is_nan() {
            return 0;
        }
        let s = score.max(0.0);
        let c = if s >= self.strong_from {
            self.strong_base + (s - self.strong_from).floor()
        } else if s >= self.moderate_from {
            self.moderate_base + ((s - self.moderate_from) * self.moderate_slope).floor()
        } else if s >= self.weak_from {
            self.weak_base + ((s - self.weak_from) * self.weak_slope).floor()
        } else {
            (s * self.floor_slope).floor().min(self.weak_base)
        };
        c.clamp(0.0, 100.0) as u8
    }
}

/// Entry/stop/target percentages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeLevels {
    pub stop: Ratio,
    pub target1: Ratio,
    pub target2: Ratio,
}

impl Default for TradeLevels {
    fn default() -> Self {
        Self {
            stop: Ratio::new_const(0.02),
            target1: Ratio::new_const(0.03),
            target2: Ratio::new_const(0.05),
        }
    }
}

// ============================================================
// SCORECARD
// ============================================================

/// One fired rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RuleHit {
    pub rule: RuleId,
    pub direction: Direction,
    pub points: f64,
}

/// Inputs to the adjustment stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentInputs {
    pub kill_zone_weight: f64,
    pub zone: Zone,
    pub htf_bias: Option<Direction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scorecard {
    bullish: f64,
    bearish: f64,
    hits: Vec<RuleHit>,
    trace: Vec<String>,
}

/// Outcome of the adjustment stage
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub signal: Signal,
    pub bullish_score: f64,
    pub bearish_score: f64,
    /// Adjusted score of the winning side, 0.0 for NEUTRAL
    pub score: f64,
    pub confidence: u8,
    pub hits: Vec<RuleHit>,
    /// Rule lines followed by adjustment lines
    pub trace: Vec<String>,
}

impl Scorecard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `points` to `direction`. Neutral hits are recorded but score nothing.
    pub fn add(&mut self, rule: RuleId, direction: Direction, points: f64, line: String) {
        tracing::debug!(rule = ?rule, direction = %direction, points, "rule fired");
        match direction {
            Direction::Bullish => self.bullish += points,
            Direction::Bearish => self.bearish += points,
            Direction::Neutral => {},
        }
        self.hits.push(RuleHit {
            rule,
            direction,
            points,
        });
        self.trace.push(line);
    }

    pub fn bullish(&self) -> f64 {
        self.bullish
    }

    pub fn bearish(&self) -> f64 {
        self.bearish
    }

    pub fn hits(&self) -> &[RuleHit] {
        &self.hits
    }

    /// Apply, in order: kill-zone weight, zone penalty, provisional direction, HTF
    /// adjustment. The reported direction is the provisional one even when the HTF
    /// adjustment flips which side is larger.
    pub fn finalize(
        self,
        adjustments: &Adjustments,
        tiers: &ConfidenceTiers,
        inputs: AdjustmentInputs,
    ) -> Verdict {
        let Scorecard {
            bullish,
            bearish,
            hits,
            mut trace,
        } = self;

        let mut bullish = bullish * inputs.kill_zone_weight;
        let mut bearish = bearish * inputs.kill_zone_weight;

        let penalty = adjustments.zone_penalty.get();
        match inputs.zone {
            Zone::Premium if bullish > 0.0 => {
                let cut = bullish * penalty;
                bullish -= cut;
                trace.push(format!("LONG in Premium zone - reduced score by {cut:.1} points"));
            },
            Zone::Discount if bearish > 0.0 => {
                let cut = bearish * penalty;
                bearish -= cut;
                trace.push(format!("SHORT in Discount zone - reduced score by {cut:.1} points"));
            },
            _ => {},
        }

        let signal = if bullish > bearish && bullish >= adjustments.min_score {
            Signal::Long
        } else if bearish > bullish && bearish >= adjustments.min_score {
            Signal::Short
        } else {
            Signal::Neutral
        };

        if let Some(bias) = inputs.htf_bias {
            let score = match signal {
                Signal::Long => Some(&mut bullish),
                Signal::Short => Some(&mut bearish),
                Signal::Neutral => None,
            };
            if let Some(score) = score {
                let wanted = signal.direction();
                if bias == wanted {
                    let bonus = *score * adjustments.htf_aligned_bonus;
                    *score += bonus;
                    trace.push(format!("HTF aligned with {signal} - bonus +{bonus:.1}"));
                } else if bias == wanted.opposite() {
                    let cut = *score * adjustments.htf_opposed_penalty.get();
                    *score -= cut;
                    trace.push(format!("HTF against {signal} (counter-trend) - penalty -{cut:.1}"));
                }
            }
        }

        let score = match signal {
            Signal::Long => bullish,
            Signal::Short => bearish,
            Signal::Neutral => {
                trace.push("Insufficient confluence - no clear signal".into());
                0.0
            },
        };

        Verdict {
            signal,
            bullish_score: bullish,
            bearish_score: bearish,
            score,
            confidence: tiers.confidence(score),
            hits,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(weight: f64, zone: Zone, htf: Option<Direction>) -> AdjustmentInputs {
        AdjustmentInputs {
            kill_zone_weight: weight,
            zone,
            htf_bias: htf,
        }
    }

    fn card(bullish: f64, bearish: f64) -> Scorecard {
        let mut card = Scorecard::new();
        if bullish > 0.0 {
            card.add(RuleId::OrderBlock, Direction::Bullish, bullish, "bull".into());
        }
        if bearish > 0.0 {
            card.add(RuleId::Fvg, Direction::Bearish, bearish, "bear".into());
        }
        card
    }

    #[test]
    fn test_confidence_tiers() {
        let t = ConfidenceTiers::default();
        assert_eq!(t.confidence(0.0), 0);
        assert_eq!(t.confidence(4.0), 24);
        assert_eq!(t.confidence(5.99), 30);
        assert_eq!(t.confidence(6.0), 30);
        assert_eq!(t.confidence(10.0), 50);
        assert_eq!(t.confidence(13.0), 60);
        assert_eq!(t.confidence(17.0), 70);
        assert_eq!(t.confidence(21.0), 80);
        assert_eq!(t.confidence(30.5), 89);
        assert_eq!(t.confidence(500.0), 100);
        assert_eq!(t.confidence(f64::NAN), 0);
    }

    #[test]
    fn test_premium_penalty_is_thirty_percent() {
        let v = card(10.0, 0.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Premium, None),
        );
        assert!((v.bullish_score - 7.0).abs() < 1e-9);
        assert_eq!(v.signal, Signal::Long);
        assert!(v.trace.iter().any(|l| l.contains("Premium")));
    }

    #[test]
    fn test_discount_penalizes_bearish_only() {
        let v = card(6.0, 10.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Discount, None),
        );
        assert!((v.bullish_score - 6.0).abs() < 1e-9);
        assert!((v.bearish_score - 7.0).abs() < 1e-9);
        assert_eq!(v.signal, Signal::Long);
    }

    #[test]
    fn test_kill_zone_weight_scales_both_sides() {
        let v = card(10.0, 4.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(0.6, Zone::Discount, None),
        );
        assert!((v.bullish_score - 6.0).abs() < 1e-9);
        assert!((v.bearish_score - 4.0 * 0.6 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_direction_frozen_after_htf_penalty() {
        // opposed HTF drops bullish below the 5-point floor, direction stays LONG
        let v = card(6.0, 5.5).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Discount, Some(Direction::Bearish)),
        );
        // discount penalty hits bearish first: 5.5 -> 3.85
        assert_eq!(v.signal, Signal::Long);
        assert!((v.bullish_score - 4.8).abs() < 1e-9);
        assert!((v.score - 4.8).abs() < 1e-9);
        assert_eq!(v.confidence, 28);
    }

    #[test]
    fn test_direction_frozen_when_htf_flips_order() {
        let mut c = Scorecard::new();
        c.add(RuleId::Choch, Direction::Bullish, 10.0, "a".into());
        c.add(RuleId::Fvg, Direction::Bearish, 8.0, "b".into());
        // Premium: bullish 10 -> 7, bearish stays 8 -> SHORT
        let v = c.finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Premium, Some(Direction::Bullish)),
        );
        assert_eq!(v.signal, Signal::Short);
        // opposed HTF: 8 -> 6.4, below bullish 7 but still SHORT
        assert!((v.bearish_score - 6.4).abs() < 1e-9);
        assert!(v.bullish_score > v.bearish_score);
        assert!(v.trace.iter().any(|l| l.contains("HTF against SHORT")));
    }

    #[test]
    fn test_htf_aligned_bonus() {
        let v = card(10.0, 0.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Discount, Some(Direction::Bullish)),
        );
        assert!((v.score - 11.0).abs() < 1e-9);
        assert_eq!(v.confidence, 55);
    }

    #[test]
    fn test_neutral_reports_zero_score() {
        let v = card(4.0, 3.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Discount, None),
        );
        assert_eq!(v.signal, Signal::Neutral);
        assert_eq!(v.score, 0.0);
        assert_eq!(v.confidence, 0);
        assert_eq!(
            v.trace.last().map(String::as_str),
            Some("Insufficient confluence - no clear signal")
        );
    }

    #[test]
    fn test_zone_penalty_breaks_ties() {
        let v = card(8.0, 8.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Discount, None),
        );
        // discount cuts bearish to 5.6, bullish 8 wins
        assert_eq!(v.signal, Signal::Long);

        let v = card(8.0, 8.0).finalize(
            &Adjustments::default(),
            &ConfidenceTiers::default(),
            inputs(1.0, Zone::Premium, Some(Direction::Neutral)),
        );
        assert_eq!(v.signal, Signal::Short);
    }
}
