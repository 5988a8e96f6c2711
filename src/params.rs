//! Tunable detector parameters
//!
//! Every builtin detector publishes a static table of [`ParamSpec`]s. The tables drive:
//! - validation of [`ParamOverrides`] (unknown keys and out-of-range values are rejected)
//! - threshold sensitivity sweeps via [`Tunable::sweep`]
//! - [`build_detector`], which creates any builtin detector by [`PatternKind`] from a
//!   loosely-typed key/value map such as a JSON object
//!
//! # Example
//!
//! ```rust
//! use ict_confluence::params::{build_detector, ParamOverrides, Tunable};
//! use ict_confluence::prelude::*;
//!
//! for spec in OrderBlockDetector::PARAMS {
//!   println!("{}: {:?} (default: {})", spec.name, spec.kind, spec.default);
//! }
//!
//! let overrides = ParamOverrides::new().set("lookback", 30.0);
//! let detector = build_detector(PatternKind::OrderBlock, &overrides).unwrap();
//! assert_eq!(detector.kind(), PatternKind::OrderBlock);
//!
//! let typo = ParamOverrides::new().set("look_back", 30.0);
//! assert!(OrderBlockDetector::from_overrides(&typo).is_err());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detectors::{
  BalancedRangeDetector, BuiltinDetector, ChochDetector, DisplacementDetector,
  FairValueGapDetector, LiquiditySweepDetector, MarketStructureDetector, OrderBlockDetector,
  VolumeImbalanceDetector,
};
use crate::{IctError, PatternKind, Period, Ratio, Result};

// ============================================================
// PARAMETER SPECS
// ============================================================

/// How a parameter value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
  /// Fraction in 0.0..=1.0 (thresholds, tolerances)
  Ratio,
  /// Bar count >= 1
  Period,
  /// Positive multiplier, may exceed 1.0 (e.g. range expansion)
  Factor,
}

/// Inclusive sweep range used for sensitivity runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
  pub min: f64,
  pub max: f64,
  pub step: f64,
}

impl Sweep {
  /// Values from `min` to `max` inclusive. A non-positive step yields `min` alone.
  pub fn values(&self) -> Vec<f64> {
    if self.step.is_nan() || self.step <= 0.0 || self.max < self.min {
      return vec![self.min];
    }
    let steps = ((self.max - self.min) / self.step + 1e-9).floor() as usize;
    (0..=steps).map(|k| self.min + k as f64 * self.step).collect()
  }
}

/// One tunable detector parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
  pub name: &'static str,
  pub kind: ParamKind,
  pub default: f64,
  pub sweep: Sweep,
  pub description: &'static str,
}

impl ParamSpec {
  const fn new(
    name: &'static str,
    kind: ParamKind,
    default: f64,
    (min, max, step): (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind, default, sweep: Sweep { min, max, step }, description }
  }

  pub const fn ratio(
    name: &'static str,
    default: f64,
    sweep: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamKind::Ratio, default, sweep, description)
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    sweep: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamKind::Period, default, sweep, description)
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    sweep: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamKind::Factor, default, sweep, description)
  }

  /// Check `value` against the parameter's kind. Sweep bounds are advisory.
  pub fn check(&self, value: f64) -> Result<()> {
    match self.kind {
      ParamKind::Ratio => Ratio::new(value).map(|_| ()),
      ParamKind::Period => to_period(value).map(|_| ()),
      ParamKind::Factor => to_factor(value).map(|_| ()),
    }
  }
}

fn to_period(value: f64) -> Result<Period> {
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(IctError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

fn to_factor(value: f64) -> Result<f64> {
  if !value.is_finite() || value <= 0.0 {
    return Err(IctError::InvalidValue("Factor must be finite and > 0"));
  }
  Ok(value)
}

// ============================================================
// OVERRIDES
// ============================================================

/// Parameter values for one detector, keyed by [`ParamSpec::name`].
///
/// Serializes as a plain JSON object, e.g. `{"lookback": 30, "threshold": 0.02}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamOverrides(BTreeMap<String, f64>);

impl ParamOverrides {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(mut self, name: &str, value: f64) -> Self {
    self.0.insert(name.to_string(), value);
    self
  }

  pub fn get(&self, name: &str) -> Option<f64> {
    self.0.get(name).copied()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Every key must name a parameter of `kind` and hold a valid value.
  pub fn check_against(&self, kind: PatternKind, specs: &[ParamSpec]) -> Result<()> {
    for (name, &value) in &self.0 {
      let Some(spec) = specs.iter().find(|s| s.name == name) else {
        return Err(IctError::InvalidConfig(format!(
          "unknown parameter '{name}' for {}",
          kind.as_str()
        )));
      };
      spec.check(value)?;
    }
    Ok(())
  }

  pub fn ratio(&self, name: &str, default: f64) -> Result<Ratio> {
    Ratio::new(self.get(name).unwrap_or(default))
  }

  pub fn period(&self, name: &str, default: usize) -> Result<Period> {
    match self.get(name) {
      Some(value) => to_period(value),
      None => Period::new(default),
    }
  }

  pub fn factor(&self, name: &str, default: f64) -> Result<f64> {
    to_factor(self.get(name).unwrap_or(default))
  }
}

// ============================================================
// TUNABLE DETECTORS
// ============================================================

/// Detector whose thresholds are described by a static [`ParamSpec`] table
pub trait Tunable: Sized {
  const KIND: PatternKind;
  const PARAMS: &'static [ParamSpec];

  /// Build from overrides already checked against [`Self::PARAMS`]. Missing keys take
  /// their defaults.
  fn from_checked(overrides: &ParamOverrides) -> Result<Self>;

  /// Build from overrides, rejecting unknown keys and invalid values
  fn from_overrides(overrides: &ParamOverrides) -> Result<Self> {
    overrides.check_against(Self::KIND, Self::PARAMS)?;
    Self::from_checked(overrides)
  }

  /// One detector per value of `name`'s sweep range, all other parameters taken from
  /// `base`. Values whose detector fails validation are skipped.
  fn sweep(base: &ParamOverrides, name: &str) -> Result<Vec<(f64, Self)>> {
    let Some(spec) = Self::PARAMS.iter().find(|s| s.name == name) else {
      return Err(IctError::InvalidConfig(format!(
        "unknown parameter '{name}' for {}",
        Self::KIND.as_str()
      )));
    };
    Ok(
      spec
        .sweep
        .values()
        .into_iter()
        .filter_map(|v| Self::from_overrides(&base.clone().set(name, v)).ok().map(|d| (v, d)))
        .collect(),
    )
  }
}

impl Tunable for FairValueGapDetector {
  const KIND: PatternKind = PatternKind::FairValueGap;
  const PARAMS: &'static [ParamSpec] = &[];

  fn from_checked(_: &ParamOverrides) -> Result<Self> {
    Ok(Self)
  }
}

impl Tunable for VolumeImbalanceDetector {
  const KIND: PatternKind = PatternKind::VolumeImbalance;
  const PARAMS: &'static [ParamSpec] = &[];

  fn from_checked(_: &ParamOverrides) -> Result<Self> {
    Ok(Self)
  }
}

/// Parameter table of a builtin detector kind
pub fn param_specs(kind: PatternKind) -> &'static [ParamSpec] {
  match kind {
    PatternKind::OrderBlock => OrderBlockDetector::PARAMS,
    PatternKind::FairValueGap => FairValueGapDetector::PARAMS,
    PatternKind::LiquiditySweep => LiquiditySweepDetector::PARAMS,
    PatternKind::MarketStructure => MarketStructureDetector::PARAMS,
    PatternKind::Choch => ChochDetector::PARAMS,
    PatternKind::Displacement => DisplacementDetector::PARAMS,
    PatternKind::BalancedRange => BalancedRangeDetector::PARAMS,
    PatternKind::VolumeImbalance => VolumeImbalanceDetector::PARAMS,
  }
}

/// Build the builtin detector of `kind` from overrides
pub fn build_detector(kind: PatternKind, overrides: &ParamOverrides) -> Result<BuiltinDetector> {
  Ok(match kind {
    PatternKind::OrderBlock => OrderBlockDetector::from_overrides(overrides)?.into(),
    PatternKind::FairValueGap => FairValueGapDetector::from_overrides(overrides)?.into(),
    PatternKind::LiquiditySweep => LiquiditySweepDetector::from_overrides(overrides)?.into(),
    PatternKind::MarketStructure => MarketStructureDetector::from_overrides(overrides)?.into(),
    PatternKind::Choch => ChochDetector::from_overrides(overrides)?.into(),
    PatternKind::Displacement => DisplacementDetector::from_overrides(overrides)?.into(),
    PatternKind::BalancedRange => BalancedRangeDetector::from_overrides(overrides)?.into(),
    PatternKind::VolumeImbalance => VolumeImbalanceDetector::from_overrides(overrides)?.into(),
  })
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  const ALL_KINDS: [PatternKind; 8] = [
    PatternKind::OrderBlock,
    PatternKind::FairValueGap,
    PatternKind::LiquiditySweep,
    PatternKind::MarketStructure,
    PatternKind::Choch,
    PatternKind::Displacement,
    PatternKind::BalancedRange,
    PatternKind::VolumeImbalance,
  ];

  #[test]
  fn test_sweep_values_inclusive() {
    let sweep = Sweep { min: 10.0, max: 40.0, step: 5.0 };
    assert_eq!(sweep.values(), vec![10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0]);
    assert_eq!(Sweep { min: 3.0, max: 1.0, step: 1.0 }.values(), vec![3.0]);
    assert_eq!(Sweep { min: 3.0, max: 5.0, step: 0.0 }.values(), vec![3.0]);
  }

  #[test]
  fn test_spec_check_by_kind() {
    let ratio = ParamSpec::ratio("threshold", 0.02, (0.005, 0.05, 0.005), "");
    assert!(ratio.check(0.5).is_ok());
    assert!(ratio.check(1.5).is_err());

    let period = ParamSpec::period("lookback", 20.0, (10.0, 40.0, 5.0), "");
    assert!(period.check(12.0).is_ok());
    assert!(period.check(12.5).is_err());
    assert!(period.check(0.0).is_err());

    let factor = ParamSpec::factor("range_factor", 1.5, (1.0, 3.0, 0.25), "");
    assert!(factor.check(4.0).is_ok());
    assert!(factor.check(-1.0).is_err());
  }

  #[test]
  fn test_defaults_are_valid_for_every_kind() {
    for kind in ALL_KINDS {
      for spec in param_specs(kind) {
        assert!(spec.check(spec.default).is_ok(), "{} {}", kind.as_str(), spec.name);
      }
      let built = build_detector(kind, &ParamOverrides::new()).unwrap();
      assert_eq!(built.kind(), kind);
    }
  }

  #[test]
  fn test_defaults_match_detector_defaults() {
    assert_eq!(
      build_detector(PatternKind::Choch, &ParamOverrides::new()).unwrap(),
      BuiltinDetector::from(ChochDetector::default())
    );
    assert_eq!(
      DisplacementDetector::from_overrides(&ParamOverrides::new()).unwrap(),
      DisplacementDetector::default()
    );
  }

  #[test]
  fn test_unknown_key_rejected() {
    let overrides = ParamOverrides::new().set("lookbak", 30.0);
    let err = build_detector(PatternKind::LiquiditySweep, &overrides).unwrap_err();
    assert!(matches!(err, IctError::InvalidConfig(msg) if msg.contains("lookbak")));
    assert!(build_detector(PatternKind::FairValueGap, &overrides).is_err());
  }

  #[test]
  fn test_overrides_from_json() {
    let overrides: ParamOverrides =
      serde_json::from_str(r#"{"lookback": 30, "displacement_threshold": 0.02}"#).unwrap();
    let ob = OrderBlockDetector::from_overrides(&overrides).unwrap();
    assert_eq!(ob.lookback.get(), 30);
    assert!((ob.displacement_threshold.get() - 0.02).abs() < 1e-12);
  }

  #[test]
  fn test_sweep_skips_invalid_configs() {
    // lookback must exceed min_swing_age, so 20 and 30 drop out
    let base = ParamOverrides::new().set("min_swing_age", 30.0);
    let runs = ChochDetector::sweep(&base, "lookback").unwrap();
    let values: Vec<f64> = runs.iter().map(|(v, _)| *v).collect();
    assert_eq!(values, vec![40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]);
    assert!(runs.iter().all(|(v, d)| d.lookback.get() as f64 == *v));
    assert!(ChochDetector::sweep(&base, "nope").is_err());
  }
}
