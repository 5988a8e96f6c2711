//! ICT pattern detectors
//!
//! Every detector is a pure function of a bar slice plus its own fixed parameters and
//! returns an index-ordered, possibly overlapping list of occurrences.
//!
//! # Detector Families
//!
//! - **Zones**: Order Block, Fair Value Gap, Balanced Range, Volume Imbalance
//! - **Structure**: Market Structure (BOS), Change of Character (CHOCH), Liquidity Sweep
//! - **Momentum**: Displacement

use serde::Serialize;

use crate::{
  BalancedRange, Displacement, FairValueGap, LiquiditySweep, OrderBlock, PatternKind,
  PatternOccurrence, Result, StructureKind, StructureShift, VolumeImbalance, OHLCV,
};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod momentum;
pub mod structure;
pub mod zones;

// Re-export all detectors for convenience
pub use helpers::*;
pub use momentum::*;
pub use structure::*;
pub use zones::*;

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Core trait for ICT pattern detectors
pub trait PatternDetector: Send + Sync {
  /// Detector family
  fn kind(&self) -> PatternKind;

  /// Minimum number of bars before the detector can emit anything
  fn min_bars(&self) -> usize;

  /// Scan the whole slice and return every occurrence in index order
  fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence>;

  /// Validate detector configuration
  fn validate_config(&self) -> Result<()> {
    Ok(())
  }
}

// ============================================================
// BUILTIN DETECTOR ENUM (static dispatch)
// ============================================================

macro_rules! define_builtin_detectors {
  (
    $(
      $variant:ident($detector:ty)
    ),* $(,)?
  ) => {
    /// All builtin detectors - fast path via enum dispatch
    #[derive(Debug, Clone, PartialEq)]
    pub enum BuiltinDetector {
      $($variant($detector)),*
    }

    impl BuiltinDetector {
      #[inline]
      pub fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternOccurrence> {
        match self {
          $(Self::$variant(d) => PatternDetector::detect(d, bars)),*
        }
      }

      #[inline]
      pub fn kind(&self) -> PatternKind {
        match self {
          $(Self::$variant(d) => PatternDetector::kind(d)),*
        }
      }

      #[inline]
      pub fn min_bars(&self) -> usize {
        match self {
          $(Self::$variant(d) => PatternDetector::min_bars(d)),*
        }
      }

      pub fn validate_config(&self) -> Result<()> {
        match self {
          $(Self::$variant(d) => PatternDetector::validate_config(d)),*
        }
      }

      /// One instance of every detector with default parameters
      pub fn all_defaults() -> Vec<Self> {
        vec![$(Self::$variant(<$detector>::default())),*]
      }
    }

    $(impl From<$detector> for BuiltinDetector {
      fn from(d: $detector) -> Self {
        Self::$variant(d)
      }
    })*
  };
}

define_builtin_detectors! {
  OrderBlock(OrderBlockDetector),
  FairValueGap(FairValueGapDetector),
  LiquiditySweep(LiquiditySweepDetector),
  MarketStructure(MarketStructureDetector),
  Choch(ChochDetector),
  Displacement(DisplacementDetector),
  BalancedRange(BalancedRangeDetector),
  VolumeImbalance(VolumeImbalanceDetector),
}

// ============================================================
// DETECTIONS
// ============================================================

/// Raw detector output for one frame, bucketed by family.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detections {
  pub order_blocks: Vec<OrderBlock>,
  pub fair_value_gaps: Vec<FairValueGap>,
  pub liquidity_sweeps: Vec<LiquiditySweep>,
  /// BOS-kind structure shifts
  pub structure: Vec<StructureShift>,
  /// CHOCH-kind structure shifts
  pub choch: Vec<StructureShift>,
  pub displacements: Vec<Displacement>,
  pub balanced_ranges: Vec<BalancedRange>,
  pub volume_imbalances: Vec<VolumeImbalance>,
}

impl Detections {
  /// Run every detector over `bars`.
  ///
  /// Detectors that need more bars than available contribute nothing. Only the first
  /// detector of each kind runs. Every family comes back in bar order.
  pub fn collect<T: OHLCV>(detectors: &[BuiltinDetector], bars: &[T]) -> Self {
    let mut out = Self::default();
    let mut seen: Vec<PatternKind> = Vec::with_capacity(detectors.len());
    for detector in detectors {
      let kind = detector.kind();
      if seen.contains(&kind) {
        tracing::trace!(detector = kind.as_str(), "skipping repeated detector kind");
        continue;
      }
      seen.push(kind);
      if bars.len() < detector.min_bars() {
        tracing::trace!(
          detector = kind.as_str(),
          bars = bars.len(),
          need = detector.min_bars(),
          "skipping detector on short input"
        );
        continue;
      }
      let found = detector.detect(bars);
      tracing::trace!(detector = kind.as_str(), count = found.len(), "detector finished");
      for occurrence in found {
        out.push(occurrence);
      }
    }
    out.sort();
    out
  }

  /// Stable sort of every family by the bar that confirms it. Order blocks are keyed on
  /// their displacement bar.
  fn sort(&mut self) {
    self.order_blocks.sort_by_key(|ob| ob.index_range.end);
    self.fair_value_gaps.sort_by_key(|g| g.index_range.start);
    self.liquidity_sweeps.sort_by_key(|s| s.index);
    self.structure.sort_by_key(|s| s.index);
    self.choch.sort_by_key(|s| s.index);
    self.displacements.sort_by_key(|d| d.index);
    self.balanced_ranges.sort_by_key(|b| b.index_range.start);
    self.volume_imbalances.sort_by_key(|v| v.index);
  }

  pub fn push(&mut self, occurrence: PatternOccurrence) {
    match occurrence {
      PatternOccurrence::OrderBlock(ob) => self.order_blocks.push(ob),
      PatternOccurrence::FairValueGap(fvg) => self.fair_value_gaps.push(fvg),
      PatternOccurrence::LiquiditySweep(s) => self.liquidity_sweeps.push(s),
      PatternOccurrence::StructureShift(s) => match s.kind {
        StructureKind::Bos => self.structure.push(s),
        StructureKind::Choch => self.choch.push(s),
      },
      PatternOccurrence::Displacement(d) => self.displacements.push(d),
      PatternOccurrence::BalancedRange(b) => self.balanced_ranges.push(b),
      PatternOccurrence::VolumeImbalance(v) => self.volume_imbalances.push(v),
    }
  }

  /// Total number of occurrences across all families
  pub fn len(&self) -> usize {
    self.order_blocks.len()
      + self.fair_value_gaps.len()
      + self.liquidity_sweeps.len()
      + self.structure.len()
      + self.choch.len()
      + self.displacements.len()
      + self.balanced_ranges.len()
      + self.volume_imbalances.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// All occurrences as tagged values, family by family
  pub fn iter(&self) -> impl Iterator<Item = PatternOccurrence> + '_ {
    self
      .order_blocks
      .iter()
      .copied()
      .map(PatternOccurrence::OrderBlock)
      .chain(self.fair_value_gaps.iter().copied().map(PatternOccurrence::FairValueGap))
      .chain(self.liquidity_sweeps.iter().copied().map(PatternOccurrence::LiquiditySweep))
      .chain(self.structure.iter().copied().map(PatternOccurrence::StructureShift))
      .chain(self.choch.iter().copied().map(PatternOccurrence::StructureShift))
      .chain(self.displacements.iter().copied().map(PatternOccurrence::Displacement))
      .chain(self.balanced_ranges.iter().copied().map(PatternOccurrence::BalancedRange))
      .chain(self.volume_imbalances.iter().copied().map(PatternOccurrence::VolumeImbalance))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{Direction, IndexRange, PriceBand};

  #[test]
  fn test_all_defaults_cover_every_family() {
    let all = BuiltinDetector::all_defaults();
    assert_eq!(all.len(), 8);
    for d in &all {
      assert!(d.validate_config().is_ok(), "{:?}", d.kind());
    }
  }

  #[test]
  fn test_push_routes_structure_kinds() {
    let mut det = Detections::default();
    let shift = StructureShift {
      direction: Direction::Bullish,
      index: 3,
      close: 101.0,
      broken_level: 100.0,
      kind: StructureKind::Bos,
      strength: 0.01,
    };
    det.push(PatternOccurrence::StructureShift(shift));
    det.push(PatternOccurrence::StructureShift(StructureShift { kind: StructureKind::Choch, ..shift }));
    det.push(PatternOccurrence::FairValueGap(FairValueGap {
      direction: Direction::Bullish,
      index_range: IndexRange { start: 0, end: 2 },
      gap: PriceBand::new(100.0, 105.0),
    }));

    assert_eq!(det.structure.len(), 1);
    assert_eq!(det.choch.len(), 1);
    assert_eq!(det.fair_value_gaps.len(), 1);
    assert_eq!(det.len(), 3);
    assert_eq!(det.iter().count(), 3);
  }

  fn uptrend(n: usize) -> Vec<crate::Bar> {
    use chrono::{Duration, TimeZone, Utc};
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
      .map(|i| {
        let base = 100.0 + i as f64 * 2.0;
        crate::Bar::new(start + Duration::hours(i as i64), base - 0.5, base + 1.5, base - 1.5, base + 1.0, 1000.0)
          .unwrap()
      })
      .collect()
  }

  #[test]
  fn test_repeated_kinds_run_once() {
    let bars = uptrend(30);
    let once = Detections::collect(&BuiltinDetector::all_defaults(), &bars);
    let mut twice = BuiltinDetector::all_defaults();
    twice.extend(BuiltinDetector::all_defaults());
    assert_eq!(Detections::collect(&twice, &bars), once);
  }

  #[test]
  fn test_families_come_back_in_bar_order() {
    let bars = uptrend(30);
    let mut detectors = BuiltinDetector::all_defaults();
    detectors.reverse();
    let det = Detections::collect(&detectors, &bars);
    assert!(det.fair_value_gaps.windows(2).all(|w| w[0].index_range.start <= w[1].index_range.start));
    assert!(det.structure.windows(2).all(|w| w[0].index <= w[1].index));
    assert!(det.displacements.windows(2).all(|w| w[0].index <= w[1].index));
    assert_eq!(det, Detections::collect(&BuiltinDetector::all_defaults(), &bars));
  }
}
