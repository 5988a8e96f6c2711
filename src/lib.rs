//! # ict-confluence
//!
//! ICT pattern detection and weighted confluence signals over OHLCV data.
//!
//! Eight independent detectors (order blocks, fair value gaps, liquidity sweeps,
//! break of structure, change of character, displacement, balanced ranges, volume
//! imbalances) and five context analyzers (kill zones, premium/discount, power of
//! three, session liquidity, higher-timeframe bias) feed a fixed, ordered rule table
//! that emits a LONG/SHORT/NEUTRAL signal with a confidence percentage and trade
//! levels. A point-in-time backtest replays the engine on truncated history.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use ict_confluence::prelude::*;
//!
//! let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
//! let bars: Vec<Bar> = (0..120)
//!     .map(|i| {
//!         let base = 100.0 + (i as f64 * 0.3).sin() * 2.0;
//!         Bar::new(start + Duration::hours(i), base, base + 1.0, base - 1.0, base + 0.2, 1_000.0)
//!             .unwrap()
//!     })
//!     .collect();
//! let frame = Frame::new(bars).unwrap();
//!
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//! let result = engine.evaluate(&frame, None);
//! assert!(result.confidence <= 100);
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub mod backtest;
pub mod config;
pub mod confluence;
pub mod context;
pub mod detectors;
pub mod params;

pub use detectors::{BuiltinDetector, Detections, PatternDetector};

pub mod prelude {
    pub use crate::{
        // Backtest
        backtest::{
            is_correct, BacktestResult, BacktestSettings, BacktestSummary, HighConfidenceSignal,
            NotEnoughHistory,
        },
        // Configuration
        config::{DetectorParams, EngineConfig},
        // Aggregator
        confluence::{
            evaluate_parallel, AdjustmentInputs, Adjustments, ConfidenceTiers, ConfluenceEngine,
            ContextSnapshots, EngineBuilder, EntryLevels, InstrumentSignal, OteLevels, RuleHit,
            RuleId, RuleTable, Scorecard, Signal, SignalResult, TradeLevels, Verdict, ZoneKind,
        },
        // Context analyzers
        context::{
            DetailedZone, HtfBias, HtfBiasEstimator, KillZone, KillZoneClassifier,
            KillZoneReading, KillZoneTable, KillZoneWindow, PhaseReading, PowerOfThreeClassifier,
            PowerOfThreePhase, PremiumDiscount, PremiumDiscountCalculator, ReferenceClock,
            Session, SessionLevels, SessionLiquidityTracker, SessionRange, SessionWindow, Zone,
        },
        // Detectors
        detectors::*,
        // Parameters
        params::{build_detector, param_specs, ParamKind, ParamOverrides, ParamSpec, Tunable},
        // Convenience entrypoints
        backtest,
        evaluate,
        // Frame model
        Bar,
        // Occurrences
        BalancedRange,
        Direction,
        Displacement,
        FairValueGap,
        Frame,
        // Errors
        IctError,
        IndexRange,
        LiquiditySweep,
        OHLCVExt,
        OrderBlock,
        PatternKind,
        PatternOccurrence,
        Period,
        PriceBand,
        Ratio,
        Result,
        StructureKind,
        StructureShift,
        VolumeImbalance,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, IctError>;

/// Errors that can occur while building frames, engines or running backtests.
///
/// Evaluation itself is total over length-valid frames and never returns one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IctError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Timestamps must be strictly increasing (violated at index {index})")]
    UnorderedTimestamps { index: usize },

    #[error("Frame must contain at least one bar")]
    EmptyFrame,

    #[error(transparent)]
    NotEnoughHistory(#[from] backtest::NotEnoughHistory),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(IctError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(IctError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(IctError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn timestamp(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(IctError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(IctError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.open().max(self.close()).max(self.low()) {
            return Err(IctError::InvalidOHLCV {
                index: 0,
                reason: "high below open/close/low",
            });
        }
        if self.low() > self.open().min(self.close()).min(self.high()) {
            return Err(IctError::InvalidOHLCV {
                index: 0,
                reason: "low above open/close/high",
            });
        }
        if self.volume() < 0.0 {
            return Err(IctError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// BAR / FRAME
// ============================================================

/// A single OHLCV bar stamped with its UTC open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a validated bar.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar from a timezone-less timestamp, which is interpreted as UTC.
    pub fn from_naive(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self> {
        Self::new(Utc.from_utc_datetime(&timestamp), open, high, low, close, volume)
    }
}

impl OHLCV for Bar {
    #[inline]
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[inline]
    fn open(&self) -> f64 {
        self.open
    }

    #[inline]
    fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }

    #[inline]
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Immutable, time-ordered, non-empty sequence of bars.
///
/// Detectors assume a uniform sampling interval; that is the caller's contract and is
/// not checked here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    bars: Vec<Bar>,
}

impl Frame {
    /// Validate and wrap a bar sequence.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(IctError::EmptyFrame);
        }
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                IctError::InvalidOHLCV { reason, .. } => IctError::InvalidOHLCV { index: i, reason },
                other => other,
            })?;
        }
        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(IctError::UnorderedTimestamps { index: i + 1 });
        }
        Ok(Self { bars })
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn last(&self) -> &Bar {
        // non-empty by construction
        &self.bars[self.bars.len() - 1]
    }

    /// Index of the bar whose timestamp is nearest to `at`. Ties go to the earlier bar.
    pub fn nearest_index(&self, at: DateTime<Utc>) -> usize {
        let p = self.bars.partition_point(|b| b.timestamp < at);
        if p == 0 {
            return 0;
        }
        if p == self.bars.len() {
            return p - 1;
        }
        let before = at - self.bars[p - 1].timestamp;
        let after = self.bars[p].timestamp - at;
        if after < before {
            p
        } else {
            p - 1
        }
    }

    /// Aggregate bars into UTC-aligned buckets of `bucket` length (e.g. 1h -> 4h).
    ///
    /// Open is the first open, high the max, low the min, close the last close and volume
    /// the sum of each bucket. Buckets are stamped with their start instant.
    pub fn resample(&self, bucket: chrono::Duration) -> Result<Frame> {
        let secs = bucket.num_seconds();
        if secs <= 0 {
            return Err(IctError::InvalidValue("resample bucket must be at least one second"));
        }

        let mut out: Vec<Bar> = Vec::new();
        let mut current_key: Option<i64> = None;

        for bar in &self.bars {
            let key = bar.timestamp.timestamp().div_euclid(secs);
            match (current_key, out.last_mut()) {
                (Some(k), Some(acc)) if k == key => {
                    acc.high = acc.high.max(bar.high);
                    acc.low = acc.low.min(bar.low);
                    acc.close = bar.close;
                    acc.volume += bar.volume;
                }
                _ => {
                    let start = DateTime::from_timestamp(key * secs, 0)
                        .ok_or(IctError::InvalidValue("resample bucket out of range"))?;
                    out.push(Bar { timestamp: start, ..*bar });
                    current_key = Some(key);
                }
            }
        }

        Frame::new(out)
    }
}

impl AsRef<[Bar]> for Frame {
    fn as_ref(&self) -> &[Bar] {
        &self.bars
    }
}

// ============================================================
// DIRECTION / BANDS
// ============================================================

/// Direction/bias of an occurrence or estimate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }

    /// Capitalized label used in reasoning lines ("Bullish", "Bearish", "Neutral").
    pub fn label(self) -> &'static str {
        match self {
            Direction::Bullish => "Bullish",
            Direction::Neutral => "Neutral",
            Direction::Bearish => "Bearish",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Bullish => "BULLISH",
            Direction::Neutral => "NEUTRAL",
            Direction::Bearish => "BEARISH",
        })
    }
}

/// Closed price interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBand {
    pub low: f64,
    pub high: f64,
}

impl PriceBand {
    /// Build a band from two bounds in either order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Inclusive bar index span of a multi-bar occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

// ============================================================
// PATTERN OCCURRENCES
// ============================================================

/// Detector family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PatternKind {
    OrderBlock,
    FairValueGap,
    LiquiditySweep,
    MarketStructure,
    Choch,
    Displacement,
    BalancedRange,
    VolumeImbalance,
}

impl PatternKind {
    /// Stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::OrderBlock => "ICT_ORDER_BLOCK",
            PatternKind::FairValueGap => "ICT_FVG",
            PatternKind::LiquiditySweep => "ICT_LIQUIDITY_SWEEP",
            PatternKind::MarketStructure => "ICT_BOS",
            PatternKind::Choch => "ICT_CHOCH",
            PatternKind::Displacement => "ICT_DISPLACEMENT",
            PatternKind::BalancedRange => "ICT_BALANCED_RANGE",
            PatternKind::VolumeImbalance => "ICT_VOLUME_IMBALANCE",
        }
    }
}

/// Last opposite-colored bar before a displacement move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderBlock {
    pub direction: Direction,
    /// `start` is the order-block bar, `end` the displacement bar that confirmed it
    pub index_range: IndexRange,
    pub band: PriceBand,
    /// Displacement fraction of the confirming bar
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FairValueGap {
    pub direction: Direction,
    pub index_range: IndexRange,
    pub gap: PriceBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiquiditySweep {
    pub index: usize,
    /// Extreme that swept the prior range
    pub price: f64,
    pub reversal: Direction,
}

/// Continuation break (BOS) vs. reversal break (CHOCH)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StructureKind {
    Bos,
    Choch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StructureShift {
    pub direction: Direction,
    pub index: usize,
    pub close: f64,
    pub broken_level: f64,
    pub kind: StructureKind,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Displacement {
    pub direction: Direction,
    pub index: usize,
    /// Signed single-bar close-to-close change
    pub magnitude: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalancedRange {
    pub index_range: IndexRange,
    pub band: PriceBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeImbalance {
    pub direction: Direction,
    pub index: usize,
    pub gap: PriceBand,
}

/// Result of pattern detection - one variant per detector family
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PatternOccurrence {
    OrderBlock(OrderBlock),
    FairValueGap(FairValueGap),
    LiquiditySweep(LiquiditySweep),
    StructureShift(StructureShift),
    Displacement(Displacement),
    BalancedRange(BalancedRange),
    VolumeImbalance(VolumeImbalance),
}

impl PatternOccurrence {
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::OrderBlock(_) => PatternKind::OrderBlock,
            Self::FairValueGap(_) => PatternKind::FairValueGap,
            Self::LiquiditySweep(_) => PatternKind::LiquiditySweep,
            Self::StructureShift(s) => match s.kind {
                StructureKind::Bos => PatternKind::MarketStructure,
                StructureKind::Choch => PatternKind::Choch,
            },
            Self::Displacement(_) => PatternKind::Displacement,
            Self::BalancedRange(_) => PatternKind::BalancedRange,
            Self::VolumeImbalance(_) => PatternKind::VolumeImbalance,
        }
    }

    /// Bar index used for recency filtering.
    pub fn anchor_index(&self) -> usize {
        match self {
            Self::OrderBlock(ob) => ob.index_range.start,
            Self::FairValueGap(fvg) => fvg.index_range.start,
            Self::LiquiditySweep(s) => s.index,
            Self::StructureShift(s) => s.index,
            Self::Displacement(d) => d.index,
            Self::BalancedRange(b) => b.index_range.start,
            Self::VolumeImbalance(v) => v.index,
        }
    }

    /// Directional bias, `None` for non-directional occurrences (balanced ranges).
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::OrderBlock(ob) => Some(ob.direction),
            Self::FairValueGap(fvg) => Some(fvg.direction),
            Self::LiquiditySweep(s) => Some(s.reversal),
            Self::StructureShift(s) => Some(s.direction),
            Self::Displacement(d) => Some(d.direction),
            Self::BalancedRange(_) => None,
            Self::VolumeImbalance(v) => Some(v.direction),
        }
    }
}

// ============================================================
// CONVENIENCE ENTRYPOINTS
// ============================================================

/// Evaluate `frame` with the default engine and the given lookback.
pub fn evaluate(frame: &Frame, htf: Option<&Frame>, lookback: Period) -> confluence::SignalResult {
    confluence::ConfluenceEngine::default().evaluate_with_lookback(frame, htf, lookback)
}

/// Backtest the default engine at `reference`, checking `forward` bars ahead.
pub fn backtest(
    frame: &Frame,
    reference: DateTime<Utc>,
    forward: Period,
) -> std::result::Result<backtest::BacktestResult, backtest::NotEnoughHistory> {
    confluence::ConfluenceEngine::default().backtest(frame, reference, forward)
}

// ============================================================
// TESTS
// ============================================================
