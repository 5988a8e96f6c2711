//! Confluence aggregation
//!
//! [`ConfluenceEngine`] runs every detector and context analyzer over one frame, scores
//! the fixed rule table and emits a [`SignalResult`].
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use ict_confluence::prelude::*;
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
//! let bars: Vec<Bar> = (0..30)
//!     .map(|i| Bar::new(start + Duration::hours(i), 100.0, 101.0, 99.0, 100.5, 10.0).unwrap())
//!     .collect();
//! let frame = Frame::new(bars).unwrap();
//!
//! // fewer than 50 bars: neutral without running detectors
//! let result = EngineBuilder::new().with_all_defaults().build().unwrap().evaluate(&frame, None);
//! assert_eq!(result.signal, Signal::Neutral);
//! assert_eq!(result.reasoning.len(), 1);
//! ```

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::backtest::BacktestSettings;
use crate::config::{DetectorParams, EngineConfig};
use crate::context::{
    HtfBiasEstimator, KillZoneClassifier, KillZoneTable, PowerOfThreeClassifier,
    PremiumDiscountCalculator, ReferenceClock, SessionLiquidityTracker, SessionWindow, Zone,
};
use crate::detectors::{BuiltinDetector, Detections};
use crate::{Direction, Frame, IctError, PatternOccurrence, Period, PriceBand, Result, OHLCV};

pub mod rules;
pub mod signal;

pub use rules::*;
pub use signal::*;

// ============================================================
// ENGINE
// ============================================================

/// Stateless evaluator; safe to share across threads.
#[derive(Debug, Clone)]
pub struct ConfluenceEngine {
    detectors: Vec<BuiltinDetector>,
    kill_zones: KillZoneClassifier,
    power_of_three: PowerOfThreeClassifier,
    sessions: SessionLiquidityTracker,
    config: EngineConfig,
}

impl Default for ConfluenceEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        let detectors = config.detectors.clone().into_detectors();
        Self::from_parts(config, ReferenceClock::default(), detectors)
    }
}

impl ConfluenceEngine {
    fn from_parts(
        config: EngineConfig,
        clock: ReferenceClock,
        detectors: Vec<BuiltinDetector>,
    ) -> Self {
        Self {
            detectors,
            kill_zones: KillZoneClassifier::new(clock, config.kill_zones.clone()),
            power_of_three: PowerOfThreeClassifier::new(clock),
            sessions: SessionLiquidityTracker::new(clock, config.sessions.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.detectors
    }

    /// Evaluate with the configured lookback
    pub fn evaluate(&self, frame: &Frame, htf: Option<&Frame>) -> SignalResult {
        self.evaluate_with_lookback(frame, htf, self.config.lookback)
    }

    pub fn evaluate_with_lookback(
        &self,
        frame: &Frame,
        htf: Option<&Frame>,
        lookback: Period,
    ) -> SignalResult {
        self.evaluate_bars(frame.bars(), htf.map(Frame::bars), lookback)
    }

    /// Evaluate the last bar of `bars`. Total over any input: short or empty input yields
    /// a NEUTRAL result.
    pub fn evaluate_bars<T: OHLCV>(
        &self,
        bars: &[T],
        htf: Option<&[T]>,
        lookback: Period,
    ) -> SignalResult {
        let min_bars = self.config.min_bars;
        let Some(last) = bars.last() else {
            return SignalResult::insufficient(0, min_bars, 0.0, None);
        };
        if bars.len() < min_bars {
            tracing::debug!(bars = bars.len(), need = min_bars, "insufficient data, returning neutral");
            return SignalResult::insufficient(
                bars.len(),
                min_bars,
                last.close(),
                Some(last.timestamp()),
            );
        }

        let current = bars.len() - 1;
        let price = last.close();
        let at = last.timestamp();
        let window = lookback.get();
        let rules = &self.config.rules;
        let recent = |anchor: usize, span: usize| current.saturating_sub(anchor) <= span;

        let detections = Detections::collect(&self.detectors, bars);
        let kill_zone = self.kill_zones.classify(at);
        let premium_discount = PremiumDiscountCalculator::new(lookback).calculate(bars);
        let power_of_three = self.power_of_three.classify(at);
        let sessions = self.sessions.track(bars);
        let htf_bias = htf.map(|h| {
            if h.len() < self.config.htf.min_bars.get() {
                tracing::warn!(
                    bars = h.len(),
                    need = self.config.htf.min_bars.get(),
                    "higher timeframe frame too short, bias will be neutral"
                );
            }
            self.config.htf.estimate(h)
        });
        let ote = OteLevels::from_range(premium_discount.range_high, premium_discount.range_low);

        // Context lines
        let mut context_lines = Vec::new();
        if kill_zone.is_active() {
            context_lines.push(format!(
                "Inside {} Kill Zone (weight {:.0}%)",
                kill_zone.zone,
                kill_zone.weight * 100.0
            ));
        } else {
            context_lines.push(format!(
                "Outside Kill Zones (weight {:.0}%)",
                kill_zone.weight * 100.0
            ));
        }
        context_lines.push(format!(
            "Price in {} zone ({:.1}% of range {:.2}-{:.2})",
            premium_discount.detailed_zone.label(),
            premium_discount.price_position * 100.0,
            premium_discount.range_low,
            premium_discount.range_high
        ));
        context_lines.push(format!(
            "{} phase - {} ({})",
            power_of_three.phase.name(),
            power_of_three.description,
            power_of_three.recommendation
        ));
        context_lines.push(match &htf_bias {
            Some(bias) => format!(
                "HTF Bias: {} ({}%) - {}",
                bias.bias, bias.strength, bias.reasoning
            ),
            None => "HTF Bias: not provided".to_string(),
        });

        let mut card = Scorecard::new();
        let mut active_zones: BTreeMap<ZoneKind, Vec<PatternOccurrence>> = BTreeMap::new();
        let mut active_blocks: [Option<PriceBand>; 2] = [None, None];

        // 1. Change of character
        let chochs: Vec<_> = detections
            .choch
            .iter()
            .filter(|s| recent(s.index, rules.choch_window))
            .collect();
        for shift in &chochs[chochs.len().saturating_sub(rules.choch_max)..] {
            card.add(
                RuleId::Choch,
                shift.direction,
                rules.choch_points,
                format!("{} CHOCH detected (reversal signal)", shift.direction.label()),
            );
        }

        // 2. Order blocks
        let proximity = rules.order_block_proximity.get();
        for (slot, direction) in [Direction::Bullish, Direction::Bearish].into_iter().enumerate() {
            let active = detections
                .order_blocks
                .iter()
                .filter(|ob| ob.direction == direction && recent(ob.index_range.start, window))
                .take(rules.order_block_candidates)
                .find(|ob| {
                    let buffer = (ob.band.width() * proximity).max(price * proximity);
                    price >= ob.band.low - buffer && price <= ob.band.high + buffer
                });
            let Some(ob) = active else { continue };

            let at_ote = ote.any_within(price, rules.ote_tolerance.get());
            let band = format!("{:.2}-{:.2}", ob.band.low, ob.band.high);
            let (rule, points, line) = if at_ote && kill_zone.is_active() {
                (
                    RuleId::OrderBlockOteKillZone,
                    rules.order_block_ote_kill_zone_points,
                    format!("{} Order Block at OTE in Kill Zone ({band})", direction.label()),
                )
            } else if at_ote {
                (
                    RuleId::OrderBlockOte,
                    rules.order_block_ote_points,
                    format!("{} Order Block at OTE level ({band})", direction.label()),
                )
            } else {
                (
                    RuleId::OrderBlock,
                    rules.order_block_points,
                    format!("{} Order Block ({band})", direction.label()),
                )
            };
            card.add(rule, direction, points, line);
            active_zones.insert(
                ZoneKind::order_block(direction),
                vec![PatternOccurrence::OrderBlock(*ob)],
            );
            active_blocks[slot] = Some(ob.band);
        }

        // 3. Fair value gaps
        let margin = rules.fvg_overlap_margin.get();
        for direction in [Direction::Bullish, Direction::Bearish] {
            let active = detections
                .fair_value_gaps
                .iter()
                .filter(|g| g.direction == direction && recent(g.index_range.start, window))
                .take(rules.fvg_candidates)
                .find(|g| match direction {
                    Direction::Bullish => g.gap.low * (1.0 - margin) < price && price < g.gap.high,
                    _ => g.gap.low < price && price < g.gap.high * (1.0 + margin),
                });
            let Some(gap) = active else { continue };

            let aligned = matches!(
                (direction, premium_discount.zone),
                (Direction::Bullish, Zone::Discount) | (Direction::Bearish, Zone::Premium)
            );
            let band = format!("{:.2}-{:.2}", gap.gap.low, gap.gap.high);
            if aligned {
                card.add(
                    RuleId::FvgAligned,
                    direction,
                    rules.fvg_aligned_points,
                    format!(
                        "{} FVG in {} zone ({band})",
                        direction.label(),
                        premium_discount.zone.label()
                    ),
                );
            } else {
                card.add(
                    RuleId::Fvg,
                    direction,
                    rules.fvg_points,
                    format!("{} FVG ({band})", direction.label()),
                );
            }
            active_zones.insert(
                ZoneKind::fvg(direction),
                vec![PatternOccurrence::FairValueGap(*gap)],
            );
        }

        // 4. Liquidity sweeps
        let sweeps: Vec<_> = detections
            .liquidity_sweeps
            .iter()
            .filter(|s| recent(s.index, rules.sweep_window))
            .collect();
        for sweep in &sweeps[sweeps.len().saturating_sub(rules.sweep_max)..] {
            card.add(
                RuleId::LiquiditySweep,
                sweep.reversal,
                rules.sweep_points,
                format!("{} liquidity sweep at {:.2}", sweep.reversal.label(), sweep.price),
            );
        }

        // 5. Market structure majority
        let (bull_bos, bear_bos) = detections
            .structure
            .iter()
            .filter(|s| recent(s.index, rules.structure_window))
            .fold((0usize, 0usize), |(bull, bear), s| match s.direction {
                Direction::Bullish => (bull + 1, bear),
                Direction::Bearish => (bull, bear + 1),
                Direction::Neutral => (bull, bear),
            });
        if bull_bos != bear_bos {
            let direction = if bull_bos > bear_bos {
                Direction::Bullish
            } else {
                Direction::Bearish
            };
            card.add(
                RuleId::MarketStructure,
                direction,
                rules.structure_points,
                format!("{} market structure (BOS)", direction.label()),
            );
        }

        // 6. Latest displacement
        if let Some(disp) = detections
            .displacements
            .iter()
            .rev()
            .find(|d| recent(d.index, rules.displacement_window))
        {
            card.add(
                RuleId::Displacement,
                disp.direction,
                rules.displacement_points,
                format!("{} displacement (strength: {:.2})", disp.direction.label(), disp.strength),
            );
        }

        let verdict = card.finalize(
            &self.config.adjustments,
            &self.config.confidence,
            AdjustmentInputs {
                kill_zone_weight: kill_zone.weight,
                zone: premium_discount.zone,
                htf_bias: htf_bias.as_ref().map(|b| b.bias),
            },
        );

        let active_block = match verdict.signal {
            Signal::Long => active_blocks[0],
            Signal::Short => active_blocks[1],
            Signal::Neutral => None,
        };
        let entry_levels = EntryLevels::derive(
            verdict.signal,
            active_block,
            price,
            premium_discount.range_high,
            premium_discount.range_low,
            &self.config.levels,
        );

        let mut reasoning = Vec::with_capacity(1 + context_lines.len() + verdict.trace.len());
        reasoning.push(format!(
            "Total Confluence: {:.1} points -> {}% confidence",
            verdict.score, verdict.confidence
        ));
        reasoning.extend(context_lines);
        reasoning.extend(verdict.trace);

        tracing::debug!(
            signal = %verdict.signal,
            confidence = verdict.confidence,
            bullish = verdict.bullish_score,
            bearish = verdict.bearish_score,
            rules = verdict.hits.len(),
            "confluence evaluated"
        );

        SignalResult {
            signal: verdict.signal,
            confidence: verdict.confidence,
            bullish_score: verdict.bullish_score,
            bearish_score: verdict.bearish_score,
            reasoning,
            breakdown: verdict.hits,
            active_zones,
            entry_levels,
            ote_levels: Some(ote),
            context: Some(ContextSnapshots {
                kill_zone,
                premium_discount,
                power_of_three,
                sessions,
                htf_bias,
            }),
            detections,
            current_price: price,
            timestamp: Some(at),
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`ConfluenceEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    detectors: Vec<BuiltinDetector>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a config; its detector parameters are registered immediately.
    pub fn from_config(config: EngineConfig) -> Self {
        let detectors = config.detectors.clone().into_detectors();
        Self { config, detectors }
    }

    /// Register every builtin detector with default parameters, replacing any already
    /// registered.
    pub fn with_all_defaults(mut self) -> Self {
        self.detectors = DetectorParams::default().into_detectors();
        self
    }

    /// Add a builtin detector. A detector of the same kind already registered is replaced
    /// in place.
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: impl Into<BuiltinDetector>) -> Self {
        let detector = detector.into();
        match self.detectors.iter_mut().find(|d| d.kind() == detector.kind()) {
            Some(slot) => *slot = detector,
            None => self.detectors.push(detector),
        }
        self
    }

    /// Add with config validation. Fails if a detector of the same kind is registered.
    pub fn add_checked(mut self, detector: impl Into<BuiltinDetector>) -> Result<Self> {
        let detector = detector.into();
        detector.validate_config()?;
        if self.detectors.iter().any(|d| d.kind() == detector.kind()) {
            return Err(IctError::InvalidConfig(format!(
                "detector {} already registered",
                detector.kind().as_str()
            )));
        }
        self.detectors.push(detector);
        Ok(self)
    }

    pub fn lookback(mut self, lookback: Period) -> Self {
        self.config.lookback = lookback;
        self
    }

    pub fn min_bars(mut self, min_bars: usize) -> Self {
        self.config.min_bars = min_bars;
        self
    }

    /// IANA timezone name for time-of-day analyzers
    pub fn timezone(mut self, name: impl Into<String>) -> Self {
        self.config.timezone = name.into();
        self
    }

    pub fn kill_zones(mut self, table: KillZoneTable) -> Self {
        self.config.kill_zones = table;
        self
    }

    pub fn sessions(mut self, windows: Vec<SessionWindow>) -> Self {
        self.config.sessions = windows;
        self
    }

    pub fn htf(mut self, estimator: HtfBiasEstimator) -> Self {
        self.config.htf = estimator;
        self
    }

    pub fn rules(mut self, rules: RuleTable) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn adjustments(mut self, adjustments: Adjustments) -> Self {
        self.config.adjustments = adjustments;
        self
    }

    pub fn confidence_tiers(mut self, tiers: ConfidenceTiers) -> Self {
        self.config.confidence = tiers;
        self
    }

    pub fn trade_levels(mut self, levels: TradeLevels) -> Self {
        self.config.levels = levels;
        self
    }

    pub fn backtest(mut self, settings: BacktestSettings) -> Self {
        self.config.backtest = settings;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ConfluenceEngine> {
        self.config.validate()?;
        for detector in &self.detectors {
            detector.validate_config()?;
        }
        let clock = self.config.clock()?;
        tracing::debug!(
            detectors = self.detectors.len(),
            timezone = %self.config.timezone,
            lookback = self.config.lookback.get(),
            "confluence engine built"
        );
        Ok(ConfluenceEngine::from_parts(self.config, clock, self.detectors))
    }
}

// ============================================================
// PARALLEL EVALUATION
// ============================================================

/// Evaluation of a single instrument
#[derive(Debug, Clone)]
pub struct InstrumentSignal {
    pub symbol: String,
    pub result: SignalResult,
}

/// Evaluate many instruments in parallel. Output order follows input order.
pub fn evaluate_parallel<'a, I>(engine: &ConfluenceEngine, instruments: I) -> Vec<InstrumentSignal>
where
    I: IntoParallelIterator<Item = (&'a str, &'a Frame)>,
{
    instruments
        .into_par_iter()
        .map(|(symbol, frame)| InstrumentSignal {
            symbol: symbol.to_string(),
            result: engine.evaluate(frame, None),
        })
        .collect()
}
