//! Point-in-time backtesting
//!
//! Replays the engine on history truncated at a reference bar, then labels the signal
//! against the realized close-to-close change over a forward horizon.
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use ict_confluence::prelude::*;
//!
//! let start = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
//! let bars: Vec<Bar> = (0..90)
//!     .map(|i| {
//!         let c = 100.0 + i as f64 * 0.1;
//!         Bar::new(start + Duration::hours(i), c, c + 0.3, c - 0.3, c, 100.0).unwrap()
//!     })
//!     .collect();
//! let frame = Frame::new(bars).unwrap();
//! let engine = ConfluenceEngine::default();
//!
//! let result = engine.backtest(&frame, start + Duration::hours(70), Period::new(5).unwrap()).unwrap();
//! assert_eq!(result.bar_index, 70);
//!
//! // too close to the end of history
//! assert!(engine.backtest(&frame, start + Duration::hours(88), Period::new(5).unwrap()).is_err());
//! ```

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::confluence::{ConfluenceEngine, Signal, SignalResult};
use crate::detectors::helpers::pct_change;
use crate::{Frame, IctError, Period, Result};

// ============================================================
// SETTINGS / ERRORS
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// LONG is correct above +threshold %, SHORT below -threshold %
    pub correct_threshold_pct: f64,
    /// Cap on the history required before the reference bar
    pub max_required_history: usize,
    /// Required history is also capped at total bars / divisor
    pub history_divisor: usize,
    pub high_confidence_min: u8,
    pub high_confidence_forward: Period,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            correct_threshold_pct: 0.05,
            max_required_history: 50,
            history_divisor: 3,
            high_confidence_min: 70,
            high_confidence_forward: Period::new_const(1),
        }
    }
}

impl BacktestSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.correct_threshold_pct.is_finite() || self.correct_threshold_pct < 0.0 {
            return Err(IctError::InvalidConfig(
                "correct_threshold_pct must be finite and >= 0".into(),
            ));
        }
        if self.history_divisor == 0 {
            return Err(IctError::InvalidConfig("history_divisor must be > 0".into()));
        }
        if self.high_confidence_min > 100 {
            return Err(IctError::InvalidConfig("high_confidence_min must be <= 100".into()));
        }
        Ok(())
    }

    /// Bars required before the reference bar for a frame of `total` bars
    pub fn required_history(&self, total: usize) -> usize {
        self.max_required_history.min(total / self.history_divisor)
    }
}

/// Reference point too close to either edge of the available history
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error(
    "not enough history at {reference}: bar {index} of {total} needs {need_before} bars before and {need_after} after"
)]
pub struct NotEnoughHistory {
    pub reference: DateTime<Utc>,
    pub index: usize,
    pub total: usize,
    pub need_before: usize,
    pub need_after: usize,
}

// ============================================================
// RESULTS
// ============================================================

/// LONG is correct iff change > +threshold, SHORT iff change < -threshold. NEUTRAL is
/// never correct.
#[inline]
pub fn is_correct(signal: Signal, change_pct: f64, threshold_pct: f64) -> bool {
    match signal {
        Signal::Long => change_pct > threshold_pct,
        Signal::Short => change_pct < -threshold_pct,
        Signal::Neutral => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub reference_timestamp: DateTime<Utc>,
    /// Timestamp of the bar nearest to the reference
    pub bar_timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub forward: usize,
    pub entry_price: f64,
    pub end_price: f64,
    pub price_change_pct: f64,
    pub max_gain_pct: f64,
    pub max_loss_pct: f64,
    pub correct: bool,
    pub signal: SignalResult,
}

impl BacktestResult {
    #[inline]
    pub fn direction(&self) -> Signal {
        self.signal.signal
    }

    #[inline]
    pub fn confidence(&self) -> u8 {
        self.signal.confidence
    }

    /// Change in the direction of the trade; 0.0 for NEUTRAL
    pub fn trade_return_pct(&self) -> f64 {
        match self.direction() {
            Signal::Long => self.price_change_pct,
            Signal::Short => -self.price_change_pct,
            Signal::Neutral => 0.0,
        }
    }
}

/// Aggregate statistics over a set of backtests
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub total: usize,
    pub neutral: usize,
    pub long_count: usize,
    pub long_correct: usize,
    pub short_count: usize,
    pub short_correct: usize,
    /// Over directional signals only; `None` when there were none
    pub accuracy_pct: Option<f64>,
    /// Mean raw close-to-close change of directional signals
    pub avg_change_pct: Option<f64>,
    pub avg_trade_return_pct: Option<f64>,
    pub avg_confidence: Option<f64>,
}

impl BacktestSummary {
    pub fn from_results(results: &[BacktestResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        let mut changes = 0.0;
        let mut returns = 0.0;
        let mut confidence = 0.0;

        for r in results {
            match r.direction() {
                Signal::Long => {
                    summary.long_count += 1;
                    summary.long_correct += usize::from(r.correct);
                },
                Signal::Short => {
                    summary.short_count += 1;
                    summary.short_correct += usize::from(r.correct);
                },
                Signal::Neutral => {
                    summary.neutral += 1;
                    continue;
                },
            }
            changes += r.price_change_pct;
            returns += r.trade_return_pct();
            confidence += f64::from(r.confidence());
        }

        let directional = summary.directional();
        if directional > 0 {
            let n = directional as f64;
            summary.accuracy_pct = Some((summary.long_correct + summary.short_correct) as f64 / n * 100.0);
            summary.avg_change_pct = Some(changes / n);
            summary.avg_trade_return_pct = Some(returns / n);
            summary.avg_confidence = Some(confidence / n);
        }
        summary
    }

    #[inline]
    pub fn directional(&self) -> usize {
        self.long_count + self.short_count
    }

    pub fn long_accuracy_pct(&self) -> Option<f64> {
        (self.long_count > 0).then(|| self.long_correct as f64 / self.long_count as f64 * 100.0)
    }

    pub fn short_accuracy_pct(&self) -> Option<f64> {
        (self.short_count > 0).then(|| self.short_correct as f64 / self.short_count as f64 * 100.0)
    }
}

/// A confident directional signal and its next-bar outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighConfidenceSignal {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub signal: Signal,
    pub confidence: u8,
    pub entry_price: f64,
    pub exit_price: f64,
    pub price_change_pct: f64,
    pub correct: bool,
    pub reasoning: Vec<String>,
}

// ============================================================
// ENGINE EXTENSIONS
// ============================================================

impl ConfluenceEngine {
    /// Backtest at the bar nearest to `reference`.
    ///
    /// The engine only sees bars up to and including the reference bar.
    pub fn backtest(
        &self,
        frame: &Frame,
        reference: DateTime<Utc>,
        forward: Period,
    ) -> std::result::Result<BacktestResult, NotEnoughHistory> {
        let index = frame.nearest_index(reference);
        self.backtest_at(frame, index, reference, forward)
    }

    /// Backtest at a bar index
    pub fn backtest_index(
        &self,
        frame: &Frame,
        index: usize,
        forward: Period,
    ) -> std::result::Result<BacktestResult, NotEnoughHistory> {
        let index = index.min(frame.len() - 1);
        let reference = frame.bars()[index].timestamp;
        self.backtest_at(frame, index, reference, forward)
    }

    fn backtest_at(
        &self,
        frame: &Frame,
        index: usize,
        reference: DateTime<Utc>,
        forward: Period,
    ) -> std::result::Result<BacktestResult, NotEnoughHistory> {
        let bars = frame.bars();
        let total = bars.len();
        let settings = &self.config().backtest;
        let need_before = settings.required_history(total);
        let horizon = forward.get();

        if index < need_before || index + horizon >= total {
            tracing::debug!(index, total, need_before, horizon, "backtest reference out of range");
            return Err(NotEnoughHistory {
                reference,
                index,
                total,
                need_before,
                need_after: horizon,
            });
        }

        let signal = self.evaluate_bars(&bars[..=index], None, self.config().lookback);

        let entry_price = bars[index].close;
        let future = &bars[index + 1..=index + horizon];
        let end_price = future[future.len() - 1].close;
        let price_change_pct = pct_change(entry_price, end_price) * 100.0;
        let (max_gain_pct, max_loss_pct) = future
            .iter()
            .map(|b| pct_change(entry_price, b.close) * 100.0)
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), c| (hi.max(c), lo.min(c)));
        let correct = is_correct(signal.signal, price_change_pct, settings.correct_threshold_pct);

        tracing::trace!(
            index,
            signal = %signal.signal,
            confidence = signal.confidence,
            price_change_pct,
            correct,
            "backtest evaluated"
        );

        Ok(BacktestResult {
            reference_timestamp: reference,
            bar_timestamp: bars[index].timestamp,
            bar_index: index,
            forward: horizon,
            entry_price,
            end_price,
            price_change_pct,
            max_gain_pct,
            max_loss_pct,
            correct,
            signal,
        })
    }

    /// Backtest many reference points in parallel. Results keep input order.
    pub fn sweep(
        &self,
        frame: &Frame,
        references: &[DateTime<Utc>],
        forward: Period,
    ) -> (Vec<BacktestResult>, Vec<NotEnoughHistory>) {
        let results: Vec<_> = references
            .par_iter()
            .map(|&reference| self.backtest(frame, reference, forward))
            .collect();

        let mut successes = Vec::new();
        let mut errors = Vec::new();

        for result in results {
            match result {
                Ok(r) => successes.push(r),
                Err(e) => errors.push(e),
            }
        }

        tracing::info!(ok = successes.len(), failed = errors.len(), "backtest sweep finished");
        (successes, errors)
    }

    /// Backtest every `step`-th bar that has enough history on both sides
    pub fn sweep_every(&self, frame: &Frame, step: Period, forward: Period) -> Vec<BacktestResult> {
        let total = frame.len();
        let start = self.config().backtest.required_history(total);
        let end = total.saturating_sub(forward.get());
        let indices: Vec<usize> = (start..end).step_by(step.get()).collect();

        indices
            .into_par_iter()
            .filter_map(|i| self.backtest_index(frame, i, forward).ok())
            .collect()
    }

    /// Every bar whose signal is directional with confidence at or above the configured
    /// minimum, labeled against the configured forward horizon.
    pub fn scan_high_confidence(&self, frame: &Frame) -> Vec<HighConfidenceSignal> {
        let settings = &self.config().backtest;
        let bars = frame.bars();
        let horizon = settings.high_confidence_forward.get();
        let start = settings.required_history(bars.len());
        let end = bars.len().saturating_sub(horizon);

        (start..end)
            .into_par_iter()
            .filter_map(|i| {
                let result = self.evaluate_bars(&bars[..=i], None, self.config().lookback);
                if !result.is_directional() || result.confidence < settings.high_confidence_min {
                    return None;
                }
                let entry_price = bars[i].close;
                let exit_price = bars[i + horizon].close;
                let price_change_pct = pct_change(entry_price, exit_price) * 100.0;
                Some(HighConfidenceSignal {
                    index: i,
                    timestamp: bars[i].timestamp,
                    signal: result.signal,
                    confidence: result.confidence,
                    entry_price,
                    exit_price,
                    price_change_pct,
                    correct: is_correct(result.signal, price_change_pct, settings.correct_threshold_pct),
                    reasoning: result.reasoning,
                })
            })
            .collect()
    }
}
