//! Output types of the confluence engine

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rules::{RuleHit, TradeLevels};
use crate::context::{HtfBias, KillZoneReading, PhaseReading, PremiumDiscount, SessionLevels};
use crate::detectors::Detections;
use crate::{Direction, PatternOccurrence, PriceBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Long,
    Short,
    Neutral,
}

impl Signal {
    pub fn direction(self) -> Direction {
        match self {
            Signal::Long => Direction::Bullish,
            Signal::Short => Direction::Bearish,
            Signal::Neutral => Direction::Neutral,
        }
    }

    #[inline]
    pub fn is_directional(self) -> bool {
        !matches!(self, Signal::Neutral)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Neutral => "NEUTRAL",
        })
    }
}

/// Key of the active-zone listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    BullishOrderBlock,
    BearishOrderBlock,
    BullishFvg,
    BearishFvg,
}

impl ZoneKind {
    pub fn order_block(direction: Direction) -> Self {
        if direction.is_bearish() {
            ZoneKind::BearishOrderBlock
        } else {
            ZoneKind::BullishOrderBlock
        }
    }

    pub fn fvg(direction: Direction) -> Self {
        if direction.is_bearish() {
            ZoneKind::BearishFvg
        } else {
            ZoneKind::BullishFvg
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntryLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
}

impl EntryLevels {
    /// Anchor at the active order block when there is one, else at the current price with
    /// the swing extremes as stop and second target.
    pub fn derive(
        signal: Signal,
        order_block: Option<PriceBand>,
        price: f64,
        swing_high: f64,
        swing_low: f64,
        levels: &TradeLevels,
    ) -> Option<Self> {
        let (stop, t1, t2) = (levels.stop.get(), levels.target1.get(), levels.target2.get());
        match (signal, order_block) {
            (Signal::Long, Some(band)) => Some(Self {
                entry: band.low,
                stop_loss: band.low * (1.0 - stop),
                take_profit_1: band.low * (1.0 + t1),
                take_profit_2: band.low * (1.0 + t2),
            }),
            (Signal::Short, Some(band)) => Some(Self {
                entry: band.high,
                stop_loss: band.high * (1.0 + stop),
                take_profit_1: band.high * (1.0 - t1),
                take_profit_2: band.high * (1.0 - t2),
            }),
            (Signal::Long, None) => Some(Self {
                entry: price,
                stop_loss: swing_low,
                take_profit_1: price * (1.0 + t1),
                take_profit_2: swing_high,
            }),
            (Signal::Short, None) => Some(Self {
                entry: price,
                stop_loss: swing_high,
                take_profit_1: price * (1.0 - t1),
                take_profit_2: swing_low,
            }),
            (Signal::Neutral, _) => None,
        }
    }
}

/// Optimal Trade Entry retracement levels of the lookback swing range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OteLevels {
    pub swing_high: f64,
    pub swing_low: f64,
    pub level_50: f64,
    pub level_62: f64,
    pub level_705: f64,
    pub level_79: f64,
}

impl OteLevels {
    pub fn from_range(swing_high: f64, swing_low: f64) -> Self {
        let diff = swing_high - swing_low;
        Self {
            swing_high,
            swing_low,
            level_50: swing_low + diff * 0.5,
            level_62: swing_low + diff * 0.62,
            level_705: swing_low + diff * 0.705,
            level_79: swing_low + diff * 0.79,
        }
    }

    pub fn levels(&self) -> [f64; 4] {
        [self.level_62, self.level_705, self.level_79, self.level_50]
    }

    /// True when `price` is within `tolerance` (relative to price) of any level
    pub fn any_within(&self, price: f64, tolerance: f64) -> bool {
        if price == 0.0 {
            return false;
        }
        self.levels()
            .iter()
            .any(|level| ((price - level) / price).abs() < tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshots {
    pub kill_zone: KillZoneReading,
    pub premium_discount: PremiumDiscount,
    pub power_of_three: PhaseReading,
    pub sessions: SessionLevels,
    pub htf_bias: Option<HtfBias>,
}

/// Full output of one confluence evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalResult {
    pub signal: Signal,
    /// 0..=100
    pub confidence: u8,
    pub bullish_score: f64,
    pub bearish_score: f64,
    /// Ordered, tag-stable explanation lines
    pub reasoning: Vec<String>,
    pub breakdown: Vec<RuleHit>,
    pub active_zones: BTreeMap<ZoneKind, Vec<PatternOccurrence>>,
    pub entry_levels: Option<EntryLevels>,
    pub ote_levels: Option<OteLevels>,
    pub context: Option<ContextSnapshots>,
    pub detections: Detections,
    pub current_price: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SignalResult {
    /// NEUTRAL result for inputs shorter than the minimum bar count
    pub fn insufficient(
        bars: usize,
        need: usize,
        current_price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            signal: Signal::Neutral,
            confidence: 0,
            bullish_score: 0.0,
            bearish_score: 0.0,
            reasoning: vec![format!("Insufficient data: need {need} bars, got {bars}")],
            breakdown: Vec::new(),
            active_zones: BTreeMap::new(),
            entry_levels: None,
            ote_levels: None,
            context: None,
            detections: Detections::default(),
            current_price,
            timestamp,
        }
    }

    #[inline]
    pub fn is_directional(&self) -> bool {
        self.signal.is_directional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ote_levels() {
        let ote = OteLevels::from_range(200.0, 100.0);
        assert_eq!(ote.level_50, 150.0);
        assert!((ote.level_62 - 162.0).abs() < 1e-9);
        assert!((ote.level_705 - 170.5).abs() < 1e-9);
        assert!((ote.level_79 - 179.0).abs() < 1e-9);
        assert!(ote.any_within(163.0, 0.015));
        assert!(!ote.any_within(120.0, 0.015));
    }

    #[test]
    fn test_entry_levels_from_order_block() {
        let levels = TradeLevels::default();
        let e = EntryLevels::derive(
            Signal::Long,
            Some(PriceBand::new(100.0, 102.0)),
            103.0,
            110.0,
            95.0,
            &levels,
        )
        .unwrap();
        assert_eq!(e.entry, 100.0);
        assert!((e.stop_loss - 98.0).abs() < 1e-9);
        assert!((e.take_profit_1 - 103.0).abs() < 1e-9);
        assert!((e.take_profit_2 - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_entry_levels_without_order_block() {
        let levels = TradeLevels::default();
        let e = EntryLevels::derive(Signal::Short, None, 100.0, 110.0, 95.0, &levels).unwrap();
        assert_eq!(e.entry, 100.0);
        assert_eq!(e.stop_loss, 110.0);
        assert!((e.take_profit_1 - 97.0).abs() < 1e-9);
        assert_eq!(e.take_profit_2, 95.0);
        assert!(EntryLevels::derive(Signal::Neutral, None, 100.0, 110.0, 95.0, &levels).is_none());
    }

    #[test]
    fn test_zone_kind_serializes_as_map_key() {
        let mut zones: BTreeMap<ZoneKind, Vec<PatternOccurrence>> = BTreeMap::new();
        zones.insert(ZoneKind::BearishFvg, vec![]);
        let json = serde_json::to_string(&zones).unwrap();
        assert_eq!(json, r#"{"bearish_fvg":[]}"#);
    }
}
