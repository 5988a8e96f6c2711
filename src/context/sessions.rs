//! Time-of-day analyzers: Kill Zones, Power of Three phases, session liquidity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReferenceClock;
use crate::{IctError, Result, OHLCV};

// ============================================================
// KILL ZONES
// ============================================================

/// Named high-probability trading windows
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillZone {
    LondonKillzone,
    NewYorkAm,
    NewYorkPm,
    AsianSession,
    Outside,
}

impl KillZone {
    pub fn name(&self) -> &'static str {
        match self {
            KillZone::LondonKillzone => "LONDON_KILLZONE",
            KillZone::NewYorkAm => "NEW_YORK_AM",
            KillZone::NewYorkPm => "NEW_YORK_PM",
            KillZone::AsianSession => "ASIAN_SESSION",
            KillZone::Outside => "OUTSIDE",
        }
    }
}

impl std::fmt::Display for KillZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name().replace('_', " "))
    }
}

/// Half-open local hour window `[start_hour, end_hour)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KillZoneWindow {
    pub zone: KillZone,
    pub start_hour: u32,
    pub end_hour: u32,
    pub weight: f64,
}

impl KillZoneWindow {
    #[inline]
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillZoneTable {
    pub windows: Vec<KillZoneWindow>,
    pub outside_weight: f64,
}

impl Default for KillZoneTable {
    fn default() -> Self {
        Self {
            windows: vec![
                KillZoneWindow {
                    zone: KillZone::LondonKillzone,
                    start_hour: 2,
                    end_hour: 5,
                    weight: 0.9,
                },
                KillZoneWindow {
                    zone: KillZone::NewYorkAm,
                    start_hour: 7,
                    end_hour: 10,
                    weight: 1.0,
                },
                KillZoneWindow {
                    zone: KillZone::NewYorkPm,
                    start_hour: 13,
                    end_hour: 16,
                    weight: 0.85,
                },
                KillZoneWindow {
                    zone: KillZone::AsianSession,
                    start_hour: 20,
                    end_hour: 24,
                    weight: 0.7,
                },
            ],
            outside_weight: 0.6,
        }
    }
}

impl KillZoneTable {
    pub fn lookup(&self, hour: u32) -> KillZoneReading {
        self.windows
            .iter()
            .find(|w| w.contains(hour))
            .map(|w| KillZoneReading {
                zone: w.zone,
                weight: w.weight,
            })
            .unwrap_or(KillZoneReading {
                zone: KillZone::Outside,
                weight: self.outside_weight,
            })
    }

    pub fn validate(&self) -> Result<()> {
        let weight_ok = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);
        if !weight_ok(self.outside_weight) {
            return Err(IctError::InvalidConfig("outside kill-zone weight must be in [0, 1]".into()));
        }
        for (i, w) in self.windows.iter().enumerate() {
            if w.zone == KillZone::Outside {
                return Err(IctError::InvalidConfig("OUTSIDE cannot be a kill-zone window".into()));
            }
            if w.start_hour >= w.end_hour || w.end_hour > 24 {
                return Err(IctError::InvalidConfig(format!(
                    "kill zone {} has invalid hours {}..{}",
                    w.zone.name(),
                    w.start_hour,
                    w.end_hour
                )));
            }
            if !weight_ok(w.weight) || w.weight < self.outside_weight {
                return Err(IctError::InvalidConfig(format!(
                    "kill zone {} weight must be in [{}, 1]",
                    w.zone.name(),
                    self.outside_weight
                )));
            }
            for other in &self.windows[i + 1..] {
                if w.start_hour < other.end_hour && other.start_hour < w.end_hour {
                    return Err(IctError::InvalidConfig(format!(
                        "kill zones {} and {} overlap",
                        w.zone.name(),
                        other.zone.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KillZoneReading {
    pub zone: KillZone,
    pub weight: f64,
}

impl KillZoneReading {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.zone != KillZone::Outside
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillZoneClassifier {
    clock: ReferenceClock,
    table: KillZoneTable,
}

impl Default for KillZoneClassifier {
    fn default() -> Self {
        Self::new(ReferenceClock::default(), KillZoneTable::default())
    }
}

impl KillZoneClassifier {
    pub fn new(clock: ReferenceClock, table: KillZoneTable) -> Self {
        Self { clock, table }
    }

    pub fn classify(&self, at: DateTime<Utc>) -> KillZoneReading {
        self.table.lookup(self.clock.local_hour(at))
    }
}

// ============================================================
// POWER OF THREE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerOfThreePhase {
    Accumulation,
    Manipulation,
    Distribution,
    AfterHours,
}

impl PowerOfThreePhase {
    /// Contiguous local-hour phases: [0,8) [8,11) [11,16) [16,24)
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=7 => PowerOfThreePhase::Accumulation,
            8..=10 => PowerOfThreePhase::Manipulation,
            11..=15 => PowerOfThreePhase::Distribution,
            _ => PowerOfThreePhase::AfterHours,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PowerOfThreePhase::Accumulation => "ACCUMULATION",
            PowerOfThreePhase::Manipulation => "MANIPULATION",
            PowerOfThreePhase::Distribution => "DISTRIBUTION",
            PowerOfThreePhase::AfterHours => "AFTER_HOURS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PowerOfThreePhase::Accumulation => "Consolidation & Setup Formation",
            PowerOfThreePhase::Manipulation => "Liquidity Sweeps & False Moves",
            PowerOfThreePhase::Distribution => "True Institutional Direction",
            PowerOfThreePhase::AfterHours => "Low Activity Period",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            PowerOfThreePhase::Accumulation => "WAIT - Mark key levels",
            PowerOfThreePhase::Manipulation => "CAUTIOUS - Watch for reversals",
            PowerOfThreePhase::Distribution => "ACTIVE - Best time to trade",
            PowerOfThreePhase::AfterHours => "AVOID - Low liquidity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseReading {
    pub phase: PowerOfThreePhase,
    pub local_hour: u32,
    pub description: &'static str,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerOfThreeClassifier {
    clock: ReferenceClock,
}

impl PowerOfThreeClassifier {
    pub fn new(clock: ReferenceClock) -> Self {
        Self { clock }
    }

    pub fn classify(&self, at: DateTime<Utc>) -> PhaseReading {
        let hour = self.clock.local_hour(at);
        let phase = PowerOfThreePhase::from_hour(hour);
        PhaseReading {
            phase,
            local_hour: hour,
            description: phase.description(),
            recommendation: phase.recommendation(),
        }
    }
}

// ============================================================
// SESSION LIQUIDITY
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    Asian,
    London,
    NewYork,
}

/// Half-open local hour window `[start_hour, end_hour)`. Windows may overlap; the first
/// matching window in table order wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub session: Session,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    #[inline]
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// Asian 19-24, London 2-10, New York 7-16, in that priority order.
pub fn default_session_windows() -> Vec<SessionWindow> {
    vec![
        SessionWindow {
            session: Session::Asian,
            start_hour: 19,
            end_hour: 24,
        },
        SessionWindow {
            session: Session::London,
            start_hour: 2,
            end_hour: 10,
        },
        SessionWindow {
            session: Session::NewYork,
            start_hour: 7,
            end_hour: 16,
        },
    ]
}

pub fn validate_session_windows(windows: &[SessionWindow]) -> Result<()> {
    for w in windows {
        if w.start_hour >= w.end_hour || w.end_hour > 24 {
            return Err(IctError::InvalidConfig(format!(
                "session {:?} has invalid hours {}..{}",
                w.session, w.start_hour, w.end_hour
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionRange {
    pub high: f64,
    pub low: f64,
}

/// Running high/low per session; `None` for sessions with no bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionLevels {
    pub asian: Option<SessionRange>,
    pub london: Option<SessionRange>,
    pub new_york: Option<SessionRange>,
}

impl SessionLevels {
    pub fn get(&self, session: Session) -> Option<SessionRange> {
        match session {
            Session::Asian => self.asian,
            Session::London => self.london,
            Session::NewYork => self.new_york,
        }
    }

    fn slot(&mut self, session: Session) -> &mut Option<SessionRange> {
        match session {
            Session::Asian => &mut self.asian,
            Session::London => &mut self.london,
            Session::NewYork => &mut self.new_york,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionLiquidityTracker {
    clock: ReferenceClock,
    windows: Vec<SessionWindow>,
}

impl Default for SessionLiquidityTracker {
    fn default() -> Self {
        Self::new(ReferenceClock::default(), default_session_windows())
    }
}

impl SessionLiquidityTracker {
    pub fn new(clock: ReferenceClock, windows: Vec<SessionWindow>) -> Self {
        Self { clock, windows }
    }

    /// First window (in priority order) containing the bar's local hour
    pub fn session_at(&self, at: DateTime<Utc>) -> Option<Session> {
        let hour = self.clock.local_hour(at);
        self.windows.iter().find(|w| w.contains(hour)).map(|w| w.session)
    }

    pub fn track<T: OHLCV>(&self, bars: &[T]) -> SessionLevels {
        let mut levels = SessionLevels::default();
        for bar in bars {
            let Some(session) = self.session_at(bar.timestamp()) else {
                continue;
            };
            let slot = levels.slot(session);
            *slot = Some(match *slot {
                Some(r) => SessionRange {
                    high: r.high.max(bar.high()),
                    low: r.low.min(bar.low()),
                },
                None => SessionRange {
                    high: bar.high(),
                    low: bar.low(),
                },
            });
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;
    use chrono::TimeZone;

    // January: US/Eastern = UTC-5
    fn winter_utc(hour_et: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
            + chrono::Duration::hours(i64::from(hour_et) + 5)
    }

    #[test]
    fn test_kill_zone_boundaries() {
        let kz = KillZoneClassifier::default();
        assert_eq!(kz.classify(winter_utc(1)).zone, KillZone::Outside);
        assert_eq!(kz.classify(winter_utc(2)).zone, KillZone::LondonKillzone);
        assert_eq!(kz.classify(winter_utc(5)).zone, KillZone::Outside);
        assert_eq!(kz.classify(winter_utc(7)).zone, KillZone::NewYorkAm);
        assert_eq!(kz.classify(winter_utc(9)).weight, 1.0);
        assert_eq!(kz.classify(winter_utc(10)).zone, KillZone::Outside);
        assert_eq!(kz.classify(winter_utc(15)).zone, KillZone::NewYorkPm);
        assert_eq!(kz.classify(winter_utc(23)).zone, KillZone::AsianSession);
        assert_eq!(kz.classify(winter_utc(12)).weight, 0.6);
    }

    #[test]
    fn test_kill_zone_summer_offset() {
        // 12:00 UTC in July is 08:00 EDT
        let kz = KillZoneClassifier::default();
        let at = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        assert_eq!(kz.classify(at).zone, KillZone::NewYorkAm);
    }

    #[test]
    fn test_kill_zone_display() {
        assert_eq!(KillZone::NewYorkAm.to_string(), "NEW YORK AM");
    }

    #[test]
    fn test_table_rejects_overlap() {
        let mut table = KillZoneTable::default();
        assert!(table.validate().is_ok());
        table.windows[1].start_hour = 4;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_table_rejects_zone_weight_below_outside() {
        let mut table = KillZoneTable::default();
        table.windows[3].weight = 0.5;
        assert!(table.validate().is_err());
        table.windows[3].weight = 0.6;
        assert!(table.validate().is_ok());
        table.windows[0].weight = 1.1;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_power_of_three_phases() {
        let p3 = PowerOfThreeClassifier::default();
        assert_eq!(p3.classify(winter_utc(0)).phase, PowerOfThreePhase::Accumulation);
        assert_eq!(p3.classify(winter_utc(7)).phase, PowerOfThreePhase::Accumulation);
        assert_eq!(p3.classify(winter_utc(8)).phase, PowerOfThreePhase::Manipulation);
        assert_eq!(p3.classify(winter_utc(11)).phase, PowerOfThreePhase::Distribution);
        let late = p3.classify(winter_utc(16));
        assert_eq!(late.phase, PowerOfThreePhase::AfterHours);
        assert_eq!(late.recommendation, "AVOID - Low liquidity");
    }

    #[test]
    fn test_session_priority_london_over_new_york() {
        let tracker = SessionLiquidityTracker::default();
        // 08:00 ET is inside both London [2,10) and New York [7,16)
        assert_eq!(tracker.session_at(winter_utc(8)), Some(Session::London));
        assert_eq!(tracker.session_at(winter_utc(10)), Some(Session::NewYork));
        assert_eq!(tracker.session_at(winter_utc(19)), Some(Session::Asian));
        assert_eq!(tracker.session_at(winter_utc(17)), None);
    }

    #[test]
    fn test_session_levels() {
        let tracker = SessionLiquidityTracker::default();
        let bars = vec![
            Bar::new(winter_utc(3), 100.0, 102.0, 99.0, 101.0, 1.0).unwrap(),
            Bar::new(winter_utc(4), 101.0, 103.0, 100.0, 102.0, 1.0).unwrap(),
            Bar::new(winter_utc(12), 102.0, 105.0, 101.0, 104.0, 1.0).unwrap(),
        ];
        let levels = tracker.track(&bars);
        assert_eq!(levels.london, Some(SessionRange { high: 103.0, low: 99.0 }));
        assert_eq!(levels.new_york, Some(SessionRange { high: 105.0, low: 101.0 }));
        assert_eq!(levels.asian, None);
    }
}
