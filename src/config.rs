//! Engine configuration
//!
//! Every tunable of the engine lives in [`EngineConfig`]. All fields have defaults, so a
//! JSON document only needs the values it overrides:
//!
//! ```rust
//! use ict_confluence::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "lookback": 48, "timezone": "US/Eastern" }"#).unwrap();
//! assert_eq!(config.lookback.get(), 48);
//! assert_eq!(config.min_bars, 50);
//! ```

use serde::{Deserialize, Serialize};

use crate::backtest::BacktestSettings;
use crate::confluence::{Adjustments, ConfidenceTiers, RuleTable, TradeLevels};
use crate::context::{
    default_session_windows, validate_session_windows, HtfBiasEstimator, KillZoneTable,
    ReferenceClock, SessionWindow,
};
use crate::detectors::{
    BalancedRangeDetector, BuiltinDetector, ChochDetector, DisplacementDetector,
    FairValueGapDetector, LiquiditySweepDetector, MarketStructureDetector, OrderBlockDetector,
    VolumeImbalanceDetector,
};
use crate::{IctError, Period, Result};

/// Parameters of the eight builtin detectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub order_block: OrderBlockDetector,
    pub fair_value_gap: FairValueGapDetector,
    pub liquidity_sweep: LiquiditySweepDetector,
    pub market_structure: MarketStructureDetector,
    pub choch: ChochDetector,
    pub displacement: DisplacementDetector,
    pub balanced_range: BalancedRangeDetector,
    pub volume_imbalance: VolumeImbalanceDetector,
}

impl DetectorParams {
    pub fn into_detectors(self) -> Vec<BuiltinDetector> {
        vec![
            self.order_block.into(),
            self.fair_value_gap.into(),
            self.liquidity_sweep.into(),
            self.market_structure.into(),
            self.choch.into(),
            self.displacement.into(),
            self.balanced_range.into(),
            self.volume_imbalance.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Premium/discount, swing range and zone recency window
    pub lookback: Period,
    /// Frames shorter than this evaluate to NEUTRAL without running detectors
    pub min_bars: usize,
    /// IANA timezone for all time-of-day analyzers
    pub timezone: String,
    pub kill_zones: KillZoneTable,
    pub sessions: Vec<SessionWindow>,
    pub detectors: DetectorParams,
    pub htf: HtfBiasEstimator,
    pub rules: RuleTable,
    pub adjustments: Adjustments,
    pub confidence: ConfidenceTiers,
    pub levels: TradeLevels,
    pub backtest: BacktestSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(60),
            min_bars: 50,
            timezone: "US/Eastern".into(),
            kill_zones: KillZoneTable::default(),
            sessions: default_session_windows(),
            detectors: DetectorParams::default(),
            htf: HtfBiasEstimator::default(),
            rules: RuleTable::default(),
            adjustments: Adjustments::default(),
            confidence: ConfidenceTiers::default(),
            levels: TradeLevels::default(),
            backtest: BacktestSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IctError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| IctError::InvalidConfig(e.to_string()))
    }

    pub fn clock(&self) -> Result<ReferenceClock> {
        ReferenceClock::from_name(&self.timezone)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_bars == 0 {
            return Err(IctError::InvalidConfig("min_bars must be > 0".into()));
        }
        self.clock()?;
        self.kill_zones.validate()?;
        validate_session_windows(&self.sessions)?;
        self.htf.validate()?;
        self.rules.validate()?;
        self.adjustments.validate()?;
        self.confidence.validate()?;
        self.backtest.validate()?;
        for detector in self.detectors.clone().into_detectors() {
            detector.validate_config()?;
        }
        Ok(())
    }
}
