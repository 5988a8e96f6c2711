//! Premium / discount position of the current price inside the trailing range

use serde::{Deserialize, Serialize};

use crate::detectors::helpers::{highest_high, lowest_low};
use crate::{Period, OHLCV};

/// Coarse split at the range midpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Premium,
    Discount,
}

impl Zone {
    pub fn label(&self) -> &'static str {
        match self {
            Zone::Premium => "Premium",
            Zone::Discount => "Discount",
        }
    }
}

/// Fine split at 0.3 / 0.5 / 0.7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailedZone {
    ExtremeDiscount,
    Discount,
    Premium,
    ExtremePremium,
}

impl DetailedZone {
    pub fn from_position(position: f64) -> Self {
        if position > 0.7 {
            DetailedZone::ExtremePremium
        } else if position > 0.5 {
            DetailedZone::Premium
        } else if position < 0.3 {
            DetailedZone::ExtremeDiscount
        } else {
            DetailedZone::Discount
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DetailedZone::ExtremeDiscount => "Extreme Discount",
            DetailedZone::Discount => "Discount",
            DetailedZone::Premium => "Premium",
            DetailedZone::ExtremePremium => "Extreme Premium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumDiscount {
    pub zone: Zone,
    pub detailed_zone: DetailedZone,
    pub range_high: f64,
    pub range_low: f64,
    pub midpoint: f64,
    /// 0.0 at the range low, 1.0 at the range high
    pub price_position: f64,
    pub current_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PremiumDiscountCalculator {
    pub lookback: Period,
}

impl Default for PremiumDiscountCalculator {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(24),
        }
    }
}

impl PremiumDiscountCalculator {
    pub fn new(lookback: Period) -> Self {
        Self { lookback }
    }

    /// Position of the last close within the trailing `lookback` bars.
    ///
    /// A degenerate range (high == low, or no bars) reports position 0.5.
    pub fn calculate<T: OHLCV>(&self, bars: &[T]) -> PremiumDiscount {
        let start = bars.len().saturating_sub(self.lookback.get());
        let window = &bars[start..];
        let current_price = bars.last().map_or(0.0, |b| b.close());

        let (range_high, range_low) = if window.is_empty() {
            (current_price, current_price)
        } else {
            (highest_high(window), lowest_low(window))
        };

        let span = range_high - range_low;
        let price_position = if span > 0.0 {
            (current_price - range_low) / span
        } else {
            0.5
        };

        PremiumDiscount {
            zone: if price_position > 0.5 {
                Zone::Premium
            } else {
                Zone::Discount
            },
            detailed_zone: DetailedZone::from_position(price_position),
            range_high,
            range_low,
            midpoint: (range_high + range_low) / 2.0,
            price_position,
            current_price,
        }
    }
}
