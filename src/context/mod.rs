//! Context analyzers
//!
//! Pure functions of a bar slice or a timestamp that describe where the current bar sits:
//! trading session, premium/discount position, Power of Three phase, session liquidity
//! and higher-timeframe bias. All time-of-day logic goes through [`ReferenceClock`].

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::{IctError, Result};

pub mod bias;
pub mod premium_discount;
pub mod sessions;

pub use bias::*;
pub use premium_discount::*;
pub use sessions::*;

/// Localizes UTC instants into the reference timezone (US/Eastern by default, DST-aware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceClock {
    tz: Tz,
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self {
            tz: chrono_tz::US::Eastern,
        }
    }
}

impl ReferenceClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA name such as `"US/Eastern"` or `"Europe/London"`.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| IctError::InvalidConfig(format!("unknown timezone: {name}")))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Hour of day (0..24) in the reference timezone
    #[inline]
    pub fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.tz).hour()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_eastern_follows_dst() {
        let clock = ReferenceClock::default();
        // EST (UTC-5) in January, EDT (UTC-4) in July
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 13, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 13, 0, 0).unwrap();
        assert_eq!(clock.local_hour(winter), 8);
        assert_eq!(clock.local_hour(summer), 9);
    }

    #[test]
    fn test_from_name() {
        assert!(ReferenceClock::from_name("US/Eastern").is_ok());
        assert!(ReferenceClock::from_name("Europe/London").is_ok());
        assert!(ReferenceClock::from_name("Not/AZone").is_err());
    }
}
