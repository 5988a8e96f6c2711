//! Common helper functions shared across the detector and analyzer modules

use serde::Serialize;

use crate::{OHLCVExt, OHLCV};

// ============================================================
// ARITHMETIC
// ============================================================

/// Fractional change from `from` to `to`. A zero base yields 0.0 instead of inf/NaN.
#[inline]
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    (to - from) / from
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator), `None` when fewer than 2 values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

// ============================================================
// WINDOW STATISTICS
// ============================================================

/// Highest high in the slice (`-inf` when empty)
pub fn highest_high<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest low in the slice (`+inf` when empty)
pub fn lowest_low<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min)
}

/// Mean high-low range of the slice, 0.0 when empty
pub fn avg_range<T: OHLCV>(bars: &[T]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.range()).sum::<f64>() / bars.len() as f64
}

// ============================================================
// SWING POINTS
// ============================================================

/// A confirmed local extremum
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
}

/// Swing highs and lows in index order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwingPoints {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

/// Find swing points with a symmetric window of `length` bars on each side.
///
/// Only indices in `[length, n - length)` can be confirmed. A bar equal to the window
/// extremum counts, so flat tops produce several swings.
pub fn find_swings<T: OHLCV>(bars: &[T], length: usize) -> SwingPoints {
    let mut out = SwingPoints::default();
    if length == 0 || bars.len() <= 2 * length {
        return out;
    }

    for i in length..bars.len() - length {
        let window = &bars[i - length..=i + length];
        let high = bars[i].high();
        let low = bars[i].low();
        if high == highest_high(window) {
            out.highs.push(SwingPoint { index: i, price: high });
        }
        if low == lowest_low(window) {
            out.lows.push(SwingPoint { index: i, price: low });
        }
    }
    out
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_highs(highs: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        highs
            .iter()
            .enumerate()
            .map(|(i, &h)| Bar {
                timestamp: start + Duration::hours(i as i64),
                open: h - 1.0,
                high: h,
                low: h - 2.0,
                close: h - 0.5,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_pct_change_zero_base() {
        assert_eq!(pct_change(0.0, 10.0), 0.0);
        assert!((pct_change(100.0, 102.0) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_sample_std() {
        assert!(sample_std(&[1.0]).is_none());
        let s = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s - 2.138089935).abs() < 1e-6);
    }

    #[test]
    fn test_find_swings_symmetric_window() {
        let bars = bars_from_highs(&[10.0, 11.0, 15.0, 11.0, 10.0, 9.0, 10.0]);
        let swings = find_swings(&bars, 2);
        assert_eq!(swings.highs, vec![SwingPoint { index: 2, price: 15.0 }]);
        // lowest low (index 5) sits outside the confirmable range
        assert!(swings.lows.is_empty());
    }

    #[test]
    fn test_find_swings_short_input() {
        let bars = bars_from_highs(&[1.0, 2.0, 3.0]);
        assert_eq!(find_swings(&bars, 2), SwingPoints::default());
    }
}
