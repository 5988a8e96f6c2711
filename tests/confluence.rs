//! Integration tests for confluence evaluation.
//!
//! The main scenario is a flat range of 59 bars followed by one bullish displacement bar.
//! Its only rule hits are a bullish displacement (+7) and a bullish BOS of the range high (+4),
//! and the close lands at the top of the range (Premium zone).

use chrono::{DateTime, Duration, TimeZone, Utc};
use ict_confluence::prelude::*;

fn hourly(end: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|i| end - Duration::hours((n - 1 - i) as i64))
        .collect()
}

/// Flat bars at 97 then a 3% bullish displacement closing at 100, ending at `end`.
fn make_breakout(end: DateTime<Utc>) -> Frame {
    let stamps = hourly(end, 60);
    let mut bars: Vec<Bar> = stamps[..59]
        .iter()
        .map(|&t| Bar::new(t, 97.0, 97.5, 96.5, 97.0, 1000.0).unwrap())
        .collect();
    bars.push(Bar::new(stamps[59], 97.0, 100.2, 96.9, 100.0, 1000.0).unwrap());
    Frame::new(bars).unwrap()
}

fn make_trend(n: usize, step: f64) -> Frame {
    let start = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
    let bars = (0..n)
        .map(|i| {
            let c = 100.0 + step * i as f64;
            Bar::new(start + Duration::hours(4 * i as i64), c, c + 0.5, c - 0.5, c, 1.0).unwrap()
        })
        .collect();
    Frame::new(bars).unwrap()
}

/// 08:00 New York time (winter)
fn ny_am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 13, 0, 0).unwrap()
}

/// 12:00 New York time, between the AM and PM kill zones
fn ny_lunch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 17, 0, 0).unwrap()
}

// ============================================================
// INSUFFICIENT DATA
// ============================================================

#[test]
fn test_short_frame_is_neutral() {
    let frame = make_breakout(ny_am());
    let short = Frame::new(frame.bars()[11..].to_vec()).unwrap();
    assert_eq!(short.len(), 49);

    let result = ConfluenceEngine::default().evaluate(&short, None);
    assert_eq!(result.signal, Signal::Neutral);
    assert_eq!(result.confidence, 0);
    assert_eq!(result.reasoning, vec!["Insufficient data: need 50 bars, got 49".to_string()]);
    assert!(result.context.is_none());
    assert!(result.entry_levels.is_none());
    assert_eq!(result.current_price, 100.0);
}

#[test]
fn test_min_bars_is_configurable() {
    let frame = make_breakout(ny_am());
    let short = Frame::new(frame.bars()[20..].to_vec()).unwrap();
    let engine = EngineBuilder::new().with_all_defaults().min_bars(30).build().unwrap();
    let result = engine.evaluate(&short, None);
    assert!(result.context.is_some());
}

// ============================================================
// RULES AND ADJUSTMENTS
// ============================================================

#[test]
fn test_breakout_in_kill_zone_is_long() {
    let frame = make_breakout(ny_am());
    let result = ConfluenceEngine::default().evaluate(&frame, None);

    assert_eq!(result.signal, Signal::Long);
    assert_eq!(result.confidence, 38);
    assert!((result.bullish_score - 7.7).abs() < 1e-9);
    assert_eq!(result.bearish_score, 0.0);

    let rules: Vec<RuleId> = result.breakdown.iter().map(|h| h.rule).collect();
    assert_eq!(rules, vec![RuleId::MarketStructure, RuleId::Displacement]);
    assert!(result.breakdown.iter().all(|h| h.direction == Direction::Bullish));

    assert_eq!(result.reasoning[0], "Total Confluence: 7.7 points -> 38% confidence");
    assert!(result
        .reasoning
        .iter()
        .any(|r| r == "Inside NEW YORK AM Kill Zone (weight 100%)"));
    assert!(result
        .reasoning
        .iter()
        .any(|r| r == "Bullish market structure (BOS)"));
    assert!(result
        .reasoning
        .iter()
        .any(|r| r.starts_with("LONG in Premium zone - reduced score by 3.3")));
    assert!(result.active_zones.is_empty());
}

#[test]
fn test_long_without_order_block_uses_swing_levels() {
    let result = ConfluenceEngine::default().evaluate(&make_breakout(ny_am()), None);
    let levels = result.entry_levels.unwrap();
    assert_eq!(levels.entry, 100.0);
    assert_eq!(levels.stop_loss, 96.5);
    assert!((levels.take_profit_1 - 103.0).abs() < 1e-9);
    assert_eq!(levels.take_profit_2, 100.2);
}

#[test]
fn test_context_snapshots() {
    let result = ConfluenceEngine::default().evaluate(&make_breakout(ny_am()), None);
    let ctx = result.context.unwrap();
    assert_eq!(ctx.kill_zone.zone, KillZone::NewYorkAm);
    assert_eq!(ctx.premium_discount.zone, Zone::Premium);
    assert_eq!(ctx.premium_discount.range_high, 100.2);
    assert_eq!(ctx.premium_discount.range_low, 96.5);
    assert!(ctx.htf_bias.is_none());
    assert_eq!(result.timestamp, Some(ny_am()));

    let ote = result.ote_levels.unwrap();
    assert_eq!(ote.swing_high, 100.2);
    assert_eq!(ote.swing_low, 96.5);
}

#[test]
fn test_outside_kill_zone_drops_below_threshold() {
    let result = ConfluenceEngine::default().evaluate(&make_breakout(ny_lunch()), None);

    // 11 * 0.6 * 0.7
    assert!((result.bullish_score - 4.62).abs() < 1e-9);
    assert_eq!(result.signal, Signal::Neutral);
    assert_eq!(result.confidence, 0);
    assert!(result.entry_levels.is_none());
    assert!(result.reasoning.iter().any(|r| r == "Outside Kill Zones (weight 60%)"));
    assert_eq!(
        result.reasoning.last().map(String::as_str),
        Some("Insufficient confluence - no clear signal")
    );
}

#[test]
fn test_htf_alignment_bonus() {
    let htf = make_trend(30, 1.0);
    let result = ConfluenceEngine::default().evaluate(&make_breakout(ny_am()), Some(&htf));

    assert_eq!(result.signal, Signal::Long);
    assert!((result.bullish_score - 8.47).abs() < 1e-9);
    assert_eq!(result.confidence, 42);
    assert!(result.reasoning.iter().any(|r| r.starts_with("HTF aligned with LONG")));
    let bias = result.context.unwrap().htf_bias.unwrap();
    assert_eq!(bias.bias, Direction::Bullish);
}

#[test]
fn test_htf_counter_trend_penalty_keeps_direction() {
    let htf = make_trend(30, -1.0);
    let result = ConfluenceEngine::default().evaluate(&make_breakout(ny_am()), Some(&htf));

    assert_eq!(result.signal, Signal::Long);
    assert!((result.bullish_score - 6.16).abs() < 1e-9);
    assert_eq!(result.confidence, 30);
    assert!(result
        .reasoning
        .iter()
        .any(|r| r.starts_with("HTF against LONG (counter-trend)")));
}

#[test]
fn test_custom_adjustments_change_outcome() {
    // without the premium penalty the lunch-hour breakout clears the threshold
    let adjustments = Adjustments {
        zone_penalty: Ratio::new(0.0).unwrap(),
        ..Default::default()
    };
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .adjustments(adjustments)
        .build()
        .unwrap();
    let result = engine.evaluate(&make_breakout(ny_lunch()), None);
    assert_eq!(result.signal, Signal::Long);
    assert!((result.bullish_score - 6.6).abs() < 1e-9);
}

// ============================================================
// ENGINE SURFACE
// ============================================================

#[test]
fn test_evaluation_is_deterministic() {
    let frame = make_breakout(ny_am());
    let htf = make_trend(30, 1.0);
    let engine = ConfluenceEngine::default();

    let a = serde_json::to_string(&engine.evaluate(&frame, Some(&htf))).unwrap();
    let b = serde_json::to_string(&engine.evaluate(&frame, Some(&htf))).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_root_evaluate_matches_default_engine() {
    let frame = make_breakout(ny_am());
    let via_fn = evaluate(&frame, None, Period::new(60).unwrap());
    let via_engine = ConfluenceEngine::default().evaluate(&frame, None);
    assert_eq!(via_fn.signal, via_engine.signal);
    assert_eq!(via_fn.confidence, via_engine.confidence);
    assert_eq!(via_fn.reasoning, via_engine.reasoning);
}

#[test]
fn test_defaults_registered_twice_match_default_engine() {
    let frame = make_breakout(ny_am());
    let engine = EngineBuilder::from_config(EngineConfig::default())
        .with_all_defaults()
        .build()
        .unwrap();
    let default = ConfluenceEngine::default();

    let a = engine.evaluate(&frame, None);
    let b = default.evaluate(&frame, None);
    assert_eq!(a.detections.len(), b.detections.len());
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn test_engine_without_detectors_is_neutral() {
    let engine = EngineBuilder::new().build().unwrap();
    let result = engine.evaluate(&make_breakout(ny_am()), None);
    assert_eq!(result.signal, Signal::Neutral);
    assert!(result.breakdown.is_empty());
    assert!(result.detections.is_empty());
}

#[test]
fn test_parallel_evaluation_keeps_order() {
    let engine = ConfluenceEngine::default();
    let am = make_breakout(ny_am());
    let lunch = make_breakout(ny_lunch());
    let out = evaluate_parallel(&engine, vec![("EURUSD", &am), ("GBPUSD", &lunch)]);

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].symbol, "EURUSD");
    assert_eq!(out[0].result.signal, Signal::Long);
    assert_eq!(out[1].symbol, "GBPUSD");
    assert_eq!(out[1].result.signal, Signal::Neutral);
}

#[test]
fn test_engine_from_json_config() {
    let config = EngineConfig::from_json(r#"{"min_bars": 70}"#).unwrap();
    let engine = EngineBuilder::from_config(config).build().unwrap();
    let result = engine.evaluate(&make_breakout(ny_am()), None);
    assert_eq!(
        result.reasoning,
        vec!["Insufficient data: need 70 bars, got 60".to_string()]
    );
}
