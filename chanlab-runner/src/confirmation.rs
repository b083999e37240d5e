//! Cross-level confirmation of signal points.
//!
//! A signal at one level is confirmed by a same-side signal at another level
//! whose timestamp lies within the pair's window. Each confirming level adds
//! `base_bonus * weight` (at most one match per level, the closest in time),
//! the total is capped at `max_bonus`, and reliability at 1.0. Matching reads
//! a snapshot of the unconfirmed signals, so the outcome does not depend on
//! the order levels are visited in.

use crate::config::CrossLevelConfig;
use chanlab_core::data::Timeframe;
use chanlab_core::domain::{CrossConfirmation, Side, SignalKind, SignalPoint};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy)]
struct Probe {
    kind: SignalKind,
    side: Side,
    timestamp: NaiveDateTime,
}

/// Attach confirmations to every level's signals in place. Returns the number
/// of signals that gained at least one confirmation.
pub fn apply_confirmations(
    levels: &mut [(Timeframe, &mut Vec<SignalPoint>)],
    cfg: &CrossLevelConfig,
) -> usize {
    let probes: Vec<(Timeframe, Vec<Probe>)> = levels
        .iter()
        .map(|(tf, signals)| {
            let probes = signals
                .iter()
                .map(|s| Probe {
                    kind: s.kind,
                    side: s.side,
                    timestamp: s.timestamp,
                })
                .collect();
            (*tf, probes)
        })
        .collect();

    let mut confirmed = 0;
    for (own, signals) in levels.iter_mut() {
        for signal in signals.iter_mut() {
            signal.confirmations.clear();
            for (other, candidates) in &probes {
                if *other == *own {
                    continue;
                }
                let window = cfg.window(*own, *other).num_seconds();
                let closest = candidates
                    .iter()
                    .filter(|p| p.side == signal.side)
                    .filter(|p| gap_seconds(p.timestamp, signal.timestamp) <= window)
                    .min_by_key(|p| (gap_seconds(p.timestamp, signal.timestamp), p.timestamp));
                if let Some(p) = closest {
                    let weight = cfg.weight(*own, *other);
                    signal.confirmations.push(CrossConfirmation {
                        level: *other,
                        kind: p.kind,
                        timestamp: p.timestamp,
                        weight,
                        bonus: cfg.base_bonus * weight,
                    });
                }
            }

            let total: f64 = signal.confirmations.iter().map(|c| c.bonus).sum();
            signal.cross_bonus = total.min(cfg.max_bonus);
            signal.reliability = (signal.base_reliability + signal.cross_bonus).min(1.0);
            if signal.is_confirmed() {
                confirmed += 1;
            }
        }
    }
    confirmed
}

fn gap_seconds(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_seconds().abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn signal(side: Side, timestamp: NaiveDateTime, reliability: f64) -> SignalPoint {
        SignalPoint {
            kind: SignalKind::Type1,
            side,
            price: 100.0,
            timestamp,
            raw_index: 0,
            base_reliability: reliability,
            cross_bonus: 0.0,
            reliability,
            pivot: None,
            segment: None,
            stroke: None,
            divergence: None,
            confirmations: Vec::new(),
        }
    }

    fn run(
        levels: Vec<(Timeframe, Vec<SignalPoint>)>,
        cfg: &CrossLevelConfig,
    ) -> (Vec<(Timeframe, Vec<SignalPoint>)>, usize) {
        let mut levels = levels;
        let count = {
            let mut views: Vec<(Timeframe, &mut Vec<SignalPoint>)> =
                levels.iter_mut().map(|(tf, s)| (*tf, s)).collect();
            apply_confirmations(&mut views, cfg)
        };
        (levels, count)
    }

    // ── Matching ──

    #[test]
    fn matching_is_symmetric_weighting_is_not() {
        let cfg = CrossLevelConfig::default();
        let (levels, count) = run(
            vec![
                (Timeframe::Hour1, vec![signal(Side::Buy, at(10), 0.6)]),
                (Timeframe::Min5, vec![signal(Side::Buy, at(11), 0.6)]),
            ],
            &cfg,
        );
        assert_eq!(count, 2);

        let hourly = &levels[0].1[0];
        let fine = &levels[1].1[0];
        assert_eq!(hourly.confirmations.len(), 1);
        assert_eq!(fine.confirmations.len(), 1);
        assert_eq!(hourly.confirmations[0].level, Timeframe::Min5);
        assert_eq!(fine.confirmations[0].level, Timeframe::Hour1);

        // Coarse confirms fine at full weight, fine confirms coarse at half.
        assert!((fine.cross_bonus - 0.1).abs() < 1e-12);
        assert!((hourly.cross_bonus - 0.05).abs() < 1e-12);
        assert!((fine.reliability - 0.7).abs() < 1e-12);
        assert_eq!(fine.base_reliability, 0.6);
    }

    #[test]
    fn opposite_side_or_outside_window_does_not_match() {
        let cfg = CrossLevelConfig::default();
        let (levels, count) = run(
            vec![
                (Timeframe::Hour1, vec![signal(Side::Buy, at(10), 0.6)]),
                (
                    Timeframe::Min5,
                    vec![signal(Side::Sell, at(10), 0.6), signal(Side::Buy, at(14), 0.6)],
                ),
            ],
            &cfg,
        );
        // The window is three hourly bars; 14:00 is four hours away.
        assert_eq!(count, 0);
        assert!(levels.iter().all(|(_, s)| s.iter().all(|p| p.cross_bonus == 0.0)));
    }

    #[test]
    fn closest_match_per_level() {
        let cfg = CrossLevelConfig::default();
        let (levels, _) = run(
            vec![
                (Timeframe::Hour1, vec![signal(Side::Buy, at(10), 0.5)]),
                (
                    Timeframe::Min5,
                    vec![signal(Side::Buy, at(8), 0.5), signal(Side::Buy, at(11), 0.5)],
                ),
            ],
            &cfg,
        );
        let hourly = &levels[0].1[0];
        assert_eq!(hourly.confirmations.len(), 1);
        assert_eq!(hourly.confirmations[0].timestamp, at(11));
    }

    // ── Caps ──

    #[test]
    fn bonus_and_reliability_are_capped() {
        let cfg = CrossLevelConfig {
            base_bonus: 0.2,
            ..CrossLevelConfig::default()
        };
        let (levels, _) = run(
            vec![
                (Timeframe::Min5, vec![signal(Side::Sell, at(10), 0.9)]),
                (Timeframe::Hour1, vec![signal(Side::Sell, at(10), 0.9)]),
                (Timeframe::Day1, vec![signal(Side::Sell, at(0), 0.9)]),
            ],
            &cfg,
        );
        let fine = &levels[0].1[0];
        assert_eq!(fine.confirmations.len(), 2);
        assert!((fine.cross_bonus - 0.25).abs() < 1e-12);
        assert_eq!(fine.reliability, 1.0);
    }

    #[test]
    fn reapplying_does_not_accumulate() {
        let cfg = CrossLevelConfig::default();
        let (once, _) = run(
            vec![
                (Timeframe::Hour1, vec![signal(Side::Buy, at(10), 0.6)]),
                (Timeframe::Min5, vec![signal(Side::Buy, at(10), 0.6)]),
            ],
            &cfg,
        );
        let (twice, _) = run(once.clone(), &cfg);
        assert_eq!(once, twice);
    }

    #[test]
    fn visiting_order_does_not_matter() {
        let cfg = CrossLevelConfig::default();
        let a = vec![
            (Timeframe::Hour1, vec![signal(Side::Buy, at(10), 0.6)]),
            (Timeframe::Min5, vec![signal(Side::Buy, at(12), 0.4)]),
            (Timeframe::Day1, vec![signal(Side::Buy, at(0), 0.7)]),
        ];
        let mut b = a.clone();
        b.reverse();
        let (mut ra, _) = run(a, &cfg);
        let (mut rb, _) = run(b, &cfg);
        ra.sort_by_key(|(tf, _)| *tf);
        rb.sort_by_key(|(tf, _)| *tf);
        for ((_, sa), (_, sb)) in ra.iter().zip(&rb) {
            assert_eq!(sa[0].reliability, sb[0].reliability);
            assert_eq!(sa[0].confirmations.len(), sb[0].confirmations.len());
        }
    }
}
