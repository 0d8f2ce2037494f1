//! Standing metric and championship order.
//!
//! `standing = scale * (results_share * recency_weighted(results) + (1 - results_share) * contribution / 100)`
//!
//! where `recency_weighted` is the decay-weighted mean of the last `window`
//! race scores (newest weight 1, each older race multiplied by `recency_decay`)
//! and `contribution` is the role-weighted roster contribution on the rating
//! scale.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sim_core::config::StandingsConfig;
use sim_core::{TeamName, RATING_MAX};

/// Race score in [0, 1] for the points earned.
pub fn race_score(points: u32, max_points: u32) -> f32 {
    if max_points == 0 {
        return 0.0;
    }
    (points as f32 / max_points as f32).clamp(0.0, 1.0)
}

/// Decay-weighted mean of the most recent `window` scores; zero when empty.
pub fn recency_weighted(results: &[f32], decay: f32, window: usize) -> f32 {
    let mut weight = 1.0;
    let mut total_weight = 0.0;
    let mut sum = 0.0;
    for r in results.iter().rev().take(window) {
        sum += weight * r;
        total_weight += weight;
        weight *= decay;
    }
    if total_weight <= 0.0 {
        0.0
    } else {
        sum / total_weight
    }
}

/// Standing metric on `[0, cfg.scale]`.
pub fn standing(results: &[f32], contribution: f32, cfg: &StandingsConfig) -> f32 {
    let recent = recency_weighted(results, cfg.recency_decay, cfg.window);
    let roster = (contribution / RATING_MAX).clamp(0.0, 1.0);
    (cfg.scale * (cfg.results_share * recent + (1.0 - cfg.results_share) * roster))
        .clamp(0.0, cfg.scale)
}

/// One line of the championship table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionshipEntry {
    pub team: TeamName,
    pub points: u32,
    pub wins: u32,
    pub podiums: u32,
    pub races: u32,
}

fn championship_order(a: &ChampionshipEntry, b: &ChampionshipEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.wins.cmp(&a.wins))
        .then_with(|| b.podiums.cmp(&a.podiums))
        .then_with(|| a.team.cmp(&b.team))
}

/// Sort into championship order: points, then wins, then podiums, then name.
pub fn rank(mut entries: Vec<ChampionshipEntry>) -> Vec<ChampionshipEntry> {
    entries.sort_by(championship_order);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn newer_results_count_more() {
        let improving = recency_weighted(&[0.0, 1.0], 0.5, 12);
        let fading = recency_weighted(&[1.0, 0.0], 0.5, 12);
        assert!(improving > fading);
        assert!((improving - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(recency_weighted(&[], 0.5, 12), 0.0);
        assert_eq!(recency_weighted(&[0.0, 1.0, 1.0], 0.5, 2), 1.0);
    }

    #[test]
    fn standing_blends_results_and_roster() {
        let cfg = StandingsConfig {
            results_share: 0.5,
            ..StandingsConfig::default()
        };
        assert_eq!(standing(&[1.0], 100.0, &cfg), 100.0);
        assert_eq!(standing(&[], 50.0, &cfg), 25.0);
    }

    #[test]
    fn championship_ties_fall_back_to_wins_then_name() {
        let e = |team: &str, points, wins| ChampionshipEntry {
            team: TeamName::from(team),
            points,
            wins,
            podiums: 0,
            races: 3,
        };
        let ranked = rank(vec![e("B", 40, 1), e("A", 40, 1), e("C", 40, 2), e("D", 50, 0)]);
        let names: Vec<&str> = ranked.iter().map(|r| r.team.as_str()).collect();
        assert_eq!(names, vec!["D", "C", "A", "B"]);
    }

    proptest! {
        #[test]
        fn standing_stays_on_scale(results in proptest::collection::vec(0.0f32..=1.0, 0..30), contribution in -10.0f32..150.0) {
            let cfg = StandingsConfig::default();
            let s = standing(&results, contribution, &cfg);
            prop_assert!((0.0..=cfg.scale).contains(&s));
        }
    }
}
