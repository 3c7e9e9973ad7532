//! Scoring model. Pure and deterministic: same inputs, bit-identical scores.
//!
//! Every intermediate term is clamped into `[0, 1]` before it is weighted,
//! and every output is clamped again, so out-of-range metrics (negative
//! counts, NaN qualities) cannot leak through.

use common::config::ScoringWeights;
use common::models::{clamp_unit, RepositoryMetrics, RepositoryScores, RepositorySignals};

const STALE_AFTER_DAYS: i64 = 730;
const STALENESS_HORIZON_DAYS: f64 = 1095.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryScorer {
    weights: ScoringWeights,
}

impl RepositoryScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn calculate(&self, metrics: &RepositoryMetrics, signals: &RepositorySignals) -> RepositoryScores {
        RepositoryScores {
            potential: self.potential(metrics, signals),
            revival_feasibility: revival_feasibility(metrics, signals),
            product_fit: product_fit(metrics),
        }
    }

    fn potential(&self, metrics: &RepositoryMetrics, signals: &RepositorySignals) -> f64 {
        let w = &self.weights;
        let score = w.quality * clamp_unit(signals.code_quality_estimate)
            + w.uniqueness * uniqueness(metrics)
            + w.completeness * completeness(signals)
            + w.effort * effort_inverse(metrics, signals);
        clamp_unit(score)
    }
}

/// Fewer stars reads as more niche.
pub fn uniqueness(metrics: &RepositoryMetrics) -> f64 {
    match metrics.stars {
        s if s < 20 => 0.9,
        s if s < 50 => 0.8,
        s if s < 100 => 0.7,
        s if s < 200 => 0.6,
        _ => 0.5,
    }
}

/// Fraction of readme, license, tests, CI and documentation present.
pub fn completeness(signals: &RepositorySignals) -> f64 {
    let present = [
        signals.has_readme,
        signals.has_license,
        signals.has_tests,
        signals.has_ci,
        signals.has_documentation,
    ]
    .iter()
    .filter(|flag| **flag)
    .count();
    present as f64 / 5.0
}

/// One minus the estimated revival effort.
pub fn effort_inverse(metrics: &RepositoryMetrics, signals: &RepositorySignals) -> f64 {
    let mut effort = 1.0 - clamp_unit(signals.code_quality_estimate);
    if !signals.has_tests {
        effort += 0.2;
    }
    effort += (1.0 - clamp_unit(signals.documentation_quality)) * 0.15;
    if metrics.days_since_last_commit > STALE_AFTER_DAYS {
        effort += 0.15;
    }
    clamp_unit(1.0 - effort)
}

/// Linear decay from 1 at the last commit to 0 after three years.
pub fn staleness(metrics: &RepositoryMetrics) -> f64 {
    clamp_unit(1.0 - metrics.days_since_last_commit as f64 / STALENESS_HORIZON_DAYS)
}

pub fn revival_feasibility(metrics: &RepositoryMetrics, signals: &RepositorySignals) -> f64 {
    let test_factor = if signals.has_tests { 0.7 } else { 0.3 };
    let contributors = clamp_unit(metrics.contributors_count as f64 / 5.0);
    clamp_unit(
        0.25 * staleness(metrics)
            + 0.30 * clamp_unit(signals.documentation_quality)
            + 0.25 * test_factor
            + 0.20 * contributors,
    )
}

/// 20 to 200 stars is the sweet spot.
pub fn star_score(stars: i64) -> f64 {
    let score = if stars < 20 {
        stars as f64 / 20.0
    } else if stars <= 200 {
        1.0
    } else {
        (1.0 - (stars - 200) as f64 / 1000.0).max(0.5)
    };
    clamp_unit(score)
}

pub fn product_fit(metrics: &RepositoryMetrics) -> f64 {
    let fork_score = clamp_unit(5.0 * metrics.forks as f64 / metrics.stars.max(1) as f64);
    let issue_score = clamp_unit(metrics.open_issues as f64 / 20.0);
    clamp_unit(0.40 * star_score(metrics.stars) + 0.35 * fork_score + 0.25 * issue_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn golden() -> (RepositoryMetrics, RepositorySignals) {
        let metrics = RepositoryMetrics {
            stars: 10,
            forks: 1,
            open_issues: 2,
            contributors_count: 1,
            days_since_last_commit: 400,
            ..Default::default()
        };
        let signals = RepositorySignals {
            has_readme: true,
            has_license: true,
            has_documentation: true,
            documentation_quality: 0.5,
            code_quality_estimate: 0.5,
            ..Default::default()
        };
        (metrics, signals)
    }

    #[test]
    fn test_golden_fixture() {
        let (metrics, signals) = golden();
        assert!((completeness(&signals) - 0.6).abs() < EPS);
        assert!((uniqueness(&metrics) - 0.9).abs() < EPS);
        let stale = 1.0 - 400.0 / 1095.0;
        assert!((staleness(&metrics) - stale).abs() < EPS);

        // effort = 0.5 + 0.2 + 0.5 * 0.15 = 0.775
        let effort_inv = 1.0 - 0.775;
        assert!((effort_inverse(&metrics, &signals) - effort_inv).abs() < EPS);

        let scores = RepositoryScorer::default().calculate(&metrics, &signals);
        let potential = 0.30 * 0.5 + 0.25 * 0.9 + 0.25 * 0.6 + 0.20 * effort_inv;
        assert!((scores.potential - potential).abs() < EPS);
        assert!((scores.potential - 0.57).abs() < EPS);

        let feasibility = 0.25 * stale + 0.30 * 0.5 + 0.25 * 0.3 + 0.20 * 0.2;
        assert!((scores.revival_feasibility - feasibility).abs() < EPS);

        // star 0.5, fork 0.5, issues 0.1
        assert!((scores.product_fit - 0.4).abs() < EPS);
    }

    #[test]
    fn test_star_score_shape() {
        assert_eq!(star_score(0), 0.0);
        assert_eq!(star_score(10), 0.5);
        assert_eq!(star_score(20), 1.0);
        assert_eq!(star_score(200), 1.0);
        assert!((star_score(700) - 0.5).abs() < EPS);
        assert_eq!(star_score(5_000), 0.5);
        assert!((star_score(300) - 0.9).abs() < EPS);
    }

    #[test]
    fn test_very_stale_adds_effort() {
        let (mut metrics, signals) = golden();
        let fresh = effort_inverse(&metrics, &signals);
        metrics.days_since_last_commit = 731;
        assert!((fresh - effort_inverse(&metrics, &signals) - 0.15).abs() < EPS);
        metrics.days_since_last_commit = 2_000;
        assert_eq!(staleness(&metrics), 0.0);
    }

    #[test]
    fn test_custom_weights() {
        let (metrics, signals) = golden();
        let scorer = RepositoryScorer::new(ScoringWeights { quality: 1.0, uniqueness: 0.0, completeness: 0.0, effort: 0.0 });
        assert!((scorer.calculate(&metrics, &signals).potential - 0.5).abs() < EPS);
    }

    fn arb_metrics() -> impl Strategy<Value = RepositoryMetrics> {
        (
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            -10_000i64..100_000,
        )
            .prop_map(|(stars, forks, open_issues, contributors_count, days)| RepositoryMetrics {
                stars,
                forks,
                open_issues,
                contributors_count,
                days_since_last_commit: days,
                ..Default::default()
            })
    }

    fn arb_signals() -> impl Strategy<Value = RepositorySignals> {
        (
            any::<[bool; 5]>(),
            prop_oneof![any::<f64>(), -1e6f64..1e6],
            prop_oneof![any::<f64>(), -1e6f64..1e6],
        )
            .prop_map(|(flags, doc, quality)| RepositorySignals {
                is_abandoned: false,
                has_readme: flags[0],
                has_license: flags[1],
                has_tests: flags[2],
                has_ci: flags[3],
                has_documentation: flags[4],
                documentation_quality: doc,
                code_quality_estimate: quality,
            })
    }

    proptest! {
        #[test]
        fn prop_scores_are_clamped(metrics in arb_metrics(), signals in arb_signals()) {
            let scores = RepositoryScorer::default().calculate(&metrics, &signals);
            for value in [scores.potential, scores.revival_feasibility, scores.product_fit] {
                prop_assert!((0.0..=1.0).contains(&value), "out of range: {}", value);
            }
        }

        #[test]
        fn prop_calculate_is_deterministic(metrics in arb_metrics(), signals in arb_signals()) {
            let scorer = RepositoryScorer::default();
            let a = scorer.calculate(&metrics, &signals);
            let b = scorer.calculate(&metrics, &signals);
            prop_assert_eq!(a.potential.to_bits(), b.potential.to_bits());
            prop_assert_eq!(a.revival_feasibility.to_bits(), b.revival_feasibility.to_bits());
            prop_assert_eq!(a.product_fit.to_bits(), b.product_fit.to_bits());
        }
    }
}
