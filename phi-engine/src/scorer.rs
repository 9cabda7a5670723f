//! Fusion Scorer
//!
//! Combines per-stage results into the unified score, a decision band and the
//! degraded flag.
//!
//! # Algorithm: Weight-Excluding Mean
//! 1. `W = Σ weight` over stages whose status is Ok
//! 2. `W = 0` → score 0, decision Unknown, degraded
//! 3. otherwise `score = Σ(weight × score) / W` over Ok stages only; failed
//!    and timed-out stages drop out of the denominator instead of being
//!    imputed a default score. Weights are divided by the largest Ok
//!    weight first, which leaves the ratio unchanged and keeps both sums
//!    finite for any valid weight set
//! 4. decision by band, boundaries inclusive to the band above

use crate::types::{Decision, StageResult};
use phi_common::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Band edges used to derive the decision
pub type ScoreBands = ScoringConfig;

/// Scorer output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionScore {
    pub unified_score: f64,
    pub decision: Decision,
    pub degraded: bool,
}

/// Fusion scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionScorer {
    bands: ScoreBands,
}

impl FusionScorer {
    /// Create a scorer; bands must already be validated
    pub fn new(bands: ScoreBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> ScoreBands {
        self.bands
    }

    /// Score one run
    ///
    /// # Arguments
    /// * `weights` - Configured weight per stage name
    /// * `per_stage` - Terminal result per configured stage
    ///
    /// A stage missing from `weights` contributes no weight; a configured stage
    /// missing from `per_stage` is not Ok and therefore marks the run degraded.
    pub fn score(
        &self,
        weights: &HashMap<String, f64>,
        per_stage: &BTreeMap<String, StageResult>,
    ) -> FusionScore {
        let contributing: Vec<(f64, f64)> = per_stage
            .iter()
            .filter_map(|(name, result)| match (result.is_ok(), result.score, weights.get(name)) {
                (true, Some(score), Some(&weight)) if weight > 0.0 => Some((weight, score)),
                _ => None,
            })
            .collect();

        // Weights are taken relative to the largest one so sums stay finite
        let max_weight = contributing.iter().map(|(w, _)| *w).fold(0.0, f64::max);
        let mut total_weight = 0.0;
        let mut weighted_sum = 0.0;
        if max_weight > 0.0 {
            for (weight, score) in &contributing {
                let relative = weight / max_weight;
                total_weight += relative;
                weighted_sum += relative * score;
            }
        }

        let all_ok = weights
            .keys()
            .all(|name| per_stage.get(name).is_some_and(StageResult::is_ok))
            && per_stage.values().all(StageResult::is_ok);
        let degraded = !all_ok;

        if total_weight <= 0.0 {
            debug!("No successful stages, decision Unknown");
            return FusionScore {
                unified_score: 0.0,
                decision: Decision::Unknown,
                degraded: true,
            };
        }

        let unified_score = (weighted_sum / total_weight).clamp(0.0, 1.0);
        let decision = self.decide(unified_score);

        debug!(
            unified_score,
            decision = %decision,
            degraded,
            total_weight,
            "Fusion scored"
        );

        FusionScore {
            unified_score,
            decision,
            degraded,
        }
    }

    /// Map a score to its band; a score on an edge belongs to the higher band
    pub fn decide(&self, unified_score: f64) -> Decision {
        if unified_score >= self.bands.accept {
            Decision::Accept
        } else if unified_score >= self.bands.hold {
            Decision::Hold
        } else {
            Decision::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(n, w)| (n.to_string(), *w)).collect()
    }

    fn results(entries: Vec<StageResult>) -> BTreeMap<String, StageResult> {
        entries
            .into_iter()
            .map(|r| (r.stage_name.clone(), r))
            .collect()
    }

    #[test]
    fn test_failed_stage_weight_is_redistributed() {
        let scorer = FusionScorer::default();
        let score = scorer.score(
            &weights(&[("a", 1.0), ("b", 1.0), ("c", 2.0)]),
            &results(vec![
                StageResult::ok("a", 0.9, Value::Null, 0),
                StageResult::ok("b", 0.3, Value::Null, 0),
                StageResult::failed("c", "x", 0),
            ]),
        );

        assert!((score.unified_score - 0.6).abs() < 1e-12);
        assert_eq!(score.decision, Decision::Hold);
        assert!(score.degraded);
    }

    #[test]
    fn test_all_ok_not_degraded() {
        let scorer = FusionScorer::default();
        let score = scorer.score(
            &weights(&[("a", 3.0), ("b", 1.0)]),
            &results(vec![
                StageResult::ok("a", 1.0, Value::Null, 0),
                StageResult::ok("b", 0.2, Value::Null, 0),
            ]),
        );

        assert!((score.unified_score - 0.8).abs() < 1e-12);
        assert_eq!(score.decision, Decision::Accept);
        assert!(!score.degraded);
    }

    #[test]
    fn test_all_failed_is_unknown() {
        let scorer = FusionScorer::default();
        let score = scorer.score(
            &weights(&[("a", 1.0), ("b", 1.0)]),
            &results(vec![
                StageResult::failed("a", "x", 0),
                StageResult::timed_out("b", 10, 10),
            ]),
        );

        assert_eq!(score.unified_score, 0.0);
        assert_eq!(score.decision, Decision::Unknown);
        assert!(score.degraded);
    }

    #[test]
    fn test_missing_result_marks_degraded() {
        let scorer = FusionScorer::default();
        let score = scorer.score(
            &weights(&[("a", 1.0), ("b", 1.0)]),
            &results(vec![StageResult::ok("a", 0.5, Value::Null, 0)]),
        );

        assert_eq!(score.unified_score, 0.5);
        assert!(score.degraded);
    }

    #[test]
    fn test_huge_weights_stay_in_range() {
        let scorer = FusionScorer::default();
        let score = scorer.score(
            &weights(&[("a", 1e308), ("b", f64::MAX), ("c", 1e308)]),
            &results(vec![
                StageResult::ok("a", 0.9, Value::Null, 0),
                StageResult::ok("b", 0.9, Value::Null, 0),
                StageResult::failed("c", "x", 0),
            ]),
        );

        assert!((score.unified_score - 0.9).abs() < 1e-12);
        assert_eq!(score.decision, Decision::Accept);
        assert!(score.degraded);
    }

    #[test]
    fn test_band_edges_inclusive_upward() {
        let scorer = FusionScorer::default();
        assert_eq!(scorer.decide(0.0), Decision::Reject);
        assert_eq!(scorer.decide(0.3399), Decision::Reject);
        assert_eq!(scorer.decide(0.34), Decision::Hold);
        assert_eq!(scorer.decide(0.6699), Decision::Hold);
        assert_eq!(scorer.decide(0.67), Decision::Accept);
        assert_eq!(scorer.decide(1.0), Decision::Accept);
    }

    #[test]
    fn test_custom_bands() {
        let scorer = FusionScorer::new(ScoreBands {
            hold: 0.5,
            accept: 0.9,
        });
        assert_eq!(scorer.decide(0.49), Decision::Reject);
        assert_eq!(scorer.decide(0.5), Decision::Hold);
        assert_eq!(scorer.decide(0.89), Decision::Hold);
        assert_eq!(scorer.decide(0.9), Decision::Accept);
    }

    proptest! {
        #[test]
        fn prop_unified_score_within_unit_interval(
            stages in prop::collection::vec((0.001f64..f64::MAX, 0.0f64..=1.0, any::<bool>()), 1..12)
        ) {
            let mut w = HashMap::new();
            let mut r = BTreeMap::new();
            for (i, (weight, score, ok)) in stages.iter().enumerate() {
                let name = format!("s{}", i);
                w.insert(name.clone(), *weight);
                let result = if *ok {
                    StageResult::ok(&name, *score, Value::Null, 0)
                } else {
                    StageResult::failed(&name, "x", 0)
                };
                r.insert(name, result);
            }

            let score = FusionScorer::default().score(&w, &r);
            prop_assert!((0.0..=1.0).contains(&score.unified_score));
            prop_assert_eq!(score.degraded, stages.iter().any(|(_, _, ok)| !ok));
            if stages.iter().all(|(_, _, ok)| !ok) {
                prop_assert_eq!(score.decision, Decision::Unknown);
            }
        }
    }
}
