//! Scoring (C10): pluggable node scorer + selector strategies (spec.md §4.8).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::Resources;
use crate::core::objects::{Candidate, NodeScore, PriceTable};
use crate::errors::ScoreError;
use crate::simulation::simulation::SimulationOutcome;

fn lookup_price(outcome: &SimulationOutcome, prices: &PriceTable) -> Result<f64, ScoreError> {
    prices.price_for(&outcome.candidate_region, &outcome.instance_type).ok_or_else(|| ScoreError::MissingPrice {
        region: outcome.candidate_region.clone(),
        instance_type: outcome.instance_type.clone(),
    })
}

/// Resource names that participate in scoring beyond the defaulted `cpu`/`memory`
/// pair — used only when the outcome's allocatable actually carries ephemeral
/// storage, so pools that never set it don't need a weight entry for it.
const OPTIONAL_RESOURCE_NAMES: &[&str] = &["ephemeral-storage"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreWeights(BTreeMap<String, f64>);

impl Default for ScoreWeights {
    /// `{cpu:5, memory:1}` (spec.md §4.8).
    fn default() -> Self {
        Self(BTreeMap::from([("cpu".to_string(), 5.0), ("memory".to_string(), 1.0)]))
    }
}

impl ScoreWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }

    fn weight(&self, resource: &str) -> Result<f64, ScoreError> {
        self.0.get(resource).copied().ok_or_else(|| ScoreError::MissingWeight(resource.to_string()))
    }

    fn resource_names(&self, allocatable: &Resources) -> Vec<&'static str> {
        let mut names = vec!["cpu", "memory"];
        for extra in OPTIONAL_RESOURCE_NAMES {
            if allocatable.get(extra).unwrap_or(0) > 0 {
                names.push(extra);
            }
        }
        names
    }
}

pub trait NodeScorer: Send + Sync {
    fn score(&self, outcome: &SimulationOutcome, prices: &PriceTable) -> Result<NodeScore, ScoreError>;
}

pub trait NodeScoreSelector: Send + Sync {
    /// Selects a winner among `scores`. Ties broken per spec.md §4.8: fewer residual
    /// unscheduled pods, then lower hourly price, then allocatable size (direction
    /// depends on the strategy — see [`break_ties`]).
    fn select<'a>(&self, scores: &'a [NodeScore]) -> Result<&'a NodeScore, ScoreError>;
}

/// Breaks ties among equally-scored candidates: fewer residual unscheduled pods,
/// then lower hourly price, then allocatable size. `prefer_larger_allocatable`
/// selects the direction of that last comparison — least-waste prefers the
/// smaller (least over-provisioned) node, while least-cost prefers the larger
/// (most value-per-dollar) node, per spec.md §4.8.
fn break_ties<'a>(best: Vec<&'a NodeScore>, prefer_larger_allocatable: bool) -> &'a NodeScore {
    let mut ranked = best;
    ranked.sort_by(|a, b| {
        let allocatable_cmp = allocatable_weight(&a.scaled_allocatable).total_cmp(&allocatable_weight(&b.scaled_allocatable));
        let allocatable_cmp = if prefer_larger_allocatable { allocatable_cmp.reverse() } else { allocatable_cmp };
        a.unscheduled_pods
            .len()
            .cmp(&b.unscheduled_pods.len())
            .then(a.hourly_price.total_cmp(&b.hourly_price))
            .then(allocatable_cmp)
    });
    ranked[0]
}

fn allocatable_weight(r: &Resources) -> f64 {
    r.cpu as f64 + r.memory as f64 + r.ephemeral_storage as f64
}

/// score = Σ weights[r] × (allocatable − requestsOnScaled − requestsOnOther). Lower
/// is better (spec.md §4.8).
pub struct LeastWasteScorer {
    pub weights: ScoreWeights,
}

impl NodeScorer for LeastWasteScorer {
    fn score(&self, outcome: &SimulationOutcome, prices: &PriceTable) -> Result<NodeScore, ScoreError> {
        let price = lookup_price(outcome, prices)?;
        let allocatable = outcome.scaled_allocatable;
        let mut value = 0.0;
        for name in self.weights.resource_names(&allocatable) {
            let w = self.weights.weight(name)?;
            let cap = allocatable.get(name).unwrap_or(0) as f64;
            let scaled = outcome.requests_on_scaled_node.get(name).unwrap_or(0) as f64;
            let other = outcome.requests_on_other_nodes.get(name).unwrap_or(0) as f64;
            value += w * (cap - scaled - other);
        }
        Ok(outcome.to_node_score(value, price))
    }
}

pub struct LeastWasteSelector;

impl NodeScoreSelector for LeastWasteSelector {
    fn select<'a>(&self, scores: &'a [NodeScore]) -> Result<&'a NodeScore, ScoreError> {
        if scores.is_empty() {
            return Err(ScoreError::NoWinningScore(0));
        }
        let min = scores.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
        let best: Vec<&NodeScore> = scores.iter().filter(|s| s.value == min).collect();
        Ok(break_ties(best, false))
    }
}

/// score = Σ weights[r] × scheduledRequests[r] ÷ hourlyPrice(instanceType, region).
/// Higher is better (spec.md §4.8).
pub struct LeastCostScorer {
    pub weights: ScoreWeights,
}

impl NodeScorer for LeastCostScorer {
    fn score(&self, outcome: &SimulationOutcome, prices: &PriceTable) -> Result<NodeScore, ScoreError> {
        let price = lookup_price(outcome, prices)?;
        let allocatable = outcome.scaled_allocatable;
        let mut value = 0.0;
        for name in self.weights.resource_names(&allocatable) {
            let w = self.weights.weight(name)?;
            let scheduled = outcome.requests_on_scaled_node.get(name).unwrap_or(0) as f64;
            value += w * scheduled / price.max(f64::EPSILON);
        }
        Ok(outcome.to_node_score(value, price))
    }
}

pub struct LeastCostSelector;

impl NodeScoreSelector for LeastCostSelector {
    fn select<'a>(&self, scores: &'a [NodeScore]) -> Result<&'a NodeScore, ScoreError> {
        if scores.is_empty() {
            return Err(ScoreError::NoWinningScore(0));
        }
        let max = scores.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
        let best: Vec<&NodeScore> = scores.iter().filter(|s| s.value == max).collect();
        Ok(break_ties(best, true))
    }
}

/// Resolves the `scoring.strategy` configuration value (spec.md §6) to a
/// scorer+selector pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringStrategy {
    LeastWaste,
    LeastCost,
}

pub fn strategy_pair(strategy: ScoringStrategy, weights: ScoreWeights) -> (Box<dyn NodeScorer>, Box<dyn NodeScoreSelector>) {
    match strategy {
        ScoringStrategy::LeastWaste => (Box::new(LeastWasteScorer { weights }), Box::new(LeastWasteSelector)),
        ScoringStrategy::LeastCost => (Box::new(LeastCostScorer { weights }), Box::new(LeastCostSelector)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::objects::PriceEntry;

    fn outcome() -> SimulationOutcome {
        SimulationOutcome {
            simulation_id: "sim-1".to_string(),
            candidate: Candidate { pool: "p".to_string(), template: "t".to_string(), zone: "z".to_string() },
            candidate_region: "us-east".to_string(),
            instance_type: "m5.large".to_string(),
            node_name: "sim-p-t-z-sim-1".to_string(),
            scaled_allocatable: Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 },
            requests_on_scaled_node: Resources { cpu: 2, memory: 1024, ephemeral_storage: 0 },
            requests_on_other_nodes: Resources::default(),
            scaled_assignment: vec!["p1".to_string()],
            other_assignments: vec![],
            unscheduled_pods: vec![],
        }
    }

    #[test]
    fn least_waste_lower_waste_wins() {
        let scorer = LeastWasteScorer { weights: ScoreWeights::default() };
        let prices = PriceTable {
            entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.2 }],
        };
        let low_waste = outcome();
        let mut high_waste = outcome();
        high_waste.requests_on_scaled_node = Resources::default();
        let s1 = scorer.score(&low_waste, &prices).unwrap();
        let s2 = scorer.score(&high_waste, &prices).unwrap();
        assert!(s1.value < s2.value);
        let selector = LeastWasteSelector;
        let winner = selector.select(&[s1.clone(), s2.clone()]).unwrap();
        assert_eq!(winner.value, s1.value);
    }

    #[test]
    fn missing_weight_names_the_resource() {
        let scorer = LeastWasteScorer { weights: ScoreWeights::new(BTreeMap::from([("cpu".to_string(), 5.0)])) };
        let prices = PriceTable {
            entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.2 }],
        };
        let err = scorer.score(&outcome(), &prices).unwrap_err();
        match err {
            ScoreError::MissingWeight(resource) => assert_eq!(resource, "memory"),
            other => panic!("expected MissingWeight, got {other:?}"),
        }
    }

    #[test]
    fn least_cost_requires_price_entry() {
        let scorer = LeastCostScorer { weights: ScoreWeights::default() };
        let err = scorer.score(&outcome(), &PriceTable::default()).unwrap_err();
        assert!(matches!(err, ScoreError::MissingPrice { .. }));
    }

    #[test]
    fn least_cost_scores_with_price_present() {
        let scorer = LeastCostScorer { weights: ScoreWeights::default() };
        let prices = PriceTable {
            entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.1 }],
        };
        let score = scorer.score(&outcome(), &prices).unwrap();
        assert!(score.value > 0.0);
    }

    #[test]
    fn least_cost_tie_break_prefers_larger_allocatable() {
        let mut small = outcome();
        small.value = 10.0;
        small.scaled_allocatable = Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 };
        let mut large = outcome();
        large.simulation_id = "sim-2".to_string();
        large.value = 10.0;
        large.scaled_allocatable = Resources { cpu: 8, memory: 8192, ephemeral_storage: 0 };

        let selector = LeastCostSelector;
        let winner = selector.select(&[small.clone(), large.clone()]).unwrap();
        assert_eq!(winner.simulation_id, large.simulation_id, "least-cost should prefer the larger allocatable on a tie");
    }

    #[test]
    fn least_waste_tie_break_prefers_smaller_allocatable() {
        let mut small = outcome();
        small.value = 10.0;
        small.scaled_allocatable = Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 };
        let mut large = outcome();
        large.simulation_id = "sim-2".to_string();
        large.value = 10.0;
        large.scaled_allocatable = Resources { cpu: 8, memory: 8192, ephemeral_storage: 0 };

        let selector = LeastWasteSelector;
        let winner = selector.select(&[small.clone(), large.clone()]).unwrap();
        assert_eq!(winner.simulation_id, small.simulation_id, "least-waste should prefer the smaller allocatable on a tie");
    }
}
