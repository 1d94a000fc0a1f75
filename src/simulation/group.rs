//! Simulation Group (C8): parallel execution of same-priority simulations, scoring,
//! and winner selection (spec.md §4.8).

use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::objects::{Candidate, NodePool, NodeScore, NodeTemplate, PriceTable};
use crate::errors::{SimulationError, SimulationGroupError};
use crate::scheduler::SchedulerLauncher;
use crate::simulation::scoring::{NodeScoreSelector, NodeScorer};
use crate::simulation::simulation::{self, SimulationOutcome, StabilizationConfig};
use crate::view::{SandboxRegistry, View};

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub candidate: Candidate,
    pub pool: NodePool,
    pub template: NodeTemplate,
    pub zone: String,
}

/// `{allScores, winnerScore, winnerNode}` (spec.md §4.8 step 4). `winner` is `None`
/// when every simulation in the group produced an empty scaled assignment.
pub struct GroupOutcome {
    pub all_scores: Vec<NodeScore>,
    pub winner: Option<(NodeScore, SimulationOutcome)>,
}

/// The set of simulations sharing one `(nodePoolPriority, nodeTemplatePriority)` key
/// (spec.md §4.8).
pub struct SimulationGroup {
    pub priority_key: (i32, i32),
    pub members: Vec<GroupMember>,
}

impl SimulationGroup {
    pub async fn run(
        &self,
        pass_id: &str,
        base: Arc<dyn View>,
        counter: Arc<AtomicI64>,
        watch_queue_size: usize,
        launcher: Arc<SchedulerLauncher>,
        stabilization: StabilizationConfig,
        scorer: &dyn NodeScorer,
        selector: &dyn NodeScoreSelector,
        prices: &PriceTable,
        registry: Option<Arc<dyn SandboxRegistry>>,
    ) -> Result<GroupOutcome, SimulationGroupError> {
        // Step 1: run every member's simulation concurrently under one cancellation
        // token (spec.md §4.8 step 1, §5 "the group cancels all siblings on first
        // error"). Tasks are polled in completion order so the token is tripped as
        // soon as any sibling fails, not only once every task has been awaited in
        // spawn order; every task is still drained before this function returns, so
        // none are left running detached.
        let cancel = CancellationToken::new();
        let mut tasks = FuturesUnordered::new();
        for (i, member) in self.members.iter().enumerate() {
            let simulation_id = format!("{pass_id}-{}-{}-{}-{i}", member.candidate.pool, member.candidate.template, member.candidate.zone);
            let base = base.clone();
            let counter = counter.clone();
            let launcher = launcher.clone();
            let candidate = member.candidate.clone();
            let pool = member.pool.clone();
            let template = member.template.clone();
            let zone = member.zone.clone();
            let cancel = cancel.clone();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                simulation::run(
                    simulation_id,
                    candidate,
                    pool,
                    template,
                    zone,
                    base,
                    counter,
                    watch_queue_size,
                    launcher,
                    stabilization,
                    cancel,
                    registry,
                )
                .await
            }));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut first_err: Option<SimulationGroupError> = None;
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(SimulationError::Cancelled)) => {}
                Ok(Err(e)) => {
                    cancel.cancel();
                    first_err.get_or_insert(SimulationGroupError::from(e));
                }
                Err(join_err) => {
                    cancel.cancel();
                    first_err.get_or_insert(SimulationGroupError::Run(join_err.to_string()));
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        // Step 2: score every successful simulation.
        let mut scores = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            scores.push(scorer.score(outcome, prices)?);
        }

        // Step 4: "no winner" when every simulation produced an empty assignment.
        if scores.iter().all(|s| s.scaled_assignment.is_empty()) {
            return Ok(GroupOutcome { all_scores: scores, winner: None });
        }

        // Step 3: select a winner; ties are broken inside the selector.
        let winner_score = selector.select(&scores)?.clone();
        let winner_outcome = outcomes
            .iter()
            .find(|o| o.simulation_id == winner_score.simulation_id)
            .cloned()
            .expect("selector returned a score not among this group's outcomes");

        Ok(GroupOutcome { all_scores: scores, winner: Some((winner_score, winner_outcome)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_key_orders_ascending() {
        let mut groups = vec![
            SimulationGroup { priority_key: (2, 1), members: vec![] },
            SimulationGroup { priority_key: (1, 1), members: vec![] },
        ];
        groups.sort_by_key(|g| g.priority_key);
        assert_eq!(groups[0].priority_key, (1, 1));
    }
}
