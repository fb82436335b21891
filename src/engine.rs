//! The loop driver: pop a task, partition it, have the
//! reviewer judge the batch, dispatch the decisions, repeat until the task
//! queue drains or the recursion cap is hit.
//!
//! Grounded in `original_source/core/graph.py::TDRClusterGraph` — the same
//! three-node cycle (`clusterer` -> `reviewer` -> `dispatcher`) and the same
//! `recursion_limit` config key, reimplemented as a plain loop instead of a
//! LangGraph state machine since nothing here needs graph-level branching.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::decision::parse_and_validate;
use crate::dispatcher::dispatch;
use crate::llm::{review_with_retry, LlmReviewer};
use crate::model::{CategoryId, Cluster, ClusterId, Query, State, Task};
use crate::partitioner::Partitioner;
use crate::prompt::build_review_prompt;

/// How a run concluded. The recursion cap is a circuit breaker, not a
/// failure: the caller still gets every category built so far, flagged as
/// incomplete rather than discarded.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(State),
    RecursionCapReached(State),
}

impl RunOutcome {
    pub fn into_state(self) -> State {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::RecursionCapReached(state) => state,
        }
    }
}

pub struct ClusterEngine<'a> {
    config: &'a Config,
    reviewer: &'a dyn LlmReviewer,
    partitioner: &'a dyn Partitioner,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(config: &'a Config, reviewer: &'a dyn LlmReviewer, partitioner: &'a dyn Partitioner) -> Self {
        Self {
            config,
            reviewer,
            partitioner,
        }
    }

    /// Run the partition -> review -> dispatch cycle to completion over
    /// `initial_queries`, discarding the recursion-cap signal. Prefer
    /// [`ClusterEngine::run_reporting_outcome`] when the caller needs to
    /// distinguish a clean finish from a capped one.
    pub async fn run(
        &self,
        initial_queries: Vec<Query>,
        initial_k: usize,
        dataset_name: impl Into<String>,
    ) -> State {
        self.run_reporting_outcome(initial_queries, initial_k, dataset_name)
            .await
            .into_state()
    }

    /// Run to completion and report whether the recursion cap was hit.
    pub async fn run_reporting_outcome(
        &self,
        initial_queries: Vec<Query>,
        initial_k: usize,
        dataset_name: impl Into<String>,
    ) -> RunOutcome {
        let dataset_name = dataset_name.into();
        let total_queries = initial_queries.len();
        let min_cluster_size = self.config.min_cluster_size(total_queries);
        let recursion_limit = self.config.system.recursion_limit;

        info!(total_queries, min_cluster_size, dataset = %dataset_name, "starting cluster run");

        let mut state = State::new(dataset_name, total_queries, min_cluster_size);
        state.tasks.push_back(Task::new(initial_queries, initial_k));

        let high_level_goal = self
            .config
            .runtime
            .high_level_goal
            .clone()
            .unwrap_or_else(|| crate::config::default_high_level_goal().to_string());
        let target_range = self.config.runtime.target_category_range.clone();

        let mut iterations: u32 = 0;
        loop {
            if state.tasks.is_empty() {
                info!(categories = state.categories.len(), "task queue empty, run complete");
                return RunOutcome::Completed(state);
            }
            if iterations >= recursion_limit {
                warn!(
                    recursion_limit,
                    remaining_tasks = state.tasks.len(),
                    "recursion cap reached with tasks still queued"
                );
                return RunOutcome::RecursionCapReached(state);
            }
            iterations += 1;

            let task = state.tasks.pop_front().expect("checked non-empty above");
            let batch = match self.partition_task(&mut state, task).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "partitioner failed for task, dropping it");
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            let reviewed = match self
                .review_batch(&state, batch, &high_level_goal, &target_range)
                .await
            {
                Ok(reviewed) => reviewed,
                Err(e) => {
                    warn!(error = %e, "reviewer exhausted retries for batch, dropping it unresolved");
                    continue;
                }
            };

            dispatch(&mut state, reviewed, self.config.clustering.max_samples_per_cluster);
        }
    }

    async fn partition_task(&self, state: &mut State, task: Task) -> crate::error::Result<Vec<Cluster>> {
        let mut next_id = || state.next_cluster_id();
        self.partitioner
            .partition(task, &mut next_id, self.config.clustering.max_samples_per_cluster)
            .await
    }

    async fn review_batch(
        &self,
        state: &State,
        batch: Vec<Cluster>,
        high_level_goal: &str,
        target_range: &str,
    ) -> crate::error::Result<Vec<Cluster>> {
        let batch_ids: HashSet<ClusterId> = batch.iter().map(|c| c.id.clone()).collect();
        let known_categories: HashSet<CategoryId> = state.categories.keys().cloned().collect();
        let categories: Vec<_> = state.categories_in_order().collect();
        let prompt = build_review_prompt(&categories, &batch, high_level_goal, target_range);

        let decisions = review_with_retry(
            self.reviewer,
            &prompt,
            self.config.llm.max_retries,
            self.config.llm.backoff_base_secs,
            |raw| parse_and_validate(raw, &batch_ids, &known_categories),
        )
        .await?;

        // Every decision may name several cluster ids (a multi-ref create or
        // assign); attach the same decision object to each one so the
        // dispatcher can key off any single cluster in the group.
        let mut decision_by_cluster: std::collections::HashMap<ClusterId, crate::decision::Decision> =
            std::collections::HashMap::new();
        for decision in &decisions {
            for cluster_ref in decision.cluster_refs() {
                decision_by_cluster.insert(cluster_ref.clone(), decision.clone());
            }
        }

        let mut batch = batch;
        for cluster in &mut batch {
            cluster.decision = decision_by_cluster.remove(&cluster.id);
        }
        Ok(batch)
    }
}
