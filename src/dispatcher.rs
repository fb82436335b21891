//! The dispatcher stage: applies each reviewed [`Decision`]
//! to [`State`], exactly once per unique decision so a multi-ref `create`/
//! `assign` is not double-applied.
//!
//! Grounded in `original_source/core/tools.py`'s three tool functions
//! (`create_new_category_tool`, `assign_to_existing_tool`,
//! `subdivide_task_tool`), including the trash-category rule: a cluster
//! below `min_cluster_size` that still needs subdividing is semantically
//! incoherent and goes to `TRASH_CATEGORY` instead of spawning a new task.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::decision::Decision;
use crate::model::{Category, CategoryId, Cluster, ClusterId, State, Task};

const TRASH_DESCRIPTION: &str = "Semantically incoherent cluster - queries that could not be \
     further classified.\nTypical examples: miscellaneous, off-topic, or unintelligible queries.";

/// Apply every cluster's decision in `batch` to `state`, consuming the
/// batch, in the order clusters appear in `batch` (for each multi-ref
/// decision, the cluster holding its leading ref determines where in that
/// order the decision runs). Category ids are handed out in this same
/// order, so which cluster becomes `CAT-001` vs `CAT-002` is determined by
/// batch order, not by hash iteration. `max_samples_per_cluster` caps the
/// representative-sample list a category retains.
pub fn dispatch(state: &mut State, batch: Vec<Cluster>, max_samples_per_cluster: usize) {
    let max_samples = max_samples_per_cluster;

    let mut applied: Vec<ClusterId> = Vec::new();
    let mut decisions: Vec<Decision> = Vec::new();
    for cluster in &batch {
        if let Some(decision) = &cluster.decision {
            if !applied.contains(decision.leading_ref()) {
                applied.push(decision.leading_ref().clone());
                decisions.push(decision.clone());
            }
        }
    }

    let mut by_id: HashMap<ClusterId, Cluster> =
        batch.into_iter().map(|c| (c.id.clone(), c)).collect();

    for decision in decisions {
        let refs: Vec<ClusterId> = decision.cluster_refs().into_iter().cloned().collect();
        let clusters: Vec<Cluster> = refs
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        if clusters.is_empty() {
            warn!("decision referenced no remaining clusters in batch, skipping");
            continue;
        }

        match decision {
            Decision::Create { description, .. } => apply_create(state, clusters, description, max_samples),
            Decision::Assign {
                target_id,
                description_update,
                ..
            } => apply_assign(state, clusters, target_id, description_update, max_samples),
            Decision::Subdivide { k_value, .. } => {
                apply_subdivide(state, clusters.into_iter().next().unwrap(), k_value)
            }
        }
    }
}

fn apply_create(state: &mut State, clusters: Vec<Cluster>, description: String, max_samples: usize) {
    let id = state.next_category_id();
    let mut category = Category::new(id.clone(), description);
    for cluster in clusters {
        category.extend(cluster.queries, cluster.samples, max_samples);
    }
    let query_count = category.query_count();
    state.insert_category(category);
    info!(category = %id, queries = query_count, "created category");
}

fn apply_assign(
    state: &mut State,
    clusters: Vec<Cluster>,
    target_id: CategoryId,
    description_update: Option<String>,
    max_samples: usize,
) {
    let Some(category) = state.categories.get_mut(&target_id) else {
        warn!(target = %target_id, "assign decision targets a category no longer present, dropping");
        return;
    };
    for cluster in clusters {
        category.extend(cluster.queries, cluster.samples, max_samples);
    }
    if let Some(description) = description_update {
        category.description = description;
    }
    info!(target = %target_id, queries = category.query_count(), "assigned to category");
}

fn apply_subdivide(state: &mut State, cluster: Cluster, k_value: usize) {
    if cluster.query_count() < state.min_cluster_size {
        warn!(
            cluster = %cluster.id,
            size = cluster.query_count(),
            floor = state.min_cluster_size,
            "cluster below minimum size still requires subdivision, routing to trash category"
        );
        route_to_trash(state, cluster);
        return;
    }

    info!(cluster = %cluster.id, k_value, "queuing subdivision task");
    state.tasks.push_back(Task::new(cluster.queries, k_value));
}

fn route_to_trash(state: &mut State, cluster: Cluster) {
    let trash_id = CategoryId::trash();
    if !state.categories.contains_key(&trash_id) {
        state.insert_category(Category::new(trash_id.clone(), TRASH_DESCRIPTION));
    }
    let trash = state.categories.get_mut(&trash_id).expect("just inserted");
    trash.queries.extend(cluster.queries);
    trash.samples.extend(cluster.samples);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Query;

    fn query(id: &str) -> Query {
        Query::new(id, format!("content {id}"), vec![0.0])
    }

    fn cluster_with(id: ClusterId, n: usize, decision: Decision) -> Cluster {
        let mut c = Cluster::new(id, (0..n).map(|i| query(&format!("q{i}"))).collect(), vec![]);
        c.decision = Some(decision);
        c
    }

    #[test]
    fn create_merges_multiple_clusters_into_one_category() {
        let mut state = State::new("ds", 10, 10);
        let id_a = state.next_cluster_id();
        let id_b = state.next_cluster_id();
        let decision = Decision::Create {
            cluster_refs: vec![id_a.clone(), id_b.clone()],
            description: "merged".to_string(),
        };
        let batch = vec![
            cluster_with(id_a, 3, decision.clone()),
            cluster_with(id_b, 4, decision),
        ];
        dispatch(&mut state, batch, 10);

        assert_eq!(state.categories.len(), 1);
        let category = state.categories.values().next().unwrap();
        assert_eq!(category.query_count(), 7);
    }

    #[test]
    fn assign_updates_description_when_provided() {
        let mut state = State::new("ds", 10, 10);
        let cat_id = state.next_category_id();
        state.insert_category(Category::new(cat_id.clone(), "old desc"));
        let cluster_id = state.next_cluster_id();
        let decision = Decision::Assign {
            cluster_refs: vec![cluster_id.clone()],
            target_id: cat_id.clone(),
            description_update: Some("new desc".to_string()),
        };
        let batch = vec![cluster_with(cluster_id, 2, decision)];
        dispatch(&mut state, batch, 10);

        let category = state.categories.get(&cat_id).unwrap();
        assert_eq!(category.description, "new desc");
        assert_eq!(category.query_count(), 2);
    }

    #[test]
    fn assign_with_no_update_preserves_description() {
        let mut state = State::new("ds", 10, 10);
        let cat_id = state.next_category_id();
        state.insert_category(Category::new(cat_id.clone(), "stays"));
        let cluster_id = state.next_cluster_id();
        let decision = Decision::Assign {
            cluster_refs: vec![cluster_id.clone()],
            target_id: cat_id.clone(),
            description_update: None,
        };
        let batch = vec![cluster_with(cluster_id, 1, decision)];
        dispatch(&mut state, batch, 10);
        assert_eq!(state.categories.get(&cat_id).unwrap().description, "stays");
    }

    #[test]
    fn subdivide_above_floor_queues_a_new_task() {
        let mut state = State::new("ds", 10, 5);
        let cluster_id = state.next_cluster_id();
        let decision = Decision::Subdivide {
            cluster_ref: cluster_id.clone(),
            k_value: 3,
        };
        let batch = vec![cluster_with(cluster_id, 8, decision)];
        dispatch(&mut state, batch, 10);

        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].k_value, 3);
        assert_eq!(state.tasks[0].queries.len(), 8);
    }

    #[test]
    fn subdivide_below_floor_routes_to_trash() {
        let mut state = State::new("ds", 10, 5);
        let cluster_id = state.next_cluster_id();
        let decision = Decision::Subdivide {
            cluster_ref: cluster_id.clone(),
            k_value: 3,
        };
        let batch = vec![cluster_with(cluster_id, 2, decision)];
        dispatch(&mut state, batch, 10);

        assert!(state.tasks.is_empty());
        let trash = state.categories.get(&CategoryId::trash()).unwrap();
        assert_eq!(trash.query_count(), 2);
    }

    #[test]
    fn repeated_trash_routing_accumulates_in_one_category() {
        let mut state = State::new("ds", 10, 5);
        for _ in 0..2 {
            let cluster_id = state.next_cluster_id();
            let decision = Decision::Subdivide {
                cluster_ref: cluster_id.clone(),
                k_value: 2,
            };
            let batch = vec![cluster_with(cluster_id, 1, decision)];
            dispatch(&mut state, batch, 10);
        }
        assert_eq!(state.categories.len(), 1);
        assert_eq!(
            state.categories.get(&CategoryId::trash()).unwrap().query_count(),
            2
        );
    }

    #[test]
    fn query_conservation_holds_across_mixed_batch() {
        let mut state = State::new("ds", 10, 10);
        let create_a = state.next_cluster_id();
        let assign_target = state.next_category_id();
        state.insert_category(Category::new(assign_target.clone(), "target"));
        let assign_cluster = state.next_cluster_id();
        let subdivide_cluster = state.next_cluster_id();

        let batch = vec![
            cluster_with(
                create_a.clone(),
                3,
                Decision::Create {
                    cluster_refs: vec![create_a],
                    description: "d".to_string(),
                },
            ),
            cluster_with(
                assign_cluster.clone(),
                2,
                Decision::Assign {
                    cluster_refs: vec![assign_cluster],
                    target_id: assign_target,
                    description_update: None,
                },
            ),
            cluster_with(
                subdivide_cluster.clone(),
                20,
                Decision::Subdivide {
                    cluster_ref: subdivide_cluster,
                    k_value: 2,
                },
            ),
        ];

        let before: usize = batch.iter().map(|c| c.query_count()).sum();
        dispatch(&mut state, batch, 10);
        assert_eq!(state.total_tracked_queries(), before);
    }
}
