//! Core entity types: `Query`, `Task`, `Cluster`, `Category`,
//! and the loop-global `State`. Plain data plus small mutators, mirroring
//! `agent-orchestrator/src/background.rs`'s `BackgroundTask`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A single embedded query. Read-only after the loader creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl Query {
    pub fn new(id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
        }
    }
}

/// A deferred partition job: a query set plus a target `k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub queries: Vec<Query>,
    pub k_value: usize,
}

impl Task {
    pub fn new(queries: Vec<Query>, k_value: usize) -> Self {
        Self { queries, k_value }
    }
}

/// Unique identifier for a cluster, monotonically assigned within a run and
/// never reused after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn from_counter(n: u64) -> Self {
        Self(format!("cluster-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build an id from a raw string rather than the monotonic counter —
    /// used when parsing LLM output, which echoes back ids minted earlier
    /// this run.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a finalized category: either `CAT-NNN` or the reserved
/// `TRASH_CATEGORY` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(String);

pub const TRASH_CATEGORY_ID: &str = "TRASH_CATEGORY";

impl CategoryId {
    /// The N-th created category receives `CAT-<N zero-padded to 3>`.
    /// `n` is 1-indexed (the first category is `CAT-001`).
    pub fn nth(n: u64) -> Self {
        Self(format!("CAT-{n:03}"))
    }

    pub fn trash() -> Self {
        Self(TRASH_CATEGORY_ID.to_string())
    }

    pub fn is_trash(&self) -> bool {
        self.0 == TRASH_CATEGORY_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient partition output awaiting a decision. `decision` is attached
/// exactly once by the reviewer stage before the dispatcher consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub queries: Vec<Query>,
    pub samples: Vec<String>,
    pub decision: Option<crate::decision::Decision>,
}

impl Cluster {
    pub fn new(id: ClusterId, queries: Vec<Query>, samples: Vec<String>) -> Self {
        Self {
            id,
            queries,
            samples,
            decision: None,
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }
}

/// A finalized semantic class. Never deleted once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub description: String,
    pub queries: Vec<Query>,
    pub samples: Vec<String>,
}

impl Category {
    pub fn new(id: CategoryId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            queries: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn extend(&mut self, queries: Vec<Query>, samples: Vec<String>, max_samples: usize) {
        self.queries.extend(queries);
        self.samples.extend(samples);
        self.samples.truncate(max_samples);
    }
}

/// Loop-global workspace mutated in place by each stage. Single-threaded,
/// owned by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub tasks: VecDeque<Task>,
    pub categories: HashMap<CategoryId, Category>,
    /// Insertion order of `categories`, since `HashMap` does not preserve it
    /// and the result serializer must emit `CAT-001, CAT-002, ...` in order.
    pub category_order: Vec<CategoryId>,
    pub batch: Vec<Cluster>,
    pub dataset_name: String,
    pub total_queries: usize,
    pub min_cluster_size: usize,
    next_category_seq: u64,
    next_cluster_seq: u64,
}

impl State {
    pub fn new(dataset_name: impl Into<String>, total_queries: usize, min_cluster_size: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            categories: HashMap::new(),
            category_order: Vec::new(),
            batch: Vec::new(),
            dataset_name: dataset_name.into(),
            total_queries,
            min_cluster_size,
            next_category_seq: 0,
            next_cluster_seq: 0,
        }
    }

    pub fn next_cluster_id(&mut self) -> ClusterId {
        self.next_cluster_seq += 1;
        ClusterId::from_counter(self.next_cluster_seq)
    }

    pub fn next_category_id(&mut self) -> CategoryId {
        self.next_category_seq += 1;
        CategoryId::nth(self.next_category_seq)
    }

    pub fn insert_category(&mut self, category: Category) {
        let id = category.id.clone();
        if !self.categories.contains_key(&id) {
            self.category_order.push(id.clone());
        }
        self.categories.insert(id, category);
    }

    pub fn categories_in_order(&self) -> impl Iterator<Item = &Category> {
        self.category_order
            .iter()
            .filter_map(move |id| self.categories.get(id))
    }

    /// Sum of queries across every queued task, the current batch, and every
    /// finalized category. Used only by tests to check the no-loss
    /// invariant — not a runtime feature.
    #[cfg(test)]
    pub fn total_tracked_queries(&self) -> usize {
        let queued: usize = self.tasks.iter().map(|t| t.queries.len()).sum();
        let batched: usize = self.batch.iter().map(|c| c.queries.len()).sum();
        let categorized: usize = self.categories.values().map(|c| c.queries.len()).sum();
        queued + batched + categorized
    }
}
