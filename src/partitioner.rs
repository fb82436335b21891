//! The partitioner stage: turns a [`Task`] into a set of
//! [`Cluster`]s via k-means over standardized embedding vectors.
//!
//! Grounded in `original_source/services/clustering_service.py::perform_clustering`:
//! the same `k > len(queries)` clamp, the same fixed seed/`n_init`/`max_iter`
//! constants (translated to linfa's builder), the same "cluster failed, fall
//! back to round-robin" exception handling, and the same sample-extraction
//! cap. `linfa`/`linfa-clustering`/`ndarray` are grounded in
//! `other_examples/manifests/LLM-Dev-Ops-analytics-hub/Cargo.toml`'s `ml`
//! feature set.

use async_trait::async_trait;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::warn;

use crate::error::Result;
use crate::model::{Cluster, ClusterId, Query, Task};

const KMEANS_SEED: u64 = 42;
const KMEANS_N_INIT: usize = 10;
const KMEANS_MAX_ITER: u64 = 300;

/// Splits a [`Task`] into clusters. A seam so tests can substitute a
/// deterministic stub instead of running real k-means.
#[async_trait]
pub trait Partitioner: Send + Sync {
    async fn partition(
        &self,
        task: Task,
        next_id: &mut (dyn FnMut() -> ClusterId + Send),
        max_samples_per_cluster: usize,
    ) -> Result<Vec<Cluster>>;
}

/// Default [`Partitioner`]: standardizes embeddings to zero mean/unit
/// variance, then runs k-means with a fixed seed for reproducibility across
/// runs over the same dataset.
#[derive(Debug, Default)]
pub struct KMeansPartitioner;

impl KMeansPartitioner {
    pub fn new() -> Self {
        Self
    }

    fn cluster_labels(queries: &[Query], k: usize) -> Vec<usize> {
        let embeddings: Array2<f64> = Array2::from_shape_vec(
            (queries.len(), queries[0].embedding.len()),
            queries
                .iter()
                .flat_map(|q| q.embedding.iter().map(|&v| v as f64))
                .collect(),
        )
        .expect("query embeddings are rectangular by construction");

        let standardized = standardize(&embeddings);
        let dataset = DatasetBase::from(standardized);

        let rng = StdRng::seed_from_u64(KMEANS_SEED);
        let result = KMeans::params_with_rng(k, rng)
            .n_runs(KMEANS_N_INIT)
            .max_n_iterations(KMEANS_MAX_ITER)
            .fit(&dataset);

        match result {
            Ok(model) => model.predict(&dataset).to_vec(),
            Err(e) => {
                warn!(error = %e, "k-means fit failed, falling back to round-robin assignment");
                round_robin_labels(queries.len(), k)
            }
        }
    }
}

fn standardize(embeddings: &Array2<f64>) -> Array2<f64> {
    let mean = embeddings.mean_axis(Axis(0)).unwrap();
    let std: Array1<f64> = embeddings.std_axis(Axis(0), 0.0).mapv(|v| if v == 0.0 { 1.0 } else { v });
    (embeddings - &mean) / &std
}

fn round_robin_labels(n: usize, k: usize) -> Vec<usize> {
    (0..n).map(|i| i % k.max(1)).collect()
}

fn extract_samples(queries: &[Query], max_samples: usize, rng: &mut impl rand::Rng) -> Vec<String> {
    if queries.len() <= max_samples {
        return queries.iter().map(|q| q.content.clone()).collect();
    }
    let mut indices: Vec<usize> = (0..queries.len()).collect();
    indices.shuffle(rng);
    indices
        .into_iter()
        .take(max_samples)
        .map(|i| queries[i].content.clone())
        .collect()
}

#[async_trait]
impl Partitioner for KMeansPartitioner {
    async fn partition(
        &self,
        task: Task,
        next_id: &mut (dyn FnMut() -> ClusterId + Send),
        max_samples_per_cluster: usize,
    ) -> Result<Vec<Cluster>> {
        if task.queries.is_empty() {
            return Ok(Vec::new());
        }

        let k = task.k_value.min(task.queries.len()).max(1);
        let labels = Self::cluster_labels(&task.queries, k);

        let mut buckets: Vec<Vec<Query>> = vec![Vec::new(); k];
        for (query, label) in task.queries.into_iter().zip(labels) {
            buckets[label].push(query);
        }

        let mut rng = rand::thread_rng();
        let clusters = buckets
            .into_iter()
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| {
                let samples = extract_samples(&bucket, max_samples_per_cluster, &mut rng);
                Cluster::new(next_id(), bucket, samples)
            })
            .collect();

        Ok(clusters)
    }
}
