//! Dataset loading and the embedding cache.
//!
//! Grounded in `original_source/services/embedding_service.py`'s
//! `save_embeddings`/`load_embeddings`: a metadata sidecar plus a raw vector
//! blob, checked before falling back to the embedding provider. The
//! original keeps three artifacts (a pandas CSV, an `.npz` blob, and a
//! pickle "complete backup"); we collapse that to two files — a JSON
//! metadata sidecar (`id`, `content`) and a raw little-endian `f32` vector
//! blob — since Rust has no pickle-equivalent and a third redundant copy
//! buys nothing here (see `DESIGN.md`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::model::Query;

/// Produces the embedded queries for a named dataset. A seam so tests can
/// substitute an in-memory fixture instead of touching the filesystem or an
/// embedding API.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, dataset_name: &str) -> Result<Vec<Query>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataRecord {
    id: String,
    content: String,
}

/// Reads raw `(id, content)` pairs from a dataset file, embeds them through
/// an [`EmbeddingProvider`], and caches the result so a re-run over the same
/// dataset skips the embedding call entirely.
pub struct CachedDatasetLoader<'a> {
    source_dir: PathBuf,
    cache_dir: PathBuf,
    embedder: &'a dyn EmbeddingProvider,
}

impl<'a> CachedDatasetLoader<'a> {
    pub fn new(source_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self {
            source_dir: source_dir.into(),
            cache_dir: cache_dir.into(),
            embedder,
        }
    }

    fn metadata_path(&self, dataset_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{dataset_name}_metadata.json"))
    }

    fn vectors_path(&self, dataset_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{dataset_name}_vectors.bin"))
    }

    fn source_path(&self, dataset_name: &str) -> PathBuf {
        self.source_dir.join(format!("{dataset_name}.json"))
    }

    fn read_cache(&self, dataset_name: &str) -> Result<Option<Vec<Query>>> {
        let metadata_path = self.metadata_path(dataset_name);
        let vectors_path = self.vectors_path(dataset_name);
        if !metadata_path.exists() || !vectors_path.exists() {
            return Ok(None);
        }

        let metadata_raw = std::fs::read_to_string(&metadata_path)?;
        let records: Vec<MetadataRecord> = serde_json::from_str(&metadata_raw)?;
        let vector_bytes = std::fs::read(&vectors_path)?;

        if records.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let dim = (vector_bytes.len() / records.len()) / 4;
        if dim == 0 || vector_bytes.len() != records.len() * dim * 4 {
            return Err(Error::DatasetLoad {
                message: format!("cache for {dataset_name} has a malformed vector blob"),
            });
        }

        let mut queries = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            let start = i * dim * 4;
            let embedding = vector_bytes[start..start + dim * 4]
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            queries.push(Query::new(record.id, record.content, embedding));
        }
        Ok(Some(queries))
    }

    fn write_cache(&self, dataset_name: &str, queries: &[Query]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let records: Vec<MetadataRecord> = queries
            .iter()
            .map(|q| MetadataRecord {
                id: q.id.clone(),
                content: q.content.clone(),
            })
            .collect();
        std::fs::write(self.metadata_path(dataset_name), serde_json::to_string(&records)?)?;

        let mut blob = Vec::new();
        for query in queries {
            for value in &query.embedding {
                blob.extend_from_slice(&value.to_le_bytes());
            }
        }
        std::fs::write(self.vectors_path(dataset_name), blob)?;
        Ok(())
    }

    fn read_source(&self, dataset_name: &str) -> Result<Vec<MetadataRecord>> {
        let path = self.source_path(dataset_name);
        if !path.exists() {
            return Err(Error::DatasetLoad {
                message: format!("no source file found for dataset {dataset_name} at {}", path.display()),
            });
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(Error::from)
    }
}

#[async_trait]
impl<'a> DatasetLoader for CachedDatasetLoader<'a> {
    async fn load(&self, dataset_name: &str) -> Result<Vec<Query>> {
        if let Some(cached) = self.read_cache(dataset_name)? {
            return Ok(cached);
        }

        let records = self.read_source(dataset_name)?;
        let contents: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let embeddings = self.embedder.embed(&contents).await?;
        if embeddings.len() != records.len() {
            return Err(Error::DatasetLoad {
                message: format!(
                    "embedding provider returned {} vectors for {} queries",
                    embeddings.len(),
                    records.len()
                ),
            });
        }

        let queries: Vec<Query> = records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| Query::new(record.id, record.content, embedding))
            .collect();

        self.write_cache(dataset_name, &queries)?;
        Ok(queries)
    }
}

/// Sample `sample_size` queries without replacement, matching
/// `random.sample` in `original_source/services/clustering_service.py` in
/// spirit: used by the CLI to honor `runtime.sample_size`.
pub fn subsample(mut queries: Vec<Query>, sample_size: Option<usize>) -> Vec<Query> {
    use rand::seq::SliceRandom;
    match sample_size {
        Some(n) if n < queries.len() => {
            queries.shuffle(&mut rand::thread_rng());
            queries.truncate(n);
            queries
        }
        _ => queries,
    }
}
