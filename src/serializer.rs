//! Result serialization: writes the final `State` as a
//! flat per-query CSV plus a per-category JSON summary.
//!
//! The original system has no single serializer module — each caller wrote
//! its own pandas `to_csv`/`to_json`. Grounded in the `csv` crate's tabular
//! output convention and `background.rs`'s use of `chrono` for run
//! timestamps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::model::State;

const MAX_SUMMARY_SAMPLES: usize = 5;

#[derive(Debug, Serialize)]
struct QueryRow<'a> {
    query_id: &'a str,
    query_content: &'a str,
    category_id: &'a str,
    category_description: &'a str,
    dataset: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CategorySummary<'a> {
    category_id: &'a str,
    description: &'a str,
    query_count: usize,
    samples: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    dataset: &'a str,
    total_queries: usize,
    category_count: usize,
    generated_at: DateTime<Utc>,
    categories: Vec<CategorySummary<'a>>,
}

/// Writes `<output_dir>/<dataset>_queries.csv` and
/// `<output_dir>/<dataset>_summary.json` for a finished run.
pub struct ResultSerializer;

impl ResultSerializer {
    pub fn write(state: &State, output_dir: &Path, generated_at: DateTime<Utc>) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        Self::write_csv(state, output_dir, generated_at)?;
        Self::write_summary(state, output_dir, generated_at)?;
        Ok(())
    }

    fn write_csv(state: &State, output_dir: &Path, generated_at: DateTime<Utc>) -> Result<()> {
        let path = output_dir.join(format!("{}_queries.csv", state.dataset_name));
        let mut writer = csv::Writer::from_path(path)?;
        for category in state.categories_in_order() {
            for query in &category.queries {
                writer.serialize(QueryRow {
                    query_id: &query.id,
                    query_content: &query.content,
                    category_id: category.id.as_str(),
                    category_description: &category.description,
                    dataset: &state.dataset_name,
                    timestamp: generated_at,
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn write_summary(state: &State, output_dir: &Path, generated_at: DateTime<Utc>) -> Result<()> {
        let categories: Vec<CategorySummary> = state
            .categories_in_order()
            .map(|category| CategorySummary {
                category_id: category.id.as_str(),
                description: &category.description,
                query_count: category.query_count(),
                samples: category.samples.iter().take(MAX_SUMMARY_SAMPLES).map(String::as_str).collect(),
            })
            .collect();

        let summary = RunSummary {
            dataset: &state.dataset_name,
            total_queries: state.total_queries,
            category_count: categories.len(),
            generated_at,
            categories,
        };

        let path = output_dir.join(format!("{}_summary.json", state.dataset_name));
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, CategoryId, Query};
    use tempfile::tempdir;

    fn sample_state() -> State {
        let mut state = State::new("banking77", 3, 10);
        let mut category = Category::new(CategoryId::nth(1), "Password resets");
        category.extend(
            vec![
                Query::new("q1", "reset my password", vec![0.0]),
                Query::new("q2", "forgot password", vec![0.0]),
            ],
            vec!["reset my password".to_string()],
            10,
        );
        state.insert_category(category);
        state
    }

    #[test]
    fn writes_csv_with_one_row_per_query() {
        let dir = tempdir().unwrap();
        let state = sample_state();
        ResultSerializer::write(&state, dir.path(), Utc::now()).unwrap();

        let csv_path = dir.path().join("banking77_queries.csv");
        let content = std::fs::read_to_string(csv_path).unwrap();
        assert_eq!(content.lines().count(), 3); // header + 2 rows
        assert!(content.contains("CAT-001"));
    }

    #[test]
    fn writes_summary_json_with_capped_samples() {
        let dir = tempdir().unwrap();
        let state = sample_state();
        ResultSerializer::write(&state, dir.path(), Utc::now()).unwrap();

        let summary_path = dir.path().join("banking77_summary.json");
        let content = std::fs::read_to_string(summary_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["category_count"], 1);
        assert_eq!(parsed["categories"][0]["category_id"], "CAT-001");
    }
}
