//! LLM-guided hierarchical intent clustering over embedded query corpora.
//!
//! The crate implements the partition -> review -> dispatch loop described
//! in `SPEC_FULL.md`: [`partitioner`] splits a query set with k-means,
//! [`llm`] asks a model to judge the resulting clusters via a structured XML
//! protocol ([`decision`]), and [`dispatcher`] applies those decisions to a
//! running [`model::State`]. [`engine`] drives the cycle to completion or to
//! a configured recursion cap.

pub mod config;
pub mod dataset;
pub mod decision;
pub mod dispatcher;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod llm;
pub mod model;
pub mod partitioner;
pub mod prompt;
pub mod serializer;

pub use config::Config;
pub use engine::{ClusterEngine, RunOutcome};
pub use error::{Error, Result};
pub use model::{Category, CategoryId, Cluster, ClusterId, Query, State, Task};
