use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset load failed: {message}")]
    DatasetLoad { message: String },

    #[error("embedding provider failed: {message}")]
    Embedding { message: String },

    #[error("partitioner failed: {message}")]
    Partitioner { message: String },

    #[error("LLM transport timed out after {0:?}")]
    TransportTimeout(std::time::Duration),

    #[error("LLM transport rate-limited: {message}")]
    TransportRateLimited { message: String },

    #[error("LLM transport error: {message}")]
    Transport { message: String },

    #[error("decision set invalid: {message}")]
    DecisionInvalid { message: String },

    #[error("unknown target_id in assign decision: {target_id}")]
    UnknownTargetId { target_id: String },

    #[error("reviewer exhausted {attempts} retries, last error: {last_error}")]
    ReviewerExhausted { attempts: u32, last_error: String },
}

pub type Result<T> = std::result::Result<T, Error>;
