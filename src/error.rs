use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    #[error("Worker Pool Error: {0}")]
    Pool(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
