use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrossQueryError {
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend timed out after {0} ms")]
    BackendTimeout(u64),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrossQueryError>;
