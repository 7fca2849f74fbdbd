use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Column serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<StoreError> for litfeed_common::LitfeedError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(d) => litfeed_common::LitfeedError::Store(d),
            StoreError::Serde(s) => litfeed_common::LitfeedError::Serialization(s),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
