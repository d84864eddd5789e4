use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EventDataError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Persistence(#[from] StoreError),
    #[error("validation failed: {0}")]
    Validation(String),
}
