//! Music publish pipeline: a resumable, multi-stage job state machine
//! (staging -> preflight -> anchor -> metadata -> register -> finalize).

pub mod chain;
pub mod handlers;
pub mod ids;
pub mod model;
pub mod policy;
pub mod store;
pub mod uploader;

pub use model::{JobStatus, PublishJob};
pub use store::{PublishJobStore, SqlitePublishJobStore};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid state transition: {0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Gone(String),
    #[error(transparent)]
    Uploader(#[from] uploader::UploaderError),
    #[error(transparent)]
    Chain(#[from] chain::ChainError),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
    #[error("{0}")]
    Internal(String),
}
