use thiserror::Error;

pub mod audit;
pub mod session;

pub use audit::{SqlAuditRepository, SqlAuditSink};
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}
