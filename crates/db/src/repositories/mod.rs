use thiserror::Error;

use wexu_core::catalog::CatalogError;
use wexu_core::ledger::LedgerError;

pub mod memory;
pub mod transaction;
pub mod user;

pub use memory::InMemoryUserRepository;
pub use transaction::SqlTransactionRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for LedgerError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(value: RepositoryError) -> Self {
        Self::Counter(value.to_string())
    }
}
