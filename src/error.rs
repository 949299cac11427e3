//! Error taxonomy shared by the registry, check and metrics paths.
//!
//! An unreachable endpoint is not an error: it is a DOWN check result.

use std::sync::Arc;
use thiserror::Error;

use crate::db::DbError;
use crate::probe::ProbeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("URL not found")]
    NotFound,
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    #[error("check execution failed: {0}")]
    Execution(#[from] ProbeError),
    #[error("storage error: {0}")]
    Store(DbError),
    #[error("storing check result failed: {0}")]
    Persist(Arc<DbError>),
    #[error("check task ended without a result")]
    Aborted,
}

impl From<DbError> for Error {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => Error::NotFound,
            other => Error::Store(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
