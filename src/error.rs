use thiserror::Error;

/// Error taxonomy shared by the scheduling and publishing operations.
///
/// `Remote` failures raised while executing a post are recorded on the post
/// record and returned as a failure outcome; they never propagate out of the
/// worker sweep.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("remote service error: {0}")]
    Remote(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("blob store error: {0}")]
    Blob(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }
}
