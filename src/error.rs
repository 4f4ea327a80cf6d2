use thiserror::Error;

/// Failures that can surface from the catalog pipeline.
///
/// A lookup miss is not represented here; `CatalogStore::get_movie` returns `Option`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("transport error: {cause}")]
    Transport { cause: String },

    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("persistence error: {cause}")]
    Persistence { cause: String },
}

impl CatalogError {
    pub fn transport(cause: impl ToString) -> Self {
        CatalogError::Transport {
            cause: cause.to_string(),
        }
    }

    pub fn malformed(reason: impl ToString) -> Self {
        CatalogError::MalformedResponse {
            reason: reason.to_string(),
        }
    }

    pub fn persistence(cause: impl ToString) -> Self {
        CatalogError::Persistence {
            cause: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::malformed(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::persistence(err)
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
