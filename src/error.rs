use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("a group named '{0}' already exists")]
    DuplicateName(String),

    #[error("group {0} already has an administrator")]
    DuplicateAdministrator(Uuid),

    #[error("group {0} has no administrator")]
    NoAdministrator(Uuid),

    #[error("group access has to be either PUBLIC or PRIVATE, got '{0}'")]
    InvalidAccessMode(String),

    #[error("user is already a member of this group")]
    AlreadyMember,

    #[error("a membership request for this group has already been sent")]
    DuplicateRequest,

    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Cache(err.to_string())
    }
}
