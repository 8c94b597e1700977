use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("service {0} already registered at this address")]
    AlreadyExists(String),

    #[error("service {0} not found")]
    NotFound(String),

    #[error("discovery cache not ready")]
    Unavailable,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, Error>;
