use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("token invalid or expired: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token carries no subject claim")]
    MissingSubject,
}

pub type Result<T> = std::result::Result<T, Error>;
