use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc call failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
