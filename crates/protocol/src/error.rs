use thiserror::Error;

/// Errors that can occur while encoding or decoding a wire frame.
#[derive(Debug, Error)]
pub enum Error {
    #[error("frame header truncated: need 10 bytes, got {0}")]
    ShortHeader(usize),

    #[error("frame exceeds max size {max}: var_header={var_header_len}, body={body_len}")]
    TooLarge {
        max: u32,
        var_header_len: u32,
        body_len: u32,
    },

    #[error("unknown message type {0}")]
    UnknownMsgType(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to decode body: {0}")]
    Decode(#[from] prost::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
