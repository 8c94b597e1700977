//! The wire codec: a fixed 10-byte header plus two variable-length regions,
//! used for every frame exchanged between a client and an IM Gateway over a
//! plain TCP stream.
//!
//! ```text
//!  byte 0      version
//!  byte 1      msg_type
//!  bytes 2..5  var_header_len  (u32, big-endian)
//!  bytes 6..9  body_len        (u32, big-endian)
//!  bytes 10..  var_header, then body
//! ```
//!
//! Body payloads are protobuf-encoded; see `proto/frame.proto`. The fixed
//! header itself is hand-rolled, never protobuf.

pub mod error;

pub use error::{Error, Result};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Generated protobuf message types for every frame body.
pub mod body {
    include!(concat!(env!("OUT_DIR"), "/imcore.protocol.rs"));
}

/// Current (and only) wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size in bytes of the fixed header.
pub const HEADER_LEN: usize = 10;

/// Default ceiling on `var_header_len + body_len`, to bound allocation for a
/// single frame. Callers that need a different limit should use
/// [`read_frame_with_limit`].
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// The six message types defined by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    MessageUpLink = 1,
    MessageDownLink = 2,
    OpenSession = 3,
    JoinSession = 4,
    LeaveSession = 5,
    CreateConn = 6,
}

impl MsgType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::MessageUpLink),
            2 => Ok(Self::MessageDownLink),
            3 => Ok(Self::OpenSession),
            4 => Ok(Self::JoinSession),
            5 => Ok(Self::LeaveSession),
            6 => Ok(Self::CreateConn),
            other => Err(Error::UnknownMsgType(other)),
        }
    }
}

/// A single decoded (or to-be-encoded) wire frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u8,
    pub msg_type: u8,
    pub var_header: Vec<u8>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Build a frame with the current protocol version and an empty
    /// variable header, the shape every message type currently uses.
    pub fn new(msg_type: MsgType, body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type.as_u8(),
            var_header: Vec::new(),
            body,
        }
    }

    pub fn msg_type(&self) -> Result<MsgType> {
        MsgType::try_from(self.msg_type)
    }

    /// Serialize to the exact `10 + var_header.len() + body.len()` bytes
    /// this frame occupies on the wire.
    pub fn encode(&self) -> Vec<u8> {
        encode_raw(self.version, self.msg_type, &self.var_header, &self.body)
    }
}

/// Build the raw bytes for a frame from its constituent parts.
pub fn encode_raw(version: u8, msg_type: u8, var_header: &[u8], body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + var_header.len() + body.len());
    buf.push(version);
    buf.push(msg_type);
    buf.extend_from_slice(&(var_header.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(var_header);
    buf.extend_from_slice(body);
    buf
}

struct Header {
    version: u8,
    msg_type: u8,
    var_header_len: u32,
    body_len: u32,
}

fn decode_header(buf: &[u8; HEADER_LEN]) -> Header {
    Header {
        version: buf[0],
        msg_type: buf[1],
        var_header_len: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        body_len: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
    }
}

/// Read the fixed header, distinguishing a clean close (no bytes read
/// before EOF) from a connection that dies mid-header.
async fn read_header<R>(reader: &mut R) -> Result<Header>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    let mut filled = 0usize;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
            }
            return Err(Error::ShortHeader(filled));
        }
        filled += n;
    }

    let header = decode_header(&header_buf);
    if header.version != PROTOCOL_VERSION {
        return Err(Error::UnsupportedVersion(header.version));
    }
    Ok(header)
}

/// Read one frame from an async byte stream, using [`DEFAULT_MAX_FRAME_BYTES`]
/// as the size cap.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    read_frame_with_limit(reader, DEFAULT_MAX_FRAME_BYTES).await
}

/// Read one frame from an async byte stream, capping `var_header_len + body_len`
/// at `max_frame_bytes`.
pub async fn read_frame_with_limit<R>(reader: &mut R, max_frame_bytes: u32) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(reader).await?;

    if header
        .var_header_len
        .checked_add(header.body_len)
        .is_none_or(|total| total > max_frame_bytes)
    {
        return Err(Error::TooLarge {
            max: max_frame_bytes,
            var_header_len: header.var_header_len,
            body_len: header.body_len,
        });
    }

    let mut var_header = vec![0u8; header.var_header_len as usize];
    reader.read_exact(&mut var_header).await?;

    let mut body = vec![0u8; header.body_len as usize];
    reader.read_exact(&mut body).await?;

    Ok(Frame {
        version: header.version,
        msg_type: header.msg_type,
        var_header,
        body,
    })
}

/// Write a frame to an async byte stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_raw_produces_exact_length() {
        let bytes = encode_raw(PROTOCOL_VERSION, MsgType::MessageUpLink.as_u8(), &[], b"hello");
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], MsgType::MessageUpLink.as_u8());
    }

    #[test]
    fn header_fields_are_big_endian() {
        let bytes = encode_raw(1, 1, &[1, 2, 3], b"ab");
        assert_eq!(u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]), 3);
        assert_eq!(u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]), 2);
    }

    #[tokio::test]
    async fn round_trip_through_async_stream() {
        let frame = Frame::new(MsgType::CreateConn, b"token-bytes".to_vec());
        let bytes = frame.encode();

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = read_frame(&mut cursor).await.unwrap();

        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.msg_type().unwrap(), MsgType::CreateConn);
        assert_eq!(decoded.body, b"token-bytes");
    }

    #[tokio::test]
    async fn short_header_is_rejected() {
        let mut cursor = std::io::Cursor::new(vec![1, 2, 3]);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::ShortHeader(3)));
    }

    #[tokio::test]
    async fn clean_close_before_any_bytes_is_io_error() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let bytes = encode_raw(PROTOCOL_VERSION + 1, 1, &[], b"ab");
        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(v) if v == PROTOCOL_VERSION + 1));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let bytes = encode_raw(1, 1, &[], &[0u8; 16]);
        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_frame_with_limit(&mut cursor, 4).await.unwrap_err();
        assert!(matches!(err, Error::TooLarge { .. }));
    }

    #[test]
    fn unknown_msg_type_is_rejected() {
        let err = MsgType::try_from(99).unwrap_err();
        assert!(matches!(err, Error::UnknownMsgType(99)));
    }
}
