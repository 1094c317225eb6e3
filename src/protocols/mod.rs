//! Gateway protocol implementations.
//!
//! Each transport has a codec module and a connection handler driven by
//! the server accept loop (or, for CGI, by the one-shot entry point).
//!
//! - `fcgi`: FastCGI responder, sequential requests per connection
//! - `scgi`: SCGI, one request per connection
//! - `cgi`: one request over inherited standard streams

pub mod cgi;
pub mod fcgi;
pub mod scgi;

/// Cap on a buffered request body, shared by all transports.
pub(crate) const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while speaking a gateway protocol.
///
/// A connection that produces one of these is closed without a response;
/// the listener keeps accepting. In CGI mode the process exits non-zero.
#[derive(Debug)]
pub enum ProtocolError {
    /// FastCGI record with an unsupported version byte.
    UnsupportedVersion(u8),
    /// Record content exceeds the 16-bit length field.
    OversizedRecord(usize),
    /// Structurally invalid framing (truncated pairs, short record body).
    Malformed(String),
    /// Malformed SCGI netstring length prefix or terminator.
    InvalidNetstring(String),
    /// SCGI header block without a leading CONTENT_LENGTH pair.
    MissingContentLength,
    /// CONTENT_LENGTH present but not a valid number.
    InvalidContentLength(String),
    /// SCGI header block without the SCGI=1 marker.
    MissingScgiMarker,
    /// Request body exceeds the gateway's cap.
    BodyTooLarge(usize),
    /// Peer closed the stream mid-frame.
    UnexpectedEof,
    /// Transport-level failure.
    Io(std::io::Error),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::UnsupportedVersion(v) => {
                write!(f, "Unsupported FastCGI version: {}", v)
            }
            ProtocolError::OversizedRecord(len) => {
                write!(f, "Record content too large: {} bytes", len)
            }
            ProtocolError::Malformed(msg) => write!(f, "Malformed framing: {}", msg),
            ProtocolError::InvalidNetstring(msg) => write!(f, "Invalid netstring: {}", msg),
            ProtocolError::MissingContentLength => {
                write!(f, "Header block missing CONTENT_LENGTH")
            }
            ProtocolError::InvalidContentLength(v) => {
                write!(f, "Invalid CONTENT_LENGTH: {}", v)
            }
            ProtocolError::MissingScgiMarker => write!(f, "Header block missing SCGI marker"),
            ProtocolError::BodyTooLarge(len) => {
                write!(f, "Request body too large: {} bytes", len)
            }
            ProtocolError::UnexpectedEof => write!(f, "Unexpected end of stream"),
            ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof
        } else {
            ProtocolError::Io(e)
        }
    }
}
