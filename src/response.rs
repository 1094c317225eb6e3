//! Echo response and CGI-style response encoding.
//!
//! All three transports deliver the application's output as a CGI-style
//! header block followed by the body; FastCGI additionally wraps the
//! encoded bytes in stdout records.

use crate::request::Request;
use bytes::{BufMut, Bytes, BytesMut};

/// A gateway response. The echo contract fixes the status and content
/// type; only the body varies.
#[derive(Debug, Clone)]
pub struct Response {
    status: &'static str,
    content_type: &'static str,
    body: Bytes,
}

impl Response {
    /// Build the echo response for a request: `200 OK`, `text/plain`,
    /// body identical to the request body.
    pub fn echo(request: Request) -> Self {
        Response {
            status: "200 OK",
            content_type: "text/plain",
            body: request.into_body(),
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Encode as a CGI-style header block followed by the body.
    ///
    /// An empty body still produces the full header block.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        buf.put_slice(b"Status: ");
        buf.put_slice(self.status.as_bytes());
        buf.put_slice(b"\r\nContent-Type: ");
        buf.put_slice(self.content_type.as_bytes());
        buf.put_slice(b"\r\n\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}
