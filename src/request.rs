//! Gateway request: CGI meta-variables plus an opaque body.

use bytes::Bytes;

/// A single request as delivered by any of the gateway protocols.
///
/// Parameters are the CGI meta-variables carried by the protocol framing
/// (FastCGI params stream, SCGI header block, or the process environment).
/// The body is never interpreted.
#[derive(Debug, Clone)]
pub struct Request {
    params: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    pub fn new(params: Vec<(String, String)>, body: Bytes) -> Self {
        Request { params, body }
    }

    /// Look up a meta-variable by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// REQUEST_METHOD, when the client supplied one.
    pub fn method(&self) -> Option<&str> {
        self.param("REQUEST_METHOD")
    }

    /// Declared CONTENT_LENGTH, when present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.param("CONTENT_LENGTH").and_then(|v| v.parse().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}
