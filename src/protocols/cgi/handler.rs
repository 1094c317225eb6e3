//! One-shot CGI handling over inherited standard streams.

use crate::protocols::{ProtocolError, MAX_BODY_SIZE};
use crate::request::Request;
use crate::response::Response;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Handle exactly one request from the inherited standard streams and
/// exit. The caller (main) turns an error into a non-zero exit code.
pub async fn run() -> Result<(), ProtocolError> {
    let params: Vec<(String, String)> = std::env::vars().collect();
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    serve(params, stdin, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

/// Handle one request: read the body from `input` (exactly CONTENT_LENGTH
/// bytes when declared, to end of stream otherwise) and write the echo
/// response to `output`.
pub async fn serve<R, W>(
    params: Vec<(String, String)>,
    mut input: R,
    output: &mut W,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let declared = match params.iter().find(|(name, _)| name == "CONTENT_LENGTH") {
        Some((_, value)) => Some(
            value
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(value.clone()))?,
        ),
        None => None,
    };

    let body = match declared {
        Some(len) => {
            if len > MAX_BODY_SIZE {
                return Err(ProtocolError::BodyTooLarge(len));
            }
            let mut buf = vec![0u8; len];
            input.read_exact(&mut buf).await?;
            Bytes::from(buf)
        }
        None => {
            // No declared length: the body is whatever stdin yields.
            let mut buf = BytesMut::new();
            loop {
                let n = input.read_buf(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if buf.len() > MAX_BODY_SIZE {
                    return Err(ProtocolError::BodyTooLarge(buf.len()));
                }
            }
            buf.freeze()
        }
    };

    let request = Request::new(params, body);
    trace!(method = request.method().unwrap_or("-"), "echoing request");

    let response = Response::echo(request);
    output.write_all(&response.encode()).await?;
    trace!(body_len = response.body().len(), "response written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_declared_length() {
        let params = env(&[("REQUEST_METHOD", "POST"), ("CONTENT_LENGTH", "5")]);
        let mut out = Vec::new();
        serve(params, &b"abcde"[..], &mut out).await.unwrap();
        assert_eq!(
            out,
            b"Status: 200 OK\r\nContent-Type: text/plain\r\n\r\nabcde"
        );
    }

    #[tokio::test]
    async fn test_declared_length_bounds_read() {
        // Bytes past CONTENT_LENGTH are left unread.
        let params = env(&[("CONTENT_LENGTH", "5")]);
        let mut out = Vec::new();
        serve(params, &b"abcdeEXTRA"[..], &mut out).await.unwrap();
        assert!(out.ends_with(b"\r\n\r\nabcde"));
    }

    #[tokio::test]
    async fn test_no_length_reads_to_eof() {
        let params = env(&[("REQUEST_METHOD", "GET")]);
        let mut out = Vec::new();
        serve(params, &b"hello\nworld\n"[..], &mut out).await.unwrap();
        assert!(out.ends_with(b"\r\n\r\nhello\nworld\n"));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let params = env(&[("CONTENT_LENGTH", "0")]);
        let mut out = Vec::new();
        serve(params, &b""[..], &mut out).await.unwrap();
        assert_eq!(out, b"Status: 200 OK\r\nContent-Type: text/plain\r\n\r\n");
    }

    #[tokio::test]
    async fn test_bad_content_length() {
        let params = env(&[("CONTENT_LENGTH", "five")]);
        let mut out = Vec::new();
        match serve(params, &b"abcde"[..], &mut out).await {
            Err(ProtocolError::InvalidContentLength(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let params = env(&[("CONTENT_LENGTH", "10")]);
        let mut out = Vec::new();
        match serve(params, &b"abc"[..], &mut out).await {
            Err(ProtocolError::UnexpectedEof) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chunked_stdin() {
        // Body delivered across several reads.
        let params = env(&[("CONTENT_LENGTH", "10")]);
        let input = tokio_test::io::Builder::new()
            .read(b"hello")
            .read(b"world")
            .build();
        let mut out = Vec::new();
        serve(params, input, &mut out).await.unwrap();
        assert!(out.ends_with(b"\r\n\r\nhelloworld"));
    }
}
