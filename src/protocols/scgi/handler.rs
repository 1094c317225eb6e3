//! SCGI connection handler.
//!
//! One request per connection: netstring-framed header block, then
//! exactly CONTENT_LENGTH body bytes, then the echoed response and a
//! write-side shutdown so the web server reads to end of stream.

use super::netstring::{self, ParseResult};
use crate::protocols::{ProtocolError, MAX_BODY_SIZE};
use crate::request::Request;
use crate::response::Response;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Handle one SCGI connection. On malformed framing the connection is
/// dropped without writing a response.
pub async fn handle_connection<S>(mut stream: S) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    // Accumulate until the header block is complete.
    let (pairs, consumed) = loop {
        match netstring::parse_header(&buffer) {
            ParseResult::Complete { pairs, consumed } => break (pairs, consumed),
            ParseResult::Incomplete => {
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    if buffer.is_empty() {
                        // Connection opened and closed without a request.
                        return Ok(());
                    }
                    return Err(ProtocolError::UnexpectedEof);
                }
            }
            ParseResult::Error(e) => return Err(e),
        }
    };

    let content_length = netstring::content_length(&pairs)?;
    if content_length > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge(content_length));
    }
    buffer.advance(consumed);

    // The body is exactly CONTENT_LENGTH bytes after the comma.
    while buffer.len() < content_length {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
    }
    let body = buffer.split_to(content_length).freeze();

    let request = Request::new(pairs, body);
    trace!(
        method = request.method().unwrap_or("-"),
        body_len = request.body().len(),
        "echoing request"
    );

    stream.write_all(&Response::echo(request).encode()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame a header block the way a web server would.
    fn frame(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut block = Vec::new();
        for (name, value) in pairs {
            block.extend_from_slice(name.as_bytes());
            block.push(0);
            block.extend_from_slice(value.as_bytes());
            block.push(0);
        }
        let mut framed = format!("{}:", block.len()).into_bytes();
        framed.extend_from_slice(&block);
        framed.push(b',');
        framed
    }

    async fn read_to_end<S>(client: &mut S) -> Vec<u8>
    where
        S: AsyncRead + Unpin,
    {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_echo_request() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));

        let mut request = frame(&[
            ("CONTENT_LENGTH", "12"),
            ("SCGI", "1"),
            ("REQUEST_METHOD", "POST"),
        ]);
        request.extend_from_slice(b"hello\nworld\n");
        client.write_all(&request).await.unwrap();

        let response = read_to_end(&mut client).await;
        assert_eq!(
            response,
            b"Status: 200 OK\r\nContent-Type: text/plain\r\n\r\nhello\nworld\n"
        );
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_body() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));

        let request = frame(&[("CONTENT_LENGTH", "0"), ("SCGI", "1")]);
        client.write_all(&request).await.unwrap();

        let response = read_to_end(&mut client).await;
        assert_eq!(response, b"Status: 200 OK\r\nContent-Type: text/plain\r\n\r\n");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_prefix_writes_nothing() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));

        client
            .write_all(b"banana:CONTENT_LENGTH\x000\x00,")
            .await
            .unwrap();

        // The handler drops the connection without a response.
        let response = read_to_end(&mut client).await;
        assert!(response.is_empty());
        match task.await.unwrap() {
            Err(ProtocolError::InvalidNetstring(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_scgi_marker() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));

        let mut request = frame(&[("CONTENT_LENGTH", "5")]);
        request.extend_from_slice(b"abcde");
        client.write_all(&request).await.unwrap();

        let response = read_to_end(&mut client).await;
        assert!(response.is_empty());
        match task.await.unwrap() {
            Err(ProtocolError::MissingScgiMarker) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));

        let mut request = frame(&[("CONTENT_LENGTH", "10"), ("SCGI", "1")]);
        request.extend_from_slice(b"abc");
        client.write_all(&request).await.unwrap();
        drop(client);

        match task.await.unwrap() {
            Err(ProtocolError::UnexpectedEof) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_idle_close() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server));
        drop(client);
        task.await.unwrap().unwrap();
    }
}
