//! FastCGI record codec.
//!
//! A record is an 8-byte header (version, type, request id, content
//! length, padding length, reserved) followed by content and padding.
//! Outgoing records are padded to an 8-byte boundary. Name-value pairs
//! encode each length as one byte when it fits in 7 bits, otherwise as
//! four bytes with the high bit set.

use crate::protocols::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FCGI_VERSION: u8 = 1;

/// Record header size on the wire.
pub const HEADER_LEN: usize = 8;

/// Maximum content bytes in a single record.
pub const MAX_CONTENT_LEN: usize = 0xffff;

/// Roles a web server may request. Only the responder role is served.
pub const ROLE_RESPONDER: u16 = 1;

/// Begin-request flag: keep the connection open after the request ends.
pub const FLAG_KEEP_CONN: u8 = 1;

/// Protocol status values for end-request records.
pub const STATUS_REQUEST_COMPLETE: u8 = 0;
pub const STATUS_UNKNOWN_ROLE: u8 = 3;

/// Management variable names answered by get-values.
pub const VAR_MAX_CONNS: &str = "FCGI_MAX_CONNS";
pub const VAR_MAX_REQS: &str = "FCGI_MAX_REQS";
pub const VAR_MPXS_CONNS: &str = "FCGI_MPXS_CONNS";

/// Record types defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::BeginRequest),
            2 => Some(RecordType::AbortRequest),
            3 => Some(RecordType::EndRequest),
            4 => Some(RecordType::Params),
            5 => Some(RecordType::Stdin),
            6 => Some(RecordType::Stdout),
            7 => Some(RecordType::Stderr),
            8 => Some(RecordType::Data),
            9 => Some(RecordType::GetValues),
            10 => Some(RecordType::GetValuesResult),
            11 => Some(RecordType::UnknownType),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            RecordType::BeginRequest => 1,
            RecordType::AbortRequest => 2,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Stderr => 7,
            RecordType::Data => 8,
            RecordType::GetValues => 9,
            RecordType::GetValuesResult => 10,
            RecordType::UnknownType => 11,
        }
    }
}

/// A single record. The raw type byte is kept so unknown types can be
/// reported back to the peer.
#[derive(Debug, Clone)]
pub struct Record {
    pub raw_type: u8,
    pub request_id: u16,
    pub content: Bytes,
}

impl Record {
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_u8(self.raw_type)
    }
}

/// Read one record, or `None` on a clean end of stream.
pub async fn read_record<S>(stream: &mut S) -> Result<Option<Record>, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];

    // A close between records is a clean end of stream; a close inside
    // the header is not.
    let n = stream.read(&mut header).await?;
    if n == 0 {
        return Ok(None);
    }
    let mut filled = n;
    while filled < HEADER_LEN {
        let n = stream.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
        filled += n;
    }

    if header[0] != FCGI_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header[0]));
    }
    let raw_type = header[1];
    let request_id = u16::from_be_bytes([header[2], header[3]]);
    let content_len = u16::from_be_bytes([header[4], header[5]]) as usize;
    let padding_len = header[6] as usize;

    let mut content = vec![0u8; content_len];
    stream.read_exact(&mut content).await?;
    if padding_len > 0 {
        let mut padding = [0u8; 255];
        stream.read_exact(&mut padding[..padding_len]).await?;
    }

    Ok(Some(Record {
        raw_type,
        request_id,
        content: Bytes::from(content),
    }))
}

/// Write one record, padding the content to an 8-byte boundary.
pub async fn write_record<S>(
    stream: &mut S,
    record_type: RecordType,
    request_id: u16,
    content: &[u8],
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    if content.len() > MAX_CONTENT_LEN {
        return Err(ProtocolError::OversizedRecord(content.len()));
    }
    let padding = (8 - content.len() % 8) % 8;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + content.len() + padding);
    buf.put_u8(FCGI_VERSION);
    buf.put_u8(record_type.as_u8());
    buf.put_u16(request_id);
    buf.put_u16(content.len() as u16);
    buf.put_u8(padding as u8);
    buf.put_u8(0);
    buf.put_slice(content);
    buf.put_bytes(0, padding);

    stream.write_all(&buf).await?;
    Ok(())
}

/// Write stream data as records, chunked at the record size limit.
pub async fn write_stream<S>(
    stream: &mut S,
    record_type: RecordType,
    request_id: u16,
    data: &[u8],
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        write_record(stream, record_type, request_id, chunk).await?;
    }
    Ok(())
}

/// Close a stream by writing its empty record.
pub async fn close_stream<S>(
    stream: &mut S,
    record_type: RecordType,
    request_id: u16,
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    write_record(stream, record_type, request_id, &[]).await
}

/// Body of a begin-request record.
#[derive(Debug, Clone, Copy)]
pub struct BeginRequestBody {
    pub role: u16,
    pub flags: u8,
}

pub fn parse_begin_request(content: &[u8]) -> Result<BeginRequestBody, ProtocolError> {
    if content.len() < 8 {
        return Err(ProtocolError::Malformed(format!(
            "begin-request body is {} bytes, expected 8",
            content.len()
        )));
    }
    Ok(BeginRequestBody {
        role: u16::from_be_bytes([content[0], content[1]]),
        flags: content[2],
    })
}

/// Body of an end-request record: application status, protocol status,
/// three reserved bytes.
pub fn end_request_body(app_status: u32, protocol_status: u8) -> [u8; 8] {
    let mut body = [0u8; 8];
    body[..4].copy_from_slice(&app_status.to_be_bytes());
    body[4] = protocol_status;
    body
}

/// Body of an unknown-type record: the offending type byte, seven
/// reserved bytes.
pub fn unknown_type_body(raw_type: u8) -> [u8; 8] {
    let mut body = [0u8; 8];
    body[0] = raw_type;
    body
}

/// Append one name-value pair.
pub fn encode_pair(buf: &mut BytesMut, name: &str, value: &str) {
    put_pair_len(buf, name.len());
    put_pair_len(buf, value.len());
    buf.put_slice(name.as_bytes());
    buf.put_slice(value.as_bytes());
}

fn put_pair_len(buf: &mut BytesMut, len: usize) {
    if len <= 127 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32(len as u32 | 0x8000_0000);
    }
}

fn read_pair_len(input: &[u8], pos: &mut usize) -> Option<usize> {
    let first = *input.get(*pos)?;
    if first <= 127 {
        *pos += 1;
        return Some(first as usize);
    }
    if input.len() < *pos + 4 {
        return None;
    }
    let len = u32::from_be_bytes([input[*pos], input[*pos + 1], input[*pos + 2], input[*pos + 3]])
        & 0x7fff_ffff;
    *pos += 4;
    Some(len as usize)
}

/// Decode a complete name-value pair stream. The params stream has
/// already been terminated by its empty record, so a truncated pair is a
/// framing error.
pub fn decode_pairs(input: &[u8]) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut pairs = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        let name_len = read_pair_len(input, &mut pos)
            .ok_or_else(|| ProtocolError::Malformed("truncated pair length".to_string()))?;
        let value_len = read_pair_len(input, &mut pos)
            .ok_or_else(|| ProtocolError::Malformed("truncated pair length".to_string()))?;
        if input.len() < pos + name_len + value_len {
            return Err(ProtocolError::Malformed("truncated pair data".to_string()));
        }
        let name = String::from_utf8_lossy(&input[pos..pos + name_len]).into_owned();
        pos += name_len;
        let value = String::from_utf8_lossy(&input[pos..pos + value_len]).into_owned();
        pos += value_len;
        pairs.push((name, value));
    }
    Ok(pairs)
}
