//! FastCGI responder connection handler.
//!
//! Drives a connection through the request lifecycle: begin-request,
//! params stream, stdin stream, then the echoed response as stdout
//! records followed by end-request. Management records (request id zero)
//! are answered inline. Requests over one connection are handled
//! sequentially; `FCGI_MPXS_CONNS` is advertised as 0.

use super::record::{
    self, Record, RecordType, FLAG_KEEP_CONN, ROLE_RESPONDER, STATUS_REQUEST_COMPLETE,
    STATUS_UNKNOWN_ROLE, VAR_MAX_CONNS, VAR_MAX_REQS, VAR_MPXS_CONNS,
};
use crate::protocols::{ProtocolError, MAX_BODY_SIZE};
use crate::request::Request;
use crate::response::Response;
use bytes::BytesMut;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

/// Cap on the accumulated params stream.
const MAX_PARAMS_SIZE: usize = 64 * 1024;

/// Per-request accumulation state between begin-request and the end of
/// its stdin stream.
struct RequestState {
    keep_conn: bool,
    params: BytesMut,
    stdin: BytesMut,
}

impl RequestState {
    fn new(keep_conn: bool) -> Self {
        RequestState {
            keep_conn,
            params: BytesMut::new(),
            stdin: BytesMut::new(),
        }
    }
}

/// Handle one FastCGI connection until the peer closes it or the last
/// request without `FCGI_KEEP_CONN` completes.
pub async fn handle_connection<S>(mut stream: S) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut requests: HashMap<u16, RequestState> = HashMap::new();

    loop {
        let rec = match record::read_record(&mut stream).await? {
            Some(rec) => rec,
            // Clean close between records.
            None => return Ok(()),
        };

        // Management records use request id zero.
        if rec.request_id == 0 {
            handle_management(&mut stream, &rec).await?;
            continue;
        }

        match rec.record_type() {
            Some(RecordType::BeginRequest) => {
                let begin = record::parse_begin_request(&rec.content)?;
                if begin.role != ROLE_RESPONDER {
                    trace!(role = begin.role, "declining non-responder role");
                    record::write_record(
                        &mut stream,
                        RecordType::EndRequest,
                        rec.request_id,
                        &record::end_request_body(0, STATUS_UNKNOWN_ROLE),
                    )
                    .await?;
                    continue;
                }
                let keep_conn = begin.flags & FLAG_KEEP_CONN != 0;
                requests.insert(rec.request_id, RequestState::new(keep_conn));
            }

            Some(RecordType::AbortRequest) => {
                if let Some(state) = requests.remove(&rec.request_id) {
                    trace!(request_id = rec.request_id, "request aborted");
                    record::write_record(
                        &mut stream,
                        RecordType::EndRequest,
                        rec.request_id,
                        &record::end_request_body(1, STATUS_REQUEST_COMPLETE),
                    )
                    .await?;
                    if !state.keep_conn {
                        return Ok(());
                    }
                }
            }

            Some(RecordType::Params) => {
                // Records for ids without a begin-request are ignored.
                if let Some(state) = requests.get_mut(&rec.request_id) {
                    if state.params.len() + rec.content.len() > MAX_PARAMS_SIZE {
                        return Err(ProtocolError::Malformed(
                            "params stream too large".to_string(),
                        ));
                    }
                    // The empty record terminates the stream.
                    state.params.extend_from_slice(&rec.content);
                }
            }

            Some(RecordType::Stdin) => {
                if rec.content.is_empty() {
                    // Stdin closed: the request is complete.
                    if let Some(state) = requests.remove(&rec.request_id) {
                        let keep_conn = state.keep_conn;
                        respond(&mut stream, rec.request_id, state).await?;
                        if !keep_conn {
                            return Ok(());
                        }
                    }
                } else if let Some(state) = requests.get_mut(&rec.request_id) {
                    if state.stdin.len() + rec.content.len() > MAX_BODY_SIZE {
                        return Err(ProtocolError::BodyTooLarge(
                            state.stdin.len() + rec.content.len(),
                        ));
                    }
                    state.stdin.extend_from_slice(&rec.content);
                }
            }

            // The data stream only matters to the filter role.
            Some(other) => {
                trace!(record_type = ?other, "ignoring unexpected record");
            }

            None => {
                answer_unknown_type(&mut stream, &rec).await?;
            }
        }
    }
}

/// Run the echo handler for a completed request and write the response.
async fn respond<S>(
    stream: &mut S,
    request_id: u16,
    state: RequestState,
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let params = record::decode_pairs(&state.params)?;
    let request = Request::new(params, state.stdin.freeze());
    trace!(
        request_id,
        method = request.method().unwrap_or("-"),
        declared_len = request.content_length().unwrap_or(0),
        body_len = request.body().len(),
        "echoing request"
    );

    let encoded = Response::echo(request).encode();
    record::write_stream(stream, RecordType::Stdout, request_id, &encoded).await?;
    record::close_stream(stream, RecordType::Stdout, request_id).await?;
    record::write_record(
        stream,
        RecordType::EndRequest,
        request_id,
        &record::end_request_body(0, STATUS_REQUEST_COMPLETE),
    )
    .await?;
    Ok(())
}

/// Answer a management record: get-values with our limits, anything else
/// with an unknown-type record.
async fn handle_management<S>(stream: &mut S, rec: &Record) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    match rec.record_type() {
        Some(RecordType::GetValues) => {
            let names = record::decode_pairs(&rec.content)?;
            let max_conns = crate::server::MAX_CONNECTIONS.to_string();
            let mut reply = BytesMut::new();
            for (name, _) in names {
                let value = match name.as_str() {
                    VAR_MAX_CONNS => max_conns.as_str(),
                    VAR_MAX_REQS => max_conns.as_str(),
                    VAR_MPXS_CONNS => "0",
                    // Names we do not know are dropped from the reply.
                    _ => continue,
                };
                record::encode_pair(&mut reply, &name, value);
            }
            record::write_record(stream, RecordType::GetValuesResult, 0, &reply).await
        }
        _ => answer_unknown_type(stream, rec).await,
    }
}

async fn answer_unknown_type<S>(stream: &mut S, rec: &Record) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    trace!(raw_type = rec.raw_type, "unknown record type");
    record::write_record(
        stream,
        RecordType::UnknownType,
        0,
        &record::unknown_type_body(rec.raw_type),
    )
    .await
}
