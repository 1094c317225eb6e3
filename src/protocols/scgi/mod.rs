//! SCGI server.
//!
//! `netstring` parses the netstring-framed header block; `handler` serves
//! the single request each connection carries.

pub mod handler;
pub mod netstring;

pub use handler::handle_connection;
