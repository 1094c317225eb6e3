//! One-shot CGI.
//!
//! No network listener: request metadata comes from the process
//! environment, the body from inherited stdin, and the response goes to
//! inherited stdout.

pub mod handler;

pub use handler::run;
