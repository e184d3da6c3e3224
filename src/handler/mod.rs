//! Request handler module
//!
//! Routes each request either to the upstream forwarder or to the static
//! file responder.

pub mod forward;
pub mod router;
pub mod static_files;

pub use router::handle_request;
