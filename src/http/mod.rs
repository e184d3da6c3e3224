//! HTTP protocol layer module
//!
//! Response builders, cache validators and MIME detection used by the
//! static file responder.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used types
pub use response::{
    build_304_response, build_404_response, build_501_response, build_file_response,
    build_html_response, build_redirect_response,
};
