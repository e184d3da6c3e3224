//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: paths under the forwarding
//! prefix go upstream, everything else is a static file.

use crate::config::AppState;
use crate::handler::forward::{self, ForwardError};
use crate::handler::static_files;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::{Method, Request, Response};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Request context for the static file responder
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_none_match: Option<String>,
}

/// Main entry point for HTTP request handling
///
/// A forwarding failure that survived the reconnect is returned as an error,
/// which makes hyper drop the client connection.
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, ForwardError> {
    let started = Instant::now();
    let mut entry = access_log_entry(&req, remote_addr);

    if state.config.logging.is_debug() {
        logger::log_headers_count(req.headers().len());
    }

    let response = if state.forward.matches(req.uri().path()) {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        match forward::forward(req, &state).await {
            Ok(forwarded) => {
                entry.upstream_uri = Some(forwarded.upstream_target);
                forwarded.response
            }
            Err(err) => {
                logger::log_forward_failure(&method, &uri, &err);
                return Err(err);
            }
        }
    } else {
        serve_static(&req, &state).await
    };

    if state.cached_access_log.load(Ordering::Relaxed) {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// GET and HEAD are served from the build directory, anything else is refused
async fn serve_static(req: &Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let method = req.method();
    if method != Method::GET && method != Method::HEAD {
        return http::build_501_response(method.as_str());
    }

    let ctx = RequestContext {
        path: req.uri().path(),
        query: req.uri().query(),
        is_head: method == Method::HEAD,
        if_none_match: req
            .headers()
            .get("if-none-match")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
    };

    static_files::serve(&ctx, &state.build_dir, &state.config.files.index_files).await
}

fn access_log_entry(req: &Request<Incoming>, remote_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().to_string(),
    );
    entry.http_version = match req.version() {
        hyper::Version::HTTP_10 => "1.0".to_string(),
        hyper::Version::HTTP_2 => "2".to_string(),
        _ => "1.1".to_string(),
    };
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry
}
