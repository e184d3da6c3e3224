//! Forwarding handler
//!
//! Rewrites a request under the forwarding prefix so it looks native to the
//! backend, sends it over the shared upstream connection and hands the
//! upstream response back untouched.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use hyper::http::HeaderMap;
use hyper::{Request, Response};

use crate::config::{AppState, ForwardConfig};
use crate::upstream::{OutgoingRequest, UpstreamError};

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to read request body from client: {0}")]
    ClientBody(#[source] hyper::Error),
    #[error("invalid upstream host header: {0}")]
    HostHeader(#[from] hyper::header::InvalidHeaderValue),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// A forwarded exchange: the upstream response and the target it was sent to
pub struct Forwarded {
    pub response: Response<Full<Bytes>>,
    pub upstream_target: String,
}

/// Forward one request and return the upstream's response
pub async fn forward(req: Request<Incoming>, state: &AppState) -> Result<Forwarded, ForwardError> {
    let outgoing = prepare(req, &state.forward).await?;
    let response = state.upstream.send(&outgoing).await?;
    Ok(Forwarded {
        response,
        upstream_target: outgoing.target,
    })
}

/// Turn an incoming request into its rewritten, fully buffered upstream form
pub async fn prepare(req: Request<Incoming>, forward: &ForwardConfig) -> Result<OutgoingRequest, ForwardError> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
    let target = rewrite_target(forward, path_and_query);

    rewrite_headers(&mut parts.headers, forward)?;

    // Buffered up front so a retry can resend the same bytes
    let body = match declared_length(&parts.headers) {
        Some(len) if len > 0 => Some(
            body.collect()
                .await
                .map_err(ForwardError::ClientBody)?
                .to_bytes(),
        ),
        _ => None,
    };

    Ok(OutgoingRequest {
        method: parts.method,
        target,
        headers: parts.headers,
        extensions: parts.extensions,
        body,
    })
}

/// Strip the forwarding prefix once and prepend the forward-path.
///
/// The query string rides along with the suffix. A target that would not
/// start with `/` (e.g. `/api?x=1` with an empty forward-path) gets one.
pub fn rewrite_target(forward: &ForwardConfig, path_and_query: &str) -> String {
    let suffix = path_and_query
        .strip_prefix(forward.prefix.as_str())
        .unwrap_or(path_and_query);
    let target = format!("{}{suffix}", forward.forward_path);
    if target.starts_with('/') {
        target
    } else {
        format!("/{target}")
    }
}

/// Keep the client-facing host in `X-Forwarded-Host` and point `host` at the
/// upstream. Every other header is left alone.
pub fn rewrite_headers(headers: &mut HeaderMap, forward: &ForwardConfig) -> Result<(), ForwardError> {
    if let Some(original_host) = headers.get(HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, original_host);
    }
    headers.insert(HOST, HeaderValue::from_str(&forward.host_header())?);
    Ok(())
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Transport;

    fn staging() -> ForwardConfig {
        ForwardConfig {
            host: "firecloud-ci.broadinstitute.org".to_string(),
            port: 443,
            transport: Transport::Secure,
            prefix: "/api".to_string(),
            forward_path: "/api".to_string(),
        }
    }

    fn local() -> ForwardConfig {
        ForwardConfig {
            host: "local.broadinstitute.org".to_string(),
            port: 8080,
            transport: Transport::Plain,
            prefix: "/api".to_string(),
            forward_path: String::new(),
        }
    }

    #[test]
    fn test_rewrite_target_staging_keeps_api_root() {
        assert_eq!(rewrite_target(&staging(), "/api/foo?x=1"), "/api/foo?x=1");
        assert_eq!(rewrite_target(&staging(), "/api"), "/api");
    }

    #[test]
    fn test_rewrite_target_local_strips_prefix() {
        assert_eq!(rewrite_target(&local(), "/api/foo?x=1"), "/foo?x=1");
        assert_eq!(
            rewrite_target(&local(), "/api/workspaces/ns/name/entities"),
            "/workspaces/ns/name/entities"
        );
    }

    #[test]
    fn test_rewrite_target_strips_prefix_once() {
        assert_eq!(rewrite_target(&local(), "/api/api/me"), "/api/me");
        assert_eq!(rewrite_target(&staging(), "/api/api/me"), "/api/api/me");
    }

    #[test]
    fn test_rewrite_target_always_origin_form() {
        assert_eq!(rewrite_target(&local(), "/api"), "/");
        assert_eq!(rewrite_target(&local(), "/api?x=1"), "/?x=1");
    }

    #[test]
    fn test_rewrite_headers_moves_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost:8000"));
        headers.insert("authorization", HeaderValue::from_static("Bearer token"));

        rewrite_headers(&mut headers, &local()).expect("valid host");

        assert_eq!(headers[HOST], "local.broadinstitute.org:8080");
        assert_eq!(headers["x-forwarded-host"], "localhost:8000");
        assert_eq!(headers["authorization"], "Bearer token");
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_rewrite_headers_default_port_and_missing_host() {
        let mut headers = HeaderMap::new();
        rewrite_headers(&mut headers, &staging()).expect("valid host");

        assert_eq!(headers[HOST], "firecloud-ci.broadinstitute.org");
        assert!(!headers.contains_key("x-forwarded-host"));
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert_eq!(declared_length(&headers), Some(0));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(declared_length(&headers), Some(42));
    }
}
