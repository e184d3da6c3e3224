//! HTTP response building module
//!
//! Builders for the responses the static file responder produces.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;

/// Metadata for a file response
pub struct FileMeta<'a> {
    pub content_type: &'a str,
    pub etag: &'a str,
    pub last_modified: Option<&'a str>,
}

/// Build 200 response for a file; HEAD keeps the headers and drops the body
pub fn build_file_response(data: Bytes, meta: &FileMeta<'_>, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    let mut builder = Response::builder()
        .status(200)
        .header("Content-Type", meta.content_type)
        .header("Content-Length", content_length)
        .header("ETag", meta.etag);
    if let Some(last_modified) = meta.last_modified {
        builder = builder.header("Last-Modified", last_modified);
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error("200", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = content.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(content)
    };

    Response::builder()
        .status(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Content-Length", content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 301 redirect response (directory without trailing slash)
pub fn build_redirect_response(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(301)
        .header("Location", location)
        .header("Content-Length", 0)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(304)
        .header("ETag", etag)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<Full<Bytes>> {
    build_error_page(404, "File not found")
}

/// Build 501 response for methods the static responder does not serve
pub fn build_501_response(method: &str) -> Response<Full<Bytes>> {
    build_error_page(501, &format!("Unsupported method ('{method}')"))
}

fn build_error_page(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Error response</title></head>\n<body>\n\
         <h1>Error response</h1>\n<p>Error code: {status}</p>\n<p>Message: {}.</p>\n</body>\n</html>\n",
        escape_html(message)
    );

    Response::builder()
        .status(status)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Content-Length", body.len())
        .header("Connection", "close")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            log_build_error(&status.to_string(), &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Escape text for inclusion in HTML
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_file_response_keeps_length() {
        let meta = FileMeta {
            content_type: "text/css; charset=utf-8",
            etag: "\"1-2\"",
            last_modified: Some("Sun, 06 Nov 1994 08:49:37 GMT"),
        };
        let resp = build_file_response(Bytes::from_static(b"body{}"), &meta, true);
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-length"], "6");
        assert_eq!(resp.headers()["etag"], "\"1-2\"");
        assert_eq!(resp.headers()["last-modified"], "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_error_pages() {
        let resp = build_404_response();
        assert_eq!(resp.status(), 404);
        let resp = build_501_response("POST");
        assert_eq!(resp.status(), 501);
        assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_redirect() {
        let resp = build_redirect_response("/js/");
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/js/");
    }
}
