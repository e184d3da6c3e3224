//! Static file serving module
//!
//! Serves the build output directory: files, index files, directory
//! listings, and redirects for directories requested without a slash.

use crate::handler::router::RequestContext;
use crate::http::response::{escape_html, FileMeta};
use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Characters escaped in directory listing links
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Serve a request path from the build directory
pub async fn serve(
    ctx: &RequestContext<'_>,
    build_dir: &Path,
    index_files: &[String],
) -> Response<Full<Bytes>> {
    let Some(fs_path) = translate_path(build_dir, ctx.path) else {
        return http::build_404_response();
    };
    let Ok(metadata) = fs::metadata(&fs_path).await else {
        return http::build_404_response();
    };
    if !is_within(build_dir, &fs_path).await {
        logger::log_warning(&format!(
            "Path escapes build directory, refusing: {}",
            ctx.path
        ));
        return http::build_404_response();
    }

    if metadata.is_dir() {
        if !ctx.path.ends_with('/') {
            let location = match ctx.query {
                Some(query) => format!("{}/?{query}", ctx.path),
                None => format!("{}/", ctx.path),
            };
            return http::build_redirect_response(&location);
        }

        for index_file in index_files {
            let index_path = fs_path.join(index_file);
            if let Ok(index_meta) = fs::metadata(&index_path).await {
                if index_meta.is_file() {
                    return serve_file(ctx, &index_path, &index_meta).await;
                }
            }
        }

        return list_directory(ctx, &fs_path).await;
    }

    // A trailing slash names a directory, never a file
    if ctx.path.ends_with('/') {
        return http::build_404_response();
    }

    serve_file(ctx, &fs_path, &metadata).await
}

/// Map a URL path onto the build directory
///
/// The path is percent-decoded; empty, `.` and `..` segments are dropped so
/// the result cannot climb out of `build_dir`.
pub fn translate_path(build_dir: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(url_path).decode_utf8().ok()?;
    let mut path = build_dir.to_path_buf();
    for segment in decoded.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        if segment.contains('\\') || segment.contains('\0') {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

/// Guard against symlinks that resolve outside the build directory
async fn is_within(build_dir: &Path, fs_path: &Path) -> bool {
    match (fs::canonicalize(build_dir).await, fs::canonicalize(fs_path).await) {
        (Ok(root), Ok(target)) => target.starts_with(root),
        _ => false,
    }
}

async fn serve_file(
    ctx: &RequestContext<'_>,
    path: &Path,
    metadata: &std::fs::Metadata,
) -> Response<Full<Bytes>> {
    let modified = metadata.modified().ok();
    let etag = cache::generate_etag(metadata.len(), modified);

    if cache::check_etag_match(ctx.if_none_match.as_deref(), &etag) {
        return http::build_304_response(&etag);
    }

    let content = match fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return http::build_404_response();
        }
    };

    let last_modified = modified.map(cache::http_date);
    let meta = FileMeta {
        content_type: mime::content_type_for(path),
        etag: &etag,
        last_modified: last_modified.as_deref(),
    };
    http::build_file_response(Bytes::from(content), &meta, ctx.is_head)
}

async fn list_directory(ctx: &RequestContext<'_>, dir: &Path) -> Response<Full<Bytes>> {
    let mut reader = match fs::read_dir(dir).await {
        Ok(r) => r,
        Err(e) => {
            logger::log_warning(&format!("No permission to list directory '{}': {e}", dir.display()));
            return http::build_404_response();
        }
    };

    let mut entries = Vec::new();
    while let Ok(Some(entry)) = reader.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().await.ok();
        let is_dir = file_type.is_some_and(|t| t.is_dir());
        let is_symlink = file_type.is_some_and(|t| t.is_symlink());
        entries.push(ListingEntry {
            name,
            is_dir,
            is_symlink,
        });
    }

    let display_path = percent_decode_str(ctx.path).decode_utf8_lossy();
    http::build_html_response(render_listing(&display_path, entries), ctx.is_head)
}

struct ListingEntry {
    name: String,
    is_dir: bool,
    is_symlink: bool,
}

/// Render a directory listing page, entries sorted case-insensitively
fn render_listing(display_path: &str, mut entries: Vec<ListingEntry>) -> String {
    entries.sort_by_key(|e| e.name.to_lowercase());

    let title = format!("Directory listing for {}", escape_html(display_path));
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n\
         <body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );

    for entry in &entries {
        let (display, link) = if entry.is_dir {
            (format!("{}/", entry.name), format!("{}/", entry.name))
        } else if entry.is_symlink {
            (format!("{}@", entry.name), entry.name.clone())
        } else {
            (entry.name.clone(), entry.name.clone())
        };
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            utf8_percent_encode(&link, HREF_ESCAPE),
            escape_html(&display)
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}
