//! Embedded static assets served under `/static/`

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::RustEmbed;

use crate::api::middleware::AppState;

/// Client scripts and styles
#[derive(RustEmbed)]
#[folder = "static/"]
#[include = "*"]
struct StaticAssets;

pub fn router() -> Router<AppState> {
    Router::new().route("/static/{*path}", get(serve_static))
}

/// GET /static/{*path}
async fn serve_static(Path(path): Path<String>) -> Response {
    // Path extraction already percent-decodes
    let path = path.trim_start_matches('/');
    if path.split('/').any(|segment| segment == "..") {
        return not_found();
    }

    match StaticAssets::get(path) {
        Some(content) => build_response(path, content.data.into_owned()),
        None => not_found(),
    }
}

fn build_response(path: &str, data: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, get_content_type(path)),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        data,
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
