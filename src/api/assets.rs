//! Embedded chat page assets
//!
//! The static UI is compiled into the binary; a filesystem fallback keeps
//! `cargo run` usable while editing the page.

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    response::IntoResponse,
};
use rust_embed::Embed;
use std::path::Path;

#[derive(Embed)]
#[folder = "ui/dist"]
struct Assets;

fn load(path: &str) -> Option<Vec<u8>> {
    if let Some(content) = Assets::get(path) {
        return Some(content.data.to_vec());
    }
    std::fs::read(Path::new("ui/dist").join(path)).ok()
}

/// Serve a static file by request path.
pub async fn serve_static(req: Request<Body>) -> impl IntoResponse {
    let path = req.uri().path().trim_start_matches('/');

    match load(path) {
        Some(bytes) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(bytes))
                .unwrap()
        }
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap(),
    }
}

/// The chat page itself.
pub fn get_index_html() -> Option<String> {
    load("index.html").and_then(|bytes| String::from_utf8(bytes).ok())
}
