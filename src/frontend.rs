use axum::http::{header, Uri};
use axum::response::{IntoResponse, Response};
use include_dir::{include_dir, Dir};
use mime_guess::from_path;

use crate::err::handler404;

static STATIC_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Serves the embedded browser client. Unknown `/api` paths stay JSON 404s;
/// every other unknown path gets `index.html`.
pub async fn serve(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path == "api" || path.starts_with("api/") {
        return handler404(uri).await.into_response();
    }

    let file_path = if path.is_empty() { "index.html" } else { path };
    match STATIC_DIR.get_file(file_path) {
        Some(file) => {
            let mime = from_path(file_path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.to_string())],
                file.contents().to_vec(),
            )
                .into_response()
        }
        None => match STATIC_DIR.get_file("index.html") {
            Some(index) => (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8".to_string())],
                index.contents().to_vec(),
            )
                .into_response(),
            None => handler404(uri).await.into_response(),
        },
    }
}
