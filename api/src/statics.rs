use std::{
    io,
    path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::http::{with_content_type, IntoResponse, Request, Response};

/// Serves files below a fixed directory for `GET` and `HEAD`. Misses return
/// `None` so routing can carry on.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn serve(&self, request: &Request) -> Option<Response> {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return None;
        }

        let path = self.resolve(request.uri().path())?;
        if !tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_file()) {
            return None;
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "failed to read static file");
                return Some(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
        };

        let mut response = with_content_type(Bytes::from(contents), &content_type(&path));
        if request.method() == Method::HEAD {
            *response.body_mut() = None;
        }

        Some(response)
    }

    fn resolve(&self, uri_path: &str) -> Option<PathBuf> {
        let relative = uri_path.trim_start_matches('/');
        let relative = if relative.is_empty() || relative.ends_with('/') {
            format!("{relative}index.html")
        } else {
            relative.to_string()
        };

        let relative = Path::new(&relative);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }
}

fn content_type(path: &Path) -> mime::Mime {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js" | "mjs") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json" | "map") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("svg") => mime::IMAGE_SVG,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("ico") => "image/x-icon".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
