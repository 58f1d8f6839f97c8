use std::{
    collections::HashMap,
    io,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    extract::Path,
    http::{HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::{handler::Handler, rerrors::RouteError};

// 1. FileSystem Contract
/// FileSystem
///
/// A read-only source of files addressed by slash-separated relative paths.
/// Implementations must not let `..` escape their root.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open(&self, path: &str) -> io::Result<Bytes>;
}

// 2. A directory on disk
/// Dir
///
/// Serves files below `root`.
#[derive(Debug, Clone)]
pub struct Dir {
    root: PathBuf,
}

impl Dir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }
}

#[async_trait]
impl FileSystem for Dir {
    async fn open(&self, path: &str) -> io::Result<Bytes> {
        let full = self.root.join(sanitize_key(path));
        let metadata = tokio::fs::metadata(&full).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", full.display()),
            ));
        }
        tokio::fs::read(&full).await.map(Bytes::from)
    }
}

// 3. In-memory files, for tests and embedded assets
/// MemoryFs
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: HashMap<String, Bytes>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Bytes>) -> Self {
        self.files.insert(sanitize_key(path), contents.into());
        self
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn open(&self, path: &str) -> io::Result<Bytes> {
        self.files.get(&sanitize_key(path)).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} not found"))
        })
    }
}

// 4. Layered file systems
/// JoinedFs
///
/// Tries each layer in order; the first one that opens the file wins. When
/// every layer fails, the last layer's error is returned, and a JoinedFs with
/// no layers reports `NotFound`.
#[derive(Clone, Default)]
pub struct JoinedFs {
    layers: Vec<Arc<dyn FileSystem>>,
}

impl JoinedFs {
    pub fn new(layers: Vec<Arc<dyn FileSystem>>) -> Self {
        Self { layers }
    }

    pub fn push(mut self, layer: impl FileSystem + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl FileSystem for JoinedFs {
    async fn open(&self, path: &str) -> io::Result<Bytes> {
        let mut last_error = None;
        for layer in &self.layers {
            match layer.open(path).await {
                Ok(contents) => return Ok(contents),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} not found in any layer"))
        }))
    }
}

/// sanitize_key
///
/// Strips directory navigation (`..`, `.`) and empty segments so a request path
/// can never leave the file system's root.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// serve_files
///
/// A handler for a route ending in a `{name...}` catch-all: the captured rest
/// of the path is looked up in `fs`. Missing files are 404s, an empty path is
/// a 400, and any other read failure a 500.
pub fn serve_files(fs: Arc<dyn FileSystem>) -> Handler {
    Handler::from_handler(move |Path(params): Path<Vec<(String, String)>>| {
        let fs = fs.clone();
        async move {
            let Some((_, path)) = params.last() else {
                return RouteError::missing_parameters(["path"]).into_response();
            };
            if sanitize_key(path).is_empty() {
                return RouteError::bad_request("empty file path").into_response();
            }

            match fs.open(path).await {
                Ok(contents) => file_response(path, contents),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    RouteError::not_found().into_response()
                }
                Err(err) => {
                    tracing::error!(path = %path, error = %err, "failed to read static file");
                    RouteError::internal_error([err]).into_response()
                }
            }
        }
    })
}

fn file_response(path: &str, contents: Bytes) -> Response {
    let content_type = HeaderValue::from_static(content_type(path));
    ([(CONTENT_TYPE, content_type)], contents).into_response()
}

/// Content type by file extension.
fn content_type(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("/a/./b//c"), "a/b/c");
        assert_eq!(sanitize_key(".."), "");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("index.HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type("app.js"), "text/javascript; charset=utf-8");
        assert_eq!(content_type("README"), "application/octet-stream");
    }
}
