use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        HeaderMap, HeaderValue, StatusCode, Uri,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};

use super::RouteError;
use crate::{
    handler::Handler,
    middleware::{
        Middleware,
        response::{MiddlewaredResponse, ResponseWriter},
    },
};

/// Query parameter carrying the encoded error on the second leg of the hand-off.
const ERROR_PARAM: &str = "error";

pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// ErrorPage
///
/// Renders a RouteError as markup for browsers. Rendering itself (templates,
/// components) lives outside the router.
pub trait ErrorPage: Send + Sync + 'static {
    fn render(&self, error: &RouteError) -> Result<String, RenderError>;
}

impl<F> ErrorPage for F
where
    F: Fn(&RouteError) -> String + Send + Sync + 'static,
{
    fn render(&self, error: &RouteError) -> Result<String, RenderError> {
        Ok(self(error))
    }
}

/// DefaultErrorPage
///
/// A bare HTML page with the status and description, for applications that do
/// not bring their own renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorPage;

impl ErrorPage for DefaultErrorPage {
    fn render(&self, error: &RouteError) -> Result<String, RenderError> {
        let title = format!("{} {}", error.status_code, escape_html(&error.error));
        Ok(format!(
            "<!DOCTYPE html><html><head><title>{title}</title></head>\
             <body><h1>{title}</h1></body></html>"
        ))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// ErrorMiddleware
///
/// Translates error statuses coming out of the chain. API clients get the JSON
/// RouteError with its status. Browsers are redirected to the same URL with the
/// error encoded in the `error` query parameter; that follow-up request is
/// answered here, by rendering the error page, without running the handler.
#[derive(Clone)]
pub struct ErrorMiddleware {
    page: Arc<dyn ErrorPage>,
    not_found: Arc<dyn ErrorPage>,
}

impl ErrorMiddleware {
    pub fn new(page: impl ErrorPage) -> Self {
        let page: Arc<dyn ErrorPage> = Arc::new(page);
        Self {
            not_found: page.clone(),
            page,
        }
    }

    /// Uses a dedicated page for 404s.
    pub fn with_not_found_page(mut self, page: impl ErrorPage) -> Self {
        self.not_found = Arc::new(page);
        self
    }

    pub fn into_middleware(self) -> Middleware {
        Middleware::from_fn(move |request: Request, next: Handler| {
            let this = self.clone();
            async move { this.serve(request, next).await }
        })
    }

    async fn serve(&self, request: Request, next: Handler) -> Response {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let path = uri.path().to_owned();

        // 1. Second leg of the hand-off: render and stop here.
        if let Some(param) = error_param(&uri) {
            return self.render_handoff(&param, &method, &path);
        }

        let wants_html = prefers_html(request.headers());

        // 2. Run the handler against a buffer.
        let mut buffer = MiddlewaredResponse::new(ResponseWriter::new());
        if let Err(err) = buffer.capture(next.run(request).await).await {
            tracing::error!(method = %method, path = %path, error = %err, "failed to read handler response");
            return RouteError::internal_error([err]).into_response();
        }

        let status = buffer.status();

        // 3. Success passes through.
        if status.as_u16() < 400 {
            return flush(buffer, &method, &path);
        }

        // 4. Nothing to translate if the handler never said what happened.
        if !buffer.is_status_written() {
            tracing::warn!(
                method = %method,
                path = %path,
                body = %String::from_utf8_lossy(&buffer.body()),
                "endpoint did not return a status code"
            );
            return flush(buffer, &method, &path);
        }

        // 5. Every 404 looks the same, whatever the handler wrote.
        if status == StatusCode::NOT_FOUND {
            return translate(RouteError::not_found(), wants_html, &uri);
        }

        // 6. Other errors are only translated when they are structured.
        if !is_json(buffer.headers()) {
            tracing::warn!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&buffer.body()),
                "endpoint didn't return a structured error"
            );
            return flush(buffer, &method, &path);
        }

        if !wants_html {
            return flush(buffer, &method, &path);
        }

        match serde_json::from_slice::<RouteError>(&buffer.body()) {
            Ok(rerr) => translate(rerr, true, &uri),
            Err(err) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    error = %err,
                    "JSON error body is not a RouteError"
                );
                flush(buffer, &method, &path)
            }
        }
    }

    fn render_handoff(&self, param: &str, method: &axum::http::Method, path: &str) -> Response {
        let rerr = match RouteError::decode(param) {
            Ok(rerr) => rerr,
            Err(err) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    data = %param,
                    error = %err,
                    "failed to decode \"error\" parameter from error redirect"
                );
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Data {param}\nError {err}"),
                )
                    .into_response();
            }
        };

        let page = if rerr.status() == StatusCode::NOT_FOUND {
            &self.not_found
        } else {
            &self.page
        };

        match page.render(&rerr) {
            Ok(html) => (
                rerr.status(),
                [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
                html,
            )
                .into_response(),
            Err(err) => {
                tracing::error!(method = %method, path = %path, error = %err, "failed to render error page");
                let raw = serde_json::to_vec(&rerr).unwrap_or_else(|_| param.as_bytes().to_vec());
                (
                    rerr.status(),
                    [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                    raw,
                )
                    .into_response()
            }
        }
    }
}

impl From<ErrorMiddleware> for Middleware {
    fn from(errors: ErrorMiddleware) -> Self {
        errors.into_middleware()
    }
}

fn flush(buffer: MiddlewaredResponse, method: &axum::http::Method, path: &str) -> Response {
    match buffer.really_flush() {
        Ok((sink, _)) => sink.into_response(),
        Err(err) => {
            tracing::error!(method = %method, path = %path, error = %err, "failed to flush response");
            RouteError::internal_error([err]).into_response()
        }
    }
}

/// Either redirects a browser to the rendered page or answers with the JSON.
fn translate(rerr: RouteError, wants_html: bool, uri: &Uri) -> Response {
    if !wants_html {
        return rerr.into_response();
    }
    match rerr.encode() {
        Ok(param) => Redirect::temporary(&with_error_param(uri, &param)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode error for redirect");
            rerr.into_response()
        }
    }
}

fn error_param(uri: &Uri) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, value)| key == ERROR_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Same path and query, plus `error=<param>`. The path keeps a single leading
/// slash so the target can never read as a protocol-relative URL.
fn with_error_param(uri: &Uri, param: &str) -> String {
    let mut query = url::form_urlencoded::Serializer::new(uri.query().unwrap_or_default().to_owned());
    query.append_pair(ERROR_PARAM, param);
    let path = uri.path().trim_start_matches(['/', '\\']);
    format!("/{}?{}", path, query.finish())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

/// prefers_html
///
/// True when the `Accept` header asks for markup (HTML or an XML flavour) and
/// does not also accept JSON.
pub fn prefers_html(headers: &HeaderMap) -> bool {
    let accept = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    if accept.is_empty() {
        return false;
    }

    let markup = ["text/html", "application/xhtml+xml", "application/xml"]
        .iter()
        .any(|kind| accept.contains(kind));
    markup && !accept.contains("application/json")
}
