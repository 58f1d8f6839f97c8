use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{
        HeaderValue, Method,
        header::{ALLOW, HOST},
    },
    response::{IntoResponse, Response},
};

use super::Route;
use crate::{handler::Handler, rerrors::RouteError};

/// Methods a path does answer to, attached to the request handed to the
/// router's 405 handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethods(pub Vec<String>);

/// What the per-path selection settled on.
#[derive(Debug)]
enum Selection<'a> {
    Found { route: &'a Route, head_via_get: bool },
    MethodNotAllowed(Vec<String>),
    NotFound,
}

/// PathDispatch
///
/// Everything registered under one axum path. axum has already matched the
/// path; this picks among the routes by host and method.
#[derive(Clone)]
pub(crate) struct PathDispatch {
    routes: Arc<[Route]>,
    not_found: Handler,
    method_not_allowed: Handler,
}

impl PathDispatch {
    pub(crate) fn new(routes: Vec<Route>, not_found: Handler, method_not_allowed: Handler) -> Self {
        Self {
            routes: routes.into(),
            not_found,
            method_not_allowed,
        }
    }

    pub(crate) fn into_handler(self) -> Handler {
        Handler::from_fn(move |request| {
            let this = self.clone();
            async move { this.dispatch(request).await }
        })
    }

    async fn dispatch(&self, mut request: Request) -> Response {
        let host = request_host(&request);
        let selection = select(&self.routes, request.method(), host.as_deref());

        match selection {
            Selection::Found { route, head_via_get } => {
                let response = route.handler.run(request).await;
                if head_via_get {
                    strip_body(response)
                } else {
                    response
                }
            }
            Selection::MethodNotAllowed(allowed) => {
                request.extensions_mut().insert(AllowedMethods(allowed));
                self.method_not_allowed.run(request).await
            }
            Selection::NotFound => self.not_found.run(request).await,
        }
    }
}

/// select
///
/// Scores every route whose host accepts the request: a matching host is worth
/// 4, an exact method 2, a `GET` route answering `HEAD` 1, a method-less route
/// 0. Highest score wins.
fn select<'a>(routes: &'a [Route], method: &Method, host: Option<&str>) -> Selection<'a> {
    let candidates: Vec<&Route> = routes
        .iter()
        .filter(|route| match (&route.pattern.host, host) {
            (None, _) => true,
            (Some(wanted), Some(host)) => wanted.eq_ignore_ascii_case(host),
            (Some(_), None) => false,
        })
        .collect();

    if candidates.is_empty() {
        return Selection::NotFound;
    }

    let best = candidates
        .iter()
        .filter_map(|route| {
            let method_score = match route.pattern.method.as_deref() {
                None => 0,
                Some(m) if m == method.as_str() => 2,
                Some("GET") if *method == Method::HEAD => 1,
                Some(_) => return None,
            };
            let host_score = if route.pattern.host.is_some() { 4 } else { 0 };
            Some((host_score + method_score, *route))
        })
        .max_by_key(|(score, _)| *score);

    match best {
        Some((_, route)) => Selection::Found {
            route,
            head_via_get: *method == Method::HEAD && route.pattern.method.as_deref() == Some("GET"),
        },
        None => Selection::MethodNotAllowed(allowed_methods(&candidates)),
    }
}

fn allowed_methods(candidates: &[&Route]) -> Vec<String> {
    let mut allowed: Vec<String> = candidates
        .iter()
        .filter_map(|route| route.pattern.method.clone())
        .collect();
    if allowed.iter().any(|m| m == "GET") {
        allowed.push(Method::HEAD.to_string());
    }
    allowed.sort();
    allowed.dedup();
    allowed
}

/// The host the request was sent to, without its port.
fn request_host(request: &Request) -> Option<String> {
    let raw = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())?;

    let host = if let Some(rest) = raw.strip_prefix('[') {
        // [::1]:8080
        rest.split(']').next().unwrap_or(rest)
    } else {
        raw.split(':').next().unwrap_or(raw)
    };
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

fn strip_body(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// The router's 405 endpoint. Reads the [`AllowedMethods`] left on the request.
pub(crate) fn method_not_allowed() -> Handler {
    Handler::from_fn(|request: Request| async move {
        let allowed = request
            .extensions()
            .get::<AllowedMethods>()
            .map(|allowed| allowed.0.clone())
            .unwrap_or_default();

        let mut response =
            RouteError::method_not_allowed(request.method().as_str(), allowed.iter().cloned())
                .into_response();
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            response.headers_mut().insert(ALLOW, value);
        }
        response
    })
}

/// The router's 404 endpoint.
pub(crate) fn not_found() -> Handler {
    Handler::from_fn(|_request: Request| async { RouteError::not_found() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::pattern::Pattern;

    fn route(pattern: &str) -> Route {
        let pattern = Pattern::parse(pattern);
        let name = pattern.to_string();
        Route {
            pattern,
            handler: Handler::from_fn(move |_req: Request| {
                let name = name.clone();
                async move { name }
            }),
        }
    }

    fn picked(selection: Selection<'_>) -> String {
        match selection {
            Selection::Found { route, .. } => route.pattern.to_string(),
            other => panic!("expected a route, got {other:?}"),
        }
    }

    #[test]
    fn host_and_method_scoring() {
        let routes = vec![
            route("/x"),
            route("GET /x"),
            route("example.com/x"),
            route("GET example.com/x"),
        ];

        assert_eq!(picked(select(&routes, &Method::GET, Some("example.com"))), "GET example.com/x");
        assert_eq!(picked(select(&routes, &Method::POST, Some("example.com"))), "example.com/x");
        assert_eq!(picked(select(&routes, &Method::GET, Some("other.org"))), "GET /x");
        assert_eq!(picked(select(&routes, &Method::POST, None)), "/x");
    }

    #[test]
    fn head_falls_back_to_get() {
        let routes = vec![route("GET /x"), route("POST /x")];
        match select(&routes, &Method::HEAD, None) {
            Selection::Found { route, head_via_get } => {
                assert_eq!(route.pattern.to_string(), "GET /x");
                assert!(head_via_get);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_method_lists_the_allowed_ones() {
        let routes = vec![route("GET /x"), route("POST /x")];
        match select(&routes, &Method::DELETE, None) {
            Selection::MethodNotAllowed(allowed) => assert_eq!(allowed, ["GET", "HEAD", "POST"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_host_is_not_found() {
        let routes = vec![route("GET example.com/x")];
        assert!(matches!(
            select(&routes, &Method::GET, Some("other.org")),
            Selection::NotFound
        ));
    }

    #[test]
    fn host_header_is_lowercased_and_portless() {
        let request = Request::builder()
            .header(HOST, "Example.COM:8080")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&request).as_deref(), Some("example.com"));

        let request = Request::builder()
            .header(HOST, "[::1]:3000")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&request).as_deref(), Some("::1"));
    }
}
