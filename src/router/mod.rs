//! Router Module Index
//!
//! A [`Router`] is built in two phases. While building, routes and middlewares
//! are registered through `&mut self`; each handler is wrapped with the chain
//! registered so far and stored under its dispatch key. `into_service` then
//! consumes the router and hands the finished table to axum, which does the
//! path matching while [`dispatch`] picks among routes sharing a path by host
//! and method.
//!
//! Routers compose by mounting: a child's routes are copied into the parent
//! under a prefix, with the child's own chain baked in first and the parent's
//! on top.

use std::{collections::BTreeMap, future::Future};

use axum::{extract::Request, response::IntoResponse};
use thiserror::Error;

use crate::{
    handler::Handler,
    middleware::{self, Middleware},
};

/// Per-path host and method selection.
pub mod dispatch;
/// `[METHOD ][HOST]/PATH` parsing and path normalization.
pub mod pattern;

pub use dispatch::AllowedMethods;
pub use pattern::Pattern;

/// A registered endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: Pattern,
    pub handler: Handler,
}

/// RouterError
///
/// Configuration mistakes found while building a router. The non-`try_`
/// registration methods panic with these messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("route {0} is already registered")]
    DuplicateRoute(String),

    #[error("cannot mount {route} under {prefix}: method {child} conflicts with {parent}")]
    MethodConflict {
        prefix: String,
        route: String,
        parent: String,
        child: String,
    },

    #[error("cannot mount {route} under {prefix}: host {child} conflicts with {parent}")]
    HostConflict {
        prefix: String,
        route: String,
        parent: String,
        child: String,
    },

    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("route {route} clashes with {existing}: same path shape, different parameter names")]
    ParameterConflict { route: String, existing: String },
}

/// RouteSource
///
/// Anything that can be mounted into a [`Router`]: it exposes its routes and,
/// optionally, a middleware chain to apply to each of them before they are
/// copied. Implementors with unusual composition rules can override
/// `wrap_middlewares`.
pub trait RouteSource {
    fn routes(&self) -> Vec<Route>;

    fn middlewares(&self) -> Vec<Middleware> {
        Vec::new()
    }

    fn wrap_middlewares(&self, handler: Handler) -> Handler {
        middleware::wrap_middlewares(&self.middlewares(), handler)
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: BTreeMap<String, Route>,
    middlewares: Vec<Middleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// handle
    ///
    /// Registers `handler` under `pattern`, wrapped with every middleware
    /// registered so far.
    ///
    /// # Panics
    ///
    /// On any [`RouterError`]; see [`Router::try_handle`].
    pub fn handle(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        if let Err(err) = self.try_handle(pattern, handler) {
            panic!("{err}");
        }
        self
    }

    pub fn try_handle(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouterError> {
        self.register(vec![(Pattern::parse(pattern), handler)])?;
        Ok(self)
    }

    /// Shorthand for `handle` with an async function of the raw request.
    pub fn handle_fn<F, Fut, R>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.handle(pattern, Handler::from_fn(f))
    }

    pub fn try_handle_fn<F, Fut, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.try_handle(pattern, Handler::from_fn(f))
    }

    /// use_middleware
    ///
    /// Appends to this router's chain. Only routes registered afterwards, and
    /// the 404/405 fallbacks, are wrapped by it.
    pub fn use_middleware(&mut self, middleware: impl Into<Middleware>) -> &mut Self {
        self.middlewares.push(middleware.into());
        self
    }

    /// mount
    ///
    /// Copies every route of `child` into this router under `prefix`.
    ///
    /// # Panics
    ///
    /// On any [`RouterError`]; see [`Router::try_mount`].
    pub fn mount(&mut self, prefix: &str, child: &impl RouteSource) -> &mut Self {
        if let Err(err) = self.try_mount(prefix, child) {
            panic!("{err}");
        }
        self
    }

    /// try_mount
    ///
    /// `prefix` is a pattern of its own: its path is joined in front of every
    /// child path, and its method and host are inherited by child routes that
    /// leave them out. A child that names a different method or host is an
    /// error. Nothing is registered unless every child route is valid.
    pub fn try_mount(&mut self, prefix: &str, child: &impl RouteSource) -> Result<&mut Self, RouterError> {
        let prefix = Pattern::parse(prefix);

        let entries = child
            .routes()
            .into_iter()
            .map(|route| {
                let pattern = mounted_pattern(&prefix, &route.pattern)?;
                Ok((pattern, child.wrap_middlewares(route.handler)))
            })
            .collect::<Result<Vec<_>, RouterError>>()?;

        self.register(entries)?;
        Ok(self)
    }

    /// Dispatch keys of every registered route, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// into_service
    ///
    /// Freezes the router into an `axum::Router`. Unmatched paths answer with
    /// a 404 RouteError and paths without an acceptable method with a 405;
    /// both go through this router's chain.
    pub fn into_service(self) -> axum::Router {
        let not_found = middleware::wrap_middlewares(&self.middlewares, dispatch::not_found());
        let method_not_allowed =
            middleware::wrap_middlewares(&self.middlewares, dispatch::method_not_allowed());

        let mut by_path: BTreeMap<String, Vec<Route>> = BTreeMap::new();
        for route in self.routes.into_values() {
            for path in pattern::axum_paths(&route.pattern.path) {
                by_path.entry(path).or_default().push(route.clone());
            }
        }

        tracing::debug!(paths = by_path.len(), "router frozen");

        by_path
            .into_iter()
            .fold(axum::Router::new(), |router, (path, routes)| {
                let dispatch =
                    dispatch::PathDispatch::new(routes, not_found.clone(), method_not_allowed.clone());
                router.route_service(&path, dispatch.into_handler())
            })
            .fallback_service(not_found)
    }

    /// Validates every entry, then wraps and stores them all.
    fn register(&mut self, entries: Vec<(Pattern, Handler)>) -> Result<(), RouterError> {
        let mut staged: BTreeMap<String, &Pattern> = BTreeMap::new();
        for (pattern, _) in &entries {
            validate(pattern)?;
            let key = pattern.key();
            if self.routes.contains_key(&key) || staged.contains_key(&key) {
                return Err(RouterError::DuplicateRoute(pattern.to_string()));
            }

            let existing = self
                .routes
                .values()
                .map(|route| &route.pattern)
                .chain(staged.values().copied());
            for other in existing {
                if other.path != pattern.path && shape(&other.path) == shape(&pattern.path) {
                    return Err(RouterError::ParameterConflict {
                        route: pattern.to_string(),
                        existing: other.to_string(),
                    });
                }
            }
            staged.insert(key, pattern);
        }

        for (pattern, handler) in entries {
            let handler = middleware::wrap_middlewares(&self.middlewares, handler);
            tracing::debug!(route = %pattern, "route registered");
            self.routes.insert(pattern.key(), Route { pattern, handler });
        }
        Ok(())
    }
}

/// A mounted router contributes its routes with its chain already applied.
impl RouteSource for Router {
    fn routes(&self) -> Vec<Route> {
        self.routes.values().cloned().collect()
    }

    fn middlewares(&self) -> Vec<Middleware> {
        self.middlewares.clone()
    }

    fn wrap_middlewares(&self, handler: Handler) -> Handler {
        handler
    }
}

fn mounted_pattern(prefix: &Pattern, child: &Pattern) -> Result<Pattern, RouterError> {
    let method = match (&prefix.method, &child.method) {
        (Some(parent), Some(own)) if parent != own => {
            return Err(RouterError::MethodConflict {
                prefix: prefix.to_string(),
                route: child.to_string(),
                parent: parent.clone(),
                child: own.clone(),
            });
        }
        (parent, own) => own.clone().or_else(|| parent.clone()),
    };

    let host = match (&prefix.host, &child.host) {
        (Some(parent), Some(own)) if !parent.eq_ignore_ascii_case(own) => {
            return Err(RouterError::HostConflict {
                prefix: prefix.to_string(),
                route: child.to_string(),
                parent: parent.clone(),
                child: own.clone(),
            });
        }
        (parent, own) => own.clone().or_else(|| parent.clone()),
    };

    Ok(Pattern {
        method,
        host,
        path: pattern::join(&prefix.path, &child.path),
    })
}

fn validate(pattern: &Pattern) -> Result<(), RouterError> {
    let segments: Vec<&str> = pattern.path.split('/').collect();
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if pattern::catch_all_name(segment).is_some() && i != last {
            return Err(RouterError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "a {name...} segment must come last",
            });
        }
    }
    Ok(())
}

/// The path with parameter names erased: `/p/{id}` and `/p/{name}` share it.
fn shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if pattern::catch_all_name(segment).is_some() {
                "{*}"
            } else if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_req: Request) -> impl Future<Output = &'static str> {
        async { "ok" }
    }

    #[test]
    fn trailing_slash_is_the_same_route() {
        let mut router = Router::new();
        router.handle_fn("/foo", ok);
        let err = router.try_handle_fn("/foo/", ok).unwrap_err();
        assert_eq!(err, RouterError::DuplicateRoute("/foo".to_string()));
    }

    #[test]
    fn mounting_inherits_prefix_method_and_host() {
        let mut child = Router::new();
        child.handle_fn("/bar", ok);

        let mut parent = Router::new();
        parent.mount("GET example.com/api", &child);

        assert_eq!(parent.keys().collect::<Vec<_>>(), ["GET example.com/api/bar/"]);
    }

    #[test]
    fn conflicting_child_method_is_rejected() {
        let mut child = Router::new();
        child.handle_fn("POST /bar", ok);

        let mut parent = Router::new();
        let err = parent.try_mount("GET /api", &child).unwrap_err();
        assert!(matches!(err, RouterError::MethodConflict { .. }), "{err}");
        assert!(parent.is_empty());
    }

    #[test]
    fn conflicting_child_host_is_rejected() {
        let mut child = Router::new();
        child.handle_fn("a.example.com/bar", ok);

        let mut parent = Router::new();
        let err = parent.try_mount("b.example.com/api", &child).unwrap_err();
        assert!(matches!(err, RouterError::HostConflict { .. }), "{err}");
    }

    #[test]
    fn failed_mount_registers_nothing() {
        let mut child = Router::new();
        child.handle_fn("/a", ok).handle_fn("/b", ok);

        let mut parent = Router::new();
        parent.handle_fn("/api/b", ok);

        assert!(parent.try_mount("/api", &child).is_err());
        assert_eq!(parent.keys().collect::<Vec<_>>(), ["/api/b/"]);
    }

    #[test]
    fn catch_all_must_be_last() {
        let mut router = Router::new();
        let err = router.try_handle_fn("/files/{rest...}/meta", ok).unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern { .. }));
        assert!(router.try_handle_fn("/files/{rest...}", ok).is_ok());
    }

    #[test]
    fn parameter_names_must_agree() {
        let mut router = Router::new();
        router.handle_fn("GET /p/{id}", ok);
        assert!(router.try_handle_fn("POST /p/{id}", ok).is_ok());
        let err = router.try_handle_fn("DELETE /p/{name}", ok).unwrap_err();
        assert!(matches!(err, RouterError::ParameterConflict { .. }));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_handle_panics() {
        let mut router = Router::new();
        router.handle_fn("GET /x", ok).handle_fn("GET /x/", ok);
    }
}
