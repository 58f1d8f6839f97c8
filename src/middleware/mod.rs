//! Middleware Module Index
//!
//! A middleware is a `Handler -> Handler` transformation. Routers keep them in
//! registration order and compose them so that the first registered middleware
//! is the outermost one: it sees the request first and the response last.
//!
//! Besides the plain constructor, middlewares can be written as an around-style
//! async function receiving the next handler (`from_fn`), or taken from any
//! tower `Layer` (`from_layer`), which is how the tower-http based policies in
//! this module are built.

use std::{convert::Infallible, fmt, future::Future, sync::Arc};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use crate::handler::Handler;

/// Cache-Control policies.
pub mod cache;
/// Request start/end logging.
pub mod logger;
/// Panic containment.
pub mod panic;
/// The deferred-commit response buffer and its sinks.
pub mod response;

pub use cache::{cache, disable_cache};
pub use logger::logger;
pub use panic::panic_recovery;

type WrapFn = dyn Fn(Handler) -> Handler + Send + Sync;

#[derive(Clone)]
pub struct Middleware(Arc<WrapFn>);

impl Middleware {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// from_fn
    ///
    /// Builds a middleware from an async function that receives the request and
    /// the next handler in the chain, and decides whether and how to call it.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Handler) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(move |next| {
            let f = f.clone();
            Handler::from_fn(move |request| f(request, next.clone()))
        })
    }

    /// from_layer
    ///
    /// Adapts a tower `Layer`, e.g. anything from tower-http.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |next| Handler::from_service(layer.layer(next)))
    }

    pub fn wrap(&self, handler: Handler) -> Handler {
        (self.0)(handler)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// wrap_middlewares
///
/// Composes a chain around `handler`. Wrapping happens from the last middleware
/// to the first, so the first one ends up outermost.
pub fn wrap_middlewares(middlewares: &[Middleware], handler: Handler) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |inner, middleware| middleware.wrap(inner))
}
