use std::{
    convert::Infallible,
    fmt,
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use tower::{Service, ServiceExt};

use crate::middleware::response::ResponseWriter;

type HandlerFn = dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync;

/// Handler
///
/// The unit the router stores, wraps and dispatches to: a cheaply cloneable
/// function from a request to a future response. Every way of writing an
/// endpoint (plain async fn, axum extractor handler, tower service, push-style
/// writer) is erased into this one type so middleware can treat them alike.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wraps an async function taking the raw request.
    pub fn from_fn<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        Self(Arc::new(move |request| {
            let fut = f(request);
            Box::pin(async move { fut.await.into_response() })
        }))
    }

    /// from_handler
    ///
    /// Adapts any axum handler, so endpoints can keep using extractors such as
    /// `Path`, `Query`, `Json` or [`UserContext`](crate::auth::UserContext).
    pub fn from_handler<H, T>(handler: H) -> Self
    where
        H: axum::handler::Handler<T, ()>,
        T: 'static,
    {
        Self::from_service(handler.with_state(()))
    }

    /// Adapts an infallible tower service.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        Self(Arc::new(move |request| {
            let service = service.clone();
            Box::pin(async move {
                match service.oneshot(request).await {
                    Ok(response) => response.into_response(),
                    Err(never) => match never {},
                }
            })
        }))
    }

    /// from_writer
    ///
    /// Adapts a push-style endpoint that receives an empty [`ResponseWriter`]
    /// and hands it back once it has written its status, headers and body.
    /// A writer returned without a status is marked as such, which the error
    /// middleware reports as a missing status.
    pub fn from_writer<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseWriter> + Send + 'static,
    {
        Self::from_fn(move |request| f(request, ResponseWriter::new()))
    }

    /// Runs the handler for one request.
    pub fn run(&self, request: Request) -> BoxFuture<'static, Response> {
        (self.0)(request)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl Service<Request> for Handler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let fut = self.run(request);
        Box::pin(async move { Ok(fut.await) })
    }
}
