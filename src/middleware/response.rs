//! Deferred-commit responses.
//!
//! A handler's response normally leaves the chain as soon as it is produced.
//! [`MiddlewaredResponse`] holds it back instead: statuses and body fragments
//! are recorded, headers go straight to the real sink, and nothing is committed
//! until [`MiddlewaredResponse::really_flush`] runs. This lets a middleware that
//! runs after the handler still rewrite or replace the outcome.

use std::io;

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// ResponseSink
///
/// The real destination of a response: headers can be edited until the status
/// is written, after which only body bytes follow.
pub trait ResponseSink {
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn write_header(&mut self, status: StatusCode);
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize>;
}

/// Marker left in the extensions of a response whose handler never wrote a
/// status.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusUnset;

/// ResponseWriter
///
/// An in-memory [`ResponseSink`] that turns into an axum `Response`. The first
/// status written is the one committed; later ones are ignored with a warning.
/// Body bytes written without any status commit as `200 OK`.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseSink for ResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => tracing::warn!(
                committed = %committed,
                ignored = %status,
                "superfluous write_header call"
            ),
            None => self.status = Some(status),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(chunk);
        Ok(chunk.len())
    }
}

impl IntoResponse for ResponseWriter {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.freeze()));
        *response.headers_mut() = self.headers;
        match self.status {
            Some(status) => *response.status_mut() = status,
            None => {
                response.extensions_mut().insert(StatusUnset);
            }
        }
        response
    }
}

/// FlushError
///
/// The first write failure hit while committing a buffered response.
#[derive(Debug, Error)]
#[error(
    "failed to write buffered response (statuses {statuses:?}, {written} bytes written before the failure)"
)]
pub struct FlushError {
    pub statuses: Vec<StatusCode>,
    pub written: usize,
    #[source]
    pub source: io::Error,
}

/// MiddlewaredResponse
///
/// A per-request buffer in front of a [`ResponseSink`]. Status writes stack up
/// (the last one wins, `500` if there never was one) and body writes are kept
/// as ordered fragments. Headers are not buffered: they live on the sink.
#[derive(Debug)]
pub struct MiddlewaredResponse<S: ResponseSink = ResponseWriter> {
    sink: S,
    statuses: Vec<StatusCode>,
    body_writes: Vec<Bytes>,
}

impl<S: ResponseSink> MiddlewaredResponse<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            statuses: Vec::new(),
            body_writes: Vec::new(),
        }
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.statuses.push(status);
    }

    pub fn write(&mut self, chunk: impl Into<Bytes>) -> usize {
        let chunk = chunk.into();
        let len = chunk.len();
        self.body_writes.push(chunk);
        len
    }

    pub fn headers(&self) -> &HeaderMap {
        self.sink.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.sink.headers_mut()
    }

    /// The status that would be committed right now.
    pub fn status(&self) -> StatusCode {
        self.statuses
            .last()
            .copied()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn statuses(&self) -> &[StatusCode] {
        &self.statuses
    }

    pub fn is_status_written(&self) -> bool {
        !self.statuses.is_empty()
    }

    /// All buffered fragments joined, in write order.
    pub fn body(&self) -> Bytes {
        match self.body_writes.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            fragments => fragments.concat().into(),
        }
    }

    /// capture
    ///
    /// Records a handler's response into the buffer: its headers are copied to
    /// the sink, its status is written unless the handler left it unset, and its
    /// body is collected as one fragment.
    pub async fn capture(&mut self, response: Response) -> Result<(), axum::Error> {
        let (parts, body) = response.into_parts();

        self.headers_mut().extend(parts.headers);
        if parts.extensions.get::<StatusUnset>().is_none() {
            self.write_header(parts.status);
        }

        let bytes = axum::body::to_bytes(body, usize::MAX).await?;
        if !bytes.is_empty() {
            self.write(bytes);
        }
        Ok(())
    }

    /// really_flush
    ///
    /// Commits the effective status and then every body fragment, in order, to
    /// the sink. Consumes the buffer; the first failing write aborts the rest.
    /// On success returns the sink together with the number of body bytes
    /// written.
    pub fn really_flush(mut self) -> Result<(S, usize), FlushError> {
        let status = self.status();
        self.sink.write_header(status);

        let mut written = 0;
        for chunk in &self.body_writes {
            match self.sink.write(chunk) {
                Ok(n) => written += n,
                Err(source) => {
                    return Err(FlushError {
                        statuses: self.statuses,
                        written,
                        source,
                    });
                }
            }
        }

        Ok((self.sink, written))
    }
}
