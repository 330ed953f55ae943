use crate::body::CompressionBody;
use crate::config::CompressionConfig;
use crate::future::ResponseFuture;
use crate::negotiate::accepts_gzip;
use http::{Method, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that gzip-compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    config: Arc<CompressionConfig>,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S, config: CompressionConfig) -> Self {
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub(crate) fn with_shared_config(inner: S, config: Arc<CompressionConfig>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: http_body::Body,
    ResBody::Error: Into<crate::BoxError>,
{
    type Response = Response<CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let accepts_gzip = accepts_gzip(req.headers());
        let is_head = req.method() == Method::HEAD;

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, accepts_gzip, is_head, self.config.clone())
    }
}
