//! Redirects plain-HTTP requests to HTTPS.

use http::header::{HOST, LOCATION};
use http::uri::{Authority, Scheme};
use http::{HeaderValue, Request, Response, StatusCode};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// A Tower layer that answers `http` and `ws` requests with a redirect to
/// `https` and `wss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsRedirectLayer;

impl HttpsRedirectLayer {
    /// Creates a new redirect layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for HttpsRedirectLayer {
    type Service = HttpsRedirect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpsRedirect { inner }
    }
}

/// A Tower service that redirects insecure requests instead of calling the
/// inner service.
///
/// The request scheme is taken from the URI when it is in absolute form,
/// otherwise from an [`http::uri::Scheme`] stored in the request extensions
/// by the server, and defaults to `http`. The redirect uses
/// `307 Temporary Redirect` so the method and body are preserved.
#[derive(Debug, Clone)]
pub struct HttpsRedirect<S> {
    inner: S,
}

impl<S> HttpsRedirect<S> {
    /// Creates a new redirect service wrapping the given inner service.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpsRedirect<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = RedirectFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        match redirect_location(&req) {
            Some(location) => {
                tracing::debug!(?location, "redirecting insecure request");
                let mut response = Response::new(ResBody::default());
                *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
                response.headers_mut().insert(LOCATION, location);
                RedirectFuture::Redirect {
                    response: Some(response),
                }
            }
            None => RedirectFuture::Inner {
                future: self.inner.call(req),
            },
        }
    }
}

pin_project! {
    /// Future for [`HttpsRedirect`] responses.
    #[project = RedirectFutureProj]
    #[allow(missing_docs)]
    pub enum RedirectFuture<F, B> {
        /// Waiting on the inner service.
        Inner {
            #[pin]
            future: F,
        },
        /// A redirect ready to be returned.
        Redirect {
            response: Option<Response<B>>,
        },
    }
}

impl<F, B, E> Future for RedirectFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            RedirectFutureProj::Inner { future } => future.poll(cx),
            RedirectFutureProj::Redirect { response } => {
                let response = response
                    .take()
                    .expect("RedirectFuture polled after completion");
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Builds the secure `Location` for an insecure request, or `None` if the
/// request should pass through.
fn redirect_location<B>(req: &Request<B>) -> Option<HeaderValue> {
    let scheme = req
        .uri()
        .scheme_str()
        .or_else(|| req.extensions().get::<Scheme>().map(Scheme::as_str))
        .unwrap_or("http");

    let secure = if scheme.eq_ignore_ascii_case("http") {
        "https"
    } else if scheme.eq_ignore_ascii_case("ws") {
        "wss"
    } else {
        return None;
    };

    let authority = match req.uri().authority() {
        Some(authority) => authority.clone(),
        None => req.headers().get(HOST)?.to_str().ok()?.parse::<Authority>().ok()?,
    };

    let path = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let host = authority.host();

    let location = match authority.port_u16() {
        None | Some(80) | Some(443) => format!("{secure}://{host}{path}"),
        Some(port) => format!("{secure}://{host}:{port}{path}"),
    };

    HeaderValue::try_from(location).ok()
}
