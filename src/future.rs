use crate::body::{CompressionBody, Tail, into_bytes};
use crate::codec::{GZIP, Gzip};
use crate::config::CompressionConfig;
use crate::error::{BoxError, Error};
use crate::extension::PathSend;
use bytes::{Bytes, BytesMut};
use http::response::Parts;
use http::{HeaderValue, Response, StatusCode, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for compression service responses.
    ///
    /// Resolves once the middleware has decided how to encode the response,
    /// which may require reading up to the minimum size worth of body first.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        state: State<B>,
        accepts_gzip: bool,
        is_head: bool,
        config: Arc<CompressionConfig>,
    }
}

enum State<B> {
    /// Waiting for the inner service to produce the response head.
    Inner,
    /// Holding the head back while the first body bytes are read.
    Buffering(Buffering<B>),
    Done,
}

struct Buffering<B> {
    head: Parts,
    body: Pin<Box<B>>,
    buffer: BytesMut,
}

/// Why buffering stopped.
enum Decision {
    /// The whole body was read.
    Complete(Tail),
    /// The minimum size was reached with more body to come.
    Threshold,
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(
        inner: F,
        accepts_gzip: bool,
        is_head: bool,
        config: Arc<CompressionConfig>,
    ) -> Self {
        Self {
            inner,
            state: State::Inner,
            accepts_gzip,
            is_head,
            config,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state {
                State::Inner => match this.inner.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        *this.state = State::Done;
                        return Poll::Ready(Err(e));
                    }
                    Poll::Ready(Ok(response)) => match start(response, this.config) {
                        Ok(response) => {
                            *this.state = State::Done;
                            return Poll::Ready(Ok(response));
                        }
                        Err(buffering) => *this.state = State::Buffering(buffering),
                    },
                },
                State::Buffering(buffering) => {
                    let decision = ready!(buffering.poll_decision(cx, this.config.min_size));
                    let State::Buffering(buffering) = mem::replace(this.state, State::Done) else {
                        unreachable!("state changed while buffering");
                    };
                    let response = match decision {
                        Decision::Complete(tail) => buffering.complete(
                            tail,
                            *this.accepts_gzip,
                            *this.is_head,
                            this.config.min_size,
                        ),
                        Decision::Threshold => buffering.engage(*this.accepts_gzip),
                    };
                    return Poll::Ready(Ok(response));
                }
                State::Done => panic!("ResponseFuture polled after completion"),
            }
        }
    }
}

/// Inspects the response head and either passes the response through or
/// starts buffering its body.
fn start<B>(
    response: Response<B>,
    config: &CompressionConfig,
) -> Result<Response<CompressionBody<B>>, Buffering<B>> {
    let (head, body) = response.into_parts();

    let skip = if head.headers.contains_key(header::CONTENT_ENCODING) {
        Some("already encoded")
    } else if config.is_excluded(&head.headers) {
        Some("excluded media type")
    } else if head.extensions.get::<PathSend>().is_some() {
        Some("path send")
    } else {
        None
    };

    if let Some(reason) = skip {
        tracing::debug!(reason, "passing response through without compression");
        return Ok(Response::from_parts(head, CompressionBody::passthrough(body)));
    }

    Err(Buffering {
        head,
        body: Box::pin(body),
        buffer: BytesMut::new(),
    })
}

impl<B> Buffering<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    /// Reads body frames until the body ends or `min_size` bytes are buffered.
    fn poll_decision(&mut self, cx: &mut Context<'_>, min_size: usize) -> Poll<Decision> {
        loop {
            if self.body.is_end_stream() {
                return Poll::Ready(Decision::Complete(Tail::End));
            }
            if self.buffer.len() >= min_size {
                return Poll::Ready(Decision::Threshold);
            }

            match ready!(self.body.as_mut().poll_frame(cx)) {
                None => return Poll::Ready(Decision::Complete(Tail::End)),
                Some(Err(e)) => {
                    return Poll::Ready(Decision::Complete(Tail::Error(Error::body(e))));
                }
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => self.buffer.extend_from_slice(&into_bytes(data)),
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            return Poll::Ready(Decision::Complete(Tail::Trailers(trailers)));
                        }
                    }
                },
            }
        }
    }

    /// Releases a response whose whole body has been read.
    fn complete(
        self,
        tail: Tail,
        accepts_gzip: bool,
        is_head: bool,
        min_size: usize,
    ) -> Response<CompressionBody<B>> {
        let Buffering {
            mut head, buffer, ..
        } = self;
        let data = buffer.freeze();

        if let Tail::Error(_) = tail {
            tracing::debug!(buffered = data.len(), "body failed before compression was decided");
            return Response::from_parts(head, CompressionBody::buffered(data, tail));
        }

        if data.len() < min_size {
            tracing::debug!(size = data.len(), "body below minimum size, not compressing");
            if !is_head && !is_bodiless(head.status) {
                set_content_length(&mut head.headers, data.len());
            }
            return Response::from_parts(head, CompressionBody::buffered(data, tail));
        }

        add_vary_accept_encoding(&mut head.headers);

        if accepts_gzip {
            match Gzip::compress(&data) {
                Ok(compressed) => {
                    tracing::debug!(
                        size = data.len(),
                        compressed = compressed.len(),
                        "compressed buffered body"
                    );
                    mark_gzip(&mut head.headers);
                    set_content_length(&mut head.headers, compressed.len());
                    return Response::from_parts(head, CompressionBody::buffered(compressed, tail));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gzip failed, sending body uncompressed");
                }
            }
        }

        set_content_length(&mut head.headers, data.len());
        Response::from_parts(head, CompressionBody::buffered(data, tail))
    }

    /// Releases a response whose body reached the minimum size with more to come.
    fn engage(self, accepts_gzip: bool) -> Response<CompressionBody<B>> {
        let Buffering {
            mut head,
            body,
            buffer,
        } = self;
        let prefix: Bytes = buffer.freeze();

        add_vary_accept_encoding(&mut head.headers);

        if !accepts_gzip {
            tracing::debug!("client does not accept gzip, streaming body unchanged");
            return Response::from_parts(head, CompressionBody::identity(prefix, body));
        }

        tracing::debug!(buffered = prefix.len(), "streaming gzip compression");
        mark_gzip(&mut head.headers);

        // The compressed length is unknown until the stream ends
        head.headers.remove(header::CONTENT_LENGTH);

        Response::from_parts(head, CompressionBody::compressed(prefix, body))
    }
}

fn mark_gzip(headers: &mut header::HeaderMap) {
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(GZIP));
    // Byte ranges refer to the uncompressed representation
    headers.remove(header::ACCEPT_RANGES);
}

fn set_content_length(headers: &mut header::HeaderMap, len: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// Statuses that never carry a body, so their `Content-Length` is left alone.
fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let listed = vary_str.split(',').any(|v| {
                let v = v.trim();
                v == "*" || v.eq_ignore_ascii_case("accept-encoding")
            });
            if listed {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        HeaderValue::from_static("Accept-Encoding"),
    );
}
