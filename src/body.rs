use crate::codec::Gzip;
use crate::error::{BoxError, Error};
use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body produced by the compression middleware.
    ///
    /// Depending on the decision made for the response, the inner body is
    /// passed through untouched, replayed from a buffer, streamed unchanged
    /// after a buffered prefix, or gzip-compressed on the fly.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Inner body forwarded frame by frame.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// The whole body was read while deciding; it is replayed from memory.
        Buffered {
            data: Option<Bytes>,
            tail: Tail,
        },
        /// A buffered prefix followed by the rest of the inner body, uncompressed.
        Identity {
            prefix: Option<Bytes>,
            inner: Pin<Box<B>>,
        },
        /// A buffered prefix followed by the rest of the inner body, gzip-compressed.
        Compressed {
            inner: Pin<Box<B>>,
            state: CompressedBody,
        },
    }
}

/// What follows the buffered data of a [`CompressionBody::Buffered`] body.
#[derive(Debug)]
pub enum Tail {
    /// The body ends after the data.
    End,
    /// The body ends with trailers.
    Trailers(HeaderMap),
    /// The inner body failed after the data was read.
    Error(Error),
}

/// State and buffers for an actively compressed body.
pub struct CompressedBody {
    gzip: Gzip,
    prefix: Option<Bytes>,
    state: CompressState,
    pending_trailers: Option<HeaderMap>,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete.
    Done,
}

impl CompressedBody {
    fn new(prefix: Bytes) -> Self {
        Self {
            gzip: Gzip::new(),
            prefix: Some(prefix),
            state: CompressState::Reading,
            pending_trailers: None,
        }
    }

    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        inner: &mut Pin<Box<B>>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Finishing => {
                    let output = self.gzip.finish();
                    self.state = if self.pending_trailers.is_some() {
                        CompressState::Trailers
                    } else {
                        CompressState::Done
                    };
                    match output {
                        Ok(data) if data.is_empty() => continue,
                        Ok(data) => return Poll::Ready(Some(Ok(Frame::data(data)))),
                        Err(e) => {
                            self.state = CompressState::Done;
                            return Poll::Ready(Some(Err(e.into())));
                        }
                    }
                }

                CompressState::Reading => {
                    // The bytes buffered while deciding go through the encoder first.
                    if let Some(prefix) = self.prefix.take() {
                        match self.compress_chunk(&prefix) {
                            Some(result) => return Poll::Ready(Some(result)),
                            None => continue,
                        }
                    }

                    match inner.as_mut().poll_frame(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => {
                            self.state = CompressState::Finishing;
                        }
                        Poll::Ready(Some(Err(e))) => {
                            self.state = CompressState::Done;
                            return Poll::Ready(Some(Err(Error::body(e))));
                        }
                        Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                            Ok(data) => {
                                if let Some(result) = self.compress_chunk(&into_bytes(data)) {
                                    return Poll::Ready(Some(result));
                                }
                            }
                            Err(frame) => {
                                if let Ok(trailers) = frame.into_trailers() {
                                    // Trailers go out after the gzip footer
                                    self.pending_trailers = Some(trailers);
                                    self.state = CompressState::Finishing;
                                }
                            }
                        },
                    }
                }
            }
        }
    }

    /// Compresses a chunk, returning a frame only if the encoder produced output.
    fn compress_chunk(&mut self, input: &[u8]) -> Option<Result<Frame<Bytes>, Error>> {
        match self.gzip.encode(input) {
            Ok(output) if output.is_empty() => None,
            Ok(output) => Some(Ok(Frame::data(output))),
            Err(e) => {
                self.state = CompressState::Done;
                Some(Err(e.into()))
            }
        }
    }
}

impl<B> CompressionBody<B> {
    /// Creates a body that forwards `inner` unchanged.
    pub(crate) fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Creates a body replaying fully buffered data.
    pub(crate) fn buffered(data: Bytes, tail: Tail) -> Self {
        Self::Buffered {
            data: Some(data),
            tail,
        }
    }

    /// Creates a body that emits `prefix` and then the rest of `inner` unchanged.
    pub(crate) fn identity(prefix: Bytes, inner: Pin<Box<B>>) -> Self {
        Self::Identity {
            prefix: Some(prefix),
            inner,
        }
    }

    /// Creates a body that gzip-compresses `prefix` followed by the rest of `inner`.
    pub(crate) fn compressed(prefix: Bytes, inner: Pin<Box<B>>) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(prefix),
        }
    }
}

impl<B: Default> Default for CompressionBody<B> {
    fn default() -> Self {
        Self::passthrough(B::default())
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => poll_identity(inner, cx),
            CompressionBodyProj::Buffered { data, tail } => {
                if let Some(data) = data.take().filter(|d| !d.is_empty()) {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                match mem::replace(tail, Tail::End) {
                    Tail::End => Poll::Ready(None),
                    Tail::Trailers(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                    Tail::Error(e) => Poll::Ready(Some(Err(e))),
                }
            }
            CompressionBodyProj::Identity { prefix, inner } => {
                if let Some(prefix) = prefix.take().filter(|p| !p.is_empty()) {
                    return Poll::Ready(Some(Ok(Frame::data(prefix))));
                }
                poll_identity(inner.as_mut(), cx)
            }
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Buffered { data, tail } => {
                data.as_ref().is_none_or(Bytes::is_empty) && matches!(tail, Tail::End)
            }
            CompressionBody::Identity { prefix, inner } => {
                prefix.as_ref().is_none_or(Bytes::is_empty) && inner.is_end_stream()
            }
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            CompressionBody::Buffered { data, .. } => {
                SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64))
            }
            CompressionBody::Identity { prefix, inner } => {
                let extra = prefix.as_ref().map_or(0, |p| p.len() as u64);
                let inner = inner.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(inner.lower() + extra);
                if let Some(upper) = inner.upper() {
                    hint.set_upper(upper + extra);
                }
                hint
            }
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => SizeHint::default(),
        }
    }
}

/// Forwards a frame from `inner`, converting its data to `Bytes`.
fn poll_identity<B>(
    inner: Pin<&mut B>,
    cx: &mut Context<'_>,
) -> Poll<Option<Result<Frame<Bytes>, Error>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match inner.poll_frame(cx) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(None) => Poll::Ready(None),
        Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame.map_data(into_bytes)))),
        Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::body(e)))),
    }
}

pub(crate) fn into_bytes<D: Buf>(mut data: D) -> Bytes {
    data.copy_to_bytes(data.remaining())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{TestBody, collect_data, gunzip, poll_body};
    use http::HeaderMap;

    #[test]
    fn test_passthrough_data() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from("hello world"))]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());
        assert_eq!(frame.into_data().unwrap(), Bytes::from("hello world"));

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("data")),
            Frame::trailers(trailers.clone()),
        ]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_trailers());
        let received_trailers = frame.into_trailers().unwrap();
        assert_eq!(received_trailers.get("x-checksum").unwrap(), "abc123");

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_error_is_wrapped() {
        let inner = TestBody::failing(vec![], "connection reset");
        let mut body = CompressionBody::passthrough(inner);

        let err = poll_body(&mut body).unwrap().unwrap_err();
        assert!(matches!(err, Error::Body(ref source) if source.to_string() == "connection reset"));
    }

    #[test]
    fn test_buffered_replays_single_frame() {
        let mut body = CompressionBody::<TestBody>::buffered(Bytes::from("OK"), Tail::End);
        assert_eq!(body.size_hint().exact(), Some(2));
        assert!(!body.is_end_stream());

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from("OK"));
        assert!(body.is_end_stream());
        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_buffered_empty_emits_no_frame() {
        let mut body = CompressionBody::<TestBody>::buffered(Bytes::new(), Tail::End);
        assert!(body.is_end_stream());
        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_buffered_then_error() {
        let err = Error::body("boom");
        let mut body = CompressionBody::<TestBody>::buffered(Bytes::from("partial"), Tail::Error(err));

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from("partial"));
        assert!(poll_body(&mut body).unwrap().is_err());
        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_identity_emits_prefix_then_rest() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from(" world"))]);
        let mut body = CompressionBody::identity(Bytes::from("hello"), Box::pin(inner));

        assert_eq!(collect_data(&mut body), b"hello world");
    }

    #[test]
    fn test_compressed_roundtrip_with_prefix() {
        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("x".repeat(400))),
            Frame::data(Bytes::from("y".repeat(400))),
        ]);
        let prefix = Bytes::from("p".repeat(600));
        let mut body = CompressionBody::compressed(prefix, Box::pin(inner));

        let mut out = Vec::new();
        while let Some(result) = poll_body(&mut body) {
            let data = result.unwrap().into_data().unwrap();
            assert!(!data.is_empty());
            out.extend_from_slice(&data);
        }
        assert!(body.is_end_stream());

        let expected = format!("{}{}{}", "p".repeat(600), "x".repeat(400), "y".repeat(400));
        assert_eq!(gunzip(&out), expected.as_bytes());
    }

    #[test]
    fn test_compressed_skips_empty_chunks() {
        let inner = TestBody::chunks([
            Bytes::new(),
            Bytes::from("b".repeat(10)),
            Bytes::new(),
            Bytes::new(),
        ]);
        let prefix = Bytes::from("a".repeat(600));
        let mut body = CompressionBody::compressed(prefix, Box::pin(inner));

        let mut out = Vec::new();
        while let Some(result) = poll_body(&mut body) {
            let data = result.unwrap().into_data().unwrap();
            assert!(!data.is_empty());
            out.extend_from_slice(&data);
        }

        let expected = format!("{}{}", "a".repeat(600), "b".repeat(10));
        assert_eq!(gunzip(&out), expected.as_bytes());
    }

    #[test]
    fn test_compressed_with_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello world")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::compressed(Bytes::new(), Box::pin(inner));

        let mut data = Vec::new();
        let mut trailer_frame = None;
        while let Some(Ok(frame)) = poll_body(&mut body) {
            if frame.is_data() {
                assert!(trailer_frame.is_none(), "data after trailers");
                data.extend_from_slice(&frame.into_data().unwrap());
            } else if frame.is_trailers() {
                trailer_frame = Some(frame);
            }
        }

        assert_eq!(gunzip(&data), b"hello world");
        let trailers = trailer_frame
            .expect("Expected trailers frame")
            .into_trailers()
            .unwrap();
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn test_compressed_error_stops_stream() {
        let inner = TestBody::failing(vec![Frame::data(Bytes::from("abc"))], "reset");
        let mut body = CompressionBody::compressed(Bytes::new(), Box::pin(inner));

        let mut saw_error = false;
        while let Some(result) = poll_body(&mut body) {
            if result.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_compressed_size_hint_unknown() {
        let inner = TestBody::new(vec![]);
        let body = CompressionBody::compressed(Bytes::new(), Box::pin(inner));
        assert_eq!(body.size_hint().exact(), None);
    }
}
