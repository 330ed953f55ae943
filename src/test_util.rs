use bytes::Bytes;
use flate2::read::GzDecoder;
use http_body::{Body, Frame};
use std::collections::VecDeque;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A test body that yields predefined frames, optionally ending in an error.
pub(crate) struct TestBody {
    frames: VecDeque<Result<Frame<Bytes>, &'static str>>,
    end_stream_known: bool,
}

impl TestBody {
    pub(crate) fn new(frames: Vec<Frame<Bytes>>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            end_stream_known: false,
        }
    }

    /// Chunks of data whose end is only discovered by polling past the last one.
    pub(crate) fn chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self::new(chunks.into_iter().map(|c| Frame::data(c.into())).collect())
    }

    /// A single chunk whose end is reported by `is_end_stream`, like a full body.
    pub(crate) fn full(data: impl Into<Bytes>) -> Self {
        let mut body = Self::chunks([data]);
        body.end_stream_known = true;
        body
    }

    pub(crate) fn failing(frames: Vec<Frame<Bytes>>, err: &'static str) -> Self {
        let mut body = Self::new(frames);
        body.frames.push_back(Err(err));
        body
    }
}

impl Body for TestBody {
    type Data = Bytes;
    type Error = &'static str;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.frames.pop_front())
    }

    fn is_end_stream(&self) -> bool {
        self.end_stream_known && self.frames.is_empty()
    }
}

/// A body that must never be read.
pub(crate) struct UnreadBody;

impl Body for UnreadBody {
    type Data = Bytes;
    type Error = &'static str;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        panic!("body of a path-send response was polled");
    }
}

pub(crate) fn poll_body<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
    let waker = std::task::Waker::noop();
    let mut cx = Context::from_waker(waker);
    match Pin::new(body).poll_frame(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => None,
    }
}

/// Collects every data frame of a body that never returns `Pending`.
pub(crate) fn collect_data<B>(body: &mut B) -> Vec<u8>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Debug,
{
    let mut out = Vec::new();
    while let Some(frame) = poll_body(body) {
        if let Ok(data) = frame.unwrap().into_data() {
            out.extend_from_slice(&data);
        }
    }
    out
}

pub(crate) fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}
