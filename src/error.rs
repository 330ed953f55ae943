use std::io;

/// Boxed error type used for errors coming out of the wrapped body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors yielded by a [`CompressionBody`](crate::CompressionBody).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The wrapped response body failed. The original error is kept as the source.
    #[error("response body error")]
    Body(#[source] BoxError),

    /// The gzip encoder failed.
    #[error("gzip encoder error")]
    Encode(#[from] io::Error),
}

impl Error {
    pub(crate) fn body<E: Into<BoxError>>(err: E) -> Self {
        Error::Body(err.into())
    }
}
