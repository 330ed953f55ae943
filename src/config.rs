use http::header::{self, HeaderMap};
use std::fmt;
use std::sync::Arc;

/// Default minimum body size, in bytes, for compression to be applied.
pub const DEFAULT_MIN_SIZE: usize = 500;

type MediaTypePredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Settings shared by every response passing through a [`CompressionLayer`].
///
/// [`CompressionLayer`]: crate::CompressionLayer
#[derive(Clone)]
pub struct CompressionConfig {
    /// Bodies smaller than this are sent uncompressed.
    pub min_size: usize,
    excluded: Arc<MediaTypePredicate>,
}

impl CompressionConfig {
    /// Creates a configuration with the default minimum size and
    /// `text/event-stream` excluded from compression.
    pub fn new() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            excluded: Arc::new(is_event_stream),
        }
    }

    /// Replaces the predicate deciding which media types are never compressed.
    ///
    /// The predicate receives the lowercased media type without parameters,
    /// e.g. `text/event-stream` for `Text/Event-Stream; charset=utf-8`.
    /// Responses it matches are passed through untouched, with no `Vary`
    /// or `Content-Length` changes.
    pub fn exclude_media_types<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.excluded = Arc::new(predicate);
        self
    }

    /// Returns whether the response's `Content-Type` is excluded from compression.
    pub(crate) fn is_excluded(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .is_some_and(|mt| (self.excluded)(&mt))
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("min_size", &self.min_size)
            .finish_non_exhaustive()
    }
}

/// Returns whether `media_type` is a server-sent events stream.
///
/// This is the default exclusion predicate; custom predicates can call it to
/// keep event streams uncompressed.
pub fn is_event_stream(media_type: &str) -> bool {
    media_type == "text/event-stream"
}

/// Strips parameters from a `Content-Type` value and lowercases the rest.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
