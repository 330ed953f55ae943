use crate::config::CompressionConfig;
use crate::service::CompressionService;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that gzip-compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies when the client's
/// `Accept-Encoding` header lists `gzip` and the body is at least the minimum size.
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: Arc<CompressionConfig>,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// The default minimum size for compression is 500 bytes, and
    /// `text/event-stream` responses are never compressed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compression layer from an explicit configuration.
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses whose complete body is smaller than this are sent
    /// uncompressed with an exact `Content-Length`.
    pub fn min_size(mut self, size: usize) -> Self {
        Arc::make_mut(&mut self.config).min_size = size;
        self
    }

    /// Replaces the predicate choosing media types that are never compressed.
    ///
    /// See [`CompressionConfig::exclude_media_types`].
    pub fn exclude_media_types<F>(self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let config = (*self.config).clone();
        Self::with_config(config.exclude_media_types(predicate))
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::with_shared_config(inner, self.config.clone())
    }
}
