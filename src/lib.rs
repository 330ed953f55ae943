//! HTTP response gzip compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses HTTP response bodies with
//! gzip when the client's `Accept-Encoding` header lists it, and a small layer
//! that redirects plain-HTTP requests to HTTPS.
//!
//! # Example
//!
//! ```ignore
//! use http_gzip_middleware::{CompressionLayer, HttpsRedirectLayer};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(HttpsRedirectLayer::new())
//!     .layer(CompressionLayer::new().min_size(1024))
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The middleware will **not** touch responses when:
//! - `Content-Encoding` header is already set
//! - `Content-Type` matches the excluded media types (`text/event-stream` by default)
//! - The response carries a [`PathSend`] extension; its body is never read
//!
//! Otherwise the response head is held back while up to the minimum size
//! (default: 500 bytes) of body is buffered:
//! - If the whole body is smaller than the minimum, it is sent unchanged with
//!   an exact `Content-Length`.
//! - If the whole body fits in the buffer, it is compressed at once and
//!   `Content-Length` is set to the compressed size.
//! - If the body is still going when the minimum is reached, it is compressed
//!   as a stream and `Content-Length` is removed.
//!
//! Whenever the body reaches the minimum size, `Vary` includes
//! `Accept-Encoding`, even if the client did not accept gzip and the body is
//! sent uncompressed.

#![deny(missing_docs)]

mod body;
mod codec;
mod config;
mod error;
mod extension;
mod future;
mod layer;
mod negotiate;
pub mod redirect;
mod service;

#[cfg(test)]
mod test_util;

pub use body::{CompressionBody, Tail};
pub use config::{CompressionConfig, DEFAULT_MIN_SIZE, is_event_stream};
pub use error::{BoxError, Error};
pub use extension::{PathSend, TransportExtensions};
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use negotiate::accepts_gzip;
pub use redirect::{HttpsRedirect, HttpsRedirectLayer};
pub use service::CompressionService;
