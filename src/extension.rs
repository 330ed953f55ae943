//! Transport extensions carried in request and response [`http::Extensions`].

use std::path::PathBuf;

/// Capabilities the transport advertised for a request.
///
/// Servers insert this into the request extensions so handlers can decide
/// whether an out-of-band response such as [`PathSend`] will be honoured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportExtensions {
    /// The transport can send a file by path instead of reading a body.
    pub path_send: bool,
}

impl TransportExtensions {
    /// Reads the capability set from a request, defaulting to none.
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        req.extensions().get::<Self>().copied().unwrap_or_default()
    }
}

/// Response extension asking the transport to send a file directly.
///
/// A response carrying this extension has its body transmitted by the
/// transport from `path`. The compression middleware never reads or encodes
/// the body of such a response, and leaves its headers untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSend {
    /// Path of the file to transmit.
    pub path: PathBuf,
}

impl PathSend {
    /// Creates a path-send extension for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}
