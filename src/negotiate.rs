use http::header::{ACCEPT_ENCODING, HeaderMap};

/// Returns whether the request's `Accept-Encoding` header lists `gzip`.
///
/// The header value is a comma-separated list of encodings with optional
/// parameters (e.g. `"br;q=1.0, gzip;q=0.8"`). Quality values are not ranked;
/// only the presence of the `gzip` token matters. Missing or unreadable
/// headers are treated as not accepting gzip.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| {
            let encoding = part.split(';').next().unwrap_or("").trim();
            encoding.eq_ignore_ascii_case(crate::codec::GZIP)
        })
}
