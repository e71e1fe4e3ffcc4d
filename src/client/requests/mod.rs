pub mod download;
pub mod ping;
pub mod upload;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::Method;
use std::borrow::Cow;

pub(crate) const UA: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Headers shared by every request.
pub(crate) fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));

    headers
}

/// Body attached to an outgoing request.
pub enum RequestBody {
    None,
    Bytes(Vec<u8>),
}

/// A call to one of the speed test endpoints.
///
/// `endpoint` is the path relative to the server's base URL. Every request
/// carries the client's user agent and opts out of caching so that
/// intermediaries never answer a measurement from a cache.
pub trait Request {
    const METHOD: Method = Method::GET;

    fn endpoint(&self) -> Cow<'_, str>;

    fn query(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn headers(&self) -> HeaderMap {
        default_headers()
    }

    /// Hand over the body. Called once, after `endpoint` and `headers`.
    fn take_body(&mut self) -> RequestBody {
        RequestBody::None
    }
}
