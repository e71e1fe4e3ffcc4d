use super::{Request, RequestBody};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::borrow::Cow;

/// Binary payload posted to the upload sink.
pub(crate) struct Upload<'a> {
    path: &'a str,
    data: Vec<u8>,
}

impl<'a> Upload<'a> {
    pub fn new(path: &'a str, data: Vec<u8>) -> Self {
        Self { path, data }
    }
}

impl Request for Upload<'_> {
    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        self.path.into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = super::default_headers();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        headers
    }

    fn take_body(&mut self) -> RequestBody {
        RequestBody::Bytes(std::mem::take(&mut self.data))
    }
}
