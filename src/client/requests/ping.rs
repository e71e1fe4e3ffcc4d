use super::Request;
use serde::Deserialize;
use std::borrow::Cow;

/// Latency ping against the ping endpoint.
pub(crate) struct Ping<'a> {
    pub path: &'a str,
}

impl Request for Ping<'_> {
    fn endpoint(&self) -> Cow<'_, str> {
        self.path.into()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PingResponse {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub pong: bool,
}
