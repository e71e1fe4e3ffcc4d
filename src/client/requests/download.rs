use super::Request;
use std::borrow::Cow;

/// Largest payload the download endpoint serves, in MiB.
pub const MAX_DOWNLOAD_MIB: u32 = 100;

/// Request for a payload of `size_mib` mebibytes.
pub(crate) struct Download<'a> {
    path: &'a str,
    size_mib: u32,
}

impl<'a> Download<'a> {
    /// The size is clamped to what the endpoint serves.
    pub fn new(path: &'a str, size_mib: u32) -> Self {
        Self { path, size_mib: size_mib.clamp(1, MAX_DOWNLOAD_MIB) }
    }
}

impl Request for Download<'_> {
    fn endpoint(&self) -> Cow<'_, str> {
        self.path.into()
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        vec![("size", self.size_mib.to_string())]
    }
}
