//! Cloud Storage object references.
//!
//! The handler only ever sees `gs://bucket/path` URIs; the public URL shown
//! by the app is derived from them by swapping the scheme for the public
//! storage host.

use std::fmt;

pub const GCS_SCHEME: &str = "gs://";
pub const PUBLIC_STORAGE_HOST: &str = "https://storage.googleapis.com/";

/// A `gs://` URI that passed the prefix check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsUri(String);

impl GcsUri {
    /// Returns `None` unless `uri` starts with `gs://`.
    pub fn parse(uri: &str) -> Option<Self> {
        uri.starts_with(GCS_SCHEME).then(|| Self(uri.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything after the scheme, i.e. `bucket/path/to/object`.
    pub fn object_path(&self) -> &str {
        &self.0[GCS_SCHEME.len()..]
    }

    pub fn public_url(&self) -> String {
        format!("{}{}", PUBLIC_STORAGE_HOST, self.object_path())
    }
}

impl fmt::Display for GcsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
