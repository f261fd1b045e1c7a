//! Listing snapshot of a remote object.

use chrono::{DateTime, Utc};
use object_store::ObjectMeta;
use object_store::path::Path;

/// Immutable snapshot of a remote object as seen by one listing.
///
/// Identity is the key: two refs with the same key are the same object even
/// if its size or ETag changed between listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRef {
    /// Path relative to the poller's `remote_dir`.
    pub location: Path,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub e_tag: Option<String>,
}

impl RemoteObjectRef {
    /// The key as a string, delimited by the remote separator.
    pub fn key(&self) -> &str {
        self.location.as_ref()
    }

    /// The key after its last `separator`.
    ///
    /// ```
    /// use flurry::source::RemoteObjectRef;
    /// use object_store::path::Path;
    ///
    /// let object = RemoteObjectRef {
    ///     location: Path::from("2024/01/report.csv"),
    ///     size: 0,
    ///     last_modified: chrono::Utc::now(),
    ///     e_tag: None,
    /// };
    /// assert_eq!(object.basename("/"), "report.csv");
    /// ```
    pub fn basename(&self, separator: &str) -> &str {
        let key = self.key();
        key.rsplit(separator).next().unwrap_or(key)
    }
}

impl From<ObjectMeta> for RemoteObjectRef {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            location: meta.location,
            size: meta.size,
            last_modified: meta.last_modified,
            e_tag: meta.e_tag,
        }
    }
}
