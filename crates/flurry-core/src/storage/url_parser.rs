//! Storage URL parsing.
//!
//! Recognized forms:
//! - S3: `s3://bucket/key`, `s3a://...`, `s3::http://host:port/bucket/key`,
//!   path-style and virtual-hosted `https://` AWS URLs
//! - GCS: `gs://bucket/key` and `https://storage.googleapis.com/...`
//! - Azure: `abfss://container@account.dfs.core.windows.net/key` and
//!   `https://account.blob.core.windows.net/container/key`
//! - Local: `file:///path`, `file:/path`, `/path`

use object_store::path::Path;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{AzureConfig, GcsConfig, LocalConfig, S3Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
}

/// Patterns in match order. Specific `https://` forms come before the
/// generic scheme forms so a GCS or Azure host is never taken for S3.
static PATTERNS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (
            Backend::S3,
            r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$",
        ),
        (
            Backend::S3,
            r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$",
        ),
        (
            Backend::S3,
            r"^[sS]3[aA]?::(?P<protocol>https?)://(?P<endpoint>[^:/]+):(?P<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$",
        ),
        (
            Backend::S3,
            r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$",
        ),
        (
            Backend::Gcs,
            r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$",
        ),
        (
            Backend::Gcs,
            r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$",
        ),
        (
            Backend::Gcs,
            r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$",
        ),
        (
            Backend::Azure,
            r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+))?$",
        ),
        (
            Backend::Azure,
            r"^https://(?P<account>[a-z0-9]+)\.(blob|dfs)\.core\.windows\.net/(?P<container>[a-z0-9\-]+)(/(?P<key>.+))?$",
        ),
        (Backend::Local, r"^file://(?P<path>.*)$"),
        (Backend::Local, r"^file:(?P<path>.*)$"),
        (Backend::Local, r"^(?P<path>/.*)$"),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("valid storage URL pattern")))
    .collect()
});

/// Backend configuration parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a storage URL.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let Some((backend, caps)) = PATTERNS
            .iter()
            .find_map(|(backend, re)| re.captures(url).map(|caps| (*backend, caps)))
        else {
            return InvalidUrlSnafu { url }.fail();
        };

        let config = match backend {
            Backend::S3 => Self::S3(parse_s3(&caps)),
            Backend::Gcs => Self::Gcs(GcsConfig {
                bucket: caps["bucket"].to_string(),
                key: key(&caps),
            }),
            Backend::Azure => Self::Azure(AzureConfig {
                account: caps["account"].to_string(),
                container: caps["container"].to_string(),
                key: key(&caps),
            }),
            Backend::Local => Self::Local(parse_local(&caps["path"])),
        };
        Ok(config)
    }

    /// Key prefix inside the bucket/container, if any.
    pub fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

fn key(caps: &Captures) -> Option<Path> {
    caps.name("key")
        .map(|m| m.as_str().trim_end_matches('/'))
        .filter(|k| !k.is_empty())
        .map(Path::from)
}

fn parse_s3(caps: &Captures) -> S3Config {
    let region = std::env::var("AWS_DEFAULT_REGION")
        .ok()
        .or_else(|| caps.name("region").map(|m| m.as_str().to_string()));

    let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
        caps.name("endpoint").map(|host| {
            let protocol = caps.name("protocol").map_or("https", |p| p.as_str());
            let port = caps
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            format!("{protocol}://{}:{port}", host.as_str())
        })
    });

    S3Config {
        endpoint,
        region,
        bucket: caps["bucket"].to_string(),
        key: key(caps),
    }
}

fn parse_local(path: &str) -> LocalConfig {
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    LocalConfig { path }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url() {
        let BackendConfig::S3(s3) = BackendConfig::parse_url("s3://inbox/incoming/daily").unwrap()
        else {
            panic!("expected S3 config");
        };
        assert_eq!(s3.bucket, "inbox");
        assert_eq!(s3.key, Some(Path::from("incoming/daily")));
    }

    #[test]
    fn test_s3_bucket_root() {
        let BackendConfig::S3(s3) = BackendConfig::parse_url("s3://inbox/").unwrap() else {
            panic!("expected S3 config");
        };
        assert_eq!(s3.key, None);
    }

    #[test]
    fn test_s3_virtual_hosted_url() {
        let BackendConfig::S3(s3) =
            BackendConfig::parse_url("https://inbox.s3.eu-west-1.amazonaws.com/incoming").unwrap()
        else {
            panic!("expected S3 config");
        };
        assert_eq!(s3.bucket, "inbox");
        assert_eq!(s3.key, Some(Path::from("incoming")));
    }

    #[test]
    fn test_s3_endpoint_url() {
        let BackendConfig::S3(s3) =
            BackendConfig::parse_url("s3::http://localhost:9000/inbox/incoming").unwrap()
        else {
            panic!("expected S3 config");
        };
        assert_eq!(s3.bucket, "inbox");
        if std::env::var("AWS_ENDPOINT").is_err() {
            assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
        }
    }

    #[test]
    fn test_gcs_urls() {
        for url in [
            "gs://inbox/incoming",
            "https://storage.googleapis.com/inbox/incoming",
            "https://inbox.storage.googleapis.com/incoming",
        ] {
            let BackendConfig::Gcs(gcs) = BackendConfig::parse_url(url).unwrap() else {
                panic!("expected GCS config for {url}");
            };
            assert_eq!(gcs.bucket, "inbox");
            assert_eq!(gcs.key, Some(Path::from("incoming")));
        }
    }

    #[test]
    fn test_azure_urls() {
        for url in [
            "abfss://drop@acct.dfs.core.windows.net/incoming",
            "https://acct.blob.core.windows.net/drop/incoming",
        ] {
            let BackendConfig::Azure(azure) = BackendConfig::parse_url(url).unwrap() else {
                panic!("expected Azure config for {url}");
            };
            assert_eq!(azure.account, "acct");
            assert_eq!(azure.container, "drop");
            assert_eq!(azure.key, Some(Path::from("incoming")));
        }
    }

    #[test]
    fn test_local_forms() {
        for url in ["/srv/inbox", "file:///srv/inbox", "file:/srv/inbox/"] {
            let BackendConfig::Local(local) = BackendConfig::parse_url(url).unwrap() else {
                panic!("expected local config for {url}");
            };
            assert_eq!(local.path, "/srv/inbox");
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(BackendConfig::parse_url("ftp://inbox").is_err());
        assert!(BackendConfig::parse_url("relative/path").is_err());
    }
}
