//! Azure Blob Storage backend.

use object_store::ObjectStore;
use object_store::RetryConfig;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AzureConfigSnafu, StorageError};

use super::StorageProvider;

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    pub(super) fn construct_azure(
        config: AzureConfig,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account)
            .with_container_name(&config.container)
            .with_retry(RetryConfig::default());

        for (key, value) in options {
            let key: AzureConfigKey = key.parse().context(AzureConfigSnafu)?;
            builder = builder.with_config(key, value.clone());
        }

        let base = format!(
            "https://{}.blob.core.windows.net/{}",
            config.account, config.container
        );
        let canonical_url = match &config.key {
            Some(key) => format!("{base}/{key}"),
            None => base,
        };

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build().context(AzureConfigSnafu)?);
        Ok(Self::from_store(store, config.key, canonical_url))
    }
}
