use apiclient::ConfigServiceClient;
use apitypes::IfNewerResponse;
use async_trait::async_trait;
use datastore::Version;
use snafu::ResultExt;
use std::time::Duration;

use crate::error::{self, Result};

/// What the sync loop needs from a master.  Implemented over HTTP by `ConfigServiceClient`; tests
/// substitute their own.
#[async_trait]
pub trait MasterConnection: Send + Sync {
    /// Identifies the master in logs.
    fn url(&self) -> &str;

    /// Asks for the master's snapshot if it's newer than `version`.
    async fn data_if_newer(&self, version: Option<&Version>) -> Result<IfNewerResponse>;

    /// Registers `self_url` in the master's slave registry.
    async fn publish(&self, self_url: &str, version: Option<Version>) -> Result<()>;
}

/// A master reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMaster {
    url: String,
    client: ConfigServiceClient,
}

impl HttpMaster {
    pub fn new<S: Into<String>>(url: S, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = ConfigServiceClient::new(&url, timeout)
            .context(error::ClientSetupSnafu { url: &url })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl MasterConnection for HttpMaster {
    fn url(&self) -> &str {
        &self.url
    }

    async fn data_if_newer(&self, version: Option<&Version>) -> Result<IfNewerResponse> {
        self.client
            .get_compressed_data_if_newer(version)
            .await
            .context(error::TransportSnafu { url: &self.url })
    }

    async fn publish(&self, self_url: &str, version: Option<Version>) -> Result<()> {
        self.client
            .publish_slave_server(self_url, version)
            .await
            .context(error::TransportSnafu { url: &self.url })
    }
}
