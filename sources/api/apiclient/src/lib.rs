//! The apiclient library provides high-level methods to interact with a configuration master (or
//! a read replica) over HTTP.  `ConfigServiceClient` has one method per API operation; see the
//! documentation for submodules [`get`] and [`set`] for helpers built on top of them.
//!
//! For APIs without a typed wrapper, `ConfigServiceClient::raw_request` takes care of the basics
//! of making a request and checking its status.

use apitypes::{
    CommitResponse, HistoryEntry, IfNewerResponse, PublishRequest, SlaveHandle, SnapshotResponse,
    Version, VersionContent, VersionResponse, WriteEnabledResponse,
};
use log::{debug, trace};
use reqwest::{Client, Method};
pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use snafu::{ensure, ResultExt};
use std::time::Duration;
use url::Url;

pub mod get;
pub mod set;

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Invalid server URL '{}': {}", url, source))]
        InvalidUrl {
            url: String,
            source: url::ParseError,
        },

        #[snafu(display("Failed to build HTTP client: {}", source))]
        ClientSetup { source: reqwest::Error },

        #[snafu(display("Failed to send {} request to {}: {}", method, uri, source))]
        RequestSend {
            method: String,
            uri: String,
            source: reqwest::Error,
        },

        #[snafu(display("Status {} when {}ing {}: {}", code.as_str(), method, uri, body))]
        ResponseStatus {
            method: String,
            code: reqwest::StatusCode,
            uri: String,
            body: String,
        },

        #[snafu(display("Failed to read body of response from {}: {}", uri, source))]
        ResponseBodyRead { uri: String, source: reqwest::Error },

        #[snafu(display("Response from {} was not valid JSON: {}", uri, source))]
        ResponseJson {
            uri: String,
            source: serde_json::Error,
        },

        #[snafu(display("Unable to serialize request for {}: {}", uri, source))]
        RequestJson {
            uri: String,
            source: serde_json::Error,
        },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;

impl Error {
    /// The HTTP status the server answered with, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ResponseStatus { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether retrying the same request later could succeed.  Connection failures, timeouts
    /// and server-side errors are worth retrying; rejections of the request itself aren't.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RequestSend { .. } | Error::ResponseBodyRead { .. } => true,
            Error::ResponseStatus { code, .. } => code.is_server_error(),
            _ => false,
        }
    }
}

/// A client for one configuration server.
#[derive(Debug, Clone)]
pub struct ConfigServiceClient {
    client: Client,
    base_url: Url,
    identity: Option<String>,
}

impl ConfigServiceClient {
    /// Creates a client for the server at `base_url`.  Every request is bounded by `timeout`.
    pub fn new<S: AsRef<str>>(base_url: S, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref()).context(error::InvalidUrlSnafu {
            url: base_url.as_ref(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(error::ClientSetupSnafu)?;
        Ok(Self {
            client,
            base_url,
            identity: None,
        })
    }

    /// Sends `identity` as the authenticated caller with every request.
    pub fn with_identity<S: Into<String>>(mut self, identity: S) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Makes an HTTP request to the server.
    ///
    /// The URI is relative to the base URL, for example "/version", and may include a query
    /// string.  `data` is sent as the request body if given.
    ///
    /// Returns the response body if the response status is in the 2xx range, and an error
    /// naming the status otherwise.
    pub async fn raw_request<S>(
        &self,
        method: Method,
        uri: S,
        data: Option<(String, &'static str)>,
    ) -> Result<String>
    where
        S: AsRef<str>,
    {
        let url = self
            .base_url
            .join(uri.as_ref())
            .context(error::InvalidUrlSnafu { url: uri.as_ref() })?;
        debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(identity) = &self.identity {
            request = request.header(constants::IDENTITY_HEADER, identity);
        }
        if let Some((body, content_type)) = data {
            request = request
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body);
        }

        let response = request.send().await.context(error::RequestSendSnafu {
            method: method.as_str(),
            uri: url.as_str(),
        })?;
        let status = response.status();
        let body = response.text().await.context(error::ResponseBodyReadSnafu {
            uri: url.as_str(),
        })?;
        trace!("Response {} from {}: {}", status, url, body);

        // Error if the response status is in not in the 2xx range.
        ensure!(
            status.is_success(),
            error::ResponseStatusSnafu {
                method: method.as_str(),
                code: status,
                uri: url.as_str(),
                body,
            }
        );
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let body = self.raw_request(Method::GET, uri, None).await?;
        serde_json::from_str(&body).context(error::ResponseJsonSnafu { uri })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        uri: &str,
        data: Option<(String, &'static str)>,
    ) -> Result<T> {
        let body = self.raw_request(Method::POST, uri, data).await?;
        serde_json::from_str(&body).context(error::ResponseJsonSnafu { uri })
    }

    pub async fn get_version(&self) -> Result<Version> {
        let response: VersionResponse = self.get_json(constants::API_VERSION_URI).await?;
        Ok(response.version)
    }

    pub async fn get_compressed_data(&self) -> Result<SnapshotResponse> {
        self.get_json(constants::API_DATA_URI).await
    }

    /// Asks for the current snapshot only if it's newer than `version`.  Pass None if you don't
    /// have any version yet.
    pub async fn get_compressed_data_if_newer(
        &self,
        version: Option<&Version>,
    ) -> Result<IfNewerResponse> {
        let version = version.map(Version::as_str).unwrap_or_default();
        let uri = format!(
            "{}?{}",
            constants::API_DATA_IF_NEWER_URI,
            query(&[("version", version)])
        );
        self.get_json(&uri).await
    }

    /// Registers `url` with the server's slave registry, or refreshes its registration.
    pub async fn publish_slave_server<S: Into<String>>(
        &self,
        url: S,
        version: Option<Version>,
    ) -> Result<()> {
        let uri = constants::API_SLAVES_URI;
        let request = PublishRequest {
            url: url.into(),
            version,
        };
        let data = serde_json::to_string(&request).context(error::RequestJsonSnafu { uri })?;
        self.raw_request(Method::POST, uri, Some((data, "application/json")))
            .await?;
        Ok(())
    }

    pub async fn list_slaves(&self) -> Result<Vec<SlaveHandle>> {
        self.get_json(constants::API_SLAVES_URI).await
    }

    /// Replaces the server's configuration with `content`, which must be complete CFG text.
    pub async fn commit_new_data<S: Into<String>>(&self, content: S) -> Result<CommitResponse> {
        self.post_json(
            constants::API_COMMIT_URI,
            Some((content.into(), "text/plain; charset=utf-8")),
        )
        .await
    }

    pub async fn write_enabled(&self) -> Result<bool> {
        let response: WriteEnabledResponse =
            self.get_json(constants::API_WRITE_ENABLED_URI).await?;
        Ok(response.write_enabled)
    }

    /// Returns up to `limit` history entries, most recent first.  The server caps the limit.
    pub async fn get_commit_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let limit = limit.to_string();
        let uri = format!(
            "{}?{}",
            constants::API_HISTORY_URI,
            query(&[("limit", limit.as_str())])
        );
        self.get_json(&uri).await
    }

    /// Returns the content of each given version, in the order given.
    pub async fn get_version_contents(&self, versions: &[Version]) -> Result<Vec<VersionContent>> {
        let joined = versions
            .iter()
            .map(Version::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let uri = format!(
            "{}?{}",
            constants::API_HISTORY_CONTENTS_URI,
            query(&[("versions", joined.as_str())])
        );
        self.get_json(&uri).await
    }

    pub async fn rollback_to_version(&self, version: &Version) -> Result<CommitResponse> {
        let uri = format!(
            "{}?{}",
            constants::API_ROLLBACK_URI,
            query(&[("version", version.as_str())])
        );
        self.post_json(&uri, None).await
    }

    /// Asks a slave to poll its master now rather than waiting for its next tick.
    pub async fn refresh(&self) -> Result<()> {
        self.raw_request(Method::POST, constants::API_REFRESH_URI, None)
            .await?;
        Ok(())
    }
}

/// Builds an encoded query string from pairs.
fn query(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
