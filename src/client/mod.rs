//! HTTP client for the speed test endpoints.

mod requests;

pub use requests::download::MAX_DOWNLOAD_MIB;

use crate::engine::{Transport, UploadAck};
use crate::errors::SpeedTestError;
use futures::StreamExt;
use log::{debug, warn};
use requests::download::Download;
use requests::ping::{Ping, PingResponse};
use requests::upload::Upload;
use requests::{Request, RequestBody};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Server location and per-request settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the speed test server.
    ///
    /// Default: `http://localhost:3000`
    pub base_url: String,
    /// Default: `/api/ping`
    pub ping_path: String,
    /// Default: `/api/download`
    pub download_path: String,
    /// Default: `/api/upload`
    pub upload_path: String,
    /// Deadline for a single request, including reading the body.
    ///
    /// Default: 30 seconds
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            ping_path: "/api/ping".to_string(),
            download_path: "/api/download".to_string(),
            upload_path: "/api/upload".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A [`Transport`] talking to a speed test server over HTTP.
#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
    base_url: Url,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, SpeedTestError> {
        let base_url = Url::parse(&config.base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SpeedTestError::config(format!(
                "unsupported server URL scheme: {}",
                base_url.scheme()
            )));
        }

        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                SpeedTestError::config("failed to build HTTP client").with_source(e)
            })?;

        Ok(Client { client, base_url, config })
    }

    /// The server this client measures against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for<R: Request>(&self, request: &R) -> Result<Url, SpeedTestError> {
        let mut url = self.base_url.join(&request.endpoint())?;

        let query = request.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// Send a request and return the response, failing on non-2xx status.
    async fn execute<R: Request>(
        &self,
        mut request: R,
    ) -> Result<reqwest::Response, SpeedTestError> {
        let url = self.url_for(&request)?;

        let builder = self
            .client
            .request(R::METHOD, url)
            .headers(request.headers());

        let builder = match request.take_body() {
            RequestBody::None => builder,
            RequestBody::Bytes(data) => builder.body(data),
        };

        let response = builder.send().await?.error_for_status()?;

        Ok(response)
    }

    async fn send<R, T>(&self, request: R) -> Result<T, SpeedTestError>
    where
        R: Request,
        T: DeserializeOwned,
    {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }

    async fn fetch_payload(&self, size_mib: u32) -> Result<u64, SpeedTestError> {
        let request = Download::new(&self.config.download_path, size_mib);
        let response = self.execute(request).await?;

        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        while let Some(chunk) = stream.next().await {
            received += chunk?.len() as u64;
        }

        Ok(received)
    }
}

/// Drive `fut` until it finishes or `cancel` fires, whichever comes first.
///
/// On cancellation the request future is dropped, closing its connection.
async fn cancelable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, SpeedTestError>>,
) -> Result<T, SpeedTestError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SpeedTestError::cancelled()),
        result = fut => result,
    }
}

impl Transport for Client {
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), SpeedTestError> {
        let request = Ping { path: &self.config.ping_path };
        let response: PingResponse = cancelable(cancel, self.send(request)).await?;

        if !response.pong {
            return Err(SpeedTestError::api("ping endpoint did not answer pong"));
        }

        debug!("pong, server timestamp {}", response.timestamp);
        Ok(())
    }

    async fn download(
        &self,
        size_mib: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, SpeedTestError> {
        if size_mib > MAX_DOWNLOAD_MIB {
            warn!(
                "Download chunk of {} MiB exceeds the server limit, requesting {} MiB",
                size_mib, MAX_DOWNLOAD_MIB
            );
        }

        cancelable(cancel, self.fetch_payload(size_mib)).await
    }

    async fn upload(
        &self,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<UploadAck, SpeedTestError> {
        let request = Upload::new(&self.config.upload_path, payload);
        cancelable(cancel, self.send(request)).await
    }
}
