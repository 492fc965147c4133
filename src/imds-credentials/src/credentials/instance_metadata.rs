// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [Instance Metadata Service] credentials.
//!
//! EC2 instances (and other compute environments emulating them) provide a
//! metadata service. This is a local service to the instance which, among
//! other things, vends temporary credentials for the role attached to the
//! instance.
//!
//! Retrieving credentials requires two requests: one to discover the name of
//! the attached role, and one to fetch the credentials for that role. If the
//! service supports it, both requests are authenticated with a session token
//! obtained with a third request.
//!
//! Example usage:
//!
//! ```
//! # use imds_credentials::credentials::instance_metadata::Builder;
//! # use std::time::Duration;
//! # tokio_test::block_on(async {
//! let provider = Builder::default()
//!     .with_timeout(Duration::from_millis(500))
//!     .with_max_retries(3)
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! [Instance Metadata Service]: https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-retrieval.html

use super::static_stability::{StaleCredentialsCallback, StaticStability};
use super::{Credentials, CredentialsProvider, Provider, imds};
use crate::build_errors::Error as BuilderError;
use crate::constants::{
    IMDS_PATH, IMDS_TOKEN_PATH, INVALID_RESPONSE_ERROR, TOKEN_HEADER, TOKEN_REQUEST_FAILED_ERROR,
    TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS,
};
use crate::credentials_cache::CredentialsCache;
use crate::endpoint::{Endpoint, EndpointMode, EndpointResolver, EnvEndpointResolver};
use crate::errors::{CredentialsError, ErrorKind};
use crate::http::{MetadataRequest, ReqwestTransport, Transport};
use crate::options::ProviderConfig;
use crate::retry::{BackoffPolicy, ExponentialBackoff, retry_loop};
use crate::{BuildResult, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Creates [Provider] instances backed by the [Instance Metadata Service].
///
/// The provider returned by [build()][Builder::build] caches credentials
/// until they are close to expiring. If refreshing them fails, it continues
/// to serve the last known credentials, extending their expiration by a few
/// minutes each time.
///
/// # Example
/// ```
/// # use imds_credentials::credentials::instance_metadata::Builder;
/// # use imds_credentials::endpoint::EndpointMode;
/// let provider = Builder::default()
///     .with_endpoint_mode(EndpointMode::IPv6)
///     .with_on_stale_credentials(|e| eprintln!("serving stale credentials: {e}"))
///     .build()?;
/// # Ok::<(), imds_credentials::build_errors::Error>(())
/// ```
///
/// [Instance Metadata Service]: https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-retrieval.html
#[derive(Debug, Default)]
pub struct Builder {
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    endpoint: Option<String>,
    endpoint_mode: Option<EndpointMode>,
    backoff_policy: Option<Arc<dyn BackoffPolicy>>,
    transport: Option<Arc<dyn Transport>>,
    endpoint_resolver: Option<Arc<dyn EndpointResolver>>,
    on_stale_credentials: Option<StaleCredentialsCallback>,
}

impl Builder {
    /// Sets the timeout for each request to the metadata service.
    ///
    /// If not set, the provider uses the `AWS_METADATA_SERVICE_TIMEOUT`
    /// environment variable (in seconds), or one second.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of retries for each step of the credentials retrieval.
    ///
    /// If not set, the provider uses the `AWS_METADATA_SERVICE_NUM_ATTEMPTS`
    /// environment variable (the total number of attempts), or no retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the metadata service endpoint, such as `http://169.254.169.254`.
    ///
    /// If not set, the provider uses the `AWS_EC2_METADATA_SERVICE_ENDPOINT`
    /// environment variable, or the default endpoint for the
    /// [endpoint mode][Builder::with_endpoint_mode].
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Selects the default endpoint when none is configured.
    pub fn with_endpoint_mode(mut self, mode: EndpointMode) -> Self {
        self.endpoint_mode = Some(mode);
        self
    }

    /// Sets the backoff policy used between retries.
    pub fn with_backoff_policy<P: BackoffPolicy + 'static>(mut self, policy: P) -> Self {
        self.backoff_policy = Some(Arc::new(policy));
        self
    }

    /// Sets the transport used to send requests.
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replaces the endpoint resolution.
    ///
    /// Any values set with [with_endpoint][Builder::with_endpoint] or
    /// [with_endpoint_mode][Builder::with_endpoint_mode] are ignored.
    pub fn with_endpoint_resolver<R: EndpointResolver + 'static>(mut self, resolver: R) -> Self {
        self.endpoint_resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets a callback invoked each time the provider serves stale
    /// credentials after a failure to refresh them.
    pub fn with_on_stale_credentials<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CredentialsError) + Send + Sync + 'static,
    {
        self.on_stale_credentials = Some(StaleCredentialsCallback::new(callback));
        self
    }

    /// Returns a [Provider] with the configured settings.
    ///
    /// Fails if the configuration, including any environment variables, is
    /// invalid.
    pub fn build(mut self) -> BuildResult<Provider> {
        let on_stale = self.on_stale_credentials.take();
        let mut stable = StaticStability::new(self.build_core()?);
        if let Some(callback) = on_stale {
            stable = stable.with_stale_callback(callback);
        }
        Ok(Provider::from(CredentialsCache::new(stable)))
    }

    /// Returns the bare protocol implementation, without caching or static
    /// stability.
    ///
    /// Every call to [credentials()][CredentialsProvider::credentials] on the
    /// returned value contacts the metadata service.
    pub fn build_core(self) -> BuildResult<InstanceMetadataProvider> {
        let config = ProviderConfig::resolve(self.timeout, self.max_retries)?;
        let resolver = match self.endpoint_resolver {
            Some(r) => r,
            None => {
                let mut r = EnvEndpointResolver::new();
                if let Some(endpoint) = self.endpoint {
                    Endpoint::parse(&endpoint)
                        .map_err(|e| BuilderError::invalid_config("endpoint", e))?;
                    r = r.with_endpoint(endpoint);
                }
                if let Some(mode) = self.endpoint_mode {
                    r = r.with_mode(mode);
                }
                Arc::new(r)
            }
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let backoff = self
            .backoff_policy
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));
        Ok(InstanceMetadataProvider {
            config,
            resolver,
            transport,
            backoff,
            token_fetch_disabled: AtomicBool::new(false),
        })
    }
}

/// Retrieves credentials from the metadata service.
///
/// The provider starts using the token-based protocol. It switches to the
/// legacy protocol if the token request times out or is rejected with
/// `403`, `404` or `405`, and switches back if a later request is rejected
/// with `401`. The switch back only affects the next call, the current call
/// fails or continues without a token.
///
/// Concurrent calls share the protocol selection. Updates are not
/// synchronized beyond the atomicity of the flag itself, a concurrent call
/// may probe or skip the token request once more than needed.
#[derive(Debug)]
pub struct InstanceMetadataProvider {
    config: ProviderConfig,
    resolver: Arc<dyn EndpointResolver>,
    transport: Arc<dyn Transport>,
    backoff: Arc<dyn BackoffPolicy>,
    token_fetch_disabled: AtomicBool,
}

impl InstanceMetadataProvider {
    #[cfg(test)]
    pub(crate) fn token_fetch_disabled(&self) -> bool {
        self.token_fetch_disabled.load(Ordering::Relaxed)
    }

    async fn fetch_credentials(&self) -> Result<Credentials> {
        let endpoint = self.resolver.resolve().await?;
        let mut headers = HeaderMap::new();
        if !self.token_fetch_disabled.load(Ordering::Relaxed) {
            if let Some(token) = self.fetch_token(&endpoint).await? {
                headers.insert(TOKEN_HEADER, token);
            }
        }
        let profile = self.get_profile(&endpoint, &headers).await?;
        self.get_credentials_from_profile(&endpoint, &headers, &profile)
            .await
    }

    /// Returns the session token, or `None` to continue without one.
    async fn fetch_token(&self, endpoint: &Endpoint) -> Result<Option<HeaderValue>> {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_TTL_HEADER, HeaderValue::from_static(TOKEN_TTL_SECONDS));
        let request = self.request(endpoint, Method::PUT, IMDS_TOKEN_PATH, headers);
        let error = match self.transport.send(request).await {
            Ok(body) => return Ok(token_header(body)),
            Err(e) => e,
        };
        match error.http_status() {
            Some(StatusCode::BAD_REQUEST) => Err(error.annotate(TOKEN_REQUEST_FAILED_ERROR)),
            Some(StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) => {
                self.disable_token_fetch(&error);
                Ok(None)
            }
            _ if error.is_timeout() => {
                self.disable_token_fetch(&error);
                Ok(None)
            }
            _ => {
                tracing::debug!("continuing without a session token: {error}");
                Ok(None)
            }
        }
    }

    async fn get_profile(&self, endpoint: &Endpoint, headers: &HeaderMap) -> Result<String> {
        let body = self.get_with_retry(endpoint, IMDS_PATH, headers).await?;
        let profile = std::str::from_utf8(&body)
            .map_err(|e| {
                CredentialsError::from_source(ErrorKind::InvalidResponse, e)
                    .annotate(INVALID_RESPONSE_ERROR)
            })?
            .trim();
        if profile.is_empty() {
            return Err(CredentialsError::from_msg(
                ErrorKind::InvalidResponse,
                format!("{INVALID_RESPONSE_ERROR} No role is attached to the instance."),
            ));
        }
        Ok(profile.to_string())
    }

    async fn get_credentials_from_profile(
        &self,
        endpoint: &Endpoint,
        headers: &HeaderMap,
        profile: &str,
    ) -> Result<Credentials> {
        let path = format!("{IMDS_PATH}{profile}");
        let body = self.get_with_retry(endpoint, &path, headers).await?;
        imds::from_slice(&body)
    }

    async fn get_with_retry(
        &self,
        endpoint: &Endpoint,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Bytes> {
        retry_loop(
            || {
                let request = self.request(endpoint, Method::GET, path, headers.clone());
                async move {
                    self.transport
                        .send(request)
                        .await
                        .inspect_err(|e| self.on_request_error(e))
                }
            },
            tokio::time::sleep,
            self.config.max_retries,
            self.backoff.as_ref(),
        )
        .await
    }

    fn on_request_error(&self, error: &CredentialsError) {
        if error.http_status() == Some(StatusCode::UNAUTHORIZED) {
            self.token_fetch_disabled.store(false, Ordering::Relaxed);
            tracing::debug!("re-enabling session tokens after: {error}");
        }
    }

    fn disable_token_fetch(&self, error: &CredentialsError) {
        self.token_fetch_disabled.store(true, Ordering::Relaxed);
        tracing::debug!("disabling session tokens after: {error}");
    }

    fn request(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        headers: HeaderMap,
    ) -> MetadataRequest {
        MetadataRequest {
            endpoint: endpoint.clone(),
            method,
            path: path.to_string(),
            headers,
            timeout: self.config.timeout,
        }
    }
}

fn token_header(body: Bytes) -> Option<HeaderValue> {
    match HeaderValue::from_maybe_shared(body) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(e) => {
            tracing::warn!("the session token is not a valid header value, continuing without it: {e}");
            None
        }
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for InstanceMetadataProvider {
    async fn credentials(&self) -> Result<Credentials> {
        self.fetch_credentials().await
    }
}
