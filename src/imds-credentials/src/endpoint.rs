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

use crate::Result;
use crate::constants::{ENV_ENDPOINT, ENV_ENDPOINT_MODE, IPV4_ENDPOINT, IPV6_ENDPOINT};
use crate::errors::{CredentialsError, ErrorKind};
use std::str::FromStr;

/// The location of the metadata service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// The URL scheme, typically `http`.
    pub protocol: String,

    /// The host name or address. IPv6 addresses include the square brackets.
    pub host: String,

    /// The port, if it differs from the default port for `protocol`.
    pub port: Option<u16>,
}

impl Endpoint {
    /// Parses an endpoint from a URL such as `http://169.254.169.254`.
    ///
    /// # Example
    /// ```
    /// # use imds_credentials::endpoint::Endpoint;
    /// let endpoint = Endpoint::parse("http://[fd00:ec2::254]:8080")?;
    /// assert_eq!(endpoint.host, "[fd00:ec2::254]");
    /// assert_eq!(endpoint.port, Some(8080));
    /// # Ok::<(), imds_credentials::errors::CredentialsError>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self> {
        let url = url::Url::parse(value).map_err(|e| {
            CredentialsError::from_source(ErrorKind::Endpoint, e)
                .annotate(format!("invalid metadata service endpoint {value}"))
        })?;
        let host = url.host_str().ok_or_else(|| {
            CredentialsError::from_msg(
                ErrorKind::Endpoint,
                format!("the metadata service endpoint {value} has no host"),
            )
        })?;
        Ok(Self {
            protocol: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
        })
    }

    /// Returns the base URL for requests, without a trailing slash.
    pub fn url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.protocol, self.host),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

/// Selects the default metadata service address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndpointMode {
    /// Use `http://169.254.169.254`.
    #[default]
    IPv4,
    /// Use `http://[fd00:ec2::254]`.
    IPv6,
}

impl EndpointMode {
    fn endpoint(&self) -> &'static str {
        match self {
            EndpointMode::IPv4 => IPV4_ENDPOINT,
            EndpointMode::IPv6 => IPV6_ENDPOINT,
        }
    }
}

impl FromStr for EndpointMode {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(EndpointMode::IPv4),
            "ipv6" => Ok(EndpointMode::IPv6),
            _ => Err(CredentialsError::from_msg(
                ErrorKind::Endpoint,
                format!("Unsupported endpoint mode: {s}. Select from IPv4,IPv6"),
            )),
        }
    }
}

/// Determines the metadata service endpoint.
///
/// The credentials provider calls the resolver on every attempt to retrieve
/// credentials. Implementations should cache any expensive lookups.
#[async_trait::async_trait]
pub trait EndpointResolver: std::fmt::Debug + Send + Sync {
    /// Returns the metadata service endpoint.
    async fn resolve(&self) -> Result<Endpoint>;
}

/// Resolves the endpoint from explicit settings or the environment.
///
/// The resolver uses, in order:
/// * the endpoint set with [with_endpoint][EnvEndpointResolver::with_endpoint],
/// * the `AWS_EC2_METADATA_SERVICE_ENDPOINT` environment variable,
/// * the default address for the endpoint mode. The mode is set with
///   [with_mode][EnvEndpointResolver::with_mode], or with the
///   `AWS_EC2_METADATA_SERVICE_ENDPOINT_MODE` environment variable, and
///   defaults to [EndpointMode::IPv4].
#[derive(Clone, Debug, Default)]
pub struct EnvEndpointResolver {
    endpoint: Option<String>,
    mode: Option<EndpointMode>,
}

impl EnvEndpointResolver {
    /// Creates a resolver with no explicit settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint, overriding the environment.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the endpoint mode, overriding the environment.
    pub fn with_mode(mut self, mode: EndpointMode) -> Self {
        self.mode = Some(mode);
        self
    }

    fn resolve_now(&self) -> Result<Endpoint> {
        if let Some(e) = self
            .endpoint
            .clone()
            .or_else(|| std::env::var(ENV_ENDPOINT).ok())
        {
            return Endpoint::parse(&e);
        }
        let mode = match (self.mode, std::env::var(ENV_ENDPOINT_MODE)) {
            (Some(m), _) => m,
            (None, Ok(m)) => m.parse::<EndpointMode>()?,
            (None, Err(_)) => EndpointMode::default(),
        };
        Endpoint::parse(mode.endpoint())
    }
}

#[async_trait::async_trait]
impl EndpointResolver for EnvEndpointResolver {
    async fn resolve(&self) -> Result<Endpoint> {
        self.resolve_now()
    }
}
