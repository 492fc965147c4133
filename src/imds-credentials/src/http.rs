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
use crate::endpoint::Endpoint;
use crate::errors::{CredentialsError, ErrorKind};
use bytes::Bytes;
use http::{HeaderMap, Method};
use std::time::Duration;

/// A single request to the metadata service.
#[derive(Clone, Debug)]
pub struct MetadataRequest {
    /// The metadata service location.
    pub endpoint: Endpoint,
    /// The HTTP method, `PUT` for token requests, `GET` otherwise.
    pub method: Method,
    /// The request path, starting with `/`.
    pub path: String,
    /// Any additional headers, such as the session token.
    pub headers: HeaderMap,
    /// The request fails with [ErrorKind::Timeout] if it does not complete
    /// within this duration.
    pub timeout: Duration,
}

impl MetadataRequest {
    /// The full URL for this request.
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint.url(), self.path)
    }
}

/// Sends requests to the metadata service.
///
/// Implementations perform a single HTTP request, without retries, and return
/// the response body. Failures must be classified:
/// * [ErrorKind::Timeout] if the request exceeded `timeout`,
/// * [ErrorKind::Http] with the status code for unsuccessful responses,
/// * [ErrorKind::Io] for any other failure to send or receive.
#[async_trait::async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Sends `request` and returns the response body.
    async fn send(&self, request: MetadataRequest) -> Result<Bytes>;
}

/// A [Transport] based on [reqwest].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a new transport with a default `reqwest` client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new transport using an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // The status drives the protocol selection, keep it even if the body
        // is unreadable.
        match response.text().await {
            Ok(body) => Err(CredentialsError::from_http_status(status, body)),
            Err(e) => Err(CredentialsError::from_http_status(
                status,
                "cannot read the error response body",
            )
            .with_source(e)),
        }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: MetadataRequest) -> Result<Bytes> {
        let url = request.url();
        let response = self
            .inner
            .request(request.method, url)
            .headers(request.headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(from_reqwest_error)?;

        let response = Self::check_response_status(response).await?;
        response.bytes().await.map_err(from_reqwest_error)
    }
}

fn from_reqwest_error(e: reqwest::Error) -> CredentialsError {
    if e.is_timeout() {
        return CredentialsError::from_source(ErrorKind::Timeout, e);
    }
    CredentialsError::from_source(ErrorKind::Io, e)
}
