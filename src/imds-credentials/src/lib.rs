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

//! Temporary security credentials from the EC2 Instance Metadata Service.
//!
//! Compute instances can reach a link-local [Instance Metadata Service]
//! (IMDS). Among other things, the service vends short-lived credentials for
//! the role attached to the instance. The types in this crate discover that
//! role and retrieve its credentials, refreshing them as needed.
//!
//! The service supports two protocols. In the token-based protocol (IMDSv2)
//! each request carries a session token obtained with a `PUT` request. The
//! legacy protocol (IMDSv1) uses plain `GET` requests. The credentials
//! provider discovers which protocol works and remembers the result, falling
//! back to the legacy protocol when the token endpoint is unavailable and
//! returning to the token-based protocol when the service starts rejecting
//! unauthenticated requests.
//!
//! Example usage:
//!
//! ```no_run
//! # use imds_credentials::credentials::instance_metadata::Builder;
//! # tokio_test::block_on(async {
//! let provider = Builder::default().with_max_retries(2).build()?;
//! let credentials = provider.credentials().await?;
//! println!("access key id: {}", credentials.access_key_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! [Instance Metadata Service]: https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-retrieval.html

pub mod build_errors;
pub mod errors;

/// Types and functions to obtain and wrap instance credentials.
pub mod credentials;

/// Locate the metadata service.
pub mod endpoint;

/// Send requests to the metadata service.
pub mod http;

/// Retry loops and backoff policies for metadata requests.
pub mod retry;

pub(crate) mod constants;

/// The credentials cache.
pub(crate) mod credentials_cache;

pub(crate) mod options;

/// A `Result` alias where the `Err` case is
/// `imds_credentials::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// The result type for builders.
pub(crate) type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
