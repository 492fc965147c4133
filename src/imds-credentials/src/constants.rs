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

use std::time::Duration;

/// Lists the role attached to the instance. Append the role name to fetch its
/// credentials.
pub(crate) const IMDS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
pub(crate) const IMDS_TOKEN_PATH: &str = "/latest/api/token";

pub(crate) const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
pub(crate) const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
pub(crate) const TOKEN_TTL_SECONDS: &str = "21600";

pub(crate) const TOKEN_REQUEST_FAILED_ERROR: &str = "EC2 Metadata token request returned error";
pub(crate) const INVALID_RESPONSE_ERROR: &str =
    "Invalid response received from instance metadata service.";

pub(crate) const ENV_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
pub(crate) const ENV_ENDPOINT_MODE: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT_MODE";
pub(crate) const ENV_TIMEOUT: &str = "AWS_METADATA_SERVICE_TIMEOUT";
pub(crate) const ENV_NUM_ATTEMPTS: &str = "AWS_METADATA_SERVICE_NUM_ATTEMPTS";

pub(crate) const IPV4_ENDPOINT: &str = "http://169.254.169.254";
pub(crate) const IPV6_ENDPOINT: &str = "http://[fd00:ec2::254]";

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 0;

pub(crate) const STATIC_STABILITY_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub(crate) const STATIC_STABILITY_JITTER_WINDOW_SECONDS: u64 = 5 * 60;
pub(crate) const STATIC_STABILITY_DOC_URL: &str =
    "https://docs.aws.amazon.com/sdkref/latest/guide/feature-static-credentials.html";

/// Cached credentials are refreshed when they are this close to expiring.
pub(crate) const CACHE_REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);
