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

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, ENV_NUM_ATTEMPTS, ENV_TIMEOUT};
use std::time::Duration;

/// The effective configuration for a credentials provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ProviderConfig {
    /// The per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt, for each retried request.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ProviderConfig {
    /// Resolves the configuration.
    ///
    /// Explicit values win over the environment, which wins over the
    /// defaults. Invalid environment values are errors, they are not ignored.
    pub fn resolve(timeout: Option<Duration>, max_retries: Option<u32>) -> BuildResult<Self> {
        let timeout = match timeout {
            Some(t) => t,
            None => timeout_from_env()?.unwrap_or(DEFAULT_TIMEOUT),
        };
        let max_retries = match max_retries {
            Some(r) => r,
            None => max_retries_from_env()?.unwrap_or(DEFAULT_MAX_RETRIES),
        };
        Ok(Self {
            timeout,
            max_retries,
        })
    }
}

fn timeout_from_env() -> BuildResult<Option<Duration>> {
    let Ok(value) = std::env::var(ENV_TIMEOUT) else {
        return Ok(None);
    };
    let seconds = value
        .trim()
        .parse::<f64>()
        .map_err(|e| BuilderError::invalid_config(ENV_TIMEOUT, e))?;
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|e| BuilderError::invalid_config(ENV_TIMEOUT, e))
}

fn max_retries_from_env() -> BuildResult<Option<u32>> {
    let Ok(value) = std::env::var(ENV_NUM_ATTEMPTS) else {
        return Ok(None);
    };
    let attempts = value
        .trim()
        .parse::<u32>()
        .map_err(|e| BuilderError::invalid_config(ENV_NUM_ATTEMPTS, e))?;
    match attempts {
        0 => Err(BuilderError::invalid_config(
            ENV_NUM_ATTEMPTS,
            "the number of attempts must be at least 1",
        )),
        n => Ok(Some(n - 1)),
    }
}
