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
use std::sync::Arc;
use time::OffsetDateTime;

pub mod imds;
pub mod instance_metadata;
pub mod static_stability;

/// Temporary security credentials for the role attached to the instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The access key id.
    pub access_key_id: String,

    /// The secret access key. This value is censored in debug output.
    pub secret_access_key: String,

    /// The session token. This value is censored in debug output.
    pub session_token: String,

    /// When the credentials expire.
    ///
    /// Credentials served after a failure to refresh them may have an
    /// expiration later than the one returned by the service, see
    /// [StaticStability][static_stability::StaticStability].
    pub expiration: OffsetDateTime,

    /// The account that owns the role, if the service reports it.
    pub account_id: Option<String>,

    /// The expiration returned by the service, set only if `expiration` was
    /// extended.
    pub original_expiration: Option<OffsetDateTime>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[censored]")
            .field("session_token", &"[censored]")
            .field("expiration", &self.expiration)
            .field("account_id", &self.account_id)
            .field("original_expiration", &self.original_expiration)
            .finish()
    }
}

/// Retrieves [Credentials].
///
/// The instance metadata provider, the static stability wrapper, and the
/// credentials cache all implement this trait. Applications can implement it
/// to layer their own policies, or to mock the provider in tests.
#[async_trait::async_trait]
pub trait CredentialsProvider: std::fmt::Debug + Send + Sync {
    /// Asynchronously retrieves credentials.
    async fn credentials(&self) -> Result<Credentials>;
}

/// A handle to a [CredentialsProvider].
///
/// Cloning the handle is cheap, all the clones share the same provider and
/// its state.
#[derive(Clone, Debug)]
pub struct Provider {
    inner: Arc<dyn CredentialsProvider>,
}

impl<T> std::convert::From<T> for Provider
where
    T: CredentialsProvider + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Provider {
    /// Asynchronously retrieves credentials.
    pub async fn credentials(&self) -> Result<Credentials> {
        self.inner.credentials().await
    }
}
