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

//! The credentials document returned by the metadata service.
//!
//! The service returns a JSON object such as:
//!
//! ```json
//! {
//!   "Code": "Success",
//!   "LastUpdated": "2026-10-17T12:00:00Z",
//!   "Type": "AWS-HMAC",
//!   "AccessKeyId": "ASIAEXAMPLE",
//!   "SecretAccessKey": "secret",
//!   "Token": "session-token",
//!   "Expiration": "2026-10-17T18:00:00Z"
//! }
//! ```

use super::Credentials;
use crate::Result;
use crate::constants::INVALID_RESPONSE_ERROR;
use crate::errors::{CredentialsError, ErrorKind};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The credentials document, as returned by the metadata service.
///
/// All the fields without an `Option` are mandatory, the document is rejected
/// if any of them is missing or is not a string.
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImdsCredentials {
    /// The outcome reported by the service, typically `Success`.
    pub code: String,
    /// The access key id.
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
    /// The session token. Temporary credentials are unusable without it.
    pub token: String,
    /// An RFC 3339 timestamp.
    pub expiration: String,
    /// The account owning the role, if reported.
    pub account_id: Option<String>,
    /// When the service last rotated these credentials.
    pub last_updated: Option<String>,
    /// The credentials type, typically `AWS-HMAC`.
    #[serde(rename = "Type")]
    pub credentials_type: Option<String>,
}

impl std::fmt::Debug for ImdsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImdsCredentials")
            .field("code", &self.code)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[censored]")
            .field("token", &"[censored]")
            .field("expiration", &self.expiration)
            .field("account_id", &self.account_id)
            .field("last_updated", &self.last_updated)
            .field("credentials_type", &self.credentials_type)
            .finish()
    }
}

impl TryFrom<ImdsCredentials> for Credentials {
    type Error = CredentialsError;

    fn try_from(value: ImdsCredentials) -> Result<Self> {
        let expiration = OffsetDateTime::parse(&value.expiration, &Rfc3339).map_err(|e| {
            CredentialsError::from_source(ErrorKind::InvalidResponse, e)
                .annotate(INVALID_RESPONSE_ERROR)
        })?;
        Ok(Credentials {
            access_key_id: value.access_key_id,
            secret_access_key: value.secret_access_key,
            session_token: value.token,
            expiration,
            account_id: value.account_id,
            original_expiration: None,
        })
    }
}

/// Validates a credentials document and maps it to [Credentials].
///
/// Fails with [ErrorKind::InvalidResponse] if the body is not a JSON object,
/// if any mandatory field is missing or mistyped, or if the expiration is not
/// an RFC 3339 timestamp.
pub fn from_slice(body: &[u8]) -> Result<Credentials> {
    let document = serde_json::from_slice::<ImdsCredentials>(body).map_err(|e| {
        CredentialsError::from_source(ErrorKind::InvalidResponse, e)
            .annotate(INVALID_RESPONSE_ERROR)
    })?;
    Credentials::try_from(document)
}
