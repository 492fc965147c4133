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

//! Errors returned while retrieving credentials.

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

/// Represents an error obtaining [Credentials][crate::credentials::Credentials]
/// from the metadata service.
///
/// The credentials provider classifies each failure. Some failures change
/// which protocol the provider uses on later calls, others are retried, and
/// some are returned immediately. Applications can inspect the
/// classification with [kind()][CredentialsError::kind] and
/// [http_status()][CredentialsError::http_status].
///
/// # Example
/// ```
/// # use imds_credentials::errors::{CredentialsError, ErrorKind};
/// let err = CredentialsError::from_msg(ErrorKind::Io, "simulated connection reset");
/// assert!(err.is_transient());
/// assert!(format!("{err}").contains("simulated connection reset"));
/// ```
#[derive(Clone, Debug)]
pub struct CredentialsError {
    kind: ErrorKind,

    /// The HTTP status returned by the metadata service, if any.
    status: Option<StatusCode>,

    /// A human readable description of the failure.
    message: Option<String>,

    /// The underlying source of the error.
    source: Option<Arc<dyn Error + Send + Sync>>,
}

/// The classification of a [CredentialsError].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The metadata service endpoint could not be determined.
    Endpoint,
    /// A request did not complete before the configured timeout.
    Timeout,
    /// The metadata service returned an unsuccessful HTTP status.
    Http,
    /// The request could not be sent, or the response could not be read.
    Io,
    /// The metadata service returned a response with an unexpected shape.
    InvalidResponse,
}

impl CredentialsError {
    /// Creates a new `CredentialsError` wrapping `source`.
    ///
    /// # Arguments
    /// * `kind` - the classification for this error.
    /// * `source` - the underlying error that caused the failure.
    pub fn from_source<T: Error + Send + Sync + 'static>(kind: ErrorKind, source: T) -> Self {
        CredentialsError {
            kind,
            status: None,
            message: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` with a message and no source.
    ///
    /// # Arguments
    /// * `kind` - the classification for this error.
    /// * `message` - describes the failure.
    pub fn from_msg<T: Into<String>>(kind: ErrorKind, message: T) -> Self {
        CredentialsError {
            kind,
            status: None,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Creates an error representing an unsuccessful HTTP response.
    ///
    /// # Arguments
    /// * `status` - the HTTP status returned by the service.
    /// * `message` - describes the failure, typically the response body.
    pub fn from_http_status<T: Into<String>>(status: StatusCode, message: T) -> Self {
        CredentialsError {
            kind: ErrorKind::Http,
            status: Some(status),
            message: Some(message.into()),
            source: None,
        }
    }

    /// Attaches `source` as the underlying cause of this error.
    pub(crate) fn with_source<T: Error + Send + Sync + 'static>(mut self, source: T) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Replaces the message, keeping the classification and HTTP status.
    ///
    /// The original error becomes the [source()][Error::source] of the
    /// returned error.
    pub(crate) fn annotate<T: Into<String>>(self, message: T) -> Self {
        CredentialsError {
            kind: self.kind,
            status: self.status,
            message: Some(message.into()),
            source: Some(Arc::new(self)),
        }
    }

    /// The classification for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The HTTP status code returned by the metadata service, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns `true` if the request timed out.
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// Returns `true` if the error is transient.
    ///
    /// Transient errors may succeed if the operation is attempted again.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout | ErrorKind::Io => true,
            ErrorKind::Http => self.status.is_some_and(is_retryable),
            ErrorKind::Endpoint | ErrorKind::InvalidResponse => false,
        }
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    /// Formats the error message to include retryability and source.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let msg = if self.is_transient() {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        match (&self.message, self.status) {
            (Some(m), Some(s)) => write!(f, "{m} (HTTP status {s}) {msg}")?,
            (Some(m), None) => write!(f, "{m} {msg}")?,
            (None, Some(s)) => write!(f, "HTTP status {s} {msg}")?,
            (None, None) => write!(f, "cannot retrieve credentials {msg}")?,
        };
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(StatusCode::BAD_GATEWAY)]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(StatusCode::GATEWAY_TIMEOUT)]
    #[test_case(StatusCode::REQUEST_TIMEOUT)]
    #[test_case(StatusCode::TOO_MANY_REQUESTS)]
    fn retryable(c: StatusCode) {
        assert!(is_retryable(c));
        let e = CredentialsError::from_http_status(c, "test-only");
        assert!(e.is_transient(), "{e}");
    }

    #[test_case(StatusCode::NOT_FOUND)]
    #[test_case(StatusCode::UNAUTHORIZED)]
    #[test_case(StatusCode::FORBIDDEN)]
    #[test_case(StatusCode::BAD_REQUEST)]
    #[test_case(StatusCode::METHOD_NOT_ALLOWED)]
    fn non_retryable(c: StatusCode) {
        assert!(!is_retryable(c));
        let e = CredentialsError::from_http_status(c, "test-only");
        assert!(!e.is_transient(), "{e}");
    }

    #[test_case(ErrorKind::Timeout, true)]
    #[test_case(ErrorKind::Io, true)]
    #[test_case(ErrorKind::Endpoint, false)]
    #[test_case(ErrorKind::InvalidResponse, false)]
    fn transient_by_kind(kind: ErrorKind, want: bool) {
        let e = CredentialsError::from_msg(kind, "test-only");
        assert_eq!(e.is_transient(), want, "{e}");
        assert_eq!(e.kind(), kind);
        assert_eq!(e.is_timeout(), kind == ErrorKind::Timeout);
        assert!(e.http_status().is_none(), "{e:?}");
    }

    #[test]
    fn fmt() {
        let e = CredentialsError::from_msg(ErrorKind::Io, "test-only-err-123");
        let got = format!("{e}");
        assert!(got.contains("test-only-err-123"), "{got}");
        assert!(got.contains(TRANSIENT_MSG), "{got}");

        let e = CredentialsError::from_msg(ErrorKind::InvalidResponse, "test-only-err-123");
        let got = format!("{e}");
        assert!(got.contains("test-only-err-123"), "{got}");
        assert!(got.contains(PERMANENT_MSG), "{got}");

        let e = CredentialsError::from_http_status(StatusCode::NOT_FOUND, "not here");
        let got = format!("{e}");
        assert!(got.contains("not here"), "{got}");
        assert!(got.contains("404"), "{got}");
    }

    #[test]
    fn source() {
        let e = CredentialsError::from_msg(ErrorKind::Io, "test-only");
        assert!(e.source().is_none(), "{e:?}");

        let io = std::io::Error::other("test-only-io");
        let e = CredentialsError::from_source(ErrorKind::Io, io);
        let got = e.source().map(|s| s.to_string());
        assert_eq!(got.as_deref(), Some("test-only-io"));
        assert!(format!("{e}").contains("test-only-io"), "{e}");
    }

    #[test]
    fn annotate() {
        let original = CredentialsError::from_http_status(StatusCode::BAD_REQUEST, "bad ttl");
        let e = original.annotate("token request failed");
        assert_eq!(e.kind(), ErrorKind::Http);
        assert_eq!(e.http_status(), Some(StatusCode::BAD_REQUEST));
        let got = format!("{e}");
        assert!(got.contains("token request failed"), "{got}");
        assert!(got.contains("bad ttl"), "{got}");
        let source = e.source().and_then(|s| s.downcast_ref::<CredentialsError>());
        assert!(
            source.is_some_and(|s| s.http_status() == Some(StatusCode::BAD_REQUEST)),
            "{e:?}"
        );
    }
}
