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

//! Errors created during credentials provider construction.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credentials provider builders.
///
/// Applications rarely need to create instances of this error type. The
/// exception might be when testing application code, where the application is
/// mocking a client library behavior.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A configuration value, from the builder or the environment, is invalid.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidConfig { .. })
    }

    /// The backoff policy parameters are invalid.
    pub fn is_invalid_backoff(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidBackoff(_))
    }

    /// Create an error representing an invalid configuration value.
    pub(crate) fn invalid_config<T>(name: &'static str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::InvalidConfig {
            name,
            source: source.into(),
        })
    }

    /// Create an error representing invalid backoff parameters.
    pub(crate) fn invalid_backoff<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::InvalidBackoff(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("invalid value for {name}: {source}")]
    InvalidConfig {
        name: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("invalid backoff policy: {0}")]
    InvalidBackoff(#[source] BoxError),
}
