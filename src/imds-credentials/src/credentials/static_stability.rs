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

//! Serve the last known credentials while the metadata service is unavailable.
//!
//! The metadata service may become unavailable for a short time, for example
//! during maintenance. Rather than failing every request, the wrapper in this
//! module keeps serving the last credentials it returned, extending their
//! expiration a few minutes at a time. See [static stability] for details.
//!
//! [static stability]: https://docs.aws.amazon.com/sdkref/latest/guide/feature-static-credentials.html

use super::{Credentials, CredentialsProvider};
use crate::Result;
use crate::constants::{
    STATIC_STABILITY_DOC_URL, STATIC_STABILITY_JITTER_WINDOW_SECONDS,
    STATIC_STABILITY_REFRESH_INTERVAL,
};
use crate::errors::CredentialsError;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// A callback invoked with the refresh error when stale credentials are
/// served.
#[derive(Clone)]
pub(crate) struct StaleCredentialsCallback(Arc<dyn Fn(&CredentialsError) + Send + Sync>);

impl StaleCredentialsCallback {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: Fn(&CredentialsError) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }
}

impl std::fmt::Debug for StaleCredentialsCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaleCredentialsCallback")
    }
}

/// Wraps a [CredentialsProvider] to serve its last successful result on
/// failure.
///
/// * If the inner provider succeeds, its credentials are returned and
///   remembered. Credentials that are already expired get their expiration
///   extended.
/// * If the inner provider fails after a previous success, the remembered
///   credentials are returned with an extended expiration.
/// * If the inner provider fails and there is no previous success, the error
///   is returned.
///
/// Extended credentials expire between 5 and 10 minutes in the future, and
/// keep the expiration returned by the service in
/// [original_expiration][Credentials::original_expiration].
#[derive(Debug)]
pub struct StaticStability<T> {
    inner: T,
    past_credentials: Mutex<Option<Credentials>>,
    on_stale: Option<StaleCredentialsCallback>,
}

impl<T> StaticStability<T>
where
    T: CredentialsProvider,
{
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            past_credentials: Mutex::new(None),
            on_stale: None,
        }
    }

    /// Sets a callback invoked each time stale credentials are served.
    ///
    /// The callback receives the error that prevented a refresh. Failures are
    /// also logged with [tracing], this is useful to export them as metrics.
    pub fn with_on_stale_credentials<F>(self, callback: F) -> Self
    where
        F: Fn(&CredentialsError) + Send + Sync + 'static,
    {
        self.with_stale_callback(StaleCredentialsCallback::new(callback))
    }

    pub(crate) fn with_stale_callback(mut self, callback: StaleCredentialsCallback) -> Self {
        self.on_stale = Some(callback);
        self
    }

    async fn on_failure(&self, error: CredentialsError) -> Result<Credentials> {
        let mut guard = self.past_credentials.lock().await;
        let Some(past) = guard.take() else {
            return Err(error);
        };
        tracing::warn!("Credential renew failed: {error}");
        if let Some(callback) = &self.on_stale {
            (callback.0)(&error);
        }
        let credentials = extend(past);
        *guard = Some(credentials.clone());
        Ok(credentials)
    }
}

#[async_trait::async_trait]
impl<T> CredentialsProvider for StaticStability<T>
where
    T: CredentialsProvider,
{
    async fn credentials(&self) -> Result<Credentials> {
        let credentials = match self.inner.credentials().await {
            Ok(c) if c.expiration < OffsetDateTime::now_utc() => extend(c),
            Ok(c) => c,
            Err(e) => return self.on_failure(e).await,
        };
        *self.past_credentials.lock().await = Some(credentials.clone());
        Ok(credentials)
    }
}

fn extend(credentials: Credentials) -> Credentials {
    use rand::Rng;
    let jitter = rand::rng().random_range(0..STATIC_STABILITY_JITTER_WINDOW_SECONDS);
    extend_with_jitter(credentials, OffsetDateTime::now_utc(), jitter)
}

fn extend_with_jitter(
    credentials: Credentials,
    now: OffsetDateTime,
    jitter_seconds: u64,
) -> Credentials {
    let expiration =
        now + STATIC_STABILITY_REFRESH_INTERVAL + std::time::Duration::from_secs(jitter_seconds);
    tracing::warn!(
        "Attempting credential expiration extension due to a credential service availability issue. \
         A refresh of these credentials will be attempted after {expiration}.\n\
         For more information, please visit: {STATIC_STABILITY_DOC_URL}"
    );
    let original_expiration = credentials
        .original_expiration
        .unwrap_or(credentials.expiration);
    Credentials {
        expiration,
        original_expiration: Some(original_expiration),
        ..credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{MockCredentialsProvider, test_credentials};
    use crate::errors::ErrorKind;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const MIN_EXTENSION: Duration = Duration::from_secs(300);
    const MAX_EXTENSION: Duration = Duration::from_secs(600);

    fn test_error() -> CredentialsError {
        CredentialsError::from_msg(ErrorKind::Io, "test-only connection refused")
    }

    fn assert_extended(got: &Credentials, before: OffsetDateTime) {
        let after = OffsetDateTime::now_utc();
        assert!(got.expiration >= before + MIN_EXTENSION, "{got:?}");
        assert!(got.expiration < after + MAX_EXTENSION, "{got:?}");
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<StdMutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    #[test]
    fn extend_bounds() {
        let now = OffsetDateTime::now_utc();
        let credentials = test_credentials(Duration::from_secs(60));
        let original = credentials.expiration;

        let got = extend_with_jitter(credentials.clone(), now, 0);
        assert_eq!(got.expiration, now + MIN_EXTENSION);
        assert_eq!(got.original_expiration, Some(original));
        assert_eq!(got.access_key_id, credentials.access_key_id);
        assert_eq!(got.secret_access_key, credentials.secret_access_key);
        assert_eq!(got.session_token, credentials.session_token);

        let got = extend_with_jitter(credentials, now, STATIC_STABILITY_JITTER_WINDOW_SECONDS - 1);
        assert_eq!(got.expiration, now + MAX_EXTENSION - Duration::from_secs(1));
    }

    #[test]
    fn extend_keeps_first_original_expiration() {
        let now = OffsetDateTime::now_utc();
        let credentials = test_credentials(Duration::from_secs(60));
        let original = credentials.expiration;
        let once = extend_with_jitter(credentials, now, 10);
        let twice = extend_with_jitter(once, now + Duration::from_secs(400), 20);
        assert_eq!(twice.original_expiration, Some(original));
        assert_eq!(
            twice.expiration,
            now + Duration::from_secs(400) + MIN_EXTENSION + Duration::from_secs(20)
        );
    }

    #[test]
    fn extend_random_jitter() {
        for _ in 0..100 {
            let before = OffsetDateTime::now_utc();
            let got = extend(test_credentials(Duration::ZERO));
            assert_extended(&got, before);
        }
    }

    #[tokio::test]
    async fn valid_credentials_pass_through() -> anyhow::Result<()> {
        let want = test_credentials(Duration::from_secs(3600));
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials().times(1).return_once({
            let want = want.clone();
            move || Ok(want)
        });

        let provider = StaticStability::new(mock);
        let got = provider.credentials().await?;
        assert_eq!(got, want);
        assert!(got.original_expiration.is_none(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn expired_credentials_are_extended() -> anyhow::Result<()> {
        let expired = Credentials {
            expiration: OffsetDateTime::now_utc() - Duration::from_secs(60),
            ..test_credentials(Duration::ZERO)
        };
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials().times(1).return_once({
            let expired = expired.clone();
            move || Ok(expired)
        });

        let before = OffsetDateTime::now_utc();
        let provider = StaticStability::new(mock);
        let got = provider.credentials().await?;
        assert_extended(&got, before);
        assert_eq!(got.original_expiration, Some(expired.expiration));
        assert_eq!(got.access_key_id, expired.access_key_id);
        Ok(())
    }

    #[tokio::test]
    async fn error_without_past_credentials() {
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials()
            .times(2)
            .returning(|| Err(test_error()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let provider = StaticStability::new(mock).with_on_stale_credentials(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..2 {
            let err = provider.credentials().await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io, "{err:?}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_with_past_credentials() -> anyhow::Result<()> {
        let first = test_credentials(Duration::from_secs(3600));
        let mut seq = mockall::Sequence::new();
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .return_once({
                let first = first.clone();
                move || Ok(first)
            });
        mock.expect_credentials()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Err(test_error()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let recorder = errors.clone();

        let provider = StaticStability::new(mock).with_on_stale_credentials(move |e| {
            recorder.lock().unwrap().push(e.to_string());
        });
        let got = provider.credentials().await?;
        assert_eq!(got, first);

        let before = OffsetDateTime::now_utc();
        let stale = provider.credentials().await?;
        assert_extended(&stale, before);
        assert_eq!(stale.access_key_id, first.access_key_id);
        assert_eq!(stale.original_expiration, Some(first.expiration));

        let before = OffsetDateTime::now_utc();
        let stale = provider.credentials().await?;
        assert_extended(&stale, before);
        assert_eq!(stale.original_expiration, Some(first.expiration));

        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(
            errors.iter().all(|e| e.contains("test-only connection refused")),
            "{errors:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn recovers_after_failure() -> anyhow::Result<()> {
        let first = test_credentials(Duration::from_secs(3600));
        let fresh = Credentials {
            access_key_id: "fresh-access-key-id".to_string(),
            ..test_credentials(Duration::from_secs(7200))
        };
        let mut seq = mockall::Sequence::new();
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .return_once({
                let first = first.clone();
                move || Ok(first)
            });
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(test_error()));
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .return_once({
                let fresh = fresh.clone();
                move || Ok(fresh)
            });

        let provider = StaticStability::new(mock);
        let _ = provider.credentials().await?;
        let stale = provider.credentials().await?;
        assert!(stale.original_expiration.is_some(), "{stale:?}");
        let got = provider.credentials().await?;
        assert_eq!(got, fresh);
        Ok(())
    }

    #[tokio::test]
    async fn extension_is_logged() -> anyhow::Result<()> {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut seq = mockall::Sequence::new();
        let mut mock = MockCredentialsProvider::new();
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|| Ok(test_credentials(Duration::from_secs(3600))));
        mock.expect_credentials()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(test_error()));

        let provider = StaticStability::new(mock);
        let _ = provider.credentials().await?;
        assert!(buffer.contents().is_empty(), "{}", buffer.contents());
        let _ = provider.credentials().await?;
        let logs = buffer.contents();
        assert!(logs.contains("Credential renew failed"), "{logs}");
        assert!(logs.contains("test-only connection refused"), "{logs}");
        assert!(logs.contains(STATIC_STABILITY_DOC_URL), "{logs}");
        Ok(())
    }
}
