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

//! Retry loops should avoid immediately retrying a request, as the service
//! may need time to recover. [Exponential backoff] is a well known algorithm
//! to find an acceptable delay between retries.
//!
//! # Example
//! ```
//! # use imds_credentials::retry::ExponentialBackoffBuilder;
//! # use imds_credentials::credentials::instance_metadata::Builder;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_millis(50))
//!     .with_maximum_delay(Duration::from_millis(500))
//!     .build()?;
//! let builder = Builder::default()
//!     .with_max_retries(3)
//!     .with_backoff_policy(backoff);
//! # Ok::<(), imds_credentials::build_errors::Error>(())
//! ```
//!
//! [Exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

use crate::Result;
use crate::build_errors::Error as BuilderError;
use std::future::Future;
use std::time::{Duration, Instant};

/// Defines the trait implemented by all backoff strategies.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the backoff delay on a failure.
    ///
    /// # Parameters
    /// * `loop_start` - when the retry loop started.
    /// * `attempt_count` - the number of attempts. This method is always called
    ///   after the first attempt.
    fn on_failure(&self, loop_start: Instant, attempt_count: u32) -> Duration;
}

/// Builds [ExponentialBackoff] policies.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl ExponentialBackoffBuilder {
    /// Creates a builder with the default parameters.
    ///
    /// The metadata service is local to the instance, the defaults are much
    /// shorter than those used for remote services.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            maximum_delay: Duration::from_secs(1),
            scaling: 2.0,
        }
    }

    /// Change the initial delay.
    pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_delay = v.into();
        self
    }

    /// Change the maximum delay.
    pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_delay = v.into();
        self
    }

    /// Change the scaling factor in this backoff policy.
    pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
        self.scaling = v.into();
        self
    }

    /// Creates a new exponential backoff policy.
    ///
    /// Fails if the scaling factor is smaller than `1.0`, the initial delay
    /// is zero, or the maximum delay is smaller than the initial delay.
    pub fn build(self) -> std::result::Result<ExponentialBackoff, BuilderError> {
        if self.scaling < 1.0 {
            return Err(BuilderError::invalid_backoff(format!(
                "the scaling value ({}) should be >= 1.0",
                self.scaling
            )));
        }
        if self.initial_delay.is_zero() {
            return Err(BuilderError::invalid_backoff(format!(
                "the initial delay ({:?}) should be greater than zero",
                self.initial_delay
            )));
        }
        if self.maximum_delay < self.initial_delay {
            return Err(BuilderError::invalid_backoff(format!(
                "the maximum delay ({:?}) should be greater than or equal to the initial delay ({:?})",
                self.maximum_delay, self.initial_delay
            )));
        }
        Ok(ExponentialBackoff {
            initial_delay: self.initial_delay,
            maximum_delay: self.maximum_delay,
            scaling: self.scaling,
        })
    }

    /// Creates a new exponential backoff policy clamping the ranges towards
    /// recommended values.
    ///
    /// The maximum delay is clamped to be between one millisecond and one
    /// minute. The initial delay is clamped to be between one millisecond and
    /// the maximum delay. The scaling factor is clamped to `[1.0, 32.0]`.
    pub fn clamp(self) -> ExponentialBackoff {
        let scaling = self.scaling.clamp(1.0, 32.0);
        let maximum_delay = self
            .maximum_delay
            .clamp(Duration::from_millis(1), Duration::from_secs(60));
        let initial_delay = self
            .initial_delay
            .clamp(Duration::from_millis(1), maximum_delay);
        ExponentialBackoff {
            initial_delay,
            maximum_delay,
            scaling,
        }
    }
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Implements truncated exponential backoff with full jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl ExponentialBackoff {
    fn delay(&self, attempt_count: u32) -> Duration {
        let exp = std::cmp::min(i32::MAX as u32, attempt_count) as i32;
        let exp = exp.saturating_sub(1);
        let scaling = self.scaling.powi(exp);
        if scaling >= self.maximum_delay.div_duration_f64(self.initial_delay) {
            self.maximum_delay
        } else {
            // Cannot panic: scaling >= 1.0 and initial_delay * scaling < maximum_delay.
            self.initial_delay.mul_f64(scaling)
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::new().clamp()
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn on_failure(&self, _loop_start: Instant, attempt_count: u32) -> Duration {
        use rand::Rng;
        let delay = self.delay(attempt_count);
        rand::rng().random_range(Duration::ZERO..=delay)
    }
}

/// Runs `inner` until it succeeds or `max_retries` retries are exhausted.
///
/// The loop makes at most `max_retries + 1` attempts. In between attempts it
/// waits the delay prescribed by `backoff_policy`, using `sleep`. Once the
/// attempts are exhausted the loop returns the last error unchanged.
pub(crate) async fn retry_loop<F, Fut, S, SFut, T>(
    mut inner: F,
    sleep: S,
    max_retries: u32,
    backoff_policy: &dyn BackoffPolicy,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let loop_start = tokio::time::Instant::now().into_std();
    let mut attempt_count = 0_u32;
    loop {
        attempt_count += 1;
        let error = match inner().await {
            Ok(r) => return Ok(r),
            Err(e) => e,
        };
        if attempt_count > max_retries {
            tracing::debug!(attempt_count, "metadata request attempts exhausted: {error}");
            return Err(error);
        }
        let delay = backoff_policy.on_failure(loop_start, attempt_count);
        tracing::debug!(
            attempt_count,
            ?delay,
            "retrying metadata request after error: {error}"
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::{CredentialsError, ErrorKind};
    use std::sync::{Arc, Mutex};
    use test_case::test_case;

    /// A backoff policy with no delays, used by tests in other modules.
    #[derive(Debug)]
    pub(crate) struct NoBackoff;

    impl BackoffPolicy for NoBackoff {
        fn on_failure(&self, _loop_start: Instant, _attempt_count: u32) -> Duration {
            Duration::ZERO
        }
    }

    #[derive(Debug)]
    struct LinearBackoff;

    impl BackoffPolicy for LinearBackoff {
        fn on_failure(&self, _loop_start: Instant, attempt_count: u32) -> Duration {
            Duration::from_millis(10) * attempt_count
        }
    }

    fn recording_sleep(
        delays: Arc<Mutex<Vec<Duration>>>,
    ) -> impl Fn(Duration) -> std::future::Ready<()> {
        move |d| {
            delays.lock().unwrap().push(d);
            std::future::ready(())
        }
    }

    #[test]
    fn exponential_build_errors() {
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::ZERO)
            .with_maximum_delay(Duration::from_secs(5))
            .build();
        assert!(b.as_ref().is_err_and(|e| e.is_invalid_backoff()), "{b:?}");

        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_maximum_delay(Duration::from_secs(5))
            .build();
        assert!(b.as_ref().is_err_and(|e| e.is_invalid_backoff()), "{b:?}");

        let b = ExponentialBackoffBuilder::new().with_scaling(0.5).build();
        assert!(b.as_ref().is_err_and(|e| e.is_invalid_backoff()), "{b:?}");
    }

    #[test]
    fn exponential_builder_defaults() {
        let r = ExponentialBackoffBuilder::new().build();
        assert!(r.is_ok(), "{r:?}");
        let r = ExponentialBackoffBuilder::default().build();
        assert!(r.is_ok(), "{r:?}");
    }

    #[test_case(Duration::from_secs(1), Duration::MAX, 0.5; "scaling below range")]
    #[test_case(Duration::from_secs(1), Duration::MAX, 1_000_000.0; "scaling over range")]
    #[test_case(Duration::from_secs(1), Duration::ZERO, 8.0; "max below range")]
    #[test_case(Duration::from_secs(10), Duration::from_secs(1), 8.0; "init over range")]
    #[test_case(Duration::ZERO, Duration::ZERO, 8.0; "init below range")]
    fn exponential_clamp(init: Duration, max: Duration, scaling: f64) {
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(init)
            .with_maximum_delay(max)
            .with_scaling(scaling)
            .clamp();
        assert_eq!(b.scaling.clamp(1.0, 32.0), b.scaling);
        assert_eq!(
            b.initial_delay
                .clamp(Duration::from_millis(1), b.maximum_delay),
            b.initial_delay
        );
        assert_eq!(
            b.maximum_delay
                .clamp(b.initial_delay, Duration::from_secs(60)),
            b.maximum_delay
        );
    }

    #[test]
    fn exponential_scaling() {
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(4))
            .with_scaling(2.0)
            .build()
            .expect("should succeed with the hard-coded test values");

        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(2));
        assert_eq!(b.delay(3), Duration::from_secs(4));
        assert_eq!(b.delay(4), Duration::from_secs(4));
    }

    #[test]
    fn exponential_jitter_bounds() {
        let b = ExponentialBackoff::default();
        let now = Instant::now();
        for attempt in 1..10 {
            let got = b.on_failure(now, attempt);
            assert!(got <= b.delay(attempt), "{got:?} {attempt}");
            assert!(got <= Duration::from_secs(1), "{got:?} {attempt}");
        }
    }

    #[tokio::test]
    async fn retry_loop_success_first_attempt() {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let mut calls = 0;
        let got = retry_loop(
            || {
                calls += 1;
                async { Ok::<_, CredentialsError>("ok") }
            },
            recording_sleep(delays.clone()),
            3,
            &LinearBackoff,
        )
        .await;
        assert_eq!(got.unwrap(), "ok");
        assert_eq!(calls, 1);
        assert!(delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_loop_success_after_transient_errors() {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let mut calls = 0;
        let got = retry_loop(
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        return Err(CredentialsError::from_msg(ErrorKind::Io, "try again"));
                    }
                    Ok("ok")
                }
            },
            recording_sleep(delays.clone()),
            2,
            &LinearBackoff,
        )
        .await;
        assert_eq!(got.unwrap(), "ok");
        assert_eq!(calls, 3);
        assert_eq!(
            *delays.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn retry_loop_exhausted_returns_last_error() {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let mut calls = 0;
        let got = retry_loop(
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    Err::<(), _>(CredentialsError::from_msg(
                        ErrorKind::Io,
                        format!("failure {attempt}"),
                    ))
                }
            },
            recording_sleep(delays.clone()),
            2,
            &LinearBackoff,
        )
        .await;
        let err = got.unwrap_err();
        assert_eq!(calls, 3);
        assert!(err.to_string().contains("failure 3"), "{err}");
        assert_eq!(delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retry_loop_no_retries() {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let mut calls = 0;
        let got = retry_loop(
            || {
                calls += 1;
                async { Err::<(), _>(CredentialsError::from_msg(ErrorKind::Io, "fail")) }
            },
            recording_sleep(delays.clone()),
            0,
            &NoBackoff,
        )
        .await;
        assert!(got.is_err(), "{got:?}");
        assert_eq!(calls, 1);
        assert!(delays.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_with_tokio_sleep() {
        let start = tokio::time::Instant::now();
        let mut calls = 0;
        let got = retry_loop(
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 2 {
                        return Err(CredentialsError::from_msg(ErrorKind::Io, "try again"));
                    }
                    Ok(attempt)
                }
            },
            tokio::time::sleep,
            1,
            &LinearBackoff,
        )
        .await;
        assert_eq!(got.unwrap(), 2);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
