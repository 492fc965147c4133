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
use crate::constants::CACHE_REFRESH_WINDOW;
use crate::credentials::{Credentials, CredentialsProvider};
use crate::errors::{CredentialsError, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug)]
pub(crate) struct CredentialsCache<T>
where
    T: CredentialsProvider,
{
    // The cached credentials, or the last seen error.
    credentials: Mutex<Result<Credentials>>,

    // Tracks if a refresh is ongoing. If the lock is held, there is a refresh.
    refresh_in_progress: Mutex<()>,
    // Incremented each time a refresh stores its result.
    completed_refreshes: AtomicU64,

    inner: T,
}

// Returns true if we are holding credentials that do not need a refresh.
fn fresh(credentials: &Result<Credentials>) -> bool {
    match credentials {
        Ok(c) => c.expiration - CACHE_REFRESH_WINDOW > OffsetDateTime::now_utc(),
        Err(_) => false,
    }
}

impl<T: CredentialsProvider> CredentialsCache<T> {
    pub fn new(inner: T) -> Self {
        Self {
            credentials: Mutex::new(Err(CredentialsError::from_msg(
                ErrorKind::Io,
                "no credentials in the cache",
            ))),
            refresh_in_progress: Mutex::new(()),
            completed_refreshes: AtomicU64::new(0),
            inner,
        }
    }

    async fn current(&self) -> Result<Credentials> {
        self.credentials.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl<T: CredentialsProvider> CredentialsProvider for CredentialsCache<T> {
    async fn credentials(&self) -> Result<Credentials> {
        loop {
            let current = self.current().await;
            if fresh(&current) {
                return current;
            }

            let completed = self.completed_refreshes.load(Ordering::Acquire);
            if let Ok(_guard) = self.refresh_in_progress.try_lock() {
                let credentials = self.inner.credentials().await;
                *self.credentials.lock().await = credentials.clone();
                self.completed_refreshes.fetch_add(1, Ordering::Release);
                return credentials;
            }

            tracing::debug!("waiting for an ongoing credentials refresh");
            // The lock is released when the refresh completes, and also when
            // the caller running it is cancelled.
            drop(self.refresh_in_progress.lock().await);
            if self.completed_refreshes.load(Ordering::Acquire) != completed {
                return self.current().await;
            }
            tracing::debug!("the ongoing credentials refresh was cancelled");
        }
    }
}
