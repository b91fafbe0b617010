//! Backoff for transient store failures.
//!
//! Only `StoreError::Unavailable` is retried. Conflicts are engine-level
//! outcomes and pass straight through.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{BaseDispatchStore, Transaction};
use crate::common::{BookingId, HelperId, StoreError};
use crate::domains::bookings::{Booking, BookingFilter};
use crate::domains::helpers::{Helper, HelperFilter, HelperProfilePatch};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Wraps any store with exponential backoff on `Unavailable`.
pub struct RetryingStore {
    inner: Arc<dyn BaseDispatchStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn BaseDispatchStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_backoff<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Store call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl BaseDispatchStore for RetryingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_helper(&self, helper: Helper) -> Result<(), StoreError> {
        self.with_backoff("insert_helper", || self.inner.insert_helper(helper.clone()))
            .await
    }

    async fn get_helper(&self, id: HelperId) -> Result<Option<Helper>, StoreError> {
        self.with_backoff("get_helper", || self.inner.get_helper(id))
            .await
    }

    async fn list_helpers(&self, filter: &HelperFilter) -> Result<Vec<Helper>, StoreError> {
        self.with_backoff("list_helpers", || self.inner.list_helpers(filter))
            .await
    }

    async fn update_helper_profile(
        &self,
        id: HelperId,
        patch: HelperProfilePatch,
    ) -> Result<Helper, StoreError> {
        self.with_backoff("update_helper_profile", || {
            self.inner.update_helper_profile(id, patch.clone())
        })
        .await
    }

    async fn create_booking(&self, booking: Booking) -> Result<BookingId, StoreError> {
        self.with_backoff("create_booking", || self.inner.create_booking(booking.clone()))
            .await
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        self.with_backoff("get_booking", || self.inner.get_booking(id))
            .await
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        self.with_backoff("list_bookings", || self.inner.list_bookings(filter))
            .await
    }

    async fn commit(&self, txn: Transaction) -> Result<Vec<Booking>, StoreError> {
        self.with_backoff("commit", || self.inner.commit(txn.clone()))
            .await
    }
}
