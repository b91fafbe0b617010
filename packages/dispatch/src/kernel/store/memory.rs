//! In-process store. Used when no `DATABASE_URL` is configured and by tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{BaseDispatchStore, Transaction};
use crate::common::{BookingId, HelperId, StoreError};
use crate::domains::bookings::{Booking, BookingFilter};
use crate::domains::helpers::{Helper, HelperFilter, HelperProfilePatch};

#[derive(Default)]
struct MemoryState {
    helpers: HashMap<HelperId, Helper>,
    bookings: HashMap<BookingId, Booking>,
}

/// `commit` validates and applies under a single write lock, which makes
/// every transaction serializable.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    helper_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes applied to helper records since creation.
    pub fn helper_write_count(&self) -> u64 {
        self.helper_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseDispatchStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_helper(&self, helper: Helper) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.helpers.insert(helper.id, helper);
        self.helper_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_helper(&self, id: HelperId) -> Result<Option<Helper>, StoreError> {
        Ok(self.state.read().await.helpers.get(&id).cloned())
    }

    async fn list_helpers(&self, filter: &HelperFilter) -> Result<Vec<Helper>, StoreError> {
        let state = self.state.read().await;
        let mut helpers: Vec<Helper> = state
            .helpers
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();
        helpers.sort_by_key(|h| h.id);
        Ok(helpers)
    }

    async fn update_helper_profile(
        &self,
        id: HelperId,
        patch: HelperProfilePatch,
    ) -> Result<Helper, StoreError> {
        let mut state = self.state.write().await;
        let helper = state
            .helpers
            .get_mut(&id)
            .ok_or_else(|| StoreError::helper_not_found(id))?;
        patch.apply(helper, Utc::now());
        self.helper_writes.fetch_add(1, Ordering::SeqCst);
        Ok(helper.clone())
    }

    async fn create_booking(&self, booking: Booking) -> Result<BookingId, StoreError> {
        let id = booking.id;
        self.state.write().await.bookings.insert(id, booking);
        Ok(id)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn commit(&self, txn: Transaction) -> Result<Vec<Booking>, StoreError> {
        let mut state = self.state.write().await;

        // Check every precondition before touching anything.
        for write in &txn.bookings {
            let stored = state
                .bookings
                .get(&write.booking.id)
                .ok_or_else(|| StoreError::booking_not_found(write.booking.id))?;
            if stored.version != write.expected_version {
                return Err(StoreError::BookingConflict(write.booking.id));
            }
        }
        for write in &txn.helpers {
            let stored = state
                .helpers
                .get(&write.helper_id)
                .ok_or_else(|| StoreError::helper_not_found(write.helper_id))?;
            if stored.lease() != write.expected {
                return Err(StoreError::HelperConflict(write.helper_id));
            }
        }

        let now = Utc::now();
        for write in &txn.helpers {
            if let Some(helper) = state.helpers.get_mut(&write.helper_id) {
                helper.apply_lease(write.next);
                helper.updated_at = now;
                self.helper_writes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut committed = Vec::with_capacity(txn.bookings.len());
        for write in txn.bookings {
            let mut booking = write.booking;
            booking.version = write.expected_version + 1;
            state.bookings.insert(booking.id, booking.clone());
            committed.push(booking);
        }
        Ok(committed)
    }
}
