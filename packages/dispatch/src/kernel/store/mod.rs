//! Booking and helper persistence.
//!
//! The engine only talks to [`BaseDispatchStore`]. Every state-machine
//! transition is written through [`BaseDispatchStore::commit`], which applies a
//! [`Transaction`] all-or-nothing after checking each write's precondition:
//!
//! ```text
//! BookingWrite  ── expected_version == stored.version
//! HelperWrite   ── expected lease   == (stored.status, stored.active_offer)
//! ```
//!
//! A failed precondition names the record that moved
//! (`StoreError::BookingConflict` / `StoreError::HelperConflict`) and nothing
//! is written.

mod memory;
mod postgres;
mod retry;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::{RetryPolicy, RetryingStore};

use async_trait::async_trait;

use crate::common::{BookingId, HelperId, StoreError};
use crate::domains::bookings::{Booking, BookingFilter};
use crate::domains::helpers::{Helper, HelperFilter, HelperLease, HelperProfilePatch};

/// Replace a booking document, provided nobody else wrote it first.
#[derive(Debug, Clone)]
pub struct BookingWrite {
    pub expected_version: u64,
    pub booking: Booking,
}

/// Swap a helper's lease, provided it is still what the caller read.
#[derive(Debug, Clone)]
pub struct HelperWrite {
    pub helper_id: HelperId,
    pub expected: HelperLease,
    pub next: HelperLease,
}

/// A set of conditional writes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub bookings: Vec<BookingWrite>,
    pub helpers: Vec<HelperWrite>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn booking(mut self, expected_version: u64, booking: Booking) -> Self {
        self.bookings.push(BookingWrite {
            expected_version,
            booking,
        });
        self
    }

    pub fn helper(mut self, helper_id: HelperId, expected: HelperLease, next: HelperLease) -> Self {
        self.helpers.push(HelperWrite {
            helper_id,
            expected,
            next,
        });
        self
    }
}

#[async_trait]
pub trait BaseDispatchStore: Send + Sync {
    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_helper(&self, helper: Helper) -> Result<(), StoreError>;

    async fn get_helper(&self, id: HelperId) -> Result<Option<Helper>, StoreError>;

    /// Snapshot read, ordered by helper id.
    async fn list_helpers(&self, filter: &HelperFilter) -> Result<Vec<Helper>, StoreError>;

    /// Location/skills changes made by the helper's own client.
    async fn update_helper_profile(
        &self,
        id: HelperId,
        patch: HelperProfilePatch,
    ) -> Result<Helper, StoreError>;

    async fn create_booking(&self, booking: Booking) -> Result<BookingId, StoreError>;

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Snapshot read, newest first.
    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;

    /// Apply every write or none. Returns the committed bookings, in write
    /// order, with their new versions.
    async fn commit(&self, txn: Transaction) -> Result<Vec<Booking>, StoreError>;

    /// Single conditional booking update.
    async fn update_booking(
        &self,
        expected_version: u64,
        booking: Booking,
    ) -> Result<Booking, StoreError> {
        let id = booking.id;
        self.commit(Transaction::new().booking(expected_version, booking))
            .await?
            .pop()
            .ok_or_else(|| StoreError::booking_not_found(id))
    }
}
