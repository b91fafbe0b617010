//! Async orchestrator over the pure state machine.
//!
//! Every operation follows the same shape: read the booking, ask
//! [`machine`](super::machine) for the next state, commit it conditionally,
//! then publish the fact. A lost conditional write means somebody else moved
//! the booking (or the helper) first; the operation re-reads and re-validates
//! instead of overwriting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::machine::{self, Planned, ReleaseReason};
use super::stats::DispatchStats;
use super::{DispatchSettings, RedispatchPolicy};
use crate::common::{
    BookingId, DispatchError, DispatchResult, HelperId, RequesterId, StoreError,
};
use crate::domains::bookings::{Booking, BookingEvent, BookingFilter, BookingStatus, NewBooking};
use crate::domains::helpers::HelperFilter;
use crate::domains::matching::{select, MatchRequest, Selection};
use crate::kernel::store::BaseDispatchStore;
use crate::kernel::StreamHub;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "booking", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The best eligible helper now holds an offer.
    Offered(Booking),
    /// Nobody eligible was left; the booking is closed out.
    NoHelpersAvailable(Booking),
    /// Every eligible helper is holding another booking's offer; the booking
    /// stays `searching` for the next sweep.
    Waiting(Booking),
    /// The booking was not `searching` (or stayed contended); nothing written.
    Skipped(Booking),
}

impl DispatchOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            DispatchOutcome::Offered(b)
            | DispatchOutcome::NoHelpersAvailable(b)
            | DispatchOutcome::Waiting(b)
            | DispatchOutcome::Skipped(b) => b,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            DispatchOutcome::Offered(b)
            | DispatchOutcome::NoHelpersAvailable(b)
            | DispatchOutcome::Waiting(b)
            | DispatchOutcome::Skipped(b) => b,
        }
    }
}

/// What one sweeper pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub offered: usize,
    pub exhausted: usize,
    pub waiting: usize,
    pub failures: usize,
}

/// A committed transition: the booking before and after.
struct Committed {
    previous: Booking,
    booking: Booking,
    helper_id: Option<HelperId>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn BaseDispatchStore>,
    stream_hub: StreamHub,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn BaseDispatchStore>,
        stream_hub: StreamHub,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            stream_hub,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    // =========================================================================
    // Requester actions
    // =========================================================================

    /// Create a booking in `searching` and run the first dispatch attempt.
    #[instrument(skip(self, input), fields(requester_id = %input.requester_id, service = %input.service_type))]
    pub async fn submit(&self, input: NewBooking) -> DispatchResult<Booking> {
        if input.requester_name.trim().is_empty() {
            return Err(DispatchError::Validation("requester name is required".into()));
        }
        input.requester_location.validate()?;

        let booking = input.into_booking(Utc::now());
        let booking_id = self.store.create_booking(booking.clone()).await?;
        info!(booking_id = %booking_id, "Booking submitted");
        self.publish(BookingEvent::BookingSubmitted {
            booking: booking.clone(),
        })
        .await;

        match self.dispatch(booking_id).await {
            Ok(outcome) => Ok(outcome.into_booking()),
            Err(e) => {
                // The sweeper retries anything still searching.
                warn!(booking_id = %booking_id, error = %e, "Initial dispatch failed");
                Ok(booking)
            }
        }
    }

    #[instrument(skip(self), fields(booking_id = %booking_id, requester_id = %requester_id))]
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        requester_id: RequesterId,
    ) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, true, |current| {
                machine::cancel(current, requester_id, Utc::now())
            })
            .await?;

        info!(
            from = %committed.previous.status,
            released_helper = ?committed.helper_id,
            "Booking cancelled"
        );
        self.publish(BookingEvent::BookingCancelled {
            booking: committed.booking.clone(),
            released_helper: committed.helper_id,
        })
        .await;
        Ok(committed.booking)
    }

    // =========================================================================
    // Helper actions
    // =========================================================================

    /// Accept the offer. Of two racing accepts exactly one commits; the other
    /// is told the job is no longer available.
    #[instrument(skip(self), fields(booking_id = %booking_id, helper_id = %helper_id))]
    pub async fn accept(
        &self,
        booking_id: BookingId,
        helper_id: HelperId,
    ) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, false, |current| {
                machine::accept(current, helper_id, Utc::now())
            })
            .await?;

        info!("Offer accepted");
        self.publish(BookingEvent::OfferAccepted {
            booking: committed.booking.clone(),
            helper_id,
        })
        .await;
        Ok(committed.booking)
    }

    #[instrument(skip(self), fields(booking_id = %booking_id, helper_id = %helper_id))]
    pub async fn decline(
        &self,
        booking_id: BookingId,
        helper_id: HelperId,
    ) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, true, |current| {
                machine::release(current, helper_id, ReleaseReason::Declined, Utc::now())
            })
            .await?;

        info!(
            rejected = committed.booking.rejected_helpers.len(),
            "Offer declined"
        );
        self.publish(BookingEvent::OfferDeclined {
            booking: committed.booking.clone(),
            helper_id,
        })
        .await;
        self.after_release(committed.booking).await
    }

    /// Deadline path. Identical to a decline once the deadline has passed.
    #[instrument(skip(self), fields(booking_id = %booking_id, helper_id = %helper_id))]
    pub async fn expire_offer(
        &self,
        booking_id: BookingId,
        helper_id: HelperId,
        now: DateTime<Utc>,
    ) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, true, |current| {
                machine::release(current, helper_id, ReleaseReason::Expired, now)
            })
            .await?;

        info!("Offer expired");
        self.publish(BookingEvent::OfferExpired {
            booking: committed.booking.clone(),
            helper_id,
        })
        .await;
        self.after_release(committed.booking).await
    }

    #[instrument(skip(self), fields(booking_id = %booking_id, helper_id = %helper_id))]
    pub async fn start(&self, booking_id: BookingId, helper_id: HelperId) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, true, |current| {
                machine::start(current, helper_id, Utc::now())
            })
            .await?;

        info!("Job started");
        self.publish(BookingEvent::JobStarted {
            booking: committed.booking.clone(),
        })
        .await;
        Ok(committed.booking)
    }

    #[instrument(skip(self), fields(booking_id = %booking_id, helper_id = %helper_id))]
    pub async fn complete(
        &self,
        booking_id: BookingId,
        helper_id: HelperId,
    ) -> DispatchResult<Booking> {
        let committed = self
            .apply(booking_id, true, |current| {
                machine::complete(current, helper_id, Utc::now())
            })
            .await?;

        info!("Booking completed");
        self.publish(BookingEvent::BookingCompleted {
            booking: committed.booking.clone(),
        })
        .await;
        Ok(committed.booking)
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Offer a `searching` booking to the best eligible helper.
    ///
    /// The booking write and the helper's lease are one conditional commit.
    /// If the chosen helper was taken in the meantime, matching re-runs on a
    /// fresh snapshot. The booking is only closed out when nobody in the pool
    /// qualifies; helpers tied up in other offers keep it `searching`.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn dispatch(&self, booking_id: BookingId) -> DispatchResult<DispatchOutcome> {
        for attempt in 1..=self.settings.max_conflict_retries.max(1) {
            let booking = self.load(booking_id).await?;
            if booking.status != BookingStatus::Searching {
                debug!(status = %booking.status, "Booking no longer searching, skipping dispatch");
                return Ok(DispatchOutcome::Skipped(booking));
            }

            let helpers = self
                .store
                .list_helpers(&HelperFilter::available_with(booking.service_type))
                .await?;
            let now = Utc::now();
            let planned = match select(&MatchRequest::for_booking(&booking), &helpers) {
                Selection::Offer(candidate) => {
                    debug!(
                        helper_id = %candidate.helper.id,
                        distance_km = candidate.distance_km,
                        score = candidate.score,
                        pool = helpers.len(),
                        "Selected helper"
                    );
                    machine::offer(&booking, &candidate, self.settings.acceptance_timeout, now)?
                }
                Selection::AllLeased { leased } => {
                    debug!(leased, "Every eligible helper holds another offer, waiting");
                    return Ok(DispatchOutcome::Waiting(booking));
                }
                Selection::Exhausted => machine::exhaust(&booking, now)?,
            };
            let helper_id = planned.helper_id();

            match self.commit(planned).await {
                Ok(committed) => return Ok(self.announce_dispatch(committed, helper_id).await),
                Err(e) if e.is_conflict() => {
                    debug!(attempt, error = %e, "Dispatch lost a race, re-matching");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Dispatch still contended after retries, leaving booking searching");
        Ok(DispatchOutcome::Skipped(self.load(booking_id).await?))
    }

    async fn announce_dispatch(
        &self,
        booking: Booking,
        helper_id: Option<HelperId>,
    ) -> DispatchOutcome {
        match (booking.status, helper_id, booking.offer_expires_at()) {
            (BookingStatus::Offered, Some(helper_id), Some(expires_at)) => {
                info!(
                    helper_id = %helper_id,
                    attempt = booking.assignment_attempts,
                    expires_at = %expires_at,
                    "Offer sent"
                );
                self.publish(BookingEvent::HelperOffered {
                    booking: booking.clone(),
                    helper_id,
                    expires_at,
                })
                .await;
                DispatchOutcome::Offered(booking)
            }
            _ => {
                info!(
                    rejected = booking.rejected_helpers.len(),
                    "No eligible helpers left"
                );
                self.publish(BookingEvent::NoHelpersAvailable {
                    booking: booking.clone(),
                })
                .await;
                DispatchOutcome::NoHelpersAvailable(booking)
            }
        }
    }

    /// The release is already committed, so a failed re-dispatch is left to
    /// the sweeper rather than reported to the caller.
    async fn after_release(&self, booking: Booking) -> DispatchResult<Booking> {
        if self.settings.redispatch == RedispatchPolicy::Deferred {
            return Ok(booking);
        }
        match self.dispatch(booking.id).await {
            Ok(outcome) => Ok(outcome.into_booking()),
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Re-dispatch after release failed");
                Ok(booking)
            }
        }
    }

    // =========================================================================
    // Deadline sweeper
    // =========================================================================

    /// Expire every offer whose deadline is at or before `now`, then dispatch
    /// whatever is still `searching`.
    ///
    /// The second pass is how the deferred policy re-dispatches, and it also
    /// picks up bookings whose inline dispatch failed.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> DispatchResult<SweepReport> {
        let mut report = SweepReport::default();

        let offered = self
            .store
            .list_bookings(&BookingFilter::with_status(BookingStatus::Offered))
            .await?;
        for booking in offered {
            let (Some(helper_id), Some(deadline)) = (booking.assignee(), booking.offer_expires_at())
            else {
                continue;
            };
            if deadline > now {
                continue;
            }
            match self.expire_offer(booking.id, helper_id, now).await {
                Ok(_) => report.expired += 1,
                Err(DispatchError::Conflict(_)) => {
                    debug!(booking_id = %booking.id, "Offer answered before it could expire");
                }
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "Failed to expire offer");
                    report.failures += 1;
                }
            }
        }

        let searching = self
            .store
            .list_bookings(&BookingFilter::with_status(BookingStatus::Searching))
            .await?;
        for booking in searching {
            match self.dispatch(booking.id).await {
                Ok(DispatchOutcome::Offered(_)) => report.offered += 1,
                Ok(DispatchOutcome::NoHelpersAvailable(_)) => report.exhausted += 1,
                Ok(DispatchOutcome::Waiting(_)) => report.waiting += 1,
                Ok(DispatchOutcome::Skipped(_)) => {}
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "Sweep dispatch failed");
                    report.failures += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                offered = report.offered,
                exhausted = report.exhausted,
                waiting = report.waiting,
                failures = report.failures,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_booking(&self, booking_id: BookingId) -> DispatchResult<Booking> {
        self.load(booking_id).await
    }

    pub async fn list_bookings(&self, filter: &BookingFilter) -> DispatchResult<Vec<Booking>> {
        Ok(self.store.list_bookings(filter).await?)
    }

    pub async fn stats(&self) -> DispatchResult<DispatchStats> {
        let bookings = self.store.list_bookings(&BookingFilter::default()).await?;
        let helpers = self.store.list_helpers(&HelperFilter::default()).await?;
        Ok(DispatchStats::from_snapshot(&bookings, &helpers))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load(&self, booking_id: BookingId) -> DispatchResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| StoreError::booking_not_found(booking_id).into())
    }

    async fn commit(&self, planned: Planned) -> Result<Booking, StoreError> {
        let booking_id = planned.booking.id;
        self.store
            .commit(planned.into_transaction())
            .await?
            .pop()
            .ok_or_else(|| StoreError::booking_not_found(booking_id))
    }

    /// Read, transition, commit. With `retry`, a lost write re-reads and
    /// re-validates up to the configured budget; without it, the first lost
    /// write is final.
    async fn apply<F>(
        &self,
        booking_id: BookingId,
        retry: bool,
        mut transition: F,
    ) -> DispatchResult<Committed>
    where
        F: FnMut(&Booking) -> DispatchResult<Planned> + Send,
    {
        let attempts = if retry {
            self.settings.max_conflict_retries.max(1)
        } else {
            1
        };

        for attempt in 1..=attempts {
            let previous = self.load(booking_id).await?;
            let planned = transition(&previous)?;
            let helper_id = planned.helper_id();

            match self.commit(planned).await {
                Ok(booking) => {
                    return Ok(Committed {
                        previous,
                        booking,
                        helper_id,
                    })
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, error = %e, "Conditional write lost, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DispatchError::no_longer_available())
    }

    async fn publish(&self, event: BookingEvent) {
        self.stream_hub.publish_booking_event(&event).await;
    }
}
