//! Booking state machine - pure transitions
//!
//! ```text
//! searching ──offer──▶ offered ──accept──▶ assigned ──start──▶ in_progress ──complete──▶ completed
//!     │                  │                    │                                   ▲
//!     │                  └─decline/expire─▶ searching          assigned ──complete┘
//!     └─exhaust─▶ no_helpers_available
//! {searching, offered, assigned} ──cancel──▶ cancelled
//! ```
//!
//! Each function takes the booking as read, the acting party and `now`, and
//! returns a [`Planned`] write: the next booking document, the version it
//! must replace, and the helper lease swap the transition implies. Nothing
//! here touches the store.

use chrono::{DateTime, Duration, Utc};

use crate::common::{DispatchError, DispatchResult, HelperId, RequesterId};
use crate::domains::bookings::{Assignment, Booking, BookingStatus};
use crate::domains::helpers::HelperLease;
use crate::domains::matching::Candidate;
use crate::kernel::store::{HelperWrite, Transaction};

/// Why an offer went back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Declined,
    Expired,
}

/// A transition ready to be committed.
#[derive(Debug, Clone)]
pub struct Planned {
    pub expected_version: u64,
    pub booking: Booking,
    pub helper_write: Option<HelperWrite>,
}

impl Planned {
    fn booking_only(current: &Booking, booking: Booking) -> Self {
        Self {
            expected_version: current.version,
            booking,
            helper_write: None,
        }
    }

    fn with_helper(
        current: &Booking,
        booking: Booking,
        helper_id: HelperId,
        expected: HelperLease,
        next: HelperLease,
    ) -> Self {
        Self {
            expected_version: current.version,
            booking,
            helper_write: Some(HelperWrite {
                helper_id,
                expected,
                next,
            }),
        }
    }

    /// Helper whose lease this transition swaps, if any.
    pub fn helper_id(&self) -> Option<HelperId> {
        self.helper_write.as_ref().map(|w| w.helper_id)
    }

    pub fn into_transaction(self) -> Transaction {
        let mut txn = Transaction::new().booking(self.expected_version, self.booking);
        if let Some(write) = self.helper_write {
            txn = txn.helper(write.helper_id, write.expected, write.next);
        }
        txn
    }
}

fn invalid(action: &'static str, booking: &Booking) -> DispatchError {
    DispatchError::InvalidTransition {
        action,
        status: booking.status,
    }
}

fn advance(current: &Booking, status: BookingStatus, now: DateTime<Utc>) -> Booking {
    let mut next = current.clone();
    next.status = status;
    next.updated_at = now;
    next
}

/// Checks that `helper_id` holds the live offer on `booking`.
///
/// A helper already in the rejected set lost the offer to a decline or a
/// timeout, so they get "no longer available" rather than a permissions error.
fn holds_offer(booking: &Booking, helper_id: HelperId, action: &'static str) -> DispatchResult<()> {
    match booking.status {
        BookingStatus::Offered if booking.is_assignee(helper_id) => Ok(()),
        _ if booking.rejected_helpers.contains(&helper_id) => {
            Err(DispatchError::no_longer_available())
        }
        BookingStatus::Offered => Err(DispatchError::unauthorized(
            action,
            "the offer belongs to another helper",
        )),
        _ => Err(invalid(action, booking)),
    }
}

fn assignee_only(booking: &Booking, helper_id: HelperId, action: &'static str) -> DispatchResult<()> {
    if booking.is_assignee(helper_id) {
        Ok(())
    } else {
        Err(DispatchError::unauthorized(
            action,
            "only the assigned helper can do this",
        ))
    }
}

/// `searching → offered`, reserving the candidate with an offer lease.
pub fn offer(
    current: &Booking,
    candidate: &Candidate,
    acceptance_timeout: Duration,
    now: DateTime<Utc>,
) -> DispatchResult<Planned> {
    if current.status != BookingStatus::Searching {
        return Err(invalid("offer", current));
    }
    if current.rejected_helpers.contains(&candidate.helper.id) {
        return Err(DispatchError::Validation(format!(
            "helper {} already passed on booking {}",
            candidate.helper.id, current.id
        )));
    }

    let mut next = advance(current, BookingStatus::Offered, now);
    next.assignment = Some(Assignment {
        helper_id: candidate.helper.id,
        helper_name: candidate.helper.name.clone(),
        helper_location: candidate.helper.location,
        distance_km: candidate.distance_km,
        score: candidate.score,
        offered_at: now,
        expires_at: now + acceptance_timeout,
        accepted_at: None,
    });
    next.assignment_attempts += 1;

    Ok(Planned::with_helper(
        current,
        next,
        candidate.helper.id,
        HelperLease::FREE,
        HelperLease::offered(current.id),
    ))
}

/// `searching → no_helpers_available`. Writes no helper record.
pub fn exhaust(current: &Booking, now: DateTime<Utc>) -> DispatchResult<Planned> {
    if current.status != BookingStatus::Searching {
        return Err(invalid("give up searching", current));
    }
    Ok(Planned::booking_only(
        current,
        advance(current, BookingStatus::NoHelpersAvailable, now),
    ))
}

/// `offered → assigned`. The helper goes busy and the lease is consumed.
pub fn accept(current: &Booking, helper_id: HelperId, now: DateTime<Utc>) -> DispatchResult<Planned> {
    if current.status.holds_helper() && current.is_assignee(helper_id) {
        // Duplicate accept that lost the race to our own first accept.
        return Err(DispatchError::no_longer_available());
    }
    holds_offer(current, helper_id, "accept")?;

    let mut next = advance(current, BookingStatus::Assigned, now);
    if let Some(assignment) = next.assignment.as_mut() {
        assignment.accepted_at = Some(now);
    }

    Ok(Planned::with_helper(
        current,
        next,
        helper_id,
        HelperLease::offered(current.id),
        HelperLease::BUSY,
    ))
}

/// `offered → searching` on decline or deadline.
///
/// Both paths add the helper to the rejected set, clear the assignment and
/// free the lease. They differ only in who checks the preconditions.
pub fn release(
    current: &Booking,
    helper_id: HelperId,
    reason: ReleaseReason,
    now: DateTime<Utc>,
) -> DispatchResult<Planned> {
    match reason {
        ReleaseReason::Declined => holds_offer(current, helper_id, "decline")?,
        ReleaseReason::Expired => {
            if current.status != BookingStatus::Offered || !current.is_assignee(helper_id) {
                return Err(DispatchError::no_longer_available());
            }
            if let Some(deadline) = current.offer_expires_at() {
                if deadline > now {
                    return Err(DispatchError::Validation(format!(
                        "offer on booking {} is open until {}",
                        current.id, deadline
                    )));
                }
            }
        }
    }

    let mut next = advance(current, BookingStatus::Searching, now);
    next.rejected_helpers.insert(helper_id);
    next.assignment = None;

    Ok(Planned::with_helper(
        current,
        next,
        helper_id,
        HelperLease::offered(current.id),
        HelperLease::FREE,
    ))
}

/// `assigned → in_progress`.
pub fn start(current: &Booking, helper_id: HelperId, now: DateTime<Utc>) -> DispatchResult<Planned> {
    if current.status != BookingStatus::Assigned {
        return Err(invalid("start", current));
    }
    assignee_only(current, helper_id, "start")?;
    Ok(Planned::booking_only(
        current,
        advance(current, BookingStatus::InProgress, now),
    ))
}

/// `assigned | in_progress → completed`. The helper becomes available again.
pub fn complete(
    current: &Booking,
    helper_id: HelperId,
    now: DateTime<Utc>,
) -> DispatchResult<Planned> {
    if !current.status.holds_helper() {
        return Err(invalid("complete", current));
    }
    assignee_only(current, helper_id, "complete")?;
    Ok(Planned::with_helper(
        current,
        advance(current, BookingStatus::Completed, now),
        helper_id,
        HelperLease::BUSY,
        HelperLease::FREE,
    ))
}

/// `searching | offered | assigned → cancelled`, requester only.
///
/// An offered helper's lease is released and the assignment dropped; an
/// assigned helper goes back to available and stays on the record.
pub fn cancel(
    current: &Booking,
    requester_id: RequesterId,
    now: DateTime<Utc>,
) -> DispatchResult<Planned> {
    if current.requester_id != requester_id {
        return Err(DispatchError::unauthorized(
            "cancel",
            "only the requester can cancel a booking",
        ));
    }

    let mut next = advance(current, BookingStatus::Cancelled, now);
    match (current.status, current.assignee()) {
        (BookingStatus::Searching, _) => Ok(Planned::booking_only(current, next)),
        (BookingStatus::Offered, Some(helper_id)) => {
            next.assignment = None;
            Ok(Planned::with_helper(
                current,
                next,
                helper_id,
                HelperLease::offered(current.id),
                HelperLease::FREE,
            ))
        }
        (BookingStatus::Assigned, Some(helper_id)) => Ok(Planned::with_helper(
            current,
            next,
            helper_id,
            HelperLease::BUSY,
            HelperLease::FREE,
        )),
        _ => Err(invalid("cancel", current)),
    }
}
