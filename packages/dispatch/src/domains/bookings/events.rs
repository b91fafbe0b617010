use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::HelperId;
use crate::domains::bookings::models::Booking;
use crate::kernel::stream_hub::topics;

/// Booking domain events
///
/// Fact events published after a transition has been committed. Each carries
/// the committed booking so subscribers never need to re-read.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingSubmitted {
        booking: Booking,
    },
    HelperOffered {
        booking: Booking,
        helper_id: HelperId,
        expires_at: DateTime<Utc>,
    },
    OfferAccepted {
        booking: Booking,
        helper_id: HelperId,
    },
    OfferDeclined {
        booking: Booking,
        helper_id: HelperId,
    },
    OfferExpired {
        booking: Booking,
        helper_id: HelperId,
    },
    JobStarted {
        booking: Booking,
    },
    BookingCompleted {
        booking: Booking,
    },
    BookingCancelled {
        booking: Booking,
        released_helper: Option<HelperId>,
    },
    NoHelpersAvailable {
        booking: Booking,
    },
}

impl BookingEvent {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingEvent::BookingSubmitted { booking }
            | BookingEvent::HelperOffered { booking, .. }
            | BookingEvent::OfferAccepted { booking, .. }
            | BookingEvent::OfferDeclined { booking, .. }
            | BookingEvent::OfferExpired { booking, .. }
            | BookingEvent::JobStarted { booking }
            | BookingEvent::BookingCompleted { booking }
            | BookingEvent::BookingCancelled { booking, .. }
            | BookingEvent::NoHelpersAvailable { booking } => booking,
        }
    }

    /// The helper this event concerns, if any. Declines and expiries name the
    /// helper that was just released, since the booking no longer does.
    pub fn helper_id(&self) -> Option<HelperId> {
        match self {
            BookingEvent::HelperOffered { helper_id, .. }
            | BookingEvent::OfferAccepted { helper_id, .. }
            | BookingEvent::OfferDeclined { helper_id, .. }
            | BookingEvent::OfferExpired { helper_id, .. } => Some(*helper_id),
            BookingEvent::BookingCancelled {
                released_helper, ..
            } => *released_helper,
            _ => self.booking().assignee(),
        }
    }

    /// Stream hub topics this event is fanned out to.
    pub fn topics(&self) -> Vec<String> {
        let booking = self.booking();
        let mut out = vec![
            topics::BOOKINGS.to_string(),
            topics::booking(booking.id),
            topics::requester(booking.requester_id),
        ];
        if let Some(helper_id) = self.helper_id() {
            out.push(topics::helper(helper_id));
        }
        out
    }
}
