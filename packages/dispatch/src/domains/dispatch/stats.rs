use serde::Serialize;
use std::collections::BTreeMap;

use crate::domains::bookings::{Booking, BookingStatus};
use crate::domains::helpers::{Helper, HelperStatus};

/// Operational totals for the admin view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub total_bookings: usize,
    pub active_bookings: usize,
    pub bookings_by_status: BTreeMap<BookingStatus, usize>,
    pub total_helpers: usize,
    pub available_helpers: usize,
    pub helpers_with_open_offer: usize,
    /// Mean offers per booking that reached `assigned` or later.
    pub average_attempts_to_assign: Option<f64>,
}

impl DispatchStats {
    pub fn from_snapshot(bookings: &[Booking], helpers: &[Helper]) -> Self {
        let mut bookings_by_status: BTreeMap<BookingStatus, usize> =
            BookingStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for booking in bookings {
            *bookings_by_status.entry(booking.status).or_default() += 1;
        }

        let assigned: Vec<u32> = bookings
            .iter()
            .filter(|b| b.assignment.as_ref().is_some_and(|a| a.accepted_at.is_some()))
            .map(|b| b.assignment_attempts)
            .collect();
        let average_attempts_to_assign = if assigned.is_empty() {
            None
        } else {
            Some(assigned.iter().map(|n| *n as f64).sum::<f64>() / assigned.len() as f64)
        };

        Self {
            total_bookings: bookings.len(),
            active_bookings: bookings.iter().filter(|b| b.status.is_active()).count(),
            bookings_by_status,
            total_helpers: helpers.len(),
            available_helpers: helpers
                .iter()
                .filter(|h| h.status == HelperStatus::Available && h.active_offer.is_none())
                .count(),
            helpers_with_open_offer: helpers.iter().filter(|h| h.active_offer.is_some()).count(),
            average_attempts_to_assign,
        }
    }
}
