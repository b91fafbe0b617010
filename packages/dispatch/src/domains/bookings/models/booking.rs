use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use typed_builder::TypedBuilder;

use crate::common::{BookingId, GeoPoint, HelperId, RequesterId};
use crate::domains::helpers::ServiceType;

/// Booking lifecycle status
///
/// `Offered` keeps the `pending_acceptance` wire name used by existing clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Searching,
    #[serde(rename = "pending_acceptance")]
    Offered,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    NoHelpersAvailable,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::Searching,
        BookingStatus::Offered,
        BookingStatus::Assigned,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoHelpersAvailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Searching => "searching",
            BookingStatus::Offered => "pending_acceptance",
            BookingStatus::Assigned => "assigned",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoHelpersAvailable => "no_helpers_available",
        }
    }

    /// Searching, offered, assigned or in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            BookingStatus::Searching
                | BookingStatus::Offered
                | BookingStatus::Assigned
                | BookingStatus::InProgress
        )
    }

    /// States in which the assignee holds the job and is `busy`.
    pub fn holds_helper(&self) -> bool {
        matches!(self, BookingStatus::Assigned | BookingStatus::InProgress)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid booking status: {}", s))
    }
}

/// Helpers that declined or timed out on a booking.
///
/// Grow-only: there is no removal API, and set semantics keep each id unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectedHelpers(BTreeSet<HelperId>);

impl RejectedHelpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the helper was already present.
    pub fn insert(&mut self, helper_id: HelperId) -> bool {
        self.0.insert(helper_id)
    }

    pub fn contains(&self, helper_id: &HelperId) -> bool {
        self.0.contains(helper_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HelperId> {
        self.0.iter()
    }

    pub fn is_superset(&self, other: &RejectedHelpers) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl FromIterator<HelperId> for RejectedHelpers {
    fn from_iter<I: IntoIterator<Item = HelperId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Snapshot of the helper an offer went to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub helper_id: HelperId,
    pub helper_name: String,
    pub helper_location: Option<GeoPoint>,
    pub distance_km: f64,
    pub score: f64,
    pub offered_at: DateTime<Utc>,
    /// Acceptance deadline; only meaningful while the booking is offered.
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Service request record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub requester_id: RequesterId,
    pub requester_name: String,
    pub service_type: ServiceType,
    pub requester_location: GeoPoint,
    pub description: Option<String>,
    pub address: Option<String>,
    pub offer_price: Option<Decimal>,
    pub assignment: Option<Assignment>,
    pub rejected_helpers: RejectedHelpers,
    pub assignment_attempts: u32,
    pub status: BookingStatus,
    /// Optimistic-concurrency token, bumped by the store on every commit.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn assignee(&self) -> Option<HelperId> {
        self.assignment.as_ref().map(|a| a.helper_id)
    }

    pub fn is_assignee(&self, helper_id: HelperId) -> bool {
        self.assignee() == Some(helper_id)
    }

    pub fn offer_expires_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            BookingStatus::Offered => self.assignment.as_ref().map(|a| a.expires_at),
            _ => None,
        }
    }
}

/// Input for submitting a booking
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
pub struct NewBooking {
    pub requester_id: RequesterId,
    #[builder(setter(into))]
    pub requester_name: String,
    pub service_type: ServiceType,
    pub requester_location: GeoPoint,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub address: Option<String>,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub offer_price: Option<Decimal>,
}

impl NewBooking {
    pub fn into_booking(self, now: DateTime<Utc>) -> Booking {
        Booking {
            id: BookingId::new(),
            requester_id: self.requester_id,
            requester_name: self.requester_name,
            service_type: self.service_type,
            requester_location: self.requester_location,
            description: self.description,
            address: self.address,
            offer_price: self.offer_price,
            assignment: None,
            rejected_helpers: RejectedHelpers::new(),
            assignment_attempts: 0,
            status: BookingStatus::Searching,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `list_bookings` filter. `None` fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub requester_id: Option<RequesterId>,
    pub helper_id: Option<HelperId>,
}

impl BookingFilter {
    pub fn with_status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn for_helper(helper_id: HelperId) -> Self {
        Self {
            helper_id: Some(helper_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.map_or(true, |status| booking.status == status)
            && self
                .requester_id
                .map_or(true, |requester| booking.requester_id == requester)
            && self
                .helper_id
                .map_or(true, |helper| booking.is_assignee(helper))
    }
}
