//! Typed ID definitions for the dispatch entities.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for helper (service provider) records.
pub struct HelperRecord;

/// Marker type for booking (service request) records.
pub struct BookingRecord;

/// Marker type for requesters (the people submitting bookings).
pub struct Requester;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type HelperId = Id<HelperRecord>;

pub type BookingId = Id<BookingRecord>;

pub type RequesterId = Id<Requester>;
