//! Booking domain - the service request record and its change events.

pub mod events;
pub mod models;

pub use events::BookingEvent;
pub use models::{
    Assignment, Booking, BookingFilter, BookingStatus, NewBooking, RejectedHelpers,
};
