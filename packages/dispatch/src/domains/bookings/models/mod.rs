pub mod booking;

pub use booking::{
    Assignment, Booking, BookingFilter, BookingStatus, NewBooking, RejectedHelpers,
};
