pub mod bookings;
pub mod dispatch;
pub mod helpers;
pub mod matching;
