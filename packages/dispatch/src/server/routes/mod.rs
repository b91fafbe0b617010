pub mod bookings;
pub mod health;
pub mod helpers;
pub mod stats;

pub use health::health_handler;
