// Helper Dispatch Engine - API Core
//
// Matches service bookings to nearby helpers, offers each job to one helper
// at a time and drives it through accept, decline and timeout until someone
// takes it or the pool runs dry. Every state change is a conditional write,
// so racing actors never double-assign a booking or a helper.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
