//! Helper domain - the provider pool the dispatcher matches against.

pub mod events;
pub mod models;
pub mod registry;
pub mod seed;

pub use events::HelperEvent;
pub use models::{
    catalog, Helper, HelperFilter, HelperLease, HelperProfilePatch, HelperStatus, NewHelper,
    ServiceType, ServiceTypeInfo, DEFAULT_RATING,
};
pub use registry::HelperRegistry;
pub use seed::{demo_helpers, seed_demo_helpers};
