pub mod helper;
pub mod service_type;

pub use helper::{
    Helper, HelperFilter, HelperLease, HelperProfilePatch, HelperStatus, NewHelper, DEFAULT_RATING,
};
pub use service_type::{catalog, ServiceType, ServiceTypeInfo};
