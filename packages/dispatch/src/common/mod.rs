// Common types and utilities shared across the engine

pub mod entity_ids;
pub mod error;
pub mod geo;
pub mod id;

pub use entity_ids::*;
pub use error::{DispatchError, DispatchResult, StoreError, NO_LONGER_AVAILABLE};
pub use geo::{distance_km, GeoPoint, InvalidCoordinates};
pub use id::Id;
