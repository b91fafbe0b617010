use thiserror::Error;

use super::entity_ids::{BookingId, HelperId};
use crate::domains::bookings::BookingStatus;

/// Message surfaced to an actor whose action lost a race.
pub const NO_LONGER_AVAILABLE: &str = "this job is no longer available";

/// Errors raised by a [`BaseDispatchStore`](crate::kernel::store::BaseDispatchStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("booking {0} was modified concurrently")]
    BookingConflict(BookingId),

    #[error("helper {0} was modified concurrently")]
    HelperConflict(HelperId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn booking_not_found(id: BookingId) -> Self {
        Self::NotFound {
            entity: "booking",
            id: id.to_string(),
        }
    }

    pub fn helper_not_found(id: HelperId) -> Self {
        Self::NotFound {
            entity: "helper",
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::BookingConflict(_) | Self::HelperConflict(_))
    }

    /// Worth retrying with backoff at the I/O boundary.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "record",
                id: String::new(),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Corrupt(err.to_string())
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Errors surfaced by the dispatch engine to requesters and helpers.
///
/// An empty candidate pool is not an error: it is reported through
/// `DispatchOutcome::NoHelpersAvailable` and the `no_helpers_available` status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {action} while booking is {status}")]
    InvalidTransition {
        action: &'static str,
        status: BookingStatus,
    },

    #[error("not permitted to {action}: {reason}")]
    Unauthorized { action: &'static str, reason: String },

    #[error("{0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl DispatchError {
    pub fn no_longer_available() -> Self {
        Self::Conflict(NO_LONGER_AVAILABLE.to_string())
    }

    pub fn unauthorized(action: &'static str, reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            action,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::BookingConflict(_) | StoreError::HelperConflict(_) => {
                Self::no_longer_available()
            }
            StoreError::Unavailable(msg) => Self::UpstreamUnavailable(msg),
            StoreError::Corrupt(msg) => Self::UpstreamUnavailable(msg),
        }
    }
}

impl From<super::geo::InvalidCoordinates> for DispatchError {
    fn from(err: super::geo::InvalidCoordinates) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
