use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use typed_builder::TypedBuilder;

use super::service_type::ServiceType;
use crate::common::{BookingId, GeoPoint, HelperId};

/// Rating given to newly registered helpers.
pub const DEFAULT_RATING: f64 = 4.5;

/// Helper availability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HelperStatus {
    Available,
    Busy,
}

impl std::fmt::Display for HelperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HelperStatus::Available => write!(f, "available"),
            HelperStatus::Busy => write!(f, "busy"),
        }
    }
}

impl std::str::FromStr for HelperStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(HelperStatus::Available),
            "busy" => Ok(HelperStatus::Busy),
            _ => Err(anyhow::anyhow!("Invalid helper status: {}", s)),
        }
    }
}

/// The part of a helper record that conditional writes compare and swap.
///
/// `active_offer` is the offer lease: while set, the helper is reserved for
/// that booking and cannot be offered anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperLease {
    pub status: HelperStatus,
    pub active_offer: Option<BookingId>,
}

impl HelperLease {
    pub const FREE: HelperLease = HelperLease {
        status: HelperStatus::Available,
        active_offer: None,
    };

    pub const BUSY: HelperLease = HelperLease {
        status: HelperStatus::Busy,
        active_offer: None,
    };

    pub fn offered(booking_id: BookingId) -> Self {
        Self {
            status: HelperStatus::Available,
            active_offer: Some(booking_id),
        }
    }
}

/// Service provider record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Helper {
    pub id: HelperId,
    pub name: String,
    pub email: Option<String>,
    pub skills: BTreeSet<ServiceType>,
    pub rating: f64,
    pub rating_count: u32,
    pub status: HelperStatus,
    pub location: Option<GeoPoint>,
    pub active_offer: Option<BookingId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Helper {
    pub fn has_skill(&self, service: ServiceType) -> bool {
        self.skills.contains(&service)
    }

    pub fn lease(&self) -> HelperLease {
        HelperLease {
            status: self.status,
            active_offer: self.active_offer,
        }
    }

    pub fn apply_lease(&mut self, lease: HelperLease) {
        self.status = lease.status;
        self.active_offer = lease.active_offer;
    }
}

/// Input for registering a helper
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
pub struct NewHelper {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub email: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub skills: BTreeSet<ServiceType>,
    #[builder(default = DEFAULT_RATING)]
    #[serde(default = "default_rating")]
    pub rating: f64,
    #[builder(default)]
    #[serde(default)]
    pub rating_count: u32,
    #[builder(default = HelperStatus::Available)]
    #[serde(default = "default_status")]
    pub status: HelperStatus,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

fn default_rating() -> f64 {
    DEFAULT_RATING
}

fn default_status() -> HelperStatus {
    HelperStatus::Available
}

impl NewHelper {
    pub fn into_helper(self, now: DateTime<Utc>) -> Helper {
        Helper {
            id: HelperId::new(),
            name: self.name,
            email: self.email,
            skills: self.skills,
            rating: self.rating,
            rating_count: self.rating_count,
            status: self.status,
            location: self.location,
            active_offer: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Client-side profile changes that do not touch the lease.
#[derive(Debug, Clone, Default)]
pub struct HelperProfilePatch {
    pub location: Option<GeoPoint>,
    pub skills: Option<BTreeSet<ServiceType>>,
}

impl HelperProfilePatch {
    pub fn apply(self, helper: &mut Helper, now: DateTime<Utc>) {
        if let Some(location) = self.location {
            helper.location = Some(location);
        }
        if let Some(skills) = self.skills {
            helper.skills = skills;
        }
        helper.updated_at = now;
    }
}

/// `list_helpers` filter. `None` fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelperFilter {
    pub status: Option<HelperStatus>,
    pub skill: Option<ServiceType>,
}

impl HelperFilter {
    pub fn available_with(skill: ServiceType) -> Self {
        Self {
            status: Some(HelperStatus::Available),
            skill: Some(skill),
        }
    }

    pub fn matches(&self, helper: &Helper) -> bool {
        self.status.map_or(true, |status| helper.status == status)
            && self.skill.map_or(true, |skill| helper.has_skill(skill))
    }
}
