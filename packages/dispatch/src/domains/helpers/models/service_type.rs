use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Fixed catalog of services a booking can request.
///
/// Serialized with the catalog's display ids (`"Cleaning"`, `"Plumbing"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Cleaning,
    Plumbing,
    Electrician,
    Cooking,
    Gardening,
    Painting,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Cleaning,
        ServiceType::Plumbing,
        ServiceType::Electrician,
        ServiceType::Cooking,
        ServiceType::Gardening,
        ServiceType::Painting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Cleaning => "Cleaning",
            ServiceType::Plumbing => "Plumbing",
            ServiceType::Electrician => "Electrician",
            ServiceType::Cooking => "Cooking",
            ServiceType::Gardening => "Gardening",
            ServiceType::Painting => "Painting",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ServiceType::Cleaning => "🧹",
            ServiceType::Plumbing => "🔧",
            ServiceType::Electrician => "⚡",
            ServiceType::Cooking => "👨‍🍳",
            ServiceType::Gardening => "🌿",
            ServiceType::Painting => "🎨",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ServiceType::ALL
            .into_iter()
            .find(|service| service.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Invalid service type: {}", s))
    }
}

/// Catalog entry as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceTypeInfo {
    pub id: ServiceType,
    pub label: &'static str,
    pub icon: &'static str,
}

pub fn catalog() -> Vec<ServiceTypeInfo> {
    ServiceType::ALL
        .into_iter()
        .map(|service| ServiceTypeInfo {
            id: service,
            label: service.as_str(),
            icon: service.icon(),
        })
        .collect()
}
