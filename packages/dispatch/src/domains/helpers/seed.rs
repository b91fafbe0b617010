//! Demo helper pool around central Mumbai, for local runs.

use tracing::info;

use crate::common::{DispatchResult, GeoPoint};
use crate::domains::helpers::models::{HelperFilter, NewHelper, ServiceType};
use crate::domains::helpers::registry::HelperRegistry;

use ServiceType::*;

struct DemoHelper {
    name: &'static str,
    email: &'static str,
    skills: &'static [ServiceType],
    rating: f64,
    rating_count: u32,
    location: (f64, f64),
}

const DEMO_HELPERS: &[DemoHelper] = &[
    DemoHelper {
        name: "Arjun Mehta",
        email: "arjun@demo.local",
        skills: &[Cleaning, Gardening],
        rating: 4.8,
        rating_count: 131,
        location: (19.0760, 72.8777),
    },
    DemoHelper {
        name: "Kavya Iyer",
        email: "kavya@demo.local",
        skills: &[Cleaning, Cooking],
        rating: 4.9,
        rating_count: 212,
        location: (19.0825, 72.8910),
    },
    DemoHelper {
        name: "Imran Shaikh",
        email: "imran@demo.local",
        skills: &[Plumbing, Electrician],
        rating: 4.5,
        rating_count: 84,
        location: (19.0620, 72.8680),
    },
    DemoHelper {
        name: "Lata Deshpande",
        email: "lata@demo.local",
        skills: &[Cleaning, Cooking, Gardening],
        rating: 4.7,
        rating_count: 150,
        location: (19.0896, 72.8656),
    },
    DemoHelper {
        name: "Rohan Pillai",
        email: "rohan@demo.local",
        skills: &[Electrician, Plumbing, Painting],
        rating: 4.3,
        rating_count: 61,
        location: (19.0544, 72.8402),
    },
    DemoHelper {
        name: "Sana Qureshi",
        email: "sana@demo.local",
        skills: &[Painting, Cleaning],
        rating: 4.6,
        rating_count: 97,
        location: (19.1136, 72.8697),
    },
    DemoHelper {
        name: "Vikram Rao",
        email: "vikram@demo.local",
        skills: &[Gardening, Painting],
        rating: 4.4,
        rating_count: 45,
        location: (19.0330, 72.8570),
    },
    DemoHelper {
        name: "Nisha Kulkarni",
        email: "nisha@demo.local",
        skills: &[Cooking],
        rating: 5.0,
        rating_count: 38,
        location: (19.0990, 72.8300),
    },
];

impl DemoHelper {
    fn to_new_helper(&self) -> NewHelper {
        let (latitude, longitude) = self.location;
        NewHelper::builder()
            .name(self.name)
            .email(self.email)
            .skills(self.skills.iter().copied().collect())
            .rating(self.rating)
            .rating_count(self.rating_count)
            .location(GeoPoint {
                latitude,
                longitude,
            })
            .build()
    }
}

pub fn demo_helpers() -> Vec<NewHelper> {
    DEMO_HELPERS.iter().map(DemoHelper::to_new_helper).collect()
}

/// Register the demo pool unless helpers already exist.
pub async fn seed_demo_helpers(registry: &HelperRegistry) -> DispatchResult<usize> {
    if !registry.list(&HelperFilter::default()).await?.is_empty() {
        info!("Helpers already present, skipping demo seed");
        return Ok(0);
    }

    let helpers = demo_helpers();
    let count = helpers.len();
    for helper in helpers {
        registry.register(helper).await?;
    }
    info!(count, "Seeded demo helpers");
    Ok(count)
}
