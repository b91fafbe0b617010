//! Test fixtures for building helpers and bookings at known distances.

use dispatch_core::common::geo::EARTH_RADIUS_KM;
use dispatch_core::common::{GeoPoint, RequesterId};
use dispatch_core::domains::bookings::{BookingFilter, NewBooking};
use dispatch_core::domains::helpers::{HelperFilter, HelperStatus, NewHelper, ServiceType};
use dispatch_core::kernel::BaseDispatchStore;

/// Requester location used by every fixture.
pub const ORIGIN: GeoPoint = GeoPoint {
    latitude: 19.0760,
    longitude: 72.8777,
};

/// A point exactly `km` due north of [`ORIGIN`] along the meridian.
pub fn point_km_north(km: f64) -> GeoPoint {
    GeoPoint {
        latitude: ORIGIN.latitude + (km / EARTH_RADIUS_KM).to_degrees(),
        longitude: ORIGIN.longitude,
    }
}

pub fn helper_at(name: &str, service: ServiceType, km: f64, rating: f64) -> NewHelper {
    NewHelper::builder()
        .name(name)
        .email(format!("{}@test.local", name.to_lowercase()))
        .skills([service].into())
        .rating(rating)
        .location(point_km_north(km))
        .build()
}

pub fn booking_for(requester_id: RequesterId, service: ServiceType) -> NewBooking {
    NewBooking::builder()
        .requester_id(requester_id)
        .requester_name("Test Requester")
        .service_type(service)
        .requester_location(ORIGIN)
        .address("12 Test Lane")
        .build()
}

/// Busy helpers are exactly the assignees of assigned/in-progress bookings,
/// and no helper holds a lease for a booking that is not offered to them.
pub async fn assert_busy_iff_assigned(store: &dyn BaseDispatchStore) {
    let helpers = store
        .list_helpers(&HelperFilter::default())
        .await
        .expect("list helpers");
    let bookings = store
        .list_bookings(&BookingFilter::default())
        .await
        .expect("list bookings");

    for helper in &helpers {
        let holds_job = bookings
            .iter()
            .any(|b| b.status.holds_helper() && b.is_assignee(helper.id));
        assert_eq!(
            helper.status == HelperStatus::Busy,
            holds_job,
            "helper {} is {} but holds_job = {}",
            helper.id,
            helper.status,
            holds_job
        );

        if let Some(booking_id) = helper.active_offer {
            let booking = bookings
                .iter()
                .find(|b| b.id == booking_id)
                .expect("lease points at a real booking");
            assert!(
                booking.offer_expires_at().is_some() && booking.is_assignee(helper.id),
                "helper {} holds a stale lease on {}",
                helper.id,
                booking_id
            );
        }
    }

    for booking in bookings.iter().filter(|b| b.status.is_active()) {
        let holders = helpers
            .iter()
            .filter(|h| {
                h.active_offer == Some(booking.id)
                    || (booking.status.holds_helper() && booking.is_assignee(h.id))
            })
            .count();
        assert!(holders <= 1, "booking {} has {} holders", booking.id, holders);
    }
}
