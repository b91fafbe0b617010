//! Pure helper ranking for dispatch
//!
//! These functions contain NO side effects. The dispatcher feeds them a
//! snapshot of the helper pool and commits whatever they pick.

use crate::common::GeoPoint;
use crate::domains::bookings::{Booking, RejectedHelpers};
use crate::domains::helpers::{Helper, HelperStatus, ServiceType};

/// Kilometres a perfect 5.0 rating is worth against distance.
pub const RATING_BONUS_MAX: f64 = 2.0;

/// What a booking asks of the pool.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub service_type: ServiceType,
    pub location: GeoPoint,
    pub rejected: &'a RejectedHelpers,
}

impl<'a> MatchRequest<'a> {
    pub fn for_booking(booking: &'a Booking) -> Self {
        Self {
            service_type: booking.service_type,
            location: booking.requester_location,
            rejected: &booking.rejected_helpers,
        }
    }
}

/// An eligible helper with its computed distance and score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub helper: Helper,
    pub distance_km: f64,
    pub score: f64,
}

/// Score a helper at `distance_km` with `rating`. Lower is better.
///
/// Ratings outside 0..=5 are clamped; a non-finite rating counts as 0.
pub fn score(distance_km: f64, rating: f64) -> f64 {
    let rating = if rating.is_finite() {
        rating.clamp(0.0, 5.0)
    } else {
        0.0
    };
    distance_km - (rating / 5.0) * RATING_BONUS_MAX
}

/// Whether `helper` qualifies for this request at all.
///
/// An offer the helper is holding for another booking does not disqualify
/// them; it only makes them unavailable for now (see [`is_free`]).
pub fn is_eligible(request: &MatchRequest<'_>, helper: &Helper) -> bool {
    helper.status == HelperStatus::Available
        && helper.location.is_some()
        && helper.has_skill(request.service_type)
        && !request.rejected.contains(&helper.id)
}

/// Whether `helper` can take a new offer right now.
pub fn is_free(helper: &Helper) -> bool {
    helper.active_offer.is_none()
}

/// How matching came out against one snapshot of the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Offer(Candidate),
    /// Eligible helpers exist but every one of them holds another offer.
    AllLeased { leased: usize },
    /// Nobody in the pool qualifies.
    Exhausted,
}

/// Eligible, free helpers with distance and score.
fn candidates<'a>(
    request: MatchRequest<'a>,
    helpers: &'a [Helper],
) -> impl Iterator<Item = (&'a Helper, f64, f64)> + 'a {
    helpers
        .iter()
        .filter(move |h| is_free(h) && is_eligible(&request, h))
        .filter_map(move |helper| {
            let location = helper.location?;
            let distance_km = request.location.distance_km_to(&location);
            Some((helper, distance_km, score(distance_km, helper.rating)))
        })
}

/// The free helper to offer the job to next. Exact score ties go to the
/// lowest id.
pub fn select_best(request: &MatchRequest<'_>, helpers: &[Helper]) -> Option<Candidate> {
    candidates(*request, helpers)
        .min_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.id.cmp(&b.0.id)))
        .map(|(helper, distance_km, score)| Candidate {
            helper: helper.clone(),
            distance_km,
            score,
        })
}

pub fn select(request: &MatchRequest<'_>, helpers: &[Helper]) -> Selection {
    if let Some(best) = select_best(request, helpers) {
        return Selection::Offer(best);
    }
    match helpers.iter().filter(|h| is_eligible(request, h)).count() {
        0 => Selection::Exhausted,
        leased => Selection::AllLeased { leased },
    }
}
