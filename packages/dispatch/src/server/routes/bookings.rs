//! Requester and helper actions on bookings.
//!
//! There is no authentication layer; the acting helper or requester is named
//! in the request body and checked against the booking by the dispatcher.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::common::{BookingId, DispatchError, DispatchResult, HelperId, RequesterId};
use crate::domains::bookings::{Booking, BookingFilter, BookingStatus, NewBooking};
use crate::domains::dispatch::DispatchOutcome;
use crate::kernel::ServerDeps;

#[derive(Debug, Deserialize)]
pub struct HelperActionBody {
    pub helper_id: HelperId,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub requester_id: RequesterId,
}

/// `GET /api/bookings?status=&requester_id=&helper_id=`
pub async fn list_bookings(
    State(deps): State<ServerDeps>,
    Query(filter): Query<BookingFilter>,
) -> DispatchResult<Json<Vec<Booking>>> {
    Ok(Json(deps.dispatcher.list_bookings(&filter).await?))
}

/// `POST /api/bookings`
pub async fn submit_booking(
    State(deps): State<ServerDeps>,
    Json(input): Json<NewBooking>,
) -> DispatchResult<(StatusCode, Json<Booking>)> {
    let booking = deps.dispatcher.submit(input).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// `GET /api/bookings/{id}`
pub async fn get_booking(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.get_booking(id).await?))
}

/// `POST /api/bookings/{id}/accept`
pub async fn accept(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
    Json(body): Json<HelperActionBody>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.accept(id, body.helper_id).await?))
}

/// `POST /api/bookings/{id}/decline`
pub async fn decline(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
    Json(body): Json<HelperActionBody>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.decline(id, body.helper_id).await?))
}

/// `POST /api/bookings/{id}/start`
pub async fn start(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
    Json(body): Json<HelperActionBody>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.start(id, body.helper_id).await?))
}

/// `POST /api/bookings/{id}/complete`
pub async fn complete(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
    Json(body): Json<HelperActionBody>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.complete(id, body.helper_id).await?))
}

/// `POST /api/bookings/{id}/cancel`
pub async fn cancel(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
    Json(body): Json<CancelBody>,
) -> DispatchResult<Json<Booking>> {
    Ok(Json(deps.dispatcher.cancel(id, body.requester_id).await?))
}

/// `POST /api/bookings/{id}/dispatch`
///
/// Manual retry for a booking left `searching`.
pub async fn dispatch(
    State(deps): State<ServerDeps>,
    Path(id): Path<BookingId>,
) -> DispatchResult<Json<DispatchOutcome>> {
    match deps.dispatcher.dispatch(id).await? {
        DispatchOutcome::Skipped(booking) if booking.status != BookingStatus::Searching => {
            Err(DispatchError::InvalidTransition {
                action: "dispatch",
                status: booking.status,
            })
        }
        outcome => Ok(Json(outcome)),
    }
}
