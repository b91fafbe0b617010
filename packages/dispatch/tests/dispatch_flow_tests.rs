//! End-to-end dispatch flows on the in-memory store.

mod common;

use chrono::{Duration, Utc};
use common::*;
use dispatch_core::common::{DispatchError, RequesterId, NO_LONGER_AVAILABLE};
use dispatch_core::domains::bookings::BookingStatus;
use dispatch_core::domains::dispatch::{DispatchOutcome, DispatchSettings, RedispatchPolicy};
use dispatch_core::domains::helpers::{HelperLease, HelperStatus, ServiceType};
use dispatch_core::kernel::stream_hub::topics;
use test_context::test_context;

fn deferred() -> DispatchSettings {
    DispatchSettings {
        redispatch: RedispatchPolicy::Deferred,
        ..Default::default()
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_submit_accept_start_complete_round_trip(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Arjun", ServiceType::Cleaning, 1.0, 4.8))
        .await;
    let requester = RequesterId::new();

    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Cleaning))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Offered);
    assert_eq!(booking.assignee(), Some(helper.id));
    assert_eq!(booking.assignment_attempts, 1);
    assert_eq!(ctx.helper(&helper).await.active_offer, Some(booking.id));
    assert_busy_iff_assigned(ctx.store.as_ref()).await;

    let assigned = ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();
    assert_eq!(assigned.status, BookingStatus::Assigned);
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::BUSY);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;

    let started = ctx.dispatcher().start(booking.id, helper.id).await.unwrap();
    assert_eq!(started.status, BookingStatus::InProgress);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;

    let completed = ctx
        .dispatcher()
        .complete(booking.id, helper.id)
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(completed.assignee(), Some(helper.id));

    let helper = ctx.helper(&helper).await;
    assert_eq!(helper.status, HelperStatus::Available);
    assert_eq!(helper.active_offer, None);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_offer_goes_to_best_scored_helper(ctx: &TestHarness) {
    let _far_five = ctx
        .register(helper_at("Far", ServiceType::Plumbing, 3.0, 5.0))
        .await;
    let close_four = ctx
        .register(helper_at("Close", ServiceType::Plumbing, 1.0, 4.0))
        .await;
    let _wrong_skill = ctx
        .register(helper_at("Painter", ServiceType::Painting, 0.1, 5.0))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Plumbing))
        .await
        .unwrap();

    assert_eq!(booking.assignee(), Some(close_four.id));
    let assignment = booking.assignment.unwrap();
    assert!((assignment.distance_km - 1.0).abs() < 1e-6);
    assert_eq!(assignment.helper_name, "Close");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_events_reach_helper_and_requester_topics(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Kavya", ServiceType::Cooking, 2.0, 4.9))
        .await;
    let requester = RequesterId::new();
    let mut helper_rx = ctx.hub().subscribe(&topics::helper(helper.id)).await;
    let mut requester_rx = ctx.hub().subscribe(&topics::requester(requester)).await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Cooking))
        .await
        .unwrap();

    let offered = helper_rx.recv().await.unwrap();
    assert_eq!(offered["type"], "helper_offered");
    assert_eq!(offered["booking"]["id"], booking.id.to_string());
    assert_eq!(offered["booking"]["status"], "pending_acceptance");

    assert_eq!(requester_rx.recv().await.unwrap()["type"], "booking_submitted");
    assert_eq!(requester_rx.recv().await.unwrap()["type"], "helper_offered");

    ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();
    assert_eq!(helper_rx.recv().await.unwrap()["type"], "offer_accepted");
}

// ============================================================================
// No eligible helpers
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_no_eligible_helpers_writes_no_helper(ctx: &TestHarness) {
    ctx.register(helper_at("Gardener", ServiceType::Gardening, 0.5, 5.0))
        .await;
    let writes_before = ctx.store.helper_write_count();

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Electrician))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::NoHelpersAvailable);
    assert_eq!(booking.assignee(), None);
    assert_eq!(booking.assignment_attempts, 0);
    assert_eq!(ctx.store.helper_write_count(), writes_before);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_helpers_without_location_are_never_offered(ctx: &TestHarness) {
    let mut nowhere = helper_at("Nowhere", ServiceType::Cleaning, 0.0, 5.0);
    nowhere.location = None;
    ctx.register(nowhere).await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::NoHelpersAvailable);
}

// ============================================================================
// Decline and timeout
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_decliner_never_reappears(ctx: &TestHarness) {
    let near = ctx
        .register(helper_at("Near", ServiceType::Cleaning, 1.0, 4.5))
        .await;
    let far = ctx
        .register(helper_at("Far", ServiceType::Cleaning, 5.0, 4.5))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();
    assert_eq!(booking.assignee(), Some(near.id));

    let reoffered = ctx.dispatcher().decline(booking.id, near.id).await.unwrap();
    assert_eq!(reoffered.status, BookingStatus::Offered);
    assert_eq!(reoffered.assignee(), Some(far.id));
    assert!(reoffered.rejected_helpers.contains(&near.id));
    assert_eq!(ctx.helper(&near).await.lease(), HelperLease::FREE);

    let exhausted = ctx.dispatcher().decline(booking.id, far.id).await.unwrap();
    assert_eq!(exhausted.status, BookingStatus::NoHelpersAvailable);
    assert_eq!(exhausted.rejected_helpers.len(), 2);
    assert_eq!(exhausted.assignment_attempts, 2);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[tokio::test]
async fn test_timeout_is_equivalent_to_decline() {
    let declined = TestHarness::new(DispatchSettings::default());
    let expired = TestHarness::new(DispatchSettings::default());

    let mut results = Vec::new();
    for (ctx, by_timeout) in [(&declined, false), (&expired, true)] {
        let helper = ctx
            .register(helper_at("Solo", ServiceType::Painting, 2.0, 4.0))
            .await;
        let booking = ctx
            .dispatcher()
            .submit(booking_for(RequesterId::new(), ServiceType::Painting))
            .await
            .unwrap();

        let after = if by_timeout {
            let report = ctx
                .dispatcher()
                .sweep(Utc::now() + Duration::seconds(16))
                .await
                .unwrap();
            assert_eq!(report.expired, 1);
            ctx.dispatcher().get_booking(booking.id).await.unwrap()
        } else {
            ctx.dispatcher().decline(booking.id, helper.id).await.unwrap()
        };

        assert!(after.rejected_helpers.contains(&helper.id));
        assert_eq!(after.rejected_helpers.len(), 1);
        assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);
        results.push(after.status);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], BookingStatus::NoHelpersAvailable);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_sweep_leaves_open_offers_alone(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Patient", ServiceType::Cooking, 1.0, 4.0))
        .await;
    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cooking))
        .await
        .unwrap();

    let report = ctx
        .dispatcher()
        .sweep(Utc::now() + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(report.expired, 0);

    let still = ctx.dispatcher().get_booking(booking.id).await.unwrap();
    assert_eq!(still.status, BookingStatus::Offered);
    assert_eq!(still.assignee(), Some(helper.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_late_accept_after_timeout_is_no_longer_available(ctx: &TestHarness) {
    let slow = ctx
        .register(helper_at("Slow", ServiceType::Gardening, 1.0, 4.0))
        .await;
    let quick = ctx
        .register(helper_at("Quick", ServiceType::Gardening, 2.0, 4.0))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Gardening))
        .await
        .unwrap();
    assert_eq!(booking.assignee(), Some(slow.id));

    ctx.dispatcher()
        .sweep(Utc::now() + Duration::seconds(20))
        .await
        .unwrap();
    let reoffered = ctx.dispatcher().get_booking(booking.id).await.unwrap();
    assert_eq!(reoffered.assignee(), Some(quick.id));

    let err = ctx
        .dispatcher()
        .accept(booking.id, slow.id)
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::Conflict(NO_LONGER_AVAILABLE.to_string()));
}

#[tokio::test]
async fn test_deferred_policy_waits_for_sweep() {
    let ctx = TestHarness::new(deferred());
    let first = ctx
        .register(helper_at("First", ServiceType::Electrician, 1.0, 4.0))
        .await;
    let second = ctx
        .register(helper_at("Second", ServiceType::Electrician, 2.0, 4.0))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Electrician))
        .await
        .unwrap();
    assert_eq!(booking.assignee(), Some(first.id));

    let waiting = ctx.dispatcher().decline(booking.id, first.id).await.unwrap();
    assert_eq!(waiting.status, BookingStatus::Searching);
    assert_eq!(ctx.helper(&second).await.active_offer, None);

    let report = ctx.dispatcher().sweep(Utc::now()).await.unwrap();
    assert_eq!(report.offered, 1);

    let offered = ctx.dispatcher().get_booking(booking.id).await.unwrap();
    assert_eq!(offered.status, BookingStatus::Offered);
    assert_eq!(offered.assignee(), Some(second.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_rejected_set_only_grows(ctx: &TestHarness) {
    let mut helpers = Vec::new();
    for (i, km) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        helpers.push(
            ctx.register(helper_at(&format!("H{i}"), ServiceType::Cleaning, km, 4.0))
                .await,
        );
    }

    let mut booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();

    let mut previous = booking.rejected_helpers.clone();
    let mut seen = Vec::new();
    while let Some(helper_id) = booking.assignee() {
        assert!(!seen.contains(&helper_id), "helper offered twice");
        seen.push(helper_id);

        // A repeated decline from the same helper is refused and changes nothing.
        booking = ctx.dispatcher().decline(booking.id, helper_id).await.unwrap();
        let again = ctx.dispatcher().decline(booking.id, helper_id).await;
        assert!(again.is_err());

        assert!(booking.rejected_helpers.is_superset(&previous));
        assert_eq!(booking.rejected_helpers.len(), previous.len() + 1);
        previous = booking.rejected_helpers.clone();
    }

    assert_eq!(seen, helpers.iter().map(|h| h.id).collect::<Vec<_>>());
    assert_eq!(booking.status, BookingStatus::NoHelpersAvailable);
}

// ============================================================================
// Authorization and invalid transitions
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_only_the_offered_helper_can_answer(ctx: &TestHarness) {
    let offered = ctx
        .register(helper_at("Offered", ServiceType::Cleaning, 1.0, 4.0))
        .await;
    let other = ctx
        .register(helper_at("Other", ServiceType::Cleaning, 9.0, 4.0))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();

    let err = ctx.dispatcher().accept(booking.id, other.id).await.unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized { .. }));
    let err = ctx.dispatcher().decline(booking.id, other.id).await.unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized { .. }));

    let err = ctx.dispatcher().start(booking.id, offered.id).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidTransition {
            status: BookingStatus::Offered,
            ..
        }
    ));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_busy_helper_cannot_toggle_availability(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Busy", ServiceType::Cleaning, 1.0, 4.0))
        .await;
    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();
    ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();

    let err = ctx
        .registry()
        .set_status(helper.id, HelperStatus::Available)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidTransition {
            status: BookingStatus::Assigned,
            ..
        }
    ));
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_unknown_booking_is_not_found(ctx: &TestHarness) {
    let err = ctx
        .dispatcher()
        .get_booking(dispatch_core::common::BookingId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ============================================================================
// Cancellation
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_cancel_releases_offered_helper(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Leased", ServiceType::Cooking, 1.0, 4.0))
        .await;
    let requester = RequesterId::new();
    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Cooking))
        .await
        .unwrap();
    let mut helper_rx = ctx.hub().subscribe(&topics::helper(helper.id)).await;

    let cancelled = ctx.dispatcher().cancel(booking.id, requester).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.assignee(), None);
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);

    let event = helper_rx.recv().await.unwrap();
    assert_eq!(event["type"], "booking_cancelled");
    assert_eq!(event["released_helper"], helper.id.to_string());

    let err = ctx.dispatcher().accept(booking.id, helper.id).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_cancel_assigned_frees_helper(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Assigned", ServiceType::Plumbing, 1.0, 4.0))
        .await;
    let requester = RequesterId::new();
    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Plumbing))
        .await
        .unwrap();
    ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();

    let err = ctx
        .dispatcher()
        .cancel(booking.id, RequesterId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized { .. }));

    ctx.dispatcher().cancel(booking.id, requester).await.unwrap();
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_in_progress_cannot_be_cancelled(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Working", ServiceType::Painting, 1.0, 4.0))
        .await;
    let requester = RequesterId::new();
    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Painting))
        .await
        .unwrap();
    ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();
    ctx.dispatcher().start(booking.id, helper.id).await.unwrap();

    let err = ctx.dispatcher().cancel(booking.id, requester).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidTransition {
            status: BookingStatus::InProgress,
            ..
        }
    ));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_manual_dispatch_skips_non_searching(ctx: &TestHarness) {
    let requester = RequesterId::new();
    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Cleaning))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::NoHelpersAvailable);

    let outcome = ctx.dispatcher().dispatch(booking.id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
}

// ============================================================================
// Races
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_exactly_one_wins() {
    for _ in 0..20 {
        let ctx = TestHarness::new(DispatchSettings::default());
        let helper = ctx
            .register(helper_at("Eager", ServiceType::Cleaning, 1.0, 4.0))
            .await;
        let booking = ctx
            .dispatcher()
            .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
            .await
            .unwrap();

        let a = tokio::spawn({
            let dispatcher = ctx.dispatcher().clone();
            async move { dispatcher.accept(booking.id, helper.id).await }
        });
        let b = tokio::spawn({
            let dispatcher = ctx.dispatcher().clone();
            async move { dispatcher.accept(booking.id, helper.id).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "results: {results:?}");
        let loss = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loss, &DispatchError::no_longer_available());

        let stored = ctx.dispatcher().get_booking(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Assigned);
        assert_busy_iff_assigned(ctx.store.as_ref()).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_bookings_race_for_one_helper() {
    for _ in 0..20 {
        let ctx = TestHarness::new(DispatchSettings::default());
        let helper = ctx
            .register(helper_at("Only", ServiceType::Plumbing, 1.0, 4.0))
            .await;

        let submit = |ctx: &TestHarness| {
            let dispatcher = ctx.dispatcher().clone();
            tokio::spawn(async move {
                dispatcher
                    .submit(booking_for(RequesterId::new(), ServiceType::Plumbing))
                    .await
            })
        };
        let a = submit(&ctx);
        let b = submit(&ctx);
        let bookings = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        let offered: Vec<_> = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Offered)
            .collect();
        assert_eq!(offered.len(), 1, "bookings: {bookings:?}");
        let waiting = bookings
            .iter()
            .find(|b| b.status != BookingStatus::Offered)
            .unwrap();
        assert_eq!(waiting.status, BookingStatus::Searching);
        assert!(waiting.rejected_helpers.is_empty());
        assert_eq!(ctx.helper(&helper).await.active_offer, Some(offered[0].id));
        assert_busy_iff_assigned(ctx.store.as_ref()).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_accept_always_ends_cancelled() {
    for _ in 0..20 {
        let ctx = TestHarness::new(DispatchSettings::default());
        let helper = ctx
            .register(helper_at("Racer", ServiceType::Cooking, 1.0, 4.0))
            .await;
        let requester = RequesterId::new();
        let booking = ctx
            .dispatcher()
            .submit(booking_for(requester, ServiceType::Cooking))
            .await
            .unwrap();

        let accept = tokio::spawn({
            let dispatcher = ctx.dispatcher().clone();
            async move { dispatcher.accept(booking.id, helper.id).await }
        });
        let cancel = tokio::spawn({
            let dispatcher = ctx.dispatcher().clone();
            async move { dispatcher.cancel(booking.id, requester).await }
        });
        let accepted = accept.await.unwrap();
        let cancelled = cancel.await.unwrap().unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        match accepted {
            Ok(assigned) => {
                assert_eq!(assigned.status, BookingStatus::Assigned);
                assert_eq!(cancelled.assignee(), Some(helper.id));
            }
            Err(_) => assert_eq!(cancelled.assignee(), None),
        }
        assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);
        assert_busy_iff_assigned(ctx.store.as_ref()).await;
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_accept_then_cancel_releases_assigned_helper(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("First", ServiceType::Cooking, 1.0, 4.0))
        .await;
    let requester = RequesterId::new();
    let booking = ctx
        .dispatcher()
        .submit(booking_for(requester, ServiceType::Cooking))
        .await
        .unwrap();

    let assigned = ctx.dispatcher().accept(booking.id, helper.id).await.unwrap();
    assert_eq!(assigned.status, BookingStatus::Assigned);
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::BUSY);

    let cancelled = ctx.dispatcher().cancel(booking.id, requester).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.assignee(), Some(helper.id));
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

// ============================================================================
// Helpers held by other offers
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_leased_helper_leaves_second_booking_searching(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Only", ServiceType::Plumbing, 1.0, 4.0))
        .await;
    let first_requester = RequesterId::new();
    let first = ctx
        .dispatcher()
        .submit(booking_for(first_requester, ServiceType::Plumbing))
        .await
        .unwrap();
    assert_eq!(first.status, BookingStatus::Offered);

    let second = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Plumbing))
        .await
        .unwrap();
    assert_eq!(second.status, BookingStatus::Searching);
    assert_eq!(second.assignment_attempts, 0);

    let outcome = ctx.dispatcher().dispatch(second.id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Waiting(_)));

    ctx.dispatcher().cancel(first.id, first_requester).await.unwrap();
    let report = ctx.dispatcher().sweep(Utc::now()).await.unwrap();
    assert_eq!(report.offered, 1);
    assert_eq!(report.exhausted, 0);

    let second = ctx.dispatcher().get_booking(second.id).await.unwrap();
    assert_eq!(second.status, BookingStatus::Offered);
    assert_eq!(second.assignee(), Some(helper.id));
    assert_eq!(ctx.helper(&helper).await.active_offer, Some(second.id));
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_waiting_booking_picks_up_helper_after_decline(ctx: &TestHarness) {
    let helper = ctx
        .register(helper_at("Only", ServiceType::Painting, 1.0, 4.0))
        .await;
    let first = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Painting))
        .await
        .unwrap();
    let second = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Painting))
        .await
        .unwrap();
    assert_eq!(second.status, BookingStatus::Searching);

    let declined = ctx.dispatcher().decline(first.id, helper.id).await.unwrap();
    assert_eq!(declined.status, BookingStatus::NoHelpersAvailable);

    let report = ctx.dispatcher().sweep(Utc::now()).await.unwrap();
    assert_eq!(report.offered, 1);
    let second = ctx.dispatcher().get_booking(second.id).await.unwrap();
    assert_eq!(second.assignee(), Some(helper.id));
}

// ============================================================================
// Re-dispatch failures after a committed release
// ============================================================================

#[tokio::test]
async fn test_decline_succeeds_when_redispatch_fails() {
    let (ctx, outage) = TestHarness::with_outage(DispatchSettings::default());
    let first = ctx
        .register(helper_at("First", ServiceType::Gardening, 1.0, 4.0))
        .await;
    let second = ctx
        .register(helper_at("Second", ServiceType::Gardening, 2.0, 4.0))
        .await;
    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Gardening))
        .await
        .unwrap();
    assert_eq!(booking.assignee(), Some(first.id));

    outage.set_down(true);
    let declined = ctx.dispatcher().decline(booking.id, first.id).await.unwrap();
    assert_eq!(declined.status, BookingStatus::Searching);
    assert!(declined.rejected_helpers.contains(&first.id));
    assert_eq!(ctx.helper(&first).await.lease(), HelperLease::FREE);

    let report = ctx.dispatcher().sweep(Utc::now()).await.unwrap();
    assert_eq!(report.failures, 1);

    outage.set_down(false);
    let report = ctx.dispatcher().sweep(Utc::now()).await.unwrap();
    assert_eq!(report.offered, 1);
    let booking = ctx.dispatcher().get_booking(booking.id).await.unwrap();
    assert_eq!(booking.assignee(), Some(second.id));
    assert_busy_iff_assigned(ctx.store.as_ref()).await;
}

#[tokio::test]
async fn test_expiry_counts_when_redispatch_fails() {
    let (ctx, outage) = TestHarness::with_outage(DispatchSettings::default());
    let helper = ctx
        .register(helper_at("Slow", ServiceType::Electrician, 1.0, 4.0))
        .await;
    ctx.register(helper_at("Backup", ServiceType::Electrician, 2.0, 4.0))
        .await;
    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Electrician))
        .await
        .unwrap();

    outage.set_down(true);
    let report = ctx
        .dispatcher()
        .sweep(Utc::now() + Duration::seconds(16))
        .await
        .unwrap();
    assert_eq!(report.expired, 1);

    let stored = ctx.dispatcher().get_booking(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Searching);
    assert!(stored.rejected_helpers.contains(&helper.id));
    assert_eq!(ctx.helper(&helper).await.lease(), HelperLease::FREE);
}

#[tokio::test]
async fn test_zero_retry_budget_still_dispatches_once() {
    let ctx = TestHarness::new(DispatchSettings {
        max_conflict_retries: 0,
        ..Default::default()
    });
    let helper = ctx
        .register(helper_at("Ready", ServiceType::Cleaning, 1.0, 4.0))
        .await;

    let booking = ctx
        .dispatcher()
        .submit(booking_for(RequesterId::new(), ServiceType::Cleaning))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Offered);
    assert_eq!(booking.assignee(), Some(helper.id));
}
