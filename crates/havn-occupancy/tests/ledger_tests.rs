//! Behavioural tests for the occupancy ledger over the in-memory store.
//!
//! Covers the geofence boundary, the one-active-session invariant under
//! concurrency, clamped check-out, availability updates and rollback on
//! timeout.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use havn_occupancy::{
    AvailabilityRequest, CheckInRequest, GeofenceOperation, LedgerConfig, LedgerError,
    MemoryStore, OccupancyLedger, OccupancyStore, ValidationError,
};
use havn_types::{
    AvailabilityStatus, NoiseLevel, OccupancyLevel, OccupancyStatus, Spot, SpotId, UserId,
};

fn spot_at(latitude: f64, longitude: f64, capacity: u32, occupancy: u32) -> Spot {
    Spot {
        id: SpotId::new(),
        name: String::from("Central Library B1"),
        latitude,
        longitude,
        total_capacity: capacity,
        current_occupancy: occupancy,
        current_available: None,
        last_update_at: None,
        updated_at: Utc::now(),
    }
}

fn ledger_with(spots: Vec<Spot>) -> (OccupancyLedger, MemoryStore) {
    let store = MemoryStore::with_spots(spots);
    let ledger = OccupancyLedger::new(Arc::new(store.clone()), LedgerConfig::default());
    (ledger, store)
}

fn check_in_at(spot: SpotId, latitude: f64, longitude: f64) -> CheckInRequest {
    CheckInRequest {
        spot_id: spot,
        latitude,
        longitude,
        location_accuracy: 8.0,
    }
}

async fn occupancy_of(store: &MemoryStore, id: SpotId) -> u32 {
    store.spot(id).await.unwrap().unwrap().current_occupancy
}

#[tokio::test]
async fn check_in_then_out_restores_occupancy_and_presence() {
    let spot = spot_at(0.0, 0.0, 50, 10);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);
    let user = UserId::new();

    let checked_in = ledger.check_in(user, &check_in_at(id, 0.0, 0.0)).await.unwrap();
    assert_eq!(checked_in.spot.current_occupancy, 11);
    assert_eq!(checked_in.record.status, OccupancyStatus::CheckedIn);
    assert_eq!(
        checked_in
            .auto_checkout_at
            .signed_duration_since(checked_in.record.checked_in_at)
            .num_hours(),
        4
    );
    let presence = store.presence(user).await.unwrap();
    assert_eq!(presence.current_spot_id, Some(id));
    assert!(presence.checked_in_at.is_some());

    let checked_out = ledger.check_out(user).await.unwrap();
    assert_eq!(checked_out.spot.current_occupancy, 10);
    assert_eq!(checked_out.record.status, OccupancyStatus::CheckedOut);
    assert!(checked_out.session_duration_secs >= 0);
    assert_eq!(checked_out.formatted_duration(), "00:00:00");

    let presence = store.presence(user).await.unwrap();
    assert_eq!(presence.current_spot_id, None);
    assert_eq!(presence.checked_in_at, None);

    let records = store.records().unwrap();
    assert_eq!(records.len(), 1);
    let closed = records.first().unwrap();
    assert_eq!(closed.status, OccupancyStatus::CheckedOut);
    assert!(closed.checked_out_at.is_some());
    assert_eq!(closed.session_duration_secs, Some(checked_out.session_duration_secs));
}

#[tokio::test]
async fn geofence_boundary_at_the_equator() {
    let spot = spot_at(0.0, 0.0, 50, 0);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);

    let too_far = ledger.check_in(UserId::new(), &check_in_at(id, 0.0, 0.002)).await;
    match too_far {
        Err(LedgerError::GeofenceViolation {
            distance_m,
            radius_m,
            operation,
        }) => {
            assert!((distance_m - 222.39).abs() < 0.1);
            assert!((radius_m - 200.0).abs() < f64::EPSILON);
            assert_eq!(operation, GeofenceOperation::CheckIn);
        }
        other => panic!("expected geofence violation, got {other:?}"),
    }
    assert_eq!(occupancy_of(&store, id).await, 0);
    assert!(store.records().unwrap().is_empty());

    let close_enough = ledger.check_in(UserId::new(), &check_in_at(id, 0.0, 0.0015)).await;
    assert!(close_enough.is_ok());
    assert_eq!(occupancy_of(&store, id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_ins_by_one_user_admit_exactly_one() {
    let spots: Vec<Spot> = (0..8).map(|_| spot_at(0.0, 0.0, 10, 0)).collect();
    let ids: Vec<SpotId> = spots.iter().map(|s| s.id).collect();
    let (ledger, store) = ledger_with(spots);
    let user = UserId::new();

    let attempts = ids.iter().map(|id| {
        let ledger = ledger.clone();
        let request = check_in_at(*id, 0.0, 0.0);
        tokio::spawn(async move { ledger.check_in(user, &request).await })
    });
    let results = futures::future::join_all(attempts).await;

    let outcomes: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::AlreadyCheckedIn)))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(rejected, 7);

    let mut total: Vec<u32> = Vec::new();
    for id in &ids {
        total.push(occupancy_of(&store, *id).await);
    }
    assert_eq!(total.iter().sum::<u32>(), 1);
    let active = store
        .records()
        .unwrap()
        .into_iter()
        .filter(|r| r.status == OccupancyStatus::CheckedIn)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_never_overfill_a_spot() {
    for _ in 0..50 {
        let spot = spot_at(0.0, 0.0, 1, 0);
        let id = spot.id;
        let (ledger, store) = ledger_with(vec![spot]);

        let attempts = (0..8).map(|_| {
            let ledger = ledger.clone();
            let request = check_in_at(id, 0.0, 0.0);
            tokio::spawn(async move { ledger.check_in(UserId::new(), &request).await })
        });
        let results = futures::future::join_all(attempts).await;

        let outcomes: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
        let full = outcomes
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::SpotFull(spot)) if *spot == id))
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(full, 7);
        assert_eq!(occupancy_of(&store, id).await, 1);
        assert_eq!(store.records().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn second_check_in_is_rejected() {
    let first = spot_at(0.0, 0.0, 10, 0);
    let second = spot_at(0.0, 0.0, 10, 0);
    let (a, b) = (first.id, second.id);
    let (ledger, store) = ledger_with(vec![first, second]);
    let user = UserId::new();

    ledger.check_in(user, &check_in_at(a, 0.0, 0.0)).await.unwrap();
    let again = ledger.check_in(user, &check_in_at(b, 0.0, 0.0)).await;
    assert!(matches!(again, Err(LedgerError::AlreadyCheckedIn)));
    assert_eq!(occupancy_of(&store, b).await, 0);
}

#[tokio::test]
async fn check_out_without_session_changes_nothing() {
    let spot = spot_at(0.0, 0.0, 10, 4);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);

    let result = ledger.check_out(UserId::new()).await;
    assert!(matches!(result, Err(LedgerError::NoActiveSession)));
    assert_eq!(occupancy_of(&store, id).await, 4);
}

#[tokio::test]
async fn check_out_clamps_drifted_counter_at_zero() {
    let spot = spot_at(0.0, 0.0, 10, 0);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot.clone()]);
    let user = UserId::new();

    ledger.check_in(user, &check_in_at(id, 0.0, 0.0)).await.unwrap();
    // Simulate accounting drift: the counter lost the check-in.
    store.insert_spot(spot).unwrap();

    let outcome = ledger.check_out(user).await.unwrap();
    assert_eq!(outcome.spot.current_occupancy, 0);
    assert_eq!(occupancy_of(&store, id).await, 0);
}

#[tokio::test]
async fn unknown_spot_is_not_found() {
    let (ledger, _store) = ledger_with(Vec::new());
    let missing = SpotId::new();
    let result = ledger.check_in(UserId::new(), &check_in_at(missing, 0.0, 0.0)).await;
    assert!(matches!(result, Err(LedgerError::SpotNotFound(id)) if id == missing));
}

#[tokio::test]
async fn full_spot_rejects_check_in() {
    let spot = spot_at(0.0, 0.0, 2, 2);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);

    let result = ledger.check_in(UserId::new(), &check_in_at(id, 0.0, 0.0)).await;
    assert!(matches!(result, Err(LedgerError::SpotFull(_))));
    assert_eq!(occupancy_of(&store, id).await, 2);
}

#[tokio::test]
async fn invalid_coordinates_are_rejected_before_the_store() {
    let spot = spot_at(0.0, 0.0, 10, 0);
    let id = spot.id;
    let (ledger, _store) = ledger_with(vec![spot]);

    let result = ledger.check_in(UserId::new(), &check_in_at(id, 91.0, 0.0)).await;
    assert!(matches!(
        result,
        Err(LedgerError::Validation(ValidationError::InvalidLatitude(_)))
    ));

    let mut request = check_in_at(id, 0.0, 0.0);
    request.location_accuracy = -1.0;
    let result = ledger.check_in(UserId::new(), &request).await;
    assert!(matches!(
        result,
        Err(LedgerError::Validation(ValidationError::InvalidAccuracy(_)))
    ));
}

#[tokio::test]
async fn availability_update_uses_the_tighter_radius() {
    let spot = spot_at(0.0, 0.0, 20, 3);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);
    let user = UserId::new();

    // ~167 m: inside the check-in radius, outside the availability radius.
    let far = ledger
        .update_availability(
            user,
            AvailabilityRequest {
                spot_id: id,
                seats_available: 5,
                noise_level: None,
                photo_url: None,
                latitude: 0.0,
                longitude: 0.0015,
            },
        )
        .await;
    assert!(matches!(
        far,
        Err(LedgerError::GeofenceViolation {
            operation: GeofenceOperation::AvailabilityUpdate,
            ..
        })
    ));

    let outcome = ledger
        .update_availability(
            user,
            AvailabilityRequest {
                spot_id: id,
                seats_available: 12,
                noise_level: Some(NoiseLevel::Quiet),
                photo_url: Some(String::from("https://cdn.example.org/p/1.jpg")),
                latitude: 0.0,
                longitude: 0.0005,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.spot.current_available, Some(12));
    assert_eq!(outcome.spot.current_occupancy, 3);
    assert_eq!(outcome.availability_status, AvailabilityStatus::Available);
    assert_eq!(outcome.confidence, 100);
    assert!(outcome.report.distance_m < 100.0);

    let reports = store.availability_reports().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports.first().map(|r| r.noise_level), Some(Some(NoiseLevel::Quiet)));
    assert!(store.records().unwrap().is_empty());
}

#[tokio::test]
async fn availability_cannot_exceed_capacity() {
    let spot = spot_at(0.0, 0.0, 10, 0);
    let id = spot.id;
    let (ledger, store) = ledger_with(vec![spot]);

    let result = ledger
        .update_availability(
            UserId::new(),
            AvailabilityRequest {
                spot_id: id,
                seats_available: 11,
                noise_level: None,
                photo_url: None,
                latitude: 0.0,
                longitude: 0.0,
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::SeatsExceedCapacity {
            seats: 11,
            capacity: 10
        })
    ));
    assert!(store.availability_reports().unwrap().is_empty());
}

#[tokio::test]
async fn spot_status_reports_levels_and_confidence() {
    let spot = spot_at(0.0, 0.0, 30, 21);
    let id = spot.id;
    let (ledger, _store) = ledger_with(vec![spot]);

    let status = ledger.spot_status(id).await.unwrap();
    assert_eq!(status.occupancy_percentage, 70);
    assert_eq!(status.occupancy_level, OccupancyLevel::High);
    assert_eq!(status.availability_status, AvailabilityStatus::Unknown);
    assert_eq!(status.confidence, 0);

    let missing = ledger.spot_status(SpotId::new()).await;
    assert!(matches!(missing, Err(LedgerError::SpotNotFound(_))));
}

#[tokio::test]
async fn timed_out_check_in_leaves_no_trace() {
    let spot = spot_at(0.0, 0.0, 10, 0);
    let id = spot.id;
    let store = MemoryStore::with_spots([spot]);
    let config = LedgerConfig {
        transaction_timeout: Duration::from_millis(50),
        ..LedgerConfig::default()
    };
    let ledger = OccupancyLedger::new(Arc::new(store.clone()), config);
    let user = UserId::new();

    // Another transaction holds the user's lock for longer than the deadline.
    let held = store.begin(user).await.unwrap();
    let result = ledger.check_in(user, &check_in_at(id, 0.0, 0.0)).await;
    assert!(matches!(result, Err(LedgerError::Timeout(_))));
    drop(held);

    assert_eq!(occupancy_of(&store, id).await, 0);
    assert!(store.records().unwrap().is_empty());

    // The lock is free again and the user can check in normally.
    assert!(ledger.check_in(user, &check_in_at(id, 0.0, 0.0)).await.is_ok());
}
