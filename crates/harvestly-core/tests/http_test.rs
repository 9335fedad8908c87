// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the HTTP API.
//!
//! These tests verify:
//! 1. CRUD endpoints return the right status codes and bodies
//! 2. Errors map to stable `{code, message}` JSON bodies
//! 3. Availability and subscription flows work end to end over HTTP
//!
//! Run with:
//! ```bash
//! cargo test -p harvestly-core --test http_test
//! ```

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use harvestly_core::availability::AvailabilityService;
use harvestly_core::cutoff::FixedClock;
use harvestly_core::http::{AppState, router};
use harvestly_core::lifecycle::SubscriptionLifecycle;
use harvestly_core::persistence::{Persistence, SqlitePersistence};

/// Router over a fresh in-memory database, with "now" frozen at
/// 2024-06-01 10:00 UTC.
async fn test_app() -> Router {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let clock = Arc::new(FixedClock("2024-06-01T10:00:00Z".parse().unwrap()));
    let availability = Arc::new(AvailabilityService::new(
        persistence.clone(),
        clock.clone(),
        chrono_tz::UTC,
    ));
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        persistence.clone(),
        availability.clone(),
        clock,
    ));
    router(AppState {
        persistence,
        availability,
        lifecycle,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn weekly_friday_schedule() -> Value {
    json!({
        "name": "Friday pickup",
        "type": "recurring",
        "recurrence_rule": {"frequency": "weekly", "day_of_week": "friday"},
        "cutoff_hours_before": 24,
        "cutoff_time": "00:00:00"
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_schedule_crud() {
    let app = test_app().await;

    let (status, created) =
        send(&app, "POST", "/schedules", Some(weekly_friday_schedule())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Friday pickup");
    assert_eq!(created["is_active"], true);
    let id = created["schedule_id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&app, "GET", &format!("/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let mut updated = weekly_friday_schedule();
    updated["name"] = json!("Friday pickup (renamed)");
    let (status, body) = send(&app, "PUT", &format!("/schedules/{}", id), Some(updated)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Friday pickup (renamed)");

    let (status, _) = send(&app, "DELETE", &format!("/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &format!("/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SCHEDULE_NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_schedule_is_rejected() {
    let app = test_app().await;

    let mut input = weekly_friday_schedule();
    input["cutoff_hours_before"] = json!(-5);
    let (status, body) = send(&app, "POST", "/schedules", Some(input)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // a runaway lead time is rejected here rather than blowing up later
    // inside availability's cutoff arithmetic
    let mut input = weekly_friday_schedule();
    input["cutoff_hours_before"] = json!(1_000_000_000_000_i64);
    let (status, body) = send(&app, "POST", "/schedules", Some(input)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_availability_flow() {
    let app = test_app().await;

    let (_, schedule) = send(&app, "POST", "/schedules", Some(weekly_friday_schedule())).await;
    let schedule_id = schedule["schedule_id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/schedule-assignments",
        Some(json!({
            "schedule_id": schedule_id,
            "fulfillment_type": "pickup",
            "location_or_zone_id": "loc-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // block the first Friday through the API
    let (status, _) = send(
        &app,
        "POST",
        &format!("/schedules/{}/blocked-dates/2024-06-07", schedule_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let uri = "/availability?fulfillment_type=pickup&location_or_zone_id=loc-1\
               &from=2024-06-01&horizon_days=21";
    let (status, dates) = send(&app, "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dates, json!(["2024-06-14", "2024-06-21"]));

    // unblocking restores the date (still before its cutoff)
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/schedules/{}/blocked-dates/2024-06-07", schedule_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, dates) = send(&app, "GET", uri, None).await;
    assert_eq!(dates, json!(["2024-06-07", "2024-06-14", "2024-06-21"]));
}

#[tokio::test]
async fn test_assignment_requires_existing_schedule() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/schedule-assignments",
        Some(json!({
            "schedule_id": "no-such-schedule",
            "fulfillment_type": "pickup",
            "location_or_zone_id": "loc-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SCHEDULE_NOT_FOUND");
}

#[tokio::test]
async fn test_subscription_flow() {
    let app = test_app().await;

    let (_, schedule) = send(&app, "POST", "/schedules", Some(weekly_friday_schedule())).await;
    send(
        &app,
        "POST",
        "/schedule-assignments",
        Some(json!({
            "schedule_id": schedule["schedule_id"],
            "fulfillment_type": "pickup",
            "location_or_zone_id": "loc-1"
        })),
    )
    .await;

    let (status, sub) = send(
        &app,
        "POST",
        "/subscriptions",
        Some(json!({
            "frequency": "weekly",
            "fulfillment_type": "pickup",
            "location_or_zone_id": "loc-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sub["status"], "active");
    assert_eq!(sub["next_order_date"], "2024-06-07");
    let id = sub["subscription_id"].as_str().unwrap().to_string();

    let (status, skipped) =
        send(&app, "POST", &format!("/subscriptions/{}/skip", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(skipped["skip_dates"], json!(["2024-06-07"]));
    assert_eq!(skipped["next_order_date"], "2024-06-14");

    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/subscriptions/{}/cancel", id),
        Some(json!({"reason": "too many pickles"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancellation_reason"], "too many pickles");

    // cancelled is terminal
    let (status, body) =
        send(&app, "POST", &format!("/subscriptions/{}/pause", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ILLEGAL_TRANSITION");
}

#[tokio::test]
async fn test_zone_resolution_endpoints() {
    let app = test_app().await;

    for zone in [
        json!({
            "zone_id": "metro",
            "name": "Metro",
            "zip_codes": ["941"],
            "delivery_fee_cents": 500,
            "free_delivery_minimum_cents": 5000,
            "min_order_amount_cents": 2000
        }),
        json!({
            "zone_id": "mission",
            "name": "Mission",
            "zip_codes": ["94110"],
            "delivery_fee_cents": 300,
            "free_delivery_minimum_cents": null,
            "min_order_amount_cents": 1000
        }),
    ] {
        let (status, _) = send(&app, "POST", "/delivery-zones", Some(zone)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // first configured zone wins the overlap
    let (status, body) = send(&app, "GET", "/delivery-zones/resolve?zip=94110", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["zone_id"], "metro");

    let (_, body) = send(&app, "GET", "/delivery-zones/resolve?zip=10001", None).await;
    assert_eq!(body, Value::Null);

    let (status, _) = send(
        &app,
        "POST",
        "/shipping-zones",
        Some(json!({
            "zone_id": "west",
            "name": "West Coast",
            "states": ["California", "Oregon"],
            "base_rate_cents": 900,
            "per_lb_rate_cents": 150,
            "free_shipping_minimum_cents": null,
            "min_order_amount_cents": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/shipping-zones/resolve?state=oregon", None).await;
    assert_eq!(body["zone_id"], "west");
}

#[tokio::test]
async fn test_unknown_subscription_is_404() {
    let app = test_app().await;
    let (status, body) = send(&app, "GET", "/subscriptions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SUBSCRIPTION_NOT_FOUND");
}
