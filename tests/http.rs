use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use course_scheduler::{SearchLimits, Scheduler, server};
use serde_json::{Value, json};
use tower::ServiceExt;

fn post(body: Value) -> Request<Body> {
    Request::post("/schedules/calculating")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn app() -> axum::Router {
    server::router(Scheduler::new(SearchLimits::default()), 2)
}

#[tokio::test]
async fn test_calculates_schedule() {
    let request = json!({
        "sections": [
            { "id": 1, "courseId": 3001, "enrolled": 25, "instructorId": 201 },
            { "id": 2, "courseId": 3002, "enrolled": 40, "instructorId": 201, "duration": 2,
              "requiredCapabilities": ["lab"] }
        ],
        "rooms": [
            { "id": 10, "capacity": 30 },
            { "id": 11, "capacity": 45, "capabilities": ["lab"] }
        ],
        "timeSlots": [
            { "id": 1, "day": 1, "period": 1 },
            { "id": 2, "day": 1, "period": 2 },
            { "id": 3, "day": 1, "period": 3 },
            { "id": 4, "day": 1, "period": 4 }
        ],
        "instructors": [ { "id": 201, "unavailableSlots": [1] } ],
        "constraints": [
            { "kind": "soft", "id": 1, "weight": 4,
              "rule": { "type": "avoidBackToBack", "instructorId": 201 } }
        ]
    });

    let response = app().oneshot(post(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["complete"], true);
    assert_eq!(body["assignment"]["2"]["roomId"], 11);
    assert_eq!(body["assignment"]["2"]["slotId"], 2);
    assert_eq!(body["assignment"]["1"]["roomId"], 10);
    assert_eq!(body["assignment"]["1"]["slotId"], 4);
    // Section 1 starts right as section 2 ends.
    assert_eq!(body["score"], 4);
    assert_eq!(body["diagnostics"]["stopReason"], "complete");
    assert_eq!(body["diagnostics"]["instructorLoad"][0]["slotsAssigned"], 3);
}

#[tokio::test]
async fn test_reports_unplaced_sections() {
    let request = json!({
        "sections": [
            { "id": 1, "courseId": 1, "enrolled": 10, "instructorId": 1 },
            { "id": 2, "courseId": 2, "enrolled": 10, "instructorId": 2 }
        ],
        "rooms": [ { "id": 1, "capacity": 20 } ],
        "timeSlots": [ { "id": 1, "day": 1, "period": 1 } ],
        "instructors": [ { "id": 1 }, { "id": 2 } ]
    });

    let response = app().oneshot(post(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["complete"], false);
    assert_eq!(body["unplaced"][0]["sectionId"], 2);
    assert_eq!(body["unplaced"][0]["reasonCode"], "no_free_slot");
    assert_eq!(body["score"], 1000);
    assert_eq!(body["diagnostics"]["stopReason"], "exhausted");
}

#[tokio::test]
async fn test_invalid_request_is_400_with_field_paths() {
    let request = json!({
        "sections": [ { "id": 1, "courseId": 1, "enrolled": 10, "instructorId": 9 } ],
        "rooms": [ { "id": 1, "capacity": 20 } ],
        "timeSlots": [ { "id": 1, "day": 1, "period": 1 } ],
        "instructors": [ { "id": 1 } ]
    });

    let response = app().oneshot(post(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["details"][0]["field"], "sections[0].instructorId");
}

#[tokio::test]
async fn test_unparseable_body_is_rejected() {
    let response = app()
        .oneshot(post(json!({ "sections": "none" })))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
