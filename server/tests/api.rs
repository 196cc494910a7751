mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use alumni_portal_server::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use alumni_portal_server::models::{Role, User};
use alumni_portal_server::payments::webhook::{sign, SIGNATURE_HEADER};
use alumni_portal_server::payments::GatewayStatus;
use alumni_portal_server::routes::create_routes;

use common::{TestApp, WEBHOOK_SECRET};

fn router(app: &TestApp) -> Router {
    create_routes(app.state.clone(), &app.config)
}

fn request(method: Method, uri: &str, caller: Option<&User>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = caller {
        builder = builder
            .header(USER_ID_HEADER, user.id.to_string())
            .header(USER_ROLE_HEADER, user.role.as_str());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(app).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_check_carries_security_headers() {
    let app = TestApp::new();
    let response = router(&app)
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = send(&app, request(Method::GET, "/users/me", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_profile_signup_and_lookup() {
    let app = TestApp::new();
    // Signed up with the auth provider but has no profile yet.
    let mut caller = app.user(Role::Member).await;
    caller.id = Uuid::new_v4();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/users",
            Some(&caller),
            Some(json!({"email": "ngozi@alumni.test", "full_name": "Ngozi Obi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "member");

    let (status, body) = send(&app, request(Method::GET, "/users/me", Some(&caller), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ngozi@alumni.test");
}

#[tokio::test]
async fn test_members_cannot_manage_events() {
    let app = TestApp::new();
    let member = app.user(Role::Member).await;
    let organizer = app.user(Role::Organizer).await;
    let new_event = json!({
        "title": "Career Fair",
        "venue": "Senate Building",
        "start_time": "2099-03-01T09:00:00Z",
        "capacity": 200,
        "price": "0"
    });

    let (status, body) = send(
        &app,
        request(Method::POST, "/events", Some(&member), Some(new_event.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(
        &app,
        request(Method::POST, "/events", Some(&organizer), Some(new_event)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "draft");
    let event_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, request(Method::GET, "/events", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _) = send(
        &app,
        request(Method::GET, &format!("/events/{event_id}"), Some(&member), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/events/{event_id}/publish"),
            Some(&organizer),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "published");

    let (_, body) = send(&app, request(Method::GET, "/events", None, None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_then_waitlist_over_http() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let first = app.user(Role::Member).await;
    let second = app.user(Role::Member).await;
    let event = app.event(organizer.id, 1, Decimal::ZERO).await;
    let uri = format!("/events/{}/registrations", event.id);

    let (status, body) = send(&app, request(Method::POST, &uri, Some(&first), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["outcome"], "registered");
    assert_eq!(body["data"]["registration"]["status"], "confirmed");

    let (status, body) = send(
        &app,
        request(Method::POST, &uri, Some(&second), Some(json!({"ticket_type": "vip"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "waitlisted");
    assert_eq!(body["data"]["entry"]["position"], 1);

    let (status, _) = send(&app, request(Method::POST, &uri, Some(&first), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let waitlist = format!("/events/{}/waitlist", event.id);
    let (status, _) = send(&app, request(Method::GET, &waitlist, Some(&first), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, request(Method::GET, &waitlist, Some(&organizer), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/events/{}/capacity", event.id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], 0);
    assert_eq!(body["data"]["waitlist_count"], 1);
}

#[tokio::test]
async fn test_only_owner_or_admin_can_cancel() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let owner = app.user(Role::Member).await;
    let stranger = app.user(Role::Member).await;
    let event = app.event(organizer.id, 5, Decimal::ZERO).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(owner.id, event.id, Default::default())
        .await
        .unwrap();
    let registration_id = outcome.registration().unwrap().id;
    let uri = format!("/registrations/{registration_id}/cancel");

    let (status, _) = send(&app, request(Method::POST, &uri, Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request(Method::POST, &uri, Some(&owner), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registration"]["status"], "cancelled");

    let (status, body) = send(&app, request(Method::POST, &uri, Some(&owner), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_signed_webhook_confirms_payment() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 10, Decimal::new(250_000, 2)).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(member.id, event.id, Default::default())
        .await
        .unwrap();
    let alumni_portal_server::services::RegistrationOutcome::Registered {
        payment: Some(payment),
        ..
    } = outcome
    else {
        panic!("priced registration should carry a payment");
    };

    let payload = json!({
        "event": "charge.success",
        "data": {
            "reference": payment.reference,
            "amount": 250_000,
            "currency": "NGN",
            "status": "success"
        }
    })
    .to_string();

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/payments/webhook")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signed = Request::builder()
        .method(Method::POST)
        .uri("/payments/webhook")
        .header(SIGNATURE_HEADER, sign(WEBHOOK_SECRET, payload.as_bytes()).unwrap())
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = send(&app, signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["status"], "success");
    assert_eq!(body["data"]["registration"]["status"], "confirmed");
    assert!(body["data"]["ticket"]["ticket_number"].is_string());
}

#[tokio::test]
async fn test_verify_endpoint_and_admin_sweep() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let admin = app.user(Role::Admin).await;
    let event = app.event(organizer.id, 10, Decimal::new(100_000, 2)).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(member.id, event.id, Default::default())
        .await
        .unwrap();
    let alumni_portal_server::services::RegistrationOutcome::Registered {
        payment: Some(payment),
        ..
    } = outcome
    else {
        panic!("priced registration should carry a payment");
    };

    let verify = format!("/payments/verify?reference={}", payment.reference);
    let (status, body) = send(&app, request(Method::GET, &verify, Some(&member), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["status"], "pending");
    assert_eq!(body["data"]["changed"], false);

    let sweep = request(
        Method::POST,
        "/admin/payments/reconcile",
        Some(&member),
        Some(json!({"older_than_minutes": 0})),
    );
    let (status, _) = send(&app, sweep).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.gateway.settle(&payment.reference, GatewayStatus::Failed);
    let sweep = request(
        Method::POST,
        "/admin/payments/reconcile",
        Some(&admin),
        Some(json!({"older_than_minutes": 0})),
    );
    let (status, body) = send(&app, sweep).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["confirmed"], 0);
}

#[tokio::test]
async fn test_page_draft_publish_and_read() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let admin = app.user(Role::Admin).await;

    let (status, body) = send(
        &app,
        request(
            Method::PUT,
            "/pages/about/draft",
            Some(&organizer),
            Some(json!({"content": {"heading": "Who we are"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["version"], 1);

    let (status, _) = send(&app, request(Method::GET, "/pages/about", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request(Method::POST, "/pages/about/publish", Some(&organizer), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request(Method::POST, "/pages/about/publish", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request(Method::GET, "/pages/about", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"]["heading"], "Who we are");
}

#[tokio::test]
async fn test_notifications_are_listed_and_marked_read() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 5, Decimal::ZERO).await;
    app.state
        .capacity
        .register_for_event(member.id, event.id, Default::default())
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        request(Method::GET, "/notifications?unread_only=true", Some(&member), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 1);
    let id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(Method::POST, &format!("/notifications/{id}/read"), Some(&organizer), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(Method::POST, &format!("/notifications/{id}/read"), Some(&member), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["read"], true);

    let (_, body) = send(&app, request(Method::GET, "/notifications", Some(&member), None)).await;
    assert_eq!(body["data"]["unread"], 0);
}

#[tokio::test]
async fn test_verify_is_limited_to_the_payer_and_admins() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let owner = app.user(Role::Member).await;
    let stranger = app.user(Role::Member).await;
    let admin = app.user(Role::Admin).await;
    let event = app.event(organizer.id, 10, Decimal::new(300_000, 2)).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(owner.id, event.id, Default::default())
        .await
        .unwrap();
    let alumni_portal_server::services::RegistrationOutcome::Registered {
        payment: Some(payment),
        ..
    } = outcome
    else {
        panic!("priced registration should carry a payment");
    };
    app.gateway.settle(&payment.reference, GatewayStatus::Success);

    let verify = format!("/payments/verify?reference={}", payment.reference);
    let (status, body) = send(&app, request(Method::GET, &verify, Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["data"].is_null());
    assert_eq!(app.gateway.verify_calls(), 0);

    let (status, body) = send(&app, request(Method::GET, &verify, Some(&owner), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["status"], "success");
    assert!(body["data"]["ticket"]["ticket_number"].is_string());

    let (status, _) = send(&app, request(Method::GET, &verify, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(
            Method::GET,
            "/payments/verify?reference=REG_0_NOSUCH",
            Some(&owner),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_analytics_overview() {
    let app = TestApp::new();
    let admin = app.user(Role::Admin).await;
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 5, Decimal::ZERO).await;
    app.state
        .capacity
        .register_for_event(member.id, event.id, Default::default())
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        request(Method::GET, "/admin/analytics", Some(&organizer), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(Method::GET, "/admin/analytics?range_days=7", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["range_days"], 7);
    assert_eq!(body["data"]["total_users"], 3);
    assert_eq!(body["data"]["new_users"]["value"], 3);
    assert_eq!(body["data"]["new_users"]["trend"], "up");
    assert_eq!(body["data"]["registrations"]["value"], 1);
    assert_eq!(body["data"]["users_by_role"][0]["role"], "member");

    let (status, body) = send(
        &app,
        request(Method::GET, "/admin/analytics?range_days=0", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_registrations_export_as_csv() {
    let app = TestApp::new();
    let admin = app.user(Role::Admin).await;
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 5, Decimal::ZERO).await;
    app.state
        .capacity
        .register_for_event(member.id, event.id, Default::default())
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        request(Method::GET, "/admin/registrations/export", Some(&member), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        request(Method::GET, "/admin/registrations/export", Some(&organizer), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/admin/registrations/export?event_id={}", event.id);
    let response = router(&app)
        .oneshot(request(Method::GET, &uri, Some(&organizer), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/csv; charset=utf-8"
    );
    let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.to_str().unwrap().contains(&event.id.to_string()));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("registration_id,ticket_number,full_name,email"));
    assert!(lines[1].contains(&member.email));
    assert!(lines[1].contains(",confirmed,"));

    let response = router(&app)
        .oneshot(request(
            Method::GET,
            "/admin/registrations/export?status=cancelled",
            Some(&admin),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().lines().count(), 1);
}
