use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDateTime, Utc};
use tower::ServiceExt;

use salon_booking::config::AppConfig;
use salon_booking::db;
use salon_booking::services::notify::{EmailProvider, SmsProvider};
use salon_booking::state::AppState;

// ── Mock providers ──

#[derive(Default)]
struct Mailbox {
    emails: Mutex<Vec<(String, String, String)>>,
    smses: Mutex<Vec<(String, String)>>,
}

struct MockEmail {
    mailbox: Arc<Mailbox>,
    fail: bool,
}

#[async_trait]
impl EmailProvider for MockEmail {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("email transport down"));
        }
        self.mailbox.emails.lock().unwrap().push((
            to.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

struct MockSms {
    mailbox: Arc<Mailbox>,
    fail: bool,
}

#[async_trait]
impl SmsProvider for MockSms {
    async fn send_sms(&self, to: &str, body: &str) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("sms transport down"));
        }
        self.mailbox
            .smses
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Helpers ──

const ADMIN: Option<&str> = Some("test-token");

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        base_url: "http://localhost:3000".to_string(),
        session_ttl_hours: 24,
        booking_window_days: 14,
        reminder_horizon_hours: 24,
        email_provider: "console".to_string(),
        smtp_server: String::new(),
        smtp_port: 587,
        smtp_username: String::new(),
        smtp_password: String::new(),
        email_from: "no-reply@localhost".to_string(),
        sms_provider: "console".to_string(),
        twilio_account_sid: String::new(),
        twilio_auth_token: String::new(),
        twilio_phone_number: String::new(),
    }
}

fn test_state_with(fail_email: bool, fail_sms: bool) -> (Arc<AppState>, Arc<Mailbox>) {
    let conn = db::init_db(":memory:").unwrap();
    let mailbox = Arc::new(Mailbox::default());
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        email: Box::new(MockEmail {
            mailbox: Arc::clone(&mailbox),
            fail: fail_email,
        }),
        sms: Box::new(MockSms {
            mailbox: Arc::clone(&mailbox),
            fail: fail_sms,
        }),
    });
    (state, mailbox)
}

fn test_state() -> (Arc<AppState>, Arc<Mailbox>) {
    test_state_with(false, false)
}

async fn request(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = salon_booking::app(Arc::clone(state));

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn fmt_dt(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Slots are persisted at second precision; keep fixtures comparable.
fn truncate_secs(dt: NaiveDateTime) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&fmt_dt(dt), "%Y-%m-%d %H:%M:%S").unwrap()
}

fn parse_api_dt(value: &serde_json::Value) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value.as_str().unwrap(), "%Y-%m-%dT%H:%M:%S").unwrap()
}

async fn seed_service(
    state: &Arc<AppState>,
    name: &str,
    duration_minutes: i32,
    price: &str,
) -> String {
    let (status, json) = request(
        state,
        "POST",
        "/api/admin/services",
        ADMIN,
        Some(serde_json::json!({
            "name": name,
            "duration_minutes": duration_minutes,
            "price": price,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn seed_staff(
    state: &Arc<AppState>,
    first: &str,
    last: &str,
    service_ids: &[&str],
) -> String {
    let (status, json) = request(
        state,
        "POST",
        "/api/admin/staff",
        ADMIN,
        Some(serde_json::json!({
            "first_name": first,
            "last_name": last,
            "service_ids": service_ids,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn seed_slot(
    state: &Arc<AppState>,
    staff_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> String {
    let (status, json) = request(
        state,
        "POST",
        "/api/admin/slots",
        ADMIN,
        Some(serde_json::json!({
            "staff_id": staff_id,
            "start_time": fmt_dt(start),
            "end_time": fmt_dt(end),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

/// Haircut (45 min, 50.00) by John Doe with one slot two days out.
async fn salon_fixture(state: &Arc<AppState>) -> (String, String, String, NaiveDateTime) {
    let service_id = seed_service(state, "Haircut", 45, "50.00").await;
    let staff_id = seed_staff(state, "John", "Doe", &[&service_id]).await;
    let start = truncate_secs(Utc::now().naive_utc() + Duration::days(2));
    let slot_id = seed_slot(state, &staff_id, start, start + Duration::hours(1)).await;
    (service_id, staff_id, slot_id, start)
}

async fn register_customer(state: &Arc<AppState>, email: &str, phone: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "email": email,
        "password": "sup3r-secret",
        "first_name": "Ada",
        "last_name": "Lovelace",
    });
    if let Some(phone) = phone {
        body["phone"] = serde_json::json!(phone);
    }
    let (status, json) = request(state, "POST", "/api/auth/register", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    json["token"].as_str().unwrap().to_string()
}

// ── Health & admin auth ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let (status, json) = request(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_admin_requires_auth() {
    let (state, _) = test_state();

    let (status, _) = request(&state, "GET", "/api/admin/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &state,
        "GET",
        "/api/admin/status",
        Some("wrong-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = request(&state, "GET", "/api/admin/status", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pending_count"], 0);
}

// ── Identity ──

#[tokio::test]
async fn test_register_login_profile_flow() {
    let (state, mailbox) = test_state();

    let token = register_customer(&state, "ada@example.com", None).await;

    // Registration sent a verification email.
    {
        let emails = mailbox.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "ada@example.com");
        assert_eq!(emails[0].1, "Verify your email");
    }

    // Duplicate email is a conflict.
    let (status, _) = request(
        &state,
        "POST",
        "/api/auth/register",
        None,
        Some(serde_json::json!({
            "email": "ada@example.com",
            "password": "sup3r-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Wrong password rejected.
    let (status, _) = request(
        &state,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({
            "email": "ada@example.com",
            "password": "wrong-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct login issues a token.
    let (status, json) = request(
        &state,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({
            "email": "ada@example.com",
            "password": "sup3r-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["token"].as_str().is_some());

    // Profile round-trip.
    let (status, json) = request(&state, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "ada@example.com");
    assert_eq!(json["sms_notifications"], true);

    let (status, json) = request(
        &state,
        "PUT",
        "/api/auth/profile",
        Some(&token),
        Some(serde_json::json!({ "sms_notifications": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sms_notifications"], false);

    // Logout invalidates the session.
    let (status, _) = request(&state, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&state, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_registration_rejected() {
    let (state, _) = test_state();

    let (status, json) = request(
        &state,
        "POST",
        "/api/auth/register",
        None,
        Some(serde_json::json!({ "email": "not-an-email", "password": "sup3r-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "email");

    let (status, json) = request(
        &state,
        "POST",
        "/api/auth/register",
        None,
        Some(serde_json::json!({ "email": "ada@example.com", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "password");
}

#[tokio::test]
async fn test_email_verification_flow() {
    let (state, mailbox) = test_state();
    let token = register_customer(&state, "ada@example.com", None).await;

    let verify_token = {
        let emails = mailbox.emails.lock().unwrap();
        let body = &emails[0].2;
        let marker = "token=";
        let idx = body.find(marker).unwrap() + marker.len();
        body[idx..idx + 32].to_string()
    };

    let (status, json) = request(
        &state,
        "GET",
        &format!("/api/auth/verify-email?token={verify_token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);

    let (_, json) = request(&state, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(json["email_verified"], true);

    // Tokens are single-use.
    let (status, _) = request(
        &state,
        "GET",
        &format!("/api/auth/verify-email?token={verify_token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_phone_otp_flow() {
    let (state, mailbox) = test_state();
    let token = register_customer(&state, "ada@example.com", None).await;

    let (status, _) = request(
        &state,
        "POST",
        "/api/auth/verify-phone",
        Some(&token),
        Some(serde_json::json!({ "phone": "+15551234567" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let code = {
        let smses = mailbox.smses.lock().unwrap();
        assert_eq!(smses.len(), 1);
        assert_eq!(smses[0].0, "+15551234567");
        let body = &smses[0].1;
        let digits: String = body.chars().filter(|c| c.is_ascii_digit()).take(6).collect();
        assert_eq!(digits.len(), 6);
        digits
    };

    // A wrong code is rejected first.
    let (status, _) = request(
        &state,
        "POST",
        "/api/auth/verify-otp",
        Some(&token),
        Some(serde_json::json!({ "code": "000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = request(
        &state,
        "POST",
        "/api/auth/verify-otp",
        Some(&token),
        Some(serde_json::json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);

    let (_, json) = request(&state, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(json["phone_verified"], true);
    assert_eq!(json["phone"], "+15551234567");
}

// ── Catalog ──

#[tokio::test]
async fn test_catalog_endpoints() {
    let (state, _) = test_state();
    let (service_id, staff_id, _, _) = salon_fixture(&state).await;
    let facial_id = seed_service(&state, "Facial", 30, "40.00").await;

    let (status, json) = request(&state, "GET", "/api/services", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    // Filter services by the staff member who offers them.
    let (_, json) = request(
        &state,
        "GET",
        &format!("/api/services?staff_id={staff_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "Haircut");
    assert_eq!(json[0]["price"], "50.00");

    let (status, json) = request(&state, "GET", "/api/services/haircut", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["duration_minutes"], 45);
    assert_eq!(json["staff"][0]["full_name"], "John Doe");

    let (status, _) = request(&state, "GET", "/api/services/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Staff listing, filtered by service.
    let (_, json) = request(
        &state,
        "GET",
        &format!("/api/staff?service_id={service_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (_, json) = request(
        &state,
        "GET",
        &format!("/api/staff?service_id={facial_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 0);

    let (status, json) = request(&state, "GET", "/api/staff/john-doe", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["full_name"], "John Doe");
    assert_eq!(json["services"][0]["slug"], "haircut");
}

#[tokio::test]
async fn test_staff_slots_grouped_by_date() {
    let (state, _) = test_state();
    let (_, staff_id, _, start) = salon_fixture(&state).await;
    let next_day = start + Duration::days(1);
    seed_slot(&state, &staff_id, next_day, next_day + Duration::hours(1)).await;

    let (status, json) = request(&state, "GET", "/api/staff/john-doe/slots", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["staff_name"], "John Doe");
    let days = json["days"].as_array().unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0]["openings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_any_staff_slots_dedupe_by_start_time() {
    let (state, _) = test_state();
    let (service_id, staff_id, _, start) = salon_fixture(&state).await;
    let jane_id = seed_staff(&state, "Jane", "Roe", &[&service_id]).await;
    // Jane offers the same instant plus one more later.
    seed_slot(&state, &jane_id, start, start + Duration::hours(1)).await;
    let later = start + Duration::hours(3);
    seed_slot(&state, &jane_id, later, later + Duration::hours(1)).await;

    let (status, json) = request(&state, "GET", "/api/slots", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let openings: Vec<&serde_json::Value> = json["days"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|d| d["openings"].as_array().unwrap())
        .collect();
    assert_eq!(openings.len(), 2);

    // Pinning the staff shows their own slots only.
    let (_, json) = request(
        &state,
        "GET",
        &format!("/api/slots?staff_id={staff_id}"),
        None,
        None,
    )
    .await;
    let openings: Vec<&serde_json::Value> = json["days"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|d| d["openings"].as_array().unwrap())
        .collect();
    assert_eq!(openings.len(), 1);
}

#[tokio::test]
async fn test_duplicate_slot_start_conflict() {
    let (state, _) = test_state();
    let (_, staff_id, _, start) = salon_fixture(&state).await;

    let (status, _) = request(
        &state,
        "POST",
        "/api/admin/slots",
        ADMIN,
        Some(serde_json::json!({
            "staff_id": staff_id,
            "start_time": fmt_dt(start),
            "end_time": fmt_dt(start + Duration::hours(2)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_slot_end_must_follow_start() {
    let (state, _) = test_state();
    let (_, staff_id, _, _) = salon_fixture(&state).await;
    let start = Utc::now().naive_utc() + Duration::days(5);

    let (status, json) = request(
        &state,
        "POST",
        "/api/admin/slots",
        ADMIN,
        Some(serde_json::json!({
            "staff_id": staff_id,
            "start_time": fmt_dt(start),
            "end_time": fmt_dt(start - Duration::hours(1)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "end_time");
}

// ── Bookings ──

#[tokio::test]
async fn test_guest_booking_lifecycle() {
    let (state, mailbox) = test_state();
    let (service_id, staff_id, slot_id, start) = salon_fixture(&state).await;

    // Guest booking with email only.
    let (status, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
            "notes": "first visit",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["price"], "50.00");
    let end = parse_api_dt(&json["end_time"]);
    assert_eq!(end, start + Duration::minutes(45));
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    // Creation alone sends nothing.
    assert!(mailbox.emails.lock().unwrap().is_empty());

    // Confirm: status flips, confirmed_at stamps, email goes out to the
    // guest address, and no SMS is attempted without a phone number.
    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert!(json["confirmed_at"].as_str().is_some());
    {
        let emails = mailbox.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "a@b.com");
        assert_eq!(emails[0].1, "Booking Confirmation");
        assert!(emails[0].2.contains(&code));
    }
    assert!(mailbox.smses.lock().unwrap().is_empty());

    // Confirming twice is a state conflict.
    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Self-service lookup by code.
    let (status, json) = request(&state, "GET", &format!("/api/bookings/{code}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
}

#[tokio::test]
async fn test_booking_requires_identity() {
    let (state, _) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;

    let (status, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "guest_email");

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "not-an-email",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registered_booking_uses_stored_contact() {
    let (state, mailbox) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;
    let token = register_customer(&state, "ada@example.com", Some("+15559876543")).await;
    mailbox.emails.lock().unwrap().clear();

    let (status, json) = request(
        &state,
        "POST",
        "/api/bookings",
        Some(&token),
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Both channels deliver to the stored contact.
    {
        let emails = mailbox.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "ada@example.com");
        let smses = mailbox.smses.lock().unwrap();
        assert_eq!(smses.len(), 1);
        assert_eq!(smses[0].0, "+15559876543");
    }

    // The booking shows up under the customer's account.
    let (status, json) = request(&state, "GET", "/api/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["confirmation_code"], code.as_str());
}

#[tokio::test]
async fn test_sms_preference_respected() {
    let (state, mailbox) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;
    let token = register_customer(&state, "ada@example.com", Some("+15559876543")).await;

    let (status, _) = request(
        &state,
        "PUT",
        "/api/auth/profile",
        Some(&token),
        Some(serde_json::json!({ "sms_notifications": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    mailbox.emails.lock().unwrap().clear();

    let (_, json) = request(
        &state,
        "POST",
        "/api/bookings",
        Some(&token),
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
        })),
    )
    .await;
    let code = json["confirmation_code"].as_str().unwrap().to_string();
    request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;

    assert_eq!(mailbox.emails.lock().unwrap().len(), 1);
    assert!(mailbox.smses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notification_failure_never_fails_the_operation() {
    let (state, mailbox) = test_state_with(true, true);
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;

    let (_, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
            "guest_phone": "+15551112222",
        })),
    )
    .await;
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert!(mailbox.emails.lock().unwrap().is_empty());
    assert!(mailbox.smses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_overlapping_booking_conflict() {
    let (state, _) = test_state();
    let (service_id, staff_id, slot_id, start) = salon_fixture(&state).await;
    // Second slot for the same staff member 20 minutes in.
    let overlap_slot = seed_slot(
        &state,
        &staff_id,
        start + Duration::minutes(20),
        start + Duration::minutes(80),
    )
    .await;

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": overlap_slot,
            "guest_email": "c@d.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The full slot itself also rejects a second taker.
    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "e@f.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_staff_must_offer_requested_service() {
    let (state, _) = test_state();
    let (_, _, _, start) = salon_fixture(&state).await;
    let facial_id = seed_service(&state, "Facial", 30, "40.00").await;
    let jane_id = seed_staff(&state, "Jane", "Roe", &[]).await;
    let jane_slot = seed_slot(
        &state,
        &jane_id,
        start + Duration::days(1),
        start + Duration::days(1) + Duration::hours(1),
    )
    .await;

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": facial_id,
            "staff_id": jane_id,
            "time_slot_id": jane_slot,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = request(&state, "GET", "/api/admin/bookings", ADMIN, None).await;
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_blocked_slot_unavailable() {
    let (state, _) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/slots/{slot_id}/block"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = request(&state, "GET", "/api/staff/john-doe/slots", None, None).await;
    assert_eq!(json["days"].as_array().unwrap().len(), 0);

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unblocking restores it.
    request(
        &state,
        "POST",
        &format!("/api/admin/slots/{slot_id}/unblock"),
        ADMIN,
        None,
    )
    .await;
    let (_, json) = request(&state, "GET", "/api/staff/john-doe/slots", None, None).await;
    assert_eq!(json["days"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_lifecycle() {
    let (state, mailbox) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;

    let (_, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/cancel"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "canceled");
    {
        let emails = mailbox.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].1, "Booking Canceled");
    }

    // Canceling a canceled booking is rejected.
    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/cancel"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The slot opens up again.
    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "c@d.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_terminal_transitions() {
    let (state, _) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;

    let (_, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    let id = json["id"].as_str().unwrap().to_string();
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    // Completing a pending booking is rejected.
    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/complete"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Admin confirms on the customer's behalf, then completes.
    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/complete"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");

    // Completed is terminal for self-service cancellation too.
    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/cancel"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_service_protected_by_bookings() {
    let (state, _) = test_state();
    let (service_id, staff_id, slot_id, _) = salon_fixture(&state).await;
    let unused_id = seed_service(&state, "Facial", 30, "40.00").await;

    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = request(
        &state,
        "DELETE",
        &format!("/api/admin/services/{service_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = request(
        &state,
        "DELETE",
        &format!("/api/admin/services/{unused_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reminders_run_once_per_booking() {
    let (state, mailbox) = test_state();
    let service_id = seed_service(&state, "Haircut", 45, "50.00").await;
    let staff_id = seed_staff(&state, "John", "Doe", &[&service_id]).await;
    // Starts in two hours: inside the 24h reminder horizon.
    let start = Utc::now().naive_utc() + Duration::hours(2);
    let slot_id = seed_slot(&state, &staff_id, start, start + Duration::hours(1)).await;

    let (_, json) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "service_id": service_id,
            "staff_id": staff_id,
            "time_slot_id": slot_id,
            "guest_email": "a@b.com",
        })),
    )
    .await;
    let code = json["confirmation_code"].as_str().unwrap().to_string();

    // Pending bookings get no reminder.
    let (status, json) = request(&state, "POST", "/api/admin/reminders/run", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["processed"], 0);

    request(
        &state,
        "POST",
        &format!("/api/bookings/{code}/confirm"),
        None,
        None,
    )
    .await;
    mailbox.emails.lock().unwrap().clear();

    let (_, json) = request(&state, "POST", "/api/admin/reminders/run", ADMIN, None).await;
    assert_eq!(json["processed"], 1);
    assert_eq!(json["delivered"], 1);
    {
        let emails = mailbox.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].1, "Appointment Reminder");
    }

    // A second run finds nothing left to send.
    let (_, json) = request(&state, "POST", "/api/admin/reminders/run", ADMIN, None).await;
    assert_eq!(json["processed"], 0);
    assert_eq!(mailbox.emails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_opening_hours_roundtrip() {
    let (state, _) = test_state();

    let (status, _) = request(
        &state,
        "PUT",
        "/api/admin/opening-hours",
        ADMIN,
        Some(serde_json::json!({
            "hours": [
                { "weekday": 0, "start_time": "09:00", "end_time": "17:00", "is_closed": false },
                { "weekday": 6, "start_time": "00:00", "end_time": "00:00", "is_closed": true },
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = request(&state, "GET", "/api/opening-hours", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let hours = json.as_array().unwrap();
    assert_eq!(hours.len(), 2);
    assert_eq!(hours[0]["weekday"], 0);
    assert_eq!(hours[0]["start_time"], "09:00");
    assert_eq!(hours[1]["is_closed"], true);

    // Invalid hours are rejected.
    let (status, _) = request(
        &state,
        "PUT",
        "/api/admin/opening-hours",
        ADMIN,
        Some(serde_json::json!({
            "hours": [{ "weekday": 9, "start_time": "09:00", "end_time": "17:00", "is_closed": false }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
