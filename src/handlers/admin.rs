use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::models::service::slugify;
use crate::models::{OpeningHour, Service, Staff, TimeSlot};
use crate::services::booking;
use crate::services::notifications::{self, Notice};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn map_unique_conflict(e: anyhow::Error, message: &str) -> AppError {
    match e.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(e),
    }
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    pub pending_count: i64,
    pub upcoming_confirmed_count: i64,
    pub active_service_count: i64,
    pub active_staff_count: i64,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let stats = {
        let db = state.db.lock().unwrap();
        queries::get_dashboard_stats(&db, &now)?
    };

    Ok(Json(StatusResponse {
        pending_count: stats.pending_count,
        upcoming_confirmed_count: stats.upcoming_confirmed_count,
        active_service_count: stats.active_service_count,
        active_staff_count: stats.active_staff_count,
    }))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AdminBookingResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub customer_id: Option<String>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<AdminBookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(&db, query.status.as_deref(), limit)?
    };

    let response = bookings
        .into_iter()
        .map(|b| AdminBookingResponse {
            customer_id: b.customer_id.clone(),
            guest_email: b.guest_email.clone(),
            guest_name: b.guest_name.clone(),
            booking: b.into(),
        })
        .collect();

    Ok(Json(response))
}

// POST /api/admin/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = Utc::now().naive_utc();

    let (booking, ctx) = {
        let db = state.db.lock().unwrap();
        let confirmed = booking::confirm(&db, &id, now)?;
        let ctx = notifications::load_context(&db, &confirmed)?;
        (confirmed, ctx)
    };

    let outcome = notifications::dispatch(
        state.email.as_ref(),
        state.sms.as_ref(),
        &ctx,
        Notice::Confirmation,
    )
    .await;
    tracing::info!(booking = %booking.id, email = outcome.email_sent, sms = outcome.sms_sent,
        "confirmation notification dispatched");

    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = Utc::now().naive_utc();

    let (booking, ctx) = {
        let db = state.db.lock().unwrap();
        let canceled = booking::cancel(&db, &id, now)?;
        let ctx = notifications::load_context(&db, &canceled)?;
        (canceled, ctx)
    };

    let outcome = notifications::dispatch(
        state.email.as_ref(),
        state.sms.as_ref(),
        &ctx,
        Notice::Cancellation,
    )
    .await;
    tracing::info!(booking = %booking.id, email = outcome.email_sent, sms = outcome.sms_sent,
        "cancellation notification dispatched");

    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();
    let booking = booking::mark_completed(&db, &id, now)?;
    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/no-show
pub async fn no_show_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();
    let booking = booking::mark_no_show(&db, &id, now)?;
    Ok(Json(booking.into()))
}

// POST /api/admin/services
#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

fn validate_service_fields(duration_minutes: i32, price: Decimal) -> Result<(), AppError> {
    if duration_minutes <= 0 {
        return Err(AppError::Validation {
            field: "duration_minutes",
            message: "duration must be a positive number of minutes".to_string(),
        });
    }
    if price.is_sign_negative() {
        return Err(AppError::Validation {
            field: "price",
            message: "price cannot be negative".to_string(),
        });
    }
    Ok(())
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    validate_service_fields(body.duration_minutes, body.price)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation {
            field: "name",
            message: "name is required".to_string(),
        });
    }

    let now = Utc::now().naive_utc();
    let service = Service {
        id: Uuid::new_v4().to_string(),
        slug: body
            .slug
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&body.name)),
        name: body.name,
        description: body.description.unwrap_or_default(),
        duration_minutes: body.duration_minutes,
        price: body.price,
        is_active: body.is_active.unwrap_or(true),
        display_order: body.display_order.unwrap_or(0),
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        queries::create_service(&db, &service)
            .map_err(|e| map_unique_conflict(e, "a service with this slug already exists"))?;
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": service.id, "slug": service.slug })),
    ))
}

// PUT /api/admin/services/:id
#[derive(Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let mut service = queries::get_service_by_id(&db, &id)?
        .ok_or_else(|| AppError::NotFound("service".to_string()))?;

    if let Some(name) = body.name {
        service.name = name;
    }
    if let Some(description) = body.description {
        service.description = description;
    }
    if let Some(duration) = body.duration_minutes {
        service.duration_minutes = duration;
    }
    if let Some(price) = body.price {
        service.price = price;
    }
    if let Some(active) = body.is_active {
        service.is_active = active;
    }
    if let Some(order) = body.display_order {
        service.display_order = order;
    }
    validate_service_fields(service.duration_minutes, service.price)?;
    service.updated_at = Utc::now().naive_utc();

    queries::update_service(&db, &service)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// DELETE /api/admin/services/:id
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    match queries::delete_service(&db, &id) {
        Ok(true) => Ok(Json(serde_json::json!({ "ok": true }))),
        Ok(false) => Err(AppError::NotFound("service".to_string())),
        Err(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(AppError::Conflict(
                "service is referenced by bookings and cannot be deleted".to_string(),
            ))
        }
        Err(e) => Err(AppError::Database(e.into())),
    }
}

// POST /api/admin/staff
#[derive(Deserialize)]
pub struct CreateStaffRequest {
    pub first_name: String,
    pub last_name: String,
    pub slug: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
    pub service_ids: Option<Vec<String>>,
}

pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return Err(AppError::Validation {
            field: "first_name",
            message: "first and last name are required".to_string(),
        });
    }

    let now = Utc::now().naive_utc();
    let staff = Staff {
        id: Uuid::new_v4().to_string(),
        slug: body
            .slug
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&format!("{} {}", body.first_name, body.last_name))),
        first_name: body.first_name,
        last_name: body.last_name,
        bio: body.bio.unwrap_or_default(),
        email: body.email.filter(|e| !e.is_empty()),
        phone: body.phone.filter(|p| !p.is_empty()),
        is_active: body.is_active.unwrap_or(true),
        display_order: body.display_order.unwrap_or(0),
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        queries::create_staff(&db, &staff)
            .map_err(|e| map_unique_conflict(e, "a staff member with this slug already exists"))?;
        if let Some(service_ids) = &body.service_ids {
            assign_services(&db, &staff.id, service_ids)?;
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": staff.id, "slug": staff.slug })),
    ))
}

// PUT /api/admin/staff/:id
#[derive(Deserialize)]
pub struct UpdateStaffRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

pub async fn update_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateStaffRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let mut staff = queries::get_staff_by_id(&db, &id)?
        .ok_or_else(|| AppError::NotFound("staff member".to_string()))?;

    if let Some(first_name) = body.first_name {
        staff.first_name = first_name;
    }
    if let Some(last_name) = body.last_name {
        staff.last_name = last_name;
    }
    if let Some(bio) = body.bio {
        staff.bio = bio;
    }
    if let Some(email) = body.email {
        staff.email = if email.is_empty() { None } else { Some(email) };
    }
    if let Some(phone) = body.phone {
        staff.phone = if phone.is_empty() { None } else { Some(phone) };
    }
    if let Some(active) = body.is_active {
        staff.is_active = active;
    }
    if let Some(order) = body.display_order {
        staff.display_order = order;
    }
    staff.updated_at = Utc::now().naive_utc();

    queries::update_staff(&db, &staff)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// PUT /api/admin/staff/:id/services
#[derive(Deserialize)]
pub struct StaffServicesRequest {
    pub service_ids: Vec<String>,
}

fn assign_services(
    db: &rusqlite::Connection,
    staff_id: &str,
    service_ids: &[String],
) -> Result<(), AppError> {
    for service_id in service_ids {
        if queries::get_service_by_id(db, service_id)?.is_none() {
            return Err(AppError::NotFound(format!("service {service_id}")));
        }
    }
    queries::set_staff_services(db, staff_id, service_ids)?;
    Ok(())
}

pub async fn set_staff_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StaffServicesRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    if queries::get_staff_by_id(&db, &id)?.is_none() {
        return Err(AppError::NotFound("staff member".to_string()));
    }
    assign_services(&db, &id, &body.service_ids)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// POST /api/admin/slots
#[derive(Deserialize)]
pub struct CreateSlotRequest {
    pub staff_id: String,
    pub start_time: String,
    pub end_time: String,
    pub capacity: Option<i32>,
}

fn parse_slot_time(s: &str, field: &'static str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| AppError::Validation {
            field,
            message: format!("invalid datetime: {s} (expected YYYY-MM-DD HH:MM)"),
        })
}

pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let start_time = parse_slot_time(&body.start_time, "start_time")?;
    let end_time = parse_slot_time(&body.end_time, "end_time")?;
    if end_time <= start_time {
        return Err(AppError::Validation {
            field: "end_time",
            message: "end time must be after start time".to_string(),
        });
    }
    let capacity = body.capacity.unwrap_or(1);
    if capacity < 1 {
        return Err(AppError::Validation {
            field: "capacity",
            message: "capacity must be at least 1".to_string(),
        });
    }

    let slot = TimeSlot {
        id: Uuid::new_v4().to_string(),
        staff_id: body.staff_id,
        start_time,
        end_time,
        capacity,
        is_blocked: false,
        created_at: Utc::now().naive_utc(),
    };

    {
        let db = state.db.lock().unwrap();
        if queries::get_staff_by_id(&db, &slot.staff_id)?.is_none() {
            return Err(AppError::NotFound("staff member".to_string()));
        }
        match queries::create_time_slot(&db, &slot) {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(f, _))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(AppError::Conflict(
                    "staff member already has a slot starting at this time".to_string(),
                ))
            }
            Err(e) => return Err(AppError::Database(e.into())),
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": slot.id })),
    ))
}

// POST /api/admin/slots/:id/block | /unblock
pub async fn block_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    set_blocked(&state, &id, true)
}

pub async fn unblock_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    set_blocked(&state, &id, false)
}

fn set_blocked(state: &AppState, id: &str, blocked: bool) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.db.lock().unwrap();
    if !queries::set_slot_blocked(&db, id, blocked)? {
        return Err(AppError::NotFound("time slot".to_string()));
    }
    Ok(Json(serde_json::json!({ "ok": true, "is_blocked": blocked })))
}

// PUT /api/admin/opening-hours
#[derive(Deserialize)]
pub struct OpeningHoursRequest {
    pub hours: Vec<OpeningHour>,
}

pub async fn set_opening_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OpeningHoursRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    for hour in &body.hours {
        hour.validate().map_err(|e| AppError::Validation {
            field: "hours",
            message: e.to_string(),
        })?;
    }

    let db = state.db.lock().unwrap();
    for hour in &body.hours {
        queries::upsert_opening_hour(&db, hour)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// POST /api/admin/reminders/run
//
// Invoked by an external scheduler. Finds confirmed bookings starting
// within the reminder horizon whose reminder has not gone out, dispatches
// each reminder, and marks the booking so the next run skips it.
#[derive(Serialize)]
pub struct RemindersResponse {
    pub processed: usize,
    pub delivered: usize,
}

pub async fn run_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RemindersResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = Utc::now().naive_utc();

    let due = {
        let db = state.db.lock().unwrap();
        queries::reminders_due(&db, &now, state.config.reminder_horizon_hours)?
    };

    let mut delivered = 0;
    let processed = due.len();
    for booking in due {
        let ctx = {
            let db = state.db.lock().unwrap();
            notifications::load_context(&db, &booking)?
        };
        let outcome = notifications::dispatch(
            state.email.as_ref(),
            state.sms.as_ref(),
            &ctx,
            Notice::Reminder,
        )
        .await;
        if outcome.delivered() {
            delivered += 1;
        }
        let db = state.db.lock().unwrap();
        queries::mark_reminder_sent(&db, &booking.id, &now)?;
    }

    Ok(Json(RemindersResponse {
        processed,
        delivered,
    }))
}
