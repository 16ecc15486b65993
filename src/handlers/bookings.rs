use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth;
use crate::models::{Booking, BookingParty};
use crate::services::booking::{self, BookingRequest};
use crate::services::notifications::{self, Notice};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub service_id: String,
    pub staff_id: String,
    pub time_slot_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: String,
    pub notes: Option<String>,
    pub price: Decimal,
    pub confirmation_code: String,
    pub confirmed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            service_id: b.service_id,
            staff_id: b.staff_id,
            time_slot_id: b.time_slot_id,
            start_time: b.start_time,
            end_time: b.end_time,
            status: b.status.as_str().to_string(),
            notes: b.notes,
            price: b.price,
            confirmation_code: b.confirmation_code,
            confirmed_at: b.confirmed_at,
            created_at: b.created_at,
        }
    }
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: String,
    pub staff_id: String,
    pub time_slot_id: String,
    pub notes: Option<String>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let party = match auth::maybe_authenticate(&state, &headers)? {
        Some(customer) => BookingParty::Registered(customer),
        None => match body.guest_email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => BookingParty::Guest {
                email: email.to_string(),
                name: body.guest_name.clone().filter(|n| !n.is_empty()),
                phone: body.guest_phone.clone().filter(|p| !p.is_empty()),
            },
            _ => {
                return Err(AppError::Validation {
                    field: "guest_email",
                    message: "guest email is required when not signed in".to_string(),
                })
            }
        },
    };

    let request = BookingRequest {
        party,
        service_id: body.service_id,
        staff_id: body.staff_id,
        time_slot_id: body.time_slot_id,
        notes: body.notes.filter(|n| !n.is_empty()),
    };

    let now = Utc::now().naive_utc();
    let booking = {
        let mut db = state.db.lock().unwrap();
        booking::create_booking(&mut db, &request, now)?
    };

    Ok((StatusCode::CREATED, Json(booking.into())))
}

// GET /api/bookings
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let customer = auth::authenticate(&state, &headers)?;
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::bookings_for_customer(&db, &customer.id)?
    };
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/:code
//
// Possession of the confirmation code is what authorizes self-service
// lookup, for guests and registered customers alike.
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_code(&db, &code)?
    }
    .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:code/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let now = Utc::now().naive_utc();

    let (booking, ctx) = {
        let db = state.db.lock().unwrap();
        let existing = queries::get_booking_by_code(&db, &code)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
        let confirmed = booking::confirm(&db, &existing.id, now)?;
        let ctx = notifications::load_context(&db, &confirmed)?;
        (confirmed, ctx)
    };

    // Dispatch strictly after the store work; failure never reverts the
    // status change.
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

// POST /api/bookings/:code/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let now = Utc::now().naive_utc();

    let (booking, ctx) = {
        let db = state.db.lock().unwrap();
        let existing = queries::get_booking_by_code(&db, &code)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
        let canceled = booking::cancel(&db, &existing.id, now)?;
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
