use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::services::ServiceResponse;
use crate::models::Staff;
use crate::services::availability::{self, DaySchedule};
use crate::state::AppState;

#[derive(Serialize)]
pub struct StaffResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub slug: String,
    pub bio: String,
    pub display_order: i32,
}

impl From<Staff> for StaffResponse {
    fn from(s: Staff) -> Self {
        let full_name = s.full_name();
        Self {
            id: s.id,
            first_name: s.first_name,
            last_name: s.last_name,
            full_name,
            slug: s.slug,
            bio: s.bio,
            display_order: s.display_order,
        }
    }
}

// GET /api/staff
#[derive(Deserialize)]
pub struct StaffQuery {
    pub service_id: Option<String>,
}

pub async fn list_staff(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaffQuery>,
) -> Result<Json<Vec<StaffResponse>>, AppError> {
    let staff = {
        let db = state.db.lock().unwrap();
        queries::list_staff(&db, query.service_id.as_deref())?
    };
    Ok(Json(staff.into_iter().map(Into::into).collect()))
}

// GET /api/staff/:slug
#[derive(Serialize)]
pub struct StaffDetailResponse {
    #[serde(flatten)]
    pub staff: StaffResponse,
    pub services: Vec<ServiceResponse>,
}

pub async fn get_staff(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<StaffDetailResponse>, AppError> {
    let db = state.db.lock().unwrap();
    let staff = queries::get_staff_by_slug(&db, &slug)?
        .ok_or_else(|| AppError::NotFound("staff member".to_string()))?;

    let services = queries::services_for_staff(&db, &staff.id)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(StaffDetailResponse {
        staff: staff.into(),
        services,
    }))
}

// GET /api/staff/:slug/slots?days=N
#[derive(Deserialize)]
pub struct StaffSlotsQuery {
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct StaffSlotsResponse {
    pub staff_id: String,
    pub staff_name: String,
    pub days: Vec<DaySchedule>,
}

pub async fn staff_slots(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<StaffSlotsQuery>,
) -> Result<Json<StaffSlotsResponse>, AppError> {
    let days_ahead = query
        .days
        .unwrap_or(state.config.booking_window_days)
        .clamp(1, 90);
    let now = Utc::now().naive_utc();
    let until = now + Duration::days(days_ahead);

    let db = state.db.lock().unwrap();
    let staff = queries::get_staff_by_slug(&db, &slug)?
        .ok_or_else(|| AppError::NotFound("staff member".to_string()))?;

    let openings = availability::available_openings(&db, Some(&staff.id), &now, &until, now)?;

    Ok(Json(StaffSlotsResponse {
        staff_id: staff.id.clone(),
        staff_name: staff.full_name(),
        days: availability::group_by_date(openings),
    }))
}
