use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::OpeningHour;
use crate::services::availability::{self, DaySchedule};
use crate::state::AppState;

// GET /api/slots?staff_id&start_date&end_date
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub staff_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub days: Vec<DaySchedule>,
}

fn parse_date(s: &str, field: &'static str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::Validation {
        field,
        message: format!("invalid date: {s} (expected YYYY-MM-DD)"),
    })
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let now = Utc::now().naive_utc();

    let from = match &query.start_date {
        Some(s) => parse_date(s, "start_date")?
            .and_hms_opt(0, 0, 0)
            .unwrap_or(now),
        None => now,
    };
    let to = match &query.end_date {
        Some(s) => parse_date(s, "end_date")?
            .and_hms_opt(23, 59, 59)
            .unwrap_or(now),
        None => now + Duration::days(state.config.booking_window_days),
    };

    let openings = {
        let db = state.db.lock().unwrap();
        availability::available_openings(&db, query.staff_id.as_deref(), &from, &to, now)?
    };

    Ok(Json(SlotsResponse {
        days: availability::group_by_date(openings),
    }))
}

// GET /api/opening-hours
pub async fn opening_hours(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OpeningHour>>, AppError> {
    let hours = {
        let db = state.db.lock().unwrap();
        queries::list_opening_hours(&db)?
    };
    Ok(Json(hours))
}
