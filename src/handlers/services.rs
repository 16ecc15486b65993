use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Service;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ServiceResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub display_order: i32,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        Self {
            id: s.id,
            name: s.name,
            slug: s.slug,
            description: s.description,
            duration_minutes: s.duration_minutes,
            price: s.price,
            display_order: s.display_order,
        }
    }
}

// GET /api/services
#[derive(Deserialize)]
pub struct ServicesQuery {
    pub staff_id: Option<String>,
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServicesQuery>,
) -> Result<Json<Vec<ServiceResponse>>, AppError> {
    let services = {
        let db = state.db.lock().unwrap();
        queries::list_services(&db, query.staff_id.as_deref())?
    };
    Ok(Json(services.into_iter().map(Into::into).collect()))
}

// GET /api/services/:slug
#[derive(Serialize)]
pub struct ServiceDetailResponse {
    #[serde(flatten)]
    pub service: ServiceResponse,
    pub staff: Vec<StaffSummary>,
}

#[derive(Serialize)]
pub struct StaffSummary {
    pub id: String,
    pub slug: String,
    pub full_name: String,
}

pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ServiceDetailResponse>, AppError> {
    let db = state.db.lock().unwrap();
    let service = queries::get_service_by_slug(&db, &slug)?
        .ok_or_else(|| AppError::NotFound("service".to_string()))?;

    let staff = queries::list_staff(&db, Some(&service.id))?
        .into_iter()
        .map(|s| StaffSummary {
            id: s.id.clone(),
            slug: s.slug.clone(),
            full_name: s.full_name(),
        })
        .collect();

    Ok(Json(ServiceDetailResponse {
        service: service.into(),
        staff,
    }))
}
