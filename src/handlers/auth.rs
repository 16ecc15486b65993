use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::customer::valid_email;
use crate::models::Customer;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolves the session token to a customer, or fails with 401.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Customer, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let now = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();
    queries::session_customer(&db, &token, &now)?.ok_or(AppError::Unauthorized)
}

/// No token means anonymous; a token that resolves to nothing is rejected
/// rather than silently downgraded to a guest.
pub fn maybe_authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Customer>, AppError> {
    match bearer_token(headers) {
        None => Ok(None),
        Some(token) => {
            let now = Utc::now().naive_utc();
            let db = state.db.lock().unwrap();
            queries::session_customer(&db, &token, &now)?
                .map(Some)
                .ok_or(AppError::Unauthorized)
        }
    }
}

fn issue_session(state: &AppState, customer_id: &str) -> Result<String, AppError> {
    let now = Utc::now().naive_utc();
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = now + Duration::hours(state.config.session_ttl_hours);
    let db = state.db.lock().unwrap();
    queries::create_session(&db, &token, customer_id, &expires_at, &now)?;
    Ok(token)
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub sms_notifications: bool,
    pub email_notifications: bool,
}

impl From<&Customer> for ProfileResponse {
    fn from(c: &Customer) -> Self {
        Self {
            id: c.id.clone(),
            email: c.email.clone(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            phone: c.phone.clone(),
            email_verified: c.email_verified,
            phone_verified: c.phone_verified,
            sms_notifications: c.sms_notifications,
            email_notifications: c.email_notifications,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub customer: ProfileResponse,
}

// POST /api/auth/register
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(AppError::Validation {
            field: "email",
            message: "a valid email address is required".to_string(),
        });
    }
    if body.password.len() < 8 {
        return Err(AppError::Validation {
            field: "password",
            message: "password must be at least 8 characters".to_string(),
        });
    }

    let password_hash =
        bcrypt::hash(&body.password, bcrypt::DEFAULT_COST).map_err(anyhow::Error::from)?;

    let now = Utc::now().naive_utc();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        email: email.clone(),
        password_hash,
        first_name: body.first_name.unwrap_or_default(),
        last_name: body.last_name.unwrap_or_default(),
        phone: body.phone.filter(|p| !p.is_empty()),
        email_verified: false,
        phone_verified: false,
        sms_notifications: true,
        email_notifications: true,
        created_at: now,
        updated_at: now,
    };
    let verify_token = Uuid::new_v4().simple().to_string();

    {
        let db = state.db.lock().unwrap();
        if queries::get_customer_by_email(&db, &email)?.is_some() {
            return Err(AppError::Conflict(
                "an account with this email already exists".to_string(),
            ));
        }
        queries::create_customer(&db, &customer, &verify_token)?;
    }

    let token = issue_session(&state, &customer.id)?;

    // Verification email is best-effort; registration already succeeded.
    let link = format!(
        "{}/api/auth/verify-email?token={verify_token}",
        state.config.base_url
    );
    if let Err(e) = state
        .email
        .send_email(
            &customer.email,
            "Verify your email",
            &format!("Welcome! Please verify your email address:\n\n{link}\n"),
        )
        .await
    {
        tracing::warn!(to = %customer.email, error = %e, "failed to send verification email");
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            customer: ProfileResponse::from(&customer),
        }),
    ))
}

// POST /api/auth/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = body.email.trim().to_lowercase();
    let customer = {
        let db = state.db.lock().unwrap();
        queries::get_customer_by_email(&db, &email)?
    }
    .ok_or(AppError::Unauthorized)?;

    let matches =
        bcrypt::verify(&body.password, &customer.password_hash).map_err(anyhow::Error::from)?;
    if !matches {
        return Err(AppError::Unauthorized);
    }

    let token = issue_session(&state, &customer.id)?;
    Ok(Json(AuthResponse {
        token,
        customer: ProfileResponse::from(&customer),
    }))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let db = state.db.lock().unwrap();
    queries::delete_session(&db, &token)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// GET /api/auth/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, AppError> {
    let customer = authenticate(&state, &headers)?;
    Ok(Json(ProfileResponse::from(&customer)))
}

// PUT /api/auth/profile
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub sms_notifications: Option<bool>,
    pub email_notifications: Option<bool>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut customer = authenticate(&state, &headers)?;

    if let Some(first_name) = body.first_name {
        customer.first_name = first_name;
    }
    if let Some(last_name) = body.last_name {
        customer.last_name = last_name;
    }
    if let Some(phone) = body.phone {
        // A changed number needs a fresh OTP round.
        if customer.phone.as_deref() != Some(phone.as_str()) {
            customer.phone_verified = false;
        }
        customer.phone = if phone.is_empty() { None } else { Some(phone) };
    }
    if let Some(sms) = body.sms_notifications {
        customer.sms_notifications = sms;
    }
    if let Some(email) = body.email_notifications {
        customer.email_notifications = email;
    }
    customer.updated_at = Utc::now().naive_utc();

    {
        let db = state.db.lock().unwrap();
        queries::update_customer_profile(&db, &customer)?;
    }
    Ok(Json(ProfileResponse::from(&customer)))
}

// GET /api/auth/verify-email?token=...
#[derive(Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = Utc::now().naive_utc();
    let verified = {
        let db = state.db.lock().unwrap();
        queries::verify_email_token(&db, &query.token, &now)?
    };
    if !verified {
        return Err(AppError::NotFound(
            "invalid or already used verification token".to_string(),
        ));
    }
    Ok(Json(serde_json::json!({ "verified": true })))
}

// POST /api/auth/verify-phone
#[derive(Deserialize)]
pub struct VerifyPhoneRequest {
    pub phone: String,
}

pub async fn verify_phone(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyPhoneRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let customer = authenticate(&state, &headers)?;

    let phone = body.phone.trim().to_string();
    if phone.len() < 7 || !phone.starts_with('+') {
        return Err(AppError::Validation {
            field: "phone",
            message: "phone number must be in international format".to_string(),
        });
    }

    let now = Utc::now().naive_utc();
    let verification = {
        let db = state.db.lock().unwrap();
        crate::services::verification::start_phone_verification(&db, &customer.id, &phone, now)?
    };

    let message = format!(
        "Your verification code is: {}\n\nThis code expires in {} minutes.",
        verification.otp_code,
        crate::services::verification::OTP_TTL_MINUTES
    );
    if let Err(e) = state.sms.send_sms(&phone, &message).await {
        tracing::warn!(to = %phone, error = %e, "failed to send OTP SMS");
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

// POST /api/auth/verify-otp
#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let customer = authenticate(&state, &headers)?;
    let now = Utc::now().naive_utc();

    let verified = {
        let db = state.db.lock().unwrap();
        crate::services::verification::verify_phone_otp(&db, &customer.id, &body.code, now)?
    };
    if !verified {
        return Err(AppError::Validation {
            field: "code",
            message: "invalid or expired verification code".to_string(),
        });
    }
    Ok(Json(serde_json::json!({ "verified": true })))
}
