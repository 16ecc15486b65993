use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::models::PhoneVerification;

pub const OTP_TTL_MINUTES: i64 = 10;

fn generate_otp_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// Creates a fresh OTP challenge for the phone number. The caller sends
/// the code via SMS after the store write.
pub fn start_phone_verification(
    conn: &Connection,
    customer_id: &str,
    phone: &str,
    now: NaiveDateTime,
) -> anyhow::Result<PhoneVerification> {
    let verification = PhoneVerification {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        phone: phone.to_string(),
        otp_code: generate_otp_code(),
        is_verified: false,
        attempts: 0,
        expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        created_at: now,
    };
    queries::create_phone_verification(conn, &verification)?;
    Ok(verification)
}

/// Checks the submitted code against the customer's most recent pending
/// challenge. Every call counts as an attempt; a matching code on a
/// still-valid challenge marks both the challenge and the customer's
/// phone as verified.
pub fn verify_phone_otp(
    conn: &Connection,
    customer_id: &str,
    code: &str,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let Some(mut verification) = queries::latest_pending_verification(conn, customer_id)? else {
        return Ok(false);
    };

    queries::increment_otp_attempts(conn, &verification.id)?;
    verification.attempts += 1;

    if verification.is_valid(now) && verification.otp_code == code {
        queries::mark_otp_verified(conn, &verification.id)?;
        queries::set_phone_verified(conn, customer_id, &verification.phone, &now)?;
        return Ok(true);
    }

    Ok(false)
}
