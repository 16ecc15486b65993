use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::models::customer::valid_email;
use crate::models::{Booking, BookingParty, BookingStatus};
use crate::services::availability;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    State(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct BookingRequest {
    pub party: BookingParty,
    pub service_id: String,
    pub staff_id: String,
    pub time_slot_id: String,
    pub notes: Option<String>,
}

const CODE_RETRY_LIMIT: u32 = 5;

fn generate_confirmation_code() -> String {
    Uuid::new_v4().simple().to_string()
}

fn is_code_collision(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, Some(msg))
        if f.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("confirmation_code"))
}

/// Creates a booking in `pending` state.
///
/// The availability check, the overlap check and the insert run in a single
/// immediate transaction; combined with the shared connection this is the
/// critical section that keeps two racing callers from double-booking the
/// same staff member.
pub fn create_booking(
    conn: &mut Connection,
    req: &BookingRequest,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    if let BookingParty::Guest { email, .. } = &req.party {
        if !valid_email(email) {
            return Err(BookingError::Validation {
                field: "guest_email",
                message: "a valid guest email address is required".to_string(),
            });
        }
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(anyhow::Error::from)?;

    let service = queries::get_service_by_id(&tx, &req.service_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| BookingError::NotFound("service".to_string()))?;
    let staff = queries::get_staff_by_id(&tx, &req.staff_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| BookingError::NotFound("staff member".to_string()))?;
    let slot = queries::get_time_slot(&tx, &req.time_slot_id)?
        .ok_or_else(|| BookingError::NotFound("time slot".to_string()))?;

    if !queries::staff_offers_service(&tx, &staff.id, &service.id)? {
        return Err(BookingError::Conflict(format!(
            "{} does not provide {}",
            staff.full_name(),
            service.name
        )));
    }

    if slot.staff_id != staff.id {
        return Err(BookingError::Conflict(
            "time slot does not belong to the selected staff member".to_string(),
        ));
    }

    if !availability::is_available(&tx, &slot, now)? {
        return Err(BookingError::Conflict(
            "this time slot is not available".to_string(),
        ));
    }

    let start_time = slot.start_time;
    let end_time = start_time + Duration::minutes(service.duration_minutes as i64);

    if queries::overlapping_active_count(&tx, &staff.id, &start_time, &end_time)? > 0 {
        return Err(BookingError::Conflict(
            "the staff member already has a booking in this time range".to_string(),
        ));
    }

    let (customer_id, guest_email, guest_name, guest_phone) = match &req.party {
        BookingParty::Registered(customer) => (Some(customer.id.clone()), None, None, None),
        BookingParty::Guest { email, name, phone } => {
            (None, Some(email.clone()), name.clone(), phone.clone())
        }
    };

    let mut booking = Booking {
        id: Uuid::new_v4().to_string(),
        customer_id,
        guest_email,
        guest_name,
        guest_phone,
        service_id: service.id.clone(),
        staff_id: staff.id.clone(),
        time_slot_id: slot.id.clone(),
        start_time,
        end_time,
        status: BookingStatus::Pending,
        notes: req.notes.clone(),
        price: service.price,
        confirmation_code: generate_confirmation_code(),
        confirmed_at: None,
        reminder_sent: false,
        created_at: now,
        updated_at: now,
    };

    // Confirmation-code collisions are retried transparently with a fresh
    // code; any other constraint failure propagates.
    let mut attempts = 0;
    loop {
        match queries::insert_booking(&tx, &booking) {
            Ok(()) => break,
            Err(e) if is_code_collision(&e) && attempts + 1 < CODE_RETRY_LIMIT => {
                attempts += 1;
                booking.confirmation_code = generate_confirmation_code();
            }
            Err(e) => return Err(BookingError::Store(e.into())),
        }
    }

    tx.commit().map_err(anyhow::Error::from)?;
    tracing::info!(booking = %booking.id, party = %req.party.email(), "booking created");
    Ok(booking)
}

/// Transitions `pending` -> `confirmed` and stamps `confirmed_at`.
/// Confirming an already-confirmed booking is an error, not a no-op.
/// The caller dispatches the confirmation notification after this returns.
pub fn confirm(
    conn: &Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    let mut booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| BookingError::NotFound("booking".to_string()))?;

    match booking.status {
        BookingStatus::Pending => {}
        BookingStatus::Confirmed => {
            return Err(BookingError::State(
                "booking is already confirmed".to_string(),
            ))
        }
        other => {
            return Err(BookingError::State(format!(
                "cannot confirm a {} booking",
                other.as_str()
            )))
        }
    }

    queries::set_booking_status(conn, booking_id, BookingStatus::Confirmed, Some(&now), &now)?;
    booking.status = BookingStatus::Confirmed;
    booking.confirmed_at = Some(now);
    booking.updated_at = now;
    Ok(booking)
}

/// Transitions `pending`/`confirmed` -> `canceled`. Terminal bookings
/// cannot be canceled again. The caller dispatches the cancellation
/// notification after this returns.
pub fn cancel(
    conn: &Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    let mut booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| BookingError::NotFound("booking".to_string()))?;

    if !booking.status.is_active() {
        return Err(BookingError::State(format!(
            "cannot cancel a {} booking",
            booking.status.as_str()
        )));
    }

    queries::set_booking_status(conn, booking_id, BookingStatus::Canceled, None, &now)?;
    booking.status = BookingStatus::Canceled;
    booking.updated_at = now;
    Ok(booking)
}

/// Admin transition `confirmed` -> `completed`.
pub fn mark_completed(
    conn: &Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    terminal_transition(conn, booking_id, BookingStatus::Completed, now)
}

/// Admin transition `confirmed` -> `no_show`.
pub fn mark_no_show(
    conn: &Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    terminal_transition(conn, booking_id, BookingStatus::NoShow, now)
}

fn terminal_transition(
    conn: &Connection,
    booking_id: &str,
    target: BookingStatus,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    let mut booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| BookingError::NotFound("booking".to_string()))?;

    if booking.status != BookingStatus::Confirmed {
        return Err(BookingError::State(format!(
            "cannot mark a {} booking as {}",
            booking.status.as_str(),
            target.as_str()
        )));
    }

    queries::set_booking_status(conn, booking_id, target, None, &now)?;
    booking.status = target;
    booking.updated_at = now;
    Ok(booking)
}
