use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingStatus, Customer, OpeningHour, PhoneVerification, Service, Staff, TimeSlot,
};

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn parse_price(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

// ── Customers ──

pub fn create_customer(
    conn: &Connection,
    customer: &Customer,
    email_verify_token: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO customers (id, email, password_hash, first_name, last_name, phone,
             email_verified, phone_verified, sms_notifications, email_notifications,
             email_verify_token, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            customer.id,
            customer.email,
            customer.password_hash,
            customer.first_name,
            customer.last_name,
            customer.phone,
            customer.email_verified as i32,
            customer.phone_verified as i32,
            customer.sms_notifications as i32,
            customer.email_notifications as i32,
            email_verify_token,
            fmt_dt(&customer.created_at),
            fmt_dt(&customer.updated_at),
        ],
    )?;
    Ok(())
}

const CUSTOMER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, \
     email_verified, phone_verified, sms_notifications, email_notifications, created_at, updated_at";

fn parse_customer_row(row: &rusqlite::Row) -> anyhow::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        email_verified: row.get::<_, i32>(6)? != 0,
        phone_verified: row.get::<_, i32>(7)? != 0,
        sms_notifications: row.get::<_, i32>(8)? != 0,
        email_notifications: row.get::<_, i32>(9)? != 0,
        created_at: parse_dt(&row.get::<_, String>(10)?),
        updated_at: parse_dt(&row.get::<_, String>(11)?),
    })
}

pub fn get_customer_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<Customer>> {
    let result = conn.query_row(
        &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = ?1"),
        params![email],
        |row| Ok(parse_customer_row(row)),
    );

    match result {
        Ok(customer) => Ok(Some(customer?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_customer_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Customer>> {
    let result = conn.query_row(
        &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"),
        params![id],
        |row| Ok(parse_customer_row(row)),
    );

    match result {
        Ok(customer) => Ok(Some(customer?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_customer_profile(conn: &Connection, customer: &Customer) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE customers SET first_name = ?1, last_name = ?2, phone = ?3,
             sms_notifications = ?4, email_notifications = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            customer.first_name,
            customer.last_name,
            customer.phone,
            customer.sms_notifications as i32,
            customer.email_notifications as i32,
            fmt_dt(&customer.updated_at),
            customer.id,
        ],
    )?;
    Ok(())
}

/// Consumes an email-verification token. Returns false when no customer
/// holds the token.
pub fn verify_email_token(
    conn: &Connection,
    token: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE customers SET email_verified = 1, email_verify_token = NULL, updated_at = ?1
         WHERE email_verify_token = ?2",
        params![fmt_dt(now), token],
    )?;
    Ok(count > 0)
}

pub fn set_phone_verified(
    conn: &Connection,
    customer_id: &str,
    phone: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE customers SET phone = ?1, phone_verified = 1, updated_at = ?2 WHERE id = ?3",
        params![phone, fmt_dt(now), customer_id],
    )?;
    Ok(())
}

// ── Sessions ──

pub fn create_session(
    conn: &Connection,
    token: &str,
    customer_id: &str,
    expires_at: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, customer_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, customer_id, fmt_dt(expires_at), fmt_dt(now)],
    )?;
    Ok(())
}

pub fn session_customer(
    conn: &Connection,
    token: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<Customer>> {
    let result = conn.query_row(
        "SELECT c.id, c.email, c.password_hash, c.first_name, c.last_name, c.phone,
             c.email_verified, c.phone_verified, c.sms_notifications, c.email_notifications,
             c.created_at, c.updated_at
         FROM customers c
         JOIN sessions s ON s.customer_id = c.id
         WHERE s.token = ?1 AND s.expires_at > ?2",
        params![token, fmt_dt(now)],
        |row| Ok(parse_customer_row(row)),
    );

    match result {
        Ok(customer) => Ok(Some(customer?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(count > 0)
}

// ── Phone verifications ──

pub fn create_phone_verification(
    conn: &Connection,
    verification: &PhoneVerification,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO phone_verifications
             (id, customer_id, phone, otp_code, is_verified, attempts, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            verification.id,
            verification.customer_id,
            verification.phone,
            verification.otp_code,
            verification.is_verified as i32,
            verification.attempts,
            fmt_dt(&verification.expires_at),
            fmt_dt(&verification.created_at),
        ],
    )?;
    Ok(())
}

pub fn latest_pending_verification(
    conn: &Connection,
    customer_id: &str,
) -> anyhow::Result<Option<PhoneVerification>> {
    let result = conn.query_row(
        "SELECT id, customer_id, phone, otp_code, is_verified, attempts, expires_at, created_at
         FROM phone_verifications
         WHERE customer_id = ?1 AND is_verified = 0
         ORDER BY created_at DESC LIMIT 1",
        params![customer_id],
        |row| {
            Ok(PhoneVerification {
                id: row.get(0)?,
                customer_id: row.get(1)?,
                phone: row.get(2)?,
                otp_code: row.get(3)?,
                is_verified: row.get::<_, i32>(4)? != 0,
                attempts: row.get(5)?,
                expires_at: parse_dt(&row.get::<_, String>(6)?),
                created_at: parse_dt(&row.get::<_, String>(7)?),
            })
        },
    );

    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn increment_otp_attempts(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE phone_verifications SET attempts = attempts + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn mark_otp_verified(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE phone_verifications SET is_verified = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// ── Services ──

const SERVICE_COLUMNS: &str = "id, name, slug, description, duration_minutes, price, \
     is_active, display_order, created_at, updated_at";

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        duration_minutes: row.get(4)?,
        price: parse_price(&row.get::<_, String>(5)?),
        is_active: row.get::<_, i32>(6)? != 0,
        display_order: row.get(7)?,
        created_at: parse_dt(&row.get::<_, String>(8)?),
        updated_at: parse_dt(&row.get::<_, String>(9)?),
    })
}

pub fn create_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, slug, description, duration_minutes, price,
             is_active, display_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            service.id,
            service.name,
            service.slug,
            service.description,
            service.duration_minutes,
            service.price.to_string(),
            service.is_active as i32,
            service.display_order,
            fmt_dt(&service.created_at),
            fmt_dt(&service.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_service(conn: &Connection, service: &Service) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET name = ?1, slug = ?2, description = ?3, duration_minutes = ?4,
             price = ?5, is_active = ?6, display_order = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            service.name,
            service.slug,
            service.description,
            service.duration_minutes,
            service.price.to_string(),
            service.is_active as i32,
            service.display_order,
            fmt_dt(&service.updated_at),
            service.id,
        ],
    )?;
    Ok(count > 0)
}

/// Fails with a foreign-key constraint error while bookings reference the
/// service; callers surface that as a conflict.
pub fn delete_service(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM services WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn get_service_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"),
        params![id],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_service_by_slug(conn: &Connection, slug: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE slug = ?1 AND is_active = 1"),
        params![slug],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_services(conn: &Connection, staff_id: Option<&str>) -> anyhow::Result<Vec<Service>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match staff_id {
        Some(staff_id) => (
            format!(
                "SELECT {SERVICE_COLUMNS} FROM services
                 JOIN staff_services ss ON ss.service_id = services.id
                 WHERE services.is_active = 1 AND ss.staff_id = ?1
                 ORDER BY display_order, name"
            ),
            vec![Box::new(staff_id.to_string()) as Box<dyn rusqlite::types::ToSql>],
        ),
        None => (
            format!(
                "SELECT {SERVICE_COLUMNS} FROM services WHERE is_active = 1
                 ORDER BY display_order, name"
            ),
            vec![],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

// ── Staff ──

const STAFF_COLUMNS: &str = "id, first_name, last_name, slug, bio, email, phone, \
     is_active, display_order, created_at, updated_at";

fn parse_staff_row(row: &rusqlite::Row) -> anyhow::Result<Staff> {
    Ok(Staff {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        slug: row.get(3)?,
        bio: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        display_order: row.get(8)?,
        created_at: parse_dt(&row.get::<_, String>(9)?),
        updated_at: parse_dt(&row.get::<_, String>(10)?),
    })
}

pub fn create_staff(conn: &Connection, staff: &Staff) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO staff (id, first_name, last_name, slug, bio, email, phone,
             is_active, display_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            staff.id,
            staff.first_name,
            staff.last_name,
            staff.slug,
            staff.bio,
            staff.email,
            staff.phone,
            staff.is_active as i32,
            staff.display_order,
            fmt_dt(&staff.created_at),
            fmt_dt(&staff.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_staff(conn: &Connection, staff: &Staff) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE staff SET first_name = ?1, last_name = ?2, slug = ?3, bio = ?4, email = ?5,
             phone = ?6, is_active = ?7, display_order = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            staff.first_name,
            staff.last_name,
            staff.slug,
            staff.bio,
            staff.email,
            staff.phone,
            staff.is_active as i32,
            staff.display_order,
            fmt_dt(&staff.updated_at),
            staff.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_staff_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Staff>> {
    let result = conn.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"),
        params![id],
        |row| Ok(parse_staff_row(row)),
    );

    match result {
        Ok(staff) => Ok(Some(staff?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_staff_by_slug(conn: &Connection, slug: &str) -> anyhow::Result<Option<Staff>> {
    let result = conn.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE slug = ?1 AND is_active = 1"),
        params![slug],
        |row| Ok(parse_staff_row(row)),
    );

    match result {
        Ok(staff) => Ok(Some(staff?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_staff(conn: &Connection, service_id: Option<&str>) -> anyhow::Result<Vec<Staff>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match service_id {
        Some(service_id) => (
            format!(
                "SELECT {STAFF_COLUMNS} FROM staff
                 JOIN staff_services ss ON ss.staff_id = staff.id
                 WHERE staff.is_active = 1 AND ss.service_id = ?1
                 ORDER BY display_order, first_name, last_name"
            ),
            vec![Box::new(service_id.to_string()) as Box<dyn rusqlite::types::ToSql>],
        ),
        None => (
            format!(
                "SELECT {STAFF_COLUMNS} FROM staff WHERE is_active = 1
                 ORDER BY display_order, first_name, last_name"
            ),
            vec![],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_staff_row(row)))?;

    let mut staff = vec![];
    for row in rows {
        staff.push(row??);
    }
    Ok(staff)
}

/// Replaces the set of services a staff member offers.
pub fn set_staff_services(
    conn: &Connection,
    staff_id: &str,
    service_ids: &[String],
) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM staff_services WHERE staff_id = ?1",
        params![staff_id],
    )?;
    for service_id in service_ids {
        conn.execute(
            "INSERT INTO staff_services (staff_id, service_id) VALUES (?1, ?2)",
            params![staff_id, service_id],
        )?;
    }
    Ok(())
}

pub fn staff_offers_service(
    conn: &Connection,
    staff_id: &str,
    service_id: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM staff_services WHERE staff_id = ?1 AND service_id = ?2",
        params![staff_id, service_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn services_for_staff(conn: &Connection, staff_id: &str) -> anyhow::Result<Vec<Service>> {
    list_services(conn, Some(staff_id))
}

// ── Time slots ──

const SLOT_COLUMNS: &str = "id, staff_id, start_time, end_time, capacity, is_blocked, created_at";

fn parse_slot_row(row: &rusqlite::Row) -> anyhow::Result<TimeSlot> {
    Ok(TimeSlot {
        id: row.get(0)?,
        staff_id: row.get(1)?,
        start_time: parse_dt(&row.get::<_, String>(2)?),
        end_time: parse_dt(&row.get::<_, String>(3)?),
        capacity: row.get(4)?,
        is_blocked: row.get::<_, i32>(5)? != 0,
        created_at: parse_dt(&row.get::<_, String>(6)?),
    })
}

/// Fails with a unique-constraint error when the staff member already has a
/// slot starting at the same instant.
pub fn create_time_slot(conn: &Connection, slot: &TimeSlot) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO time_slots (id, staff_id, start_time, end_time, capacity, is_blocked, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            slot.id,
            slot.staff_id,
            fmt_dt(&slot.start_time),
            fmt_dt(&slot.end_time),
            slot.capacity,
            slot.is_blocked as i32,
            fmt_dt(&slot.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_time_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<TimeSlot>> {
    let result = conn.query_row(
        &format!("SELECT {SLOT_COLUMNS} FROM time_slots WHERE id = ?1"),
        params![id],
        |row| Ok(parse_slot_row(row)),
    );

    match result {
        Ok(slot) => Ok(Some(slot?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_slot_blocked(conn: &Connection, id: &str, blocked: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE time_slots SET is_blocked = ?1 WHERE id = ?2",
        params![blocked as i32, id],
    )?;
    Ok(count > 0)
}

/// Unblocked slots of active staff within [from, to], with the staff
/// member's name, ordered for presentation and for any-staff
/// deduplication (earliest start first, staff display order breaking ties).
pub fn list_open_slots(
    conn: &Connection,
    staff_id: Option<&str>,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> anyhow::Result<Vec<(TimeSlot, String)>> {
    let base = "SELECT t.id, t.staff_id, t.start_time, t.end_time, t.capacity, t.is_blocked,
             t.created_at, s.first_name || ' ' || s.last_name AS staff_name
         FROM time_slots t
         JOIN staff s ON s.id = t.staff_id
         WHERE s.is_active = 1 AND t.is_blocked = 0 AND t.start_time >= ?1 AND t.start_time <= ?2";
    let order = " ORDER BY t.start_time, s.display_order, s.first_name, s.last_name";

    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match staff_id {
        Some(staff_id) => (
            format!("{base} AND t.staff_id = ?3{order}"),
            vec![
                Box::new(fmt_dt(from)) as Box<dyn rusqlite::types::ToSql>,
                Box::new(fmt_dt(to)),
                Box::new(staff_id.to_string()),
            ],
        ),
        None => (
            format!("{base}{order}"),
            vec![
                Box::new(fmt_dt(from)) as Box<dyn rusqlite::types::ToSql>,
                Box::new(fmt_dt(to)),
            ],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let staff_name: String = row.get(7)?;
        Ok((parse_slot_row(row), staff_name))
    })?;

    let mut slots = vec![];
    for row in rows {
        let (slot, staff_name) = row?;
        slots.push((slot?, staff_name));
    }
    Ok(slots)
}

/// Bookings holding the slot: pending or confirmed.
pub fn active_booking_count(conn: &Connection, slot_id: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE time_slot_id = ?1 AND status IN ('pending', 'confirmed')",
        params![slot_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, guest_email, guest_name, guest_phone, \
     service_id, staff_id, time_slot_id, start_time, end_time, status, notes, price, \
     confirmation_code, confirmed_at, reminder_sent, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let status_str: String = row.get(10)?;
    let confirmed_at: Option<String> = row.get(14)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        guest_email: row.get(2)?,
        guest_name: row.get(3)?,
        guest_phone: row.get(4)?,
        service_id: row.get(5)?,
        staff_id: row.get(6)?,
        time_slot_id: row.get(7)?,
        start_time: parse_dt(&row.get::<_, String>(8)?),
        end_time: parse_dt(&row.get::<_, String>(9)?),
        status: BookingStatus::parse(&status_str),
        notes: row.get(11)?,
        price: parse_price(&row.get::<_, String>(12)?),
        confirmation_code: row.get(13)?,
        confirmed_at: confirmed_at.as_deref().map(parse_dt),
        reminder_sent: row.get::<_, i32>(15)? != 0,
        created_at: parse_dt(&row.get::<_, String>(16)?),
        updated_at: parse_dt(&row.get::<_, String>(17)?),
    })
}

/// Raw insert; unique-constraint failures (confirmation code collisions)
/// surface as rusqlite errors so the caller can retry with a fresh code.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, guest_email, guest_name, guest_phone,
             service_id, staff_id, time_slot_id, start_time, end_time, status, notes, price,
             confirmation_code, confirmed_at, reminder_sent, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            booking.id,
            booking.customer_id,
            booking.guest_email,
            booking.guest_name,
            booking.guest_phone,
            booking.service_id,
            booking.staff_id,
            booking.time_slot_id,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.status.as_str(),
            booking.notes,
            booking.price.to_string(),
            booking.confirmation_code,
            booking.confirmed_at.as_ref().map(fmt_dt),
            booking.reminder_sent as i32,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE confirmation_code = ?1"),
        params![code],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Active bookings for the staff member whose half-open interval
/// [start_time, end_time) overlaps [start, end).
pub fn overlapping_active_count(
    conn: &Connection,
    staff_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE staff_id = ?1 AND status IN ('pending', 'confirmed')
           AND start_time < ?2 AND end_time > ?3",
        params![staff_id, fmt_dt(end), fmt_dt(start)],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn bookings_for_customer(
    conn: &Connection,
    customer_id: &str,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = ?1 ORDER BY start_time DESC"
    ))?;

    let rows = stmt.query_map(params![customer_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1
                 ORDER BY start_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY start_time DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn set_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    confirmed_at: Option<&NaiveDateTime>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, confirmed_at = COALESCE(?2, confirmed_at),
             updated_at = ?3
         WHERE id = ?4",
        params![status.as_str(), confirmed_at.map(fmt_dt), fmt_dt(now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_reminder_sent(conn: &Connection, id: &str, now: &NaiveDateTime) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET reminder_sent = 1, updated_at = ?1 WHERE id = ?2",
        params![fmt_dt(now), id],
    )?;
    Ok(())
}

/// Confirmed bookings starting within the horizon whose reminder has not
/// gone out yet.
pub fn reminders_due(
    conn: &Connection,
    now: &NaiveDateTime,
    horizon_hours: i64,
) -> anyhow::Result<Vec<Booking>> {
    let until = *now + Duration::hours(horizon_hours);
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'confirmed' AND reminder_sent = 0
           AND start_time > ?1 AND start_time <= ?2
         ORDER BY start_time"
    ))?;

    let rows = stmt.query_map(params![fmt_dt(now), fmt_dt(&until)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

// ── Dashboard ──

pub struct DashboardStats {
    pub pending_count: i64,
    pub upcoming_confirmed_count: i64,
    pub active_service_count: i64,
    pub active_staff_count: i64,
}

pub fn get_dashboard_stats(
    conn: &Connection,
    now: &NaiveDateTime,
) -> anyhow::Result<DashboardStats> {
    let pending_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bookings WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let upcoming_confirmed_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bookings WHERE status = 'confirmed' AND start_time > ?1",
            params![fmt_dt(now)],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let active_service_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM services WHERE is_active = 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let active_staff_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM staff WHERE is_active = 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(DashboardStats {
        pending_count,
        upcoming_confirmed_count,
        active_service_count,
        active_staff_count,
    })
}

// ── Opening hours ──

pub fn list_opening_hours(conn: &Connection) -> anyhow::Result<Vec<OpeningHour>> {
    let mut stmt = conn.prepare(
        "SELECT weekday, start_time, end_time, is_closed FROM opening_hours ORDER BY weekday",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(OpeningHour {
            weekday: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            is_closed: row.get::<_, i32>(3)? != 0,
        })
    })?;

    let mut hours = vec![];
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}

pub fn upsert_opening_hour(conn: &Connection, hour: &OpeningHour) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO opening_hours (weekday, start_time, end_time, is_closed)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(weekday) DO UPDATE SET
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           is_closed = excluded.is_closed",
        params![
            hour.weekday,
            hour.start_time,
            hour.end_time,
            hour.is_closed as i32
        ],
    )?;
    Ok(())
}
