use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::TimeSlot;

/// Pure predicate over current state: a slot can be booked while it is not
/// blocked, has not started yet, and its pending/confirmed booking count is
/// below capacity. Must be evaluated inside the same transaction as any
/// booking attempt it gates.
pub fn is_available(
    conn: &Connection,
    slot: &TimeSlot,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    if slot.is_blocked {
        return Ok(false);
    }
    if slot.start_time <= now {
        return Ok(false);
    }

    let active = queries::active_booking_count(conn, &slot.id)?;
    Ok(active < slot.capacity as i64)
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotOpening {
    pub id: String,
    pub staff_id: String,
    pub staff_name: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Bookable openings in [from, to], ordered by start time. When no staff
/// member is pinned, openings are deduplicated by start time across staff:
/// the caller sees one offering per instant and the staff assignment
/// happens at booking time through whichever slot id is submitted.
pub fn available_openings(
    conn: &Connection,
    staff_id: Option<&str>,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<SlotOpening>> {
    let slots = queries::list_open_slots(conn, staff_id, from, to)?;

    let mut openings = Vec::new();
    let mut seen_starts: HashSet<NaiveDateTime> = HashSet::new();

    for (slot, staff_name) in slots {
        if !is_available(conn, &slot, now)? {
            continue;
        }
        if staff_id.is_none() && !seen_starts.insert(slot.start_time) {
            continue;
        }
        openings.push(SlotOpening {
            id: slot.id,
            staff_id: slot.staff_id,
            staff_name,
            start_time: slot.start_time,
            end_time: slot.end_time,
        });
    }

    Ok(openings)
}

#[derive(Debug, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub openings: Vec<SlotOpening>,
}

/// Groups openings (already ordered by start time) by calendar date.
pub fn group_by_date(openings: Vec<SlotOpening>) -> Vec<DaySchedule> {
    let mut days: Vec<DaySchedule> = Vec::new();
    for opening in openings {
        let date = opening.start_time.date();
        match days.last_mut() {
            Some(day) if day.date == date => day.openings.push(opening),
            _ => days.push(DaySchedule {
                date,
                openings: vec![opening],
            }),
        }
    }
    days
}
