use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A staff-scoped bookable window. Availability is computed, not stored:
/// a slot can be taken while it is not blocked, has not started yet, and
/// its active-booking count is below capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub staff_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub capacity: i32,
    pub is_blocked: bool,
    pub created_at: NaiveDateTime,
}
