use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Customer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: Option<String>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub service_id: String,
    pub staff_id: String,
    pub time_slot_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub price: Decimal,
    pub confirmation_code: String,
    pub confirmed_at: Option<NaiveDateTime>,
    pub reminder_sent: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Canceled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Canceled => "canceled",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "completed" => BookingStatus::Completed,
            "canceled" => BookingStatus::Canceled,
            "no_show" => BookingStatus::NoShow,
            _ => BookingStatus::Pending,
        }
    }

    /// Active bookings hold their slot and block overlapping bookings.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Canceled | BookingStatus::NoShow
        )
    }
}

/// Who a booking is for: a registered customer, or a guest identified
/// only by submitted contact fields. Exactly one of the two, by
/// construction.
#[derive(Debug, Clone)]
pub enum BookingParty {
    Registered(Customer),
    Guest {
        email: String,
        name: Option<String>,
        phone: Option<String>,
    },
}

impl BookingParty {
    pub fn email(&self) -> &str {
        match self {
            BookingParty::Registered(c) => &c.email,
            BookingParty::Guest { email, .. } => email,
        }
    }
}
