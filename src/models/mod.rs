pub mod booking;
pub mod customer;
pub mod opening_hours;
pub mod service;
pub mod staff;
pub mod time_slot;

pub use booking::{Booking, BookingParty, BookingStatus};
pub use customer::{Customer, PhoneVerification};
pub use opening_hours::OpeningHour;
pub use service::Service;
pub use staff::Staff;
pub use time_slot::TimeSlot;
