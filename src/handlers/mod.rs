pub mod admin;
pub mod auth;
pub mod bookings;
pub mod health;
pub mod services;
pub mod slots;
pub mod staff;
