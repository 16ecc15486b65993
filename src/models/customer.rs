use chrono::NaiveDateTime;

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub sms_notifications: bool,
    pub email_notifications: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Customer {
    /// Full name, or the email when no name is set.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// One OTP challenge for a phone number. Valid until verified, expired,
/// or three failed attempts.
#[derive(Debug, Clone)]
pub struct PhoneVerification {
    pub id: String,
    pub customer_id: String,
    pub phone: String,
    pub otp_code: String,
    pub is_verified: bool,
    pub attempts: i32,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

pub const MAX_OTP_ATTEMPTS: i32 = 3;

impl PhoneVerification {
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        !self.is_verified && self.attempts < MAX_OTP_ATTEMPTS && self.expires_at > now
    }
}

/// Syntactic email check: one '@', non-empty local part, domain with a dot.
pub fn valid_email(s: &str) -> bool {
    let mut parts = s.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !s.contains(char::is_whitespace)
}
