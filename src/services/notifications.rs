use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Booking, Customer};
use crate::services::notify::{EmailProvider, SmsProvider};

/// The three booking messages share one dispatch path; only the wording
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Confirmation,
    Cancellation,
    Reminder,
}

/// Everything dispatch needs, loaded before the db lock is released so no
/// network call happens while the store is held.
pub struct NoticeContext {
    pub booking: Booking,
    pub service_name: String,
    pub staff_name: String,
    pub customer: Option<Customer>,
}

pub fn load_context(conn: &Connection, booking: &Booking) -> anyhow::Result<NoticeContext> {
    let service_name = queries::get_service_by_id(conn, &booking.service_id)?
        .map(|s| s.name)
        .unwrap_or_else(|| "your appointment".to_string());
    let staff_name = queries::get_staff_by_id(conn, &booking.staff_id)?
        .map(|s| s.full_name())
        .unwrap_or_else(|| "our team".to_string());
    let customer = match &booking.customer_id {
        Some(id) => queries::get_customer_by_id(conn, id)?,
        None => None,
    };

    Ok(NoticeContext {
        booking: booking.clone(),
        service_name,
        staff_name,
        customer,
    })
}

pub struct Contacts {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Prefer the registered customer's stored contact, honoring their
/// notification preferences; guests are reached through the contact fields
/// they submitted.
pub fn resolve_contacts(ctx: &NoticeContext) -> Contacts {
    match &ctx.customer {
        Some(customer) => Contacts {
            email: customer
                .email_notifications
                .then(|| customer.email.clone()),
            phone: if customer.sms_notifications {
                customer.phone.clone()
            } else {
                None
            },
        },
        None => Contacts {
            email: ctx.booking.guest_email.clone(),
            phone: ctx.booking.guest_phone.clone(),
        },
    }
}

pub struct DispatchOutcome {
    pub email_sent: bool,
    pub sms_sent: bool,
}

impl DispatchOutcome {
    /// The notification step counts as successful when at least one
    /// channel delivered.
    pub fn delivered(&self) -> bool {
        self.email_sent || self.sms_sent
    }
}

fn subject(notice: Notice) -> &'static str {
    match notice {
        Notice::Confirmation => "Booking Confirmation",
        Notice::Cancellation => "Booking Canceled",
        Notice::Reminder => "Appointment Reminder",
    }
}

fn when(ctx: &NoticeContext) -> String {
    ctx.booking.start_time.format("%b %d at %H:%M").to_string()
}

fn recipient_name(ctx: &NoticeContext) -> Option<String> {
    match &ctx.customer {
        Some(customer) => Some(customer.display_name()),
        None => ctx.booking.guest_name.clone(),
    }
}

fn email_body(ctx: &NoticeContext, notice: Notice) -> String {
    let when = when(ctx);
    let greeting = match recipient_name(ctx) {
        Some(name) => format!("Hi {name},\n\n"),
        None => String::new(),
    };
    match notice {
        Notice::Confirmation => format!(
            "{greeting}Your booking is confirmed.\n\n\
             Service: {}\nWith: {}\nWhen: {}\n\n\
             Confirmation code: {}\n",
            ctx.service_name, ctx.staff_name, when, ctx.booking.confirmation_code
        ),
        Notice::Cancellation => format!(
            "Your booking for {} on {} has been canceled.\n",
            ctx.service_name, when
        ),
        Notice::Reminder => format!(
            "Reminder: {} appointment on {} with {}.\n\n\
             Confirmation code: {}\n",
            ctx.service_name, when, ctx.staff_name, ctx.booking.confirmation_code
        ),
    }
}

fn sms_body(ctx: &NoticeContext, notice: Notice) -> String {
    let when = when(ctx);
    match notice {
        Notice::Confirmation => format!(
            "Booking confirmed! {} with {} on {}. Confirmation: {}",
            ctx.service_name, ctx.staff_name, when, ctx.booking.confirmation_code
        ),
        Notice::Cancellation => format!(
            "Your booking for {} on {} has been canceled.",
            ctx.service_name, when
        ),
        Notice::Reminder => format!(
            "Reminder: {} appointment on {} with {}.",
            ctx.service_name, when, ctx.staff_name
        ),
    }
}

/// Best-effort delivery over both channels independently. Failures are
/// logged and never propagate to the lifecycle operation that triggered
/// the notice.
pub async fn dispatch(
    email: &dyn EmailProvider,
    sms: &dyn SmsProvider,
    ctx: &NoticeContext,
    notice: Notice,
) -> DispatchOutcome {
    let contacts = resolve_contacts(ctx);
    let mut outcome = DispatchOutcome {
        email_sent: false,
        sms_sent: false,
    };

    if let Some(to) = &contacts.email {
        match email.send_email(to, subject(notice), &email_body(ctx, notice)).await {
            Ok(()) => outcome.email_sent = true,
            Err(e) => {
                tracing::warn!(to = %to, booking = %ctx.booking.id, error = %e,
                    "failed to send booking email")
            }
        }
    }

    if let Some(to) = &contacts.phone {
        match sms.send_sms(to, &sms_body(ctx, notice)).await {
            Ok(()) => outcome.sms_sent = true,
            Err(e) => {
                tracing::warn!(to = %to, booking = %ctx.booking.id, error = %e,
                    "failed to send booking SMS")
            }
        }
    }

    if !outcome.delivered() {
        tracing::warn!(booking = %ctx.booking.id, "booking notification reached no channel");
    }

    outcome
}
