use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use salon_booking::config::AppConfig;
use salon_booking::db;
use salon_booking::services::notify::smtp::SmtpEmailProvider;
use salon_booking::services::notify::twilio::TwilioSmsProvider;
use salon_booking::services::notify::{
    ConsoleEmailProvider, ConsoleSmsProvider, EmailProvider, SmsProvider,
};
use salon_booking::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let email: Box<dyn EmailProvider> = match config.email_provider.as_str() {
        "smtp" => {
            anyhow::ensure!(
                !config.smtp_server.is_empty(),
                "SMTP_SERVER must be set when EMAIL_PROVIDER=smtp"
            );
            tracing::info!("using SMTP email provider (server: {})", config.smtp_server);
            Box::new(SmtpEmailProvider::new(
                &config.smtp_server,
                config.smtp_port,
                config.smtp_username.clone(),
                config.smtp_password.clone(),
                config.email_from.clone(),
            )?)
        }
        _ => {
            tracing::info!("using console email provider");
            Box::new(ConsoleEmailProvider)
        }
    };

    let sms: Box<dyn SmsProvider> = match config.sms_provider.as_str() {
        "twilio" => {
            anyhow::ensure!(
                !config.twilio_account_sid.is_empty(),
                "TWILIO_ACCOUNT_SID must be set when SMS_PROVIDER=twilio"
            );
            tracing::info!("using Twilio SMS provider");
            Box::new(TwilioSmsProvider::new(
                config.twilio_account_sid.clone(),
                config.twilio_auth_token.clone(),
                config.twilio_phone_number.clone(),
            ))
        }
        _ => {
            tracing::info!("using console SMS provider");
            Box::new(ConsoleSmsProvider)
        }
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        email,
        sms,
    });

    let app = salon_booking::app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
