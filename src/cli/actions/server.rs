use crate::{
    api,
    cli::telemetry,
    passcode::{LogNotifier, MailTemplate, PasscodeConfig, PasscodeService, Store, SystemClock},
};
use anyhow::{Context, Result, anyhow};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub db: PathBuf,
    pub token_expiry_minutes: u64,
    pub request_log_cleanup_hours: u64,
    pub backoff_window_minutes: u64,
    pub backoff_threshold: u32,
    pub code_min: u32,
    pub code_max: u32,
    pub mail_from_address: String,
    pub mail_from_name: String,
    pub mail_subject: String,
    pub mail_body: String,
    pub mail_alt_body: String,
}

impl Args {
    fn passcode_config(&self) -> Result<PasscodeConfig> {
        let config = PasscodeConfig::new()
            .with_token_expiry_minutes(self.token_expiry_minutes)
            .with_request_log_cleanup_hours(self.request_log_cleanup_hours)
            .with_backoff_window_minutes(self.backoff_window_minutes)
            .with_backoff_threshold(self.backoff_threshold)
            .with_code_range(self.code_min, self.code_max);
        config.validate().map_err(|err| anyhow!(err))?;
        Ok(config)
    }

    fn mail_template(&self) -> MailTemplate {
        MailTemplate::new()
            .with_from(self.mail_from_address.clone(), self.mail_from_name.clone())
            .with_subject(self.mail_subject.clone())
            .with_html_body(self.mail_body.clone())
            .with_text_body(self.mail_alt_body.clone())
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = args.passcode_config()?;

    let store = Store::open(&args.db)
        .await
        .with_context(|| format!("Failed to open database: {}", args.db.display()))?;
    info!(db = %args.db.display(), "Database ready");

    let notifier = Arc::new(LogNotifier::new(args.mail_template()));
    let service = Arc::new(PasscodeService::new(
        store,
        &config,
        Arc::new(SystemClock),
        notifier,
    ));

    let result = api::new(args.port, service).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        db = %args.db.display(),
        token_expiry_minutes = args.token_expiry_minutes,
        request_log_cleanup_hours = args.request_log_cleanup_hours,
        backoff_window_minutes = args.backoff_window_minutes,
        backoff_threshold = args.backoff_threshold,
        code_min = args.code_min,
        code_max = args.code_max,
        mail_from = %args.mail_from_address,
        "Starting server"
    );
}
