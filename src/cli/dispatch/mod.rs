//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an action, such as starting the API server
//! with its passcode policy and mail template.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DB, ARG_PORT, mail, passcode};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let db = matches
        .get_one::<String>(ARG_DB)
        .filter(|db| !db.trim().is_empty())
        .map(PathBuf::from)
        .context("missing required argument: --db")?;

    let passcode_opts = passcode::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        db,
        token_expiry_minutes: passcode_opts.token_expiry_minutes,
        request_log_cleanup_hours: passcode_opts.request_log_cleanup_hours,
        backoff_window_minutes: passcode_opts.backoff_window_minutes,
        backoff_threshold: passcode_opts.backoff_threshold,
        code_min: passcode_opts.code_min,
        code_max: passcode_opts.code_max,
        mail_from_address: mail_opts.from_address,
        mail_from_name: mail_opts.from_name,
        mail_subject: mail_opts.subject,
        mail_body: mail_opts.body,
        mail_alt_body: mail_opts.alt_body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR: [(&str, Option<&str>); 5] = [
        ("PASSGATE_PORT", None),
        ("PASSGATE_DB", None),
        ("PASSGATE_BACKOFF_THRESHOLD", None),
        ("PASSGATE_CODE_MIN", None),
        ("PASSGATE_CODE_MAX", None),
    ];

    #[test]
    fn server_action_from_args() {
        temp_env::with_vars(CLEAR, || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "passgate",
                "--port",
                "9000",
                "--db",
                "/tmp/passgate.sqlite3",
                "--backoff-threshold",
                "4",
                "--mail-subject",
                "Your code",
            ]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.port, 9000);
                assert_eq!(args.db, PathBuf::from("/tmp/passgate.sqlite3"));
                assert_eq!(args.backoff_threshold, 4);
                assert_eq!(args.token_expiry_minutes, 5);
                assert_eq!(args.code_min, 10_000);
                assert_eq!(args.code_max, 99_999);
                assert_eq!(args.mail_subject, "Your code");
                assert_eq!(args.mail_from_name, "Mailer");
            }
        });
    }

    #[test]
    fn empty_code_range_rejected() {
        temp_env::with_vars(CLEAR, || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "passgate",
                "--code-min",
                "500",
                "--code-max",
                "499",
            ]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--code-min (500)"));
            }
        });
    }

    #[test]
    fn empty_db_path_rejected() {
        temp_env::with_vars(CLEAR, || {
            let matches =
                crate::cli::commands::new().get_matches_from(vec!["passgate", "--db", " "]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("missing required argument: --db"));
            }
        });
    }
}
