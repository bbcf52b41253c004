use clap::{Arg, ArgMatches, Command};

pub const ARG_TOKEN_EXPIRY_MINUTES: &str = "token-expiry-minutes";
pub const ARG_REQUEST_LOG_CLEANUP_HOURS: &str = "request-log-cleanup-hours";
pub const ARG_BACKOFF_WINDOW_MINUTES: &str = "backoff-window-minutes";
pub const ARG_BACKOFF_THRESHOLD: &str = "backoff-threshold";
pub const ARG_CODE_MIN: &str = "code-min";
pub const ARG_CODE_MAX: &str = "code-max";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub token_expiry_minutes: u64,
    pub request_log_cleanup_hours: u64,
    pub backoff_window_minutes: u64,
    pub backoff_threshold: u32,
    pub code_min: u32,
    pub code_max: u32,
}

impl Options {
    /// Parse passcode policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or the code range is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_u64 = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let get_u32 = |id: &str| {
            matches
                .get_one::<u32>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let options = Self {
            token_expiry_minutes: get_u64(ARG_TOKEN_EXPIRY_MINUTES)?,
            request_log_cleanup_hours: get_u64(ARG_REQUEST_LOG_CLEANUP_HOURS)?,
            backoff_window_minutes: get_u64(ARG_BACKOFF_WINDOW_MINUTES)?,
            backoff_threshold: get_u32(ARG_BACKOFF_THRESHOLD)?,
            code_min: get_u32(ARG_CODE_MIN)?,
            code_max: get_u32(ARG_CODE_MAX)?,
        };

        if options.code_min > options.code_max {
            anyhow::bail!(
                "--{ARG_CODE_MIN} ({}) must not exceed --{ARG_CODE_MAX} ({})",
                options.code_min,
                options.code_max
            );
        }

        Ok(options)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_EXPIRY_MINUTES)
                .long(ARG_TOKEN_EXPIRY_MINUTES)
                .help("Minutes a passcode stays valid after it is issued")
                .env("PASSGATE_TOKEN_EXPIRY_MINUTES")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REQUEST_LOG_CLEANUP_HOURS)
                .long(ARG_REQUEST_LOG_CLEANUP_HOURS)
                .help("Hours request-log rows are kept before verification purges them")
                .env("PASSGATE_REQUEST_LOG_CLEANUP_HOURS")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BACKOFF_WINDOW_MINUTES)
                .long(ARG_BACKOFF_WINDOW_MINUTES)
                .help("Sliding window, in minutes, used to count attempts per email")
                .env("PASSGATE_BACKOFF_WINDOW_MINUTES")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BACKOFF_THRESHOLD)
                .long(ARG_BACKOFF_THRESHOLD)
                .help("Accepted attempts per email inside the window before throttling")
                .env("PASSGATE_BACKOFF_THRESHOLD")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_CODE_MIN)
                .long(ARG_CODE_MIN)
                .help("Smallest passcode value")
                .env("PASSGATE_CODE_MIN")
                .default_value("10000")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_CODE_MAX)
                .long(ARG_CODE_MAX)
                .help("Largest passcode value")
                .env("PASSGATE_CODE_MAX")
                .default_value("99999")
                .value_parser(clap::value_parser!(u32)),
        )
}
