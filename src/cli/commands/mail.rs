use clap::{Arg, ArgMatches, Command};

pub const ARG_MAIL_FROM_ADDRESS: &str = "mail-from-address";
pub const ARG_MAIL_FROM_NAME: &str = "mail-from-name";
pub const ARG_MAIL_SUBJECT: &str = "mail-subject";
pub const ARG_MAIL_BODY: &str = "mail-body";
pub const ARG_MAIL_ALT_BODY: &str = "mail-alt-body";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
    pub body: String,
    pub alt_body: String,
}

impl Options {
    /// Parse mail template arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            from_address: get(ARG_MAIL_FROM_ADDRESS)?,
            from_name: get(ARG_MAIL_FROM_NAME)?,
            subject: get(ARG_MAIL_SUBJECT)?,
            body: get(ARG_MAIL_BODY)?,
            alt_body: get(ARG_MAIL_ALT_BODY)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_FROM_ADDRESS)
                .long(ARG_MAIL_FROM_ADDRESS)
                .help("Sender address of passcode mails")
                .env("PASSGATE_MAIL_FROM_ADDRESS")
                .default_value("from@example.com"),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM_NAME)
                .long(ARG_MAIL_FROM_NAME)
                .help("Sender display name of passcode mails")
                .env("PASSGATE_MAIL_FROM_NAME")
                .default_value("Mailer"),
        )
        .arg(
            Arg::new(ARG_MAIL_SUBJECT)
                .long(ARG_MAIL_SUBJECT)
                .help("Subject of passcode mails")
                .env("PASSGATE_MAIL_SUBJECT")
                .default_value("Reset token"),
        )
        .arg(
            Arg::new(ARG_MAIL_BODY)
                .long(ARG_MAIL_BODY)
                .help("HTML body of passcode mails, %s is replaced by the passcode")
                .env("PASSGATE_MAIL_BODY")
                .default_value("Use this token to reset your password: <b>%s</b>"),
        )
        .arg(
            Arg::new(ARG_MAIL_ALT_BODY)
                .long(ARG_MAIL_ALT_BODY)
                .help("Plain-text body of passcode mails, %s is replaced by the passcode")
                .env("PASSGATE_MAIL_ALT_BODY")
                .default_value("Use this token to reset your password: %s"),
        )
}
