//! Out-of-band passcode delivery.
//!
//! The manager hands every freshly issued passcode to a `Notifier`. `deliver` is a
//! blocking call run on the runtime's blocking pool, so a transport may do plain
//! network IO. The issuing request waits for it and a failure is reported straight
//! back to the caller, with no retry or queue.
//!
//! The default notifier for local dev is `LogNotifier`, which renders the mail
//! template and logs it instead of talking to a mail server.

use anyhow::Result;
use tracing::info;

use super::Passcode;

const DEFAULT_FROM_ADDRESS: &str = "from@example.com";
const DEFAULT_FROM_NAME: &str = "Mailer";
const DEFAULT_SUBJECT: &str = "Reset token";
const DEFAULT_HTML_BODY: &str = "Use this token to reset your password: <b>%s</b>";
const DEFAULT_TEXT_BODY: &str = "Use this token to reset your password: %s";
const CODE_PLACEHOLDER: &str = "%s";

/// Delivery abstraction invoked once per issued passcode, off the async workers.
pub trait Notifier: Send + Sync {
    /// Deliver `code` to `identity` or return an error to fail the request.
    fn deliver(&self, identity: &str, code: &Passcode) -> Result<()>;
}

/// A rendered passcode email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasscodeMessage {
    pub to_email: String,
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Sender and body templates; `%s` in either body is replaced by the passcode.
#[derive(Clone, Debug)]
pub struct MailTemplate {
    from_address: String,
    from_name: String,
    subject: String,
    html_body: String,
    text_body: String,
}

impl MailTemplate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            html_body: DEFAULT_HTML_BODY.to_string(),
            text_body: DEFAULT_TEXT_BODY.to_string(),
        }
    }

    #[must_use]
    pub fn with_from(mut self, address: String, name: String) -> Self {
        self.from_address = address;
        self.from_name = name;
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: String) -> Self {
        self.subject = subject;
        self
    }

    #[must_use]
    pub fn with_html_body(mut self, body: String) -> Self {
        self.html_body = body;
        self
    }

    #[must_use]
    pub fn with_text_body(mut self, body: String) -> Self {
        self.text_body = body;
        self
    }

    #[must_use]
    pub fn render(&self, identity: &str, code: &Passcode) -> PasscodeMessage {
        let code = code.to_string();
        PasscodeMessage {
            to_email: identity.to_string(),
            from_address: self.from_address.clone(),
            from_name: self.from_name.clone(),
            subject: self.subject.clone(),
            html_body: self.html_body.replace(CODE_PLACEHOLDER, &code),
            text_body: self.text_body.replace(CODE_PLACEHOLDER, &code),
        }
    }
}

impl Default for MailTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// Local dev notifier that logs the rendered message instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    template: MailTemplate,
}

impl LogNotifier {
    #[must_use]
    pub fn new(template: MailTemplate) -> Self {
        Self { template }
    }
}

impl Notifier for LogNotifier {
    fn deliver(&self, identity: &str, code: &Passcode) -> Result<()> {
        let message = self.template.render(identity, code);
        info!(
            to_email = %message.to_email,
            from = %format!("{} <{}>", message.from_name, message.from_address),
            subject = %message.subject,
            body = %message.text_body,
            "passcode mail send stub"
        );
        Ok(())
    }
}
