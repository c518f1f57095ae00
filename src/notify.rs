//! Outbound mail. The core only composes messages; delivering them is up to
//! a [`Mailer`].

use crate::config::Config;
use crate::user::User;
use tera::{Context, Tera};
use thiserror::Error;

const VERIFY_TXT: &str = include_str!("../templates/verify_account.txt");
const VERIFY_HTML: &str = include_str!("../templates/verify_account.html");

/// An email message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub text_body: String,
    pub html_body: String,
}

/// Delivers messages.
pub trait Mailer {
    fn send(&self, message: &Message) -> Result<()>;
}

/// A [`Mailer`] that writes messages to the log instead of sending them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &Message) -> Result<()> {
        if message.recipients.is_empty() {
            return Err(Error::Transport(
                "message has no recipients".to_owned(),
            ));
        }
        tracing::info!(
            subject = %message.subject,
            sender = %message.sender,
            recipients = ?message.recipients,
            "mail:\n{}",
            message.text_body
        );
        Ok(())
    }
}

fn templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("verify_account.txt", VERIFY_TXT),
        ("verify_account.html", VERIFY_HTML),
    ])?;
    Ok(tera)
}

/// Composes the request the site admins receive when `user` registers.
/// `token` is the verification token and `minutes` its lifetime.
pub fn verification_message(
    config: &Config,
    user: &User,
    token: &str,
    minutes: i64,
) -> Result<Message> {
    let mut context = Context::new();
    context.insert("site", &config.title);
    context.insert("username", &user.username);
    context.insert("email", &user.email);
    context.insert("url", config.verification_url(token).as_str());
    context.insert("minutes", &minutes);

    let tera = templates()?;
    Ok(Message {
        subject: format!("[{}] New User Request", config.title),
        sender: config.mail_sender.clone(),
        recipients: config.admins.clone(),
        text_body: tera.render("verify_account.txt", &context)?,
        html_body: tera.render("verify_account.html", &context)?,
    })
}

/// The result of composing or sending mail.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error composing or sending mail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("rendering mail template: {0}")]
    Template(#[from] tera::Error),

    #[error("sending mail: {0}")]
    Transport(String),
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::user::{test_user, UserLevel};
    use parking_lot::Mutex;

    /// Records messages instead of sending them, or fails every send.
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub(crate) sent: Mutex<Vec<Message>>,
        pub(crate) fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, message: &Message) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("connection refused".to_owned()));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    pub(crate) fn test_config() -> Config {
        Config {
            title: "Simply Precise".to_owned(),
            site_root: "https://example.org/".parse().unwrap(),
            secret: "s3cret".to_owned(),
            database: "quire.db.yaml".into(),
            posts_per_page: 5,
            admins: vec!["root@example.org".to_owned()],
            mail_sender: "noreply@example.org".to_owned(),
            log_level: "info".to_owned(),
            highlight_theme: "InspiredGitHub".to_owned(),
        }
    }

    #[test]
    fn test_verification_message() -> Result<()> {
        let mut user = test_user(7, "ann", UserLevel::Normal);
        user.username = "<ann>".to_owned();
        let message = verification_message(&test_config(), &user, "tok", 10)?;

        assert_eq!("[Simply Precise] New User Request", message.subject);
        assert_eq!(vec!["root@example.org".to_owned()], message.recipients);
        assert!(message
            .text_body
            .contains("https://example.org/cms/verify_account/tok"));
        assert!(message.text_body.contains("<ann>"));
        assert!(message.html_body.contains("&lt;ann&gt;"));
        assert!(message.text_body.contains("10 minutes"));
        Ok(())
    }

    #[test]
    fn test_log_mailer_needs_recipients() {
        let mut message = verification_message(
            &test_config(),
            &test_user(1, "ann", UserLevel::Normal),
            "tok",
            10,
        )
        .unwrap();
        assert!(LogMailer.send(&message).is_ok());
        message.recipients.clear();
        assert!(matches!(LogMailer.send(&message), Err(Error::Transport(_))));
    }
}
