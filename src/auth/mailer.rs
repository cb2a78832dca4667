use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail API rejected message with status {0}")]
    Rejected(u16),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Posts messages to a transactional mail HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let payload = MailPayload {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }
        tracing::debug!("Mail '{}' accepted for {}", email.subject, email.to);
        Ok(())
    }
}

/// Used when no mail API is configured: the message only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail delivery disabled");
        tracing::debug!("{}", email.text);
        Ok(())
    }
}

/// Keeps every message in memory. Can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }

    /// Wait for a message that may be sent from a spawned task.
    pub async fn wait_for(&self, to: &str, count: usize) -> Option<OutgoingEmail> {
        for _ in 0..200 {
            let matching: Vec<_> = self.sent().into_iter().filter(|m| m.to == to).collect();
            if matching.len() >= count {
                return matching.last().cloned();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(MailError::Other("recording mailer set to fail".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(())
    }
}

/// Pull the `token` query parameter out of a link in a message body.
pub fn token_from_link(body: &str) -> Option<String> {
    let start = body.find("token=")? + "token=".len();
    let token: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    (!token.is_empty()).then_some(token)
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn verification_email(config: &Config, name: &str, to: &str, token: &str) -> OutgoingEmail {
    let safe_name = escape_html(name);
    let link = format!("{}/auth/verify-email?token={}", config.api_public_url, token);
    OutgoingEmail {
        to: to.to_string(),
        subject: "Confirm your email - Toloni Pescarias".into(),
        html: format!(
            "<p>Hi {safe_name},</p>\
             <p>Welcome to Toloni Pescarias! Confirm your email address to activate your account:</p>\
             <p><a href=\"{link}\">Confirm email</a></p>\
             <p>This link is valid for 24 hours.</p>"
        ),
        text: format!(
            "Hi {name},\n\nWelcome to Toloni Pescarias! Confirm your email address:\n{link}\n\nThis link is valid for 24 hours.\n"
        ),
    }
}

pub fn password_reset_email(config: &Config, name: &str, to: &str, token: &str) -> OutgoingEmail {
    let safe_name = escape_html(name);
    let link = format!("{}/reset-password?token={}", config.app_base_url, token);
    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your password - Toloni Pescarias".into(),
        html: format!(
            "<p>Hi {safe_name},</p>\
             <p>We received a request to reset your password.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>This link is valid for 1 hour. If you did not ask for it, ignore this email.</p>"
        ),
        text: format!(
            "Hi {name},\n\nReset your password here:\n{link}\n\nThis link is valid for 1 hour. If you did not ask for it, ignore this email.\n"
        ),
    }
}
