//! Out-of-band delivery of one-time access codes.
//!
//! The portal hands a code to a [`DeliveryChannel`] and needs a synchronous success/failure
//! answer; it never retries. Implementations:
//! - [`ConsoleChannel`]: logs the code (development substitute for a gateway)
//! - [`SmsGatewayChannel`]: posts the code to an HTTP SMS gateway with a bounded timeout
//! - [`OutboxChannel`]: records messages in memory for tests and tooling

use carelith_types::{EmailAddress, PhoneNumber};
use reqwest::Url;
use std::sync::Mutex;
use std::time::Duration;

/// Log target the console channel writes codes to; binaries keep it at `info`.
pub const CONSOLE_DELIVERY_TARGET: &str = "carelith::delivery";

/// Kind of address a code can be sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Sms,
}

impl std::fmt::Display for ContactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContactKind::Email => "email",
            ContactKind::Sms => "sms",
        })
    }
}

/// A patient address resolved for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Contact {
    Email(EmailAddress),
    Sms(PhoneNumber),
}

impl Contact {
    pub fn kind(&self) -> ContactKind {
        match self {
            Contact::Email(_) => ContactKind::Email,
            Contact::Sms(_) => ContactKind::Sms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{channel} channel cannot send {kind:?} messages")]
    Unsupported {
        channel: &'static str,
        kind: ContactKind,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gateway rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, kind: ContactKind) -> bool;

    fn send_email(&self, to: &EmailAddress, subject: &str, body: &str) -> Result<(), DeliveryError>;

    fn send_sms(&self, phone: &PhoneNumber, code: &str) -> Result<(), DeliveryError>;
}

/// Sends `code` to `contact`, wording e-mails for the requesting doctor and lifetime.
pub fn dispatch_code(
    channel: &dyn DeliveryChannel,
    contact: &Contact,
    code: &str,
    doctor_name: &str,
    ttl_minutes: i64,
) -> Result<(), DeliveryError> {
    match contact {
        Contact::Email(to) => {
            let body = format!(
                "Dr. {doctor_name} has requested access to your medical records.\n\
                 Your one-time code is {code}. It expires in {ttl_minutes} minutes.\n\
                 Share it only if you agree to grant access."
            );
            channel.send_email(to, "Your Carelith access code", &body)
        }
        Contact::Sms(phone) => channel.send_sms(phone, code),
    }
}

/// Writes codes to the log instead of sending them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleChannel;

impl DeliveryChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    fn supports(&self, _kind: ContactKind) -> bool {
        true
    }

    fn send_email(&self, to: &EmailAddress, subject: &str, body: &str) -> Result<(), DeliveryError> {
        tracing::info!(target: CONSOLE_DELIVERY_TARGET, %to, subject, "[console delivery] {}", body);
        Ok(())
    }

    fn send_sms(&self, phone: &PhoneNumber, code: &str) -> Result<(), DeliveryError> {
        tracing::info!(target: CONSOLE_DELIVERY_TARGET, %phone, "[console delivery] access code {}", code);
        Ok(())
    }
}

/// Posts codes to an OTP SMS gateway.
///
/// Request body: `{"route": "otp", "variables_values": <code>, "numbers": <phone>}` with the API
/// key in the `authorization` header.
#[derive(Debug)]
pub struct SmsGatewayChannel {
    client: reqwest::blocking::Client,
    url: Url,
    api_key: String,
}

impl SmsGatewayChannel {
    /// Must be called outside an async runtime (the blocking client owns one internally).
    pub fn new(url: Url, api_key: String, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

impl DeliveryChannel for SmsGatewayChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn supports(&self, kind: ContactKind) -> bool {
        kind == ContactKind::Sms
    }

    fn send_email(&self, _to: &EmailAddress, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unsupported {
            channel: self.name(),
            kind: ContactKind::Email,
        })
    }

    fn send_sms(&self, phone: &PhoneNumber, code: &str) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "route": "otp",
            "variables_values": code,
            "numbers": phone.as_str(),
        });

        let response = self
            .client
            .post(self.url.clone())
            .header("authorization", &self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// A message captured by [`OutboxChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub kind: ContactKind,
    pub body: String,
}

/// Records every message in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct OutboxChannel {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<bool>,
}

impl OutboxChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The six-digit code contained in the most recent message, if any.
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.last().and_then(|m| {
            m.body
                .split(|c: char| !c.is_ascii_digit())
                .find(|w| w.len() == crate::constants::OTP_LENGTH)
                .map(str::to_string)
        })
    }

    fn record(&self, to: String, kind: ContactKind, body: String) -> Result<(), DeliveryError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DeliveryError::Transport("outbox is failing".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage { to, kind, body });
        Ok(())
    }
}

impl DeliveryChannel for OutboxChannel {
    fn name(&self) -> &'static str {
        "outbox"
    }

    fn supports(&self, _kind: ContactKind) -> bool {
        true
    }

    fn send_email(&self, to: &EmailAddress, _subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.record(to.to_string(), ContactKind::Email, body.to_string())
    }

    fn send_sms(&self, phone: &PhoneNumber, code: &str) -> Result<(), DeliveryError> {
        self.record(phone.to_string(), ContactKind::Sms, code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_body_carries_code_and_lifetime() {
        let outbox = OutboxChannel::new();
        let to = EmailAddress::parse("asha@example.org").unwrap();
        dispatch_code(&outbox, &Contact::Email(to), "012345", "Alice Smith", 10).unwrap();

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, ContactKind::Email);
        assert!(sent[0].body.contains("Dr. Alice Smith"));
        assert!(sent[0].body.contains("10 minutes"));
        assert_eq!(outbox.last_code().as_deref(), Some("012345"));
    }

    #[test]
    fn sms_sends_bare_code() {
        let outbox = OutboxChannel::new();
        let phone = PhoneNumber::parse("+919800000001").unwrap();
        dispatch_code(&outbox, &Contact::Sms(phone), "654321", "Alice Smith", 10).unwrap();
        assert_eq!(outbox.sent()[0].body, "654321");
        assert_eq!(outbox.last_code().as_deref(), Some("654321"));
    }

    #[test]
    fn failing_outbox_reports_transport_error() {
        let outbox = OutboxChannel::new();
        outbox.set_failing(true);
        let phone = PhoneNumber::parse("+919800000001").unwrap();
        let err = outbox.send_sms(&phone, "111111").unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn sms_gateway_refuses_email() {
        let url = Url::parse("http://127.0.0.1:9/send").unwrap();
        let channel = SmsGatewayChannel::new(url, "key".into(), Duration::from_secs(1)).unwrap();
        assert!(!channel.supports(ContactKind::Email));
        let to = EmailAddress::parse("asha@example.org").unwrap();
        assert!(matches!(
            channel.send_email(&to, "s", "b"),
            Err(DeliveryError::Unsupported { .. })
        ));
    }

    #[test]
    fn sms_gateway_unreachable_is_transport_error() {
        let url = Url::parse("http://127.0.0.1:9/send").unwrap();
        let channel = SmsGatewayChannel::new(url, "key".into(), Duration::from_secs(1)).unwrap();
        let phone = PhoneNumber::parse("+919800000001").unwrap();
        assert!(matches!(
            channel.send_sms(&phone, "123456"),
            Err(DeliveryError::Transport(_))
        ));
    }
}
