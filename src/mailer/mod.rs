//! # SMTP Notification Delivery
//!
//! Sends alert e-mails through an SMTP relay using `lettre`.
//!
//! ## Delivery Semantics
//!
//! A send returns `Ok` only once the relay accepted the message. The engine marks
//! a subscription as sent on `Ok` alone, so every failure path here must surface
//! as an error:
//!
//! - **Missing credentials**: `NotifyError::MissingCredentials`, nothing is sent
//! - **Invalid addresses**: `NotifyError::Config`
//! - **Relay rejection or network failure**: `NotifyError::Smtp`
//!
//! No retries happen inside the notifier. A failed alert stays pending and the
//! next cycle evaluates it again.
//!
//! ## Environment Configuration
//!
//! Built from [`SmtpConfig`], which reads `CATCHSEAT_SMTP_HOST`,
//! `CATCHSEAT_SMTP_PORT`, `CATCHSEAT_SMTP_USER`, `CATCHSEAT_SMTP_PASSWORD`,
//! `CATCHSEAT_SMTP_USE_TLS` and `CATCHSEAT_SMTP_DEFAULT_SENDER`.

pub mod templates;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::models::Notification;
use crate::traits::{Notifier, NotifyError};

/// E-mail notifier for alert subscribers.
///
/// Holds a pooled async SMTP transport. Without credentials there is no relay:
/// the sender address is not even parsed and every send fails with
/// [`NotifyError::MissingCredentials`], so affected alerts stay pending.
pub struct SmtpNotifier {
    relay: Option<Relay>,
}

struct Relay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Builds the notifier from SMTP settings.
    ///
    /// Port 465 uses implicit TLS, other ports use STARTTLS when `use_tls` is set
    /// and plain SMTP otherwise.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let (Some(user), Some(password)) = (&config.user, &config.password) else {
            warn!(
                "CATCHSEAT_SMTP_USER / CATCHSEAT_SMTP_PASSWORD not set - alert e-mails will not be sent"
            );
            return Ok(Self { relay: None });
        };

        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                user.clone(),
                password.expose_secret().to_string(),
            ))
            .build();

        Ok(Self {
            relay: Some(Relay { transport, from }),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        recipient: &str,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let Some(Relay { transport, from }) = &self.relay else {
            return Err(NotifyError::MissingCredentials);
        };

        let to: Mailbox = recipient
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let email = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!("Alert e-mail delivered to {}: {}", recipient, notification.subject);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
