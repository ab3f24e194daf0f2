//! SMTP email delivery using the SMTP settings from the main config file.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Service for sending account emails
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send the post-signup verification email with the activation link.
    pub async fn send_verification_email(
        &self,
        to_email: &str,
        first_name: &str,
        verify_url: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping verification email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Verify your email address";
        let text_body = format!(
            "Hi {first_name},\n\n\
             Thanks for signing up. Please verify your email address by opening\n\
             the link below:\n\n{verify_url}\n\n\
             If you did not create this account, you can ignore this email.\n"
        );
        let html_body = format!(
            "<p>Hi {first_name},</p>\
             <p>Thanks for signing up. Please verify your email address:</p>\
             <p><a href=\"{verify_url}\">Verify email</a></p>\
             <p>If you did not create this account, you can ignore this email.</p>"
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send the password reset email with the reset link. The link embeds the
    /// plaintext secret; only its digest is stored.
    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        first_name: &str,
        reset_url: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping reset email to {}", to_email);
            return Ok(());
        }

        let subject = "Reset your password";
        let text_body = format!(
            "Hi {first_name},\n\n\
             A password reset was requested for your account. Open the link\n\
             below to set a new password. The link expires in 10 minutes.\n\n\
             {reset_url}\n\n\
             If you did not request this, you can ignore this email.\n"
        );
        let html_body = format!(
            "<p>Hi {first_name},</p>\
             <p>A password reset was requested for your account. The link below\
             expires in 10 minutes.</p>\
             <p><a href=\"{reset_url}\">Reset password</a></p>\
             <p>If you did not request this, you can ignore this email.</p>"
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!("Sent \"{}\" email to {}", subject, to_email);
        Ok(())
    }
}
