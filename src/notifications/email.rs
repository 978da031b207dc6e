//! System email service for sending OTP and password-reset emails.
//!
//! Uses the SMTP configuration from the main config file. When SMTP is not
//! configured the service logs and skips, so development environments work
//! without a mail server.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Service for sending system emails
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    /// Create a new email service
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// A service that never sends; used where SMTP is absent (tests, dev)
    pub fn unconfigured() -> Self {
        Self {
            config: EmailConfig::default(),
        }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send the account-verification code
    pub async fn send_otp_email(&self, to_email: &str, otp: i64, ttl_minutes: i64) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping OTP email to {}", to_email);
            return Ok(());
        }

        let subject = "Your one-time verification code";
        let html_body = render_code_html(
            "Verify your account",
            "Use this code to verify your account:",
            otp,
            ttl_minutes,
        );
        let text_body = render_code_text(
            "Use this code to verify your account:",
            otp,
            ttl_minutes,
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send the password-reset code
    pub async fn send_reset_email(&self, to_email: &str, otp: i64, ttl_minutes: i64) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping reset email to {}", to_email);
            return Ok(());
        }

        let subject = "Your password reset code";
        let html_body = render_code_html(
            "Reset your password",
            "Use this code to reset your password:",
            otp,
            ttl_minutes,
        );
        let text_body = render_code_text(
            "Use this code to reset your password:",
            otp,
            ttl_minutes,
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

        // Build the from mailbox with name
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

        // Build SMTP transport
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

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

/// Render the HTML version of a code email
fn render_code_html(title: &str, lead: &str, otp: i64, ttl_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0, 0, 0, 0.06);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #ef4444 0%, #dc2626 100%);
            color: white;
            padding: 32px 24px;
            text-align: center;
        }}
        .header h1 {{
            margin: 0;
            font-size: 24px;
            font-weight: 600;
        }}
        .content {{
            padding: 32px 24px;
        }}
        .content p {{
            margin: 0 0 16px;
            color: #374151;
            line-height: 1.6;
        }}
        .code {{
            background-color: #f3f4f6;
            border-radius: 6px;
            padding: 16px;
            margin: 20px 0;
            text-align: center;
            font-size: 32px;
            font-weight: 700;
            letter-spacing: 8px;
            color: #111827;
        }}
        .footer {{
            padding: 0 24px 32px;
            color: #9ca3af;
            font-size: 13px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header"><h1>{title}</h1></div>
            <div class="content">
                <p>{lead}</p>
                <div class="code">{otp}</div>
                <p>The code expires in {ttl_minutes} minutes.</p>
            </div>
            <div class="footer">
                If you did not request this code, you can safely ignore this email.
            </div>
        </div>
    </div>
</body>
</html>"#
    )
}

/// Render the plain text version of a code email
fn render_code_text(lead: &str, otp: i64, ttl_minutes: i64) -> String {
    format!(
        "{lead}\n\n    {otp}\n\nThe code expires in {ttl_minutes} minutes.\n\n\
         If you did not request this code, you can safely ignore this email.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_service_is_disabled() {
        assert!(!EmailService::unconfigured().is_enabled());
    }

    #[test]
    fn test_render_includes_code_and_ttl() {
        let html = render_code_html("Verify", "Use this code:", 123456, 3);
        assert!(html.contains("123456"));
        assert!(html.contains("3 minutes"));

        let text = render_code_text("Use this code:", 123456, 3);
        assert!(text.contains("123456"));
    }
}
