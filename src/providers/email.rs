//! Email Provider
//!
//! Abstract email-delivery contract plus a logging sink that stands in for an
//! SMTP backend — direct translation of the original's `LoggingEmailProvider`.

use async_trait::async_trait;

/// A pluggable email-delivery backend.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email. Returns `Ok(true)` on success, `Ok(false)` if the
    /// provider declined delivery without erroring, `Err` on a hard failure
    /// the dispatcher should treat as retryable.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from: Option<&str>,
    ) -> Result<bool, crate::error::ExternalError>;

    /// Whether the provider is currently configured/reachable.
    fn available(&self) -> bool;

    /// Stable provider name, used in logs and dead-letter diagnostics.
    fn name(&self) -> &'static str;
}

/// Logs the email that would have been sent instead of sending it — the
/// default/dev provider, matching `logging_email_provider.py`.
pub struct LoggingEmailProvider {
    default_from_email: String,
}

impl LoggingEmailProvider {
    pub fn new() -> Self {
        Self {
            default_from_email: "noreply@example.com".to_string(),
        }
    }

    pub fn with_default_from(default_from_email: impl Into<String>) -> Self {
        Self {
            default_from_email: default_from_email.into(),
        }
    }
}

impl Default for LoggingEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from: Option<&str>,
    ) -> Result<bool, crate::error::ExternalError> {
        let from = from.unwrap_or(&self.default_from_email);
        let truncated: String = body.chars().take(100).collect();
        let ellipsis = if body.chars().count() > 100 { "..." } else { "" };

        tracing::info!(
            provider = self.name(),
            from,
            to,
            subject,
            body = %format!("{truncated}{ellipsis}"),
            "email logged (not sent)"
        );

        Ok(true)
    }

    fn available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_provider_always_available_and_succeeds() {
        let provider = LoggingEmailProvider::new();
        assert!(provider.available());
        let sent = provider
            .send("user@example.com", "Welcome", "hello there", None)
            .await
            .unwrap();
        assert!(sent);
    }
}
