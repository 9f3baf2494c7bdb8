use async_trait::async_trait;

/// Outbound notification collaborator. Real delivery (email/SMS) lives
/// outside this core; the auth flows only need a fire-and-forget handoff.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reset_email(&self, email: &str, token: &str);
    async fn send_verification_email(&self, email: &str, token: &str);
}

/// Development notifier: logs the handoff instead of sending anything.
/// The token itself is never written to the log.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reset_email(&self, email: &str, token: &str) {
        tracing::info!(
            target: "audit",
            email = email,
            token_len = token.len(),
            "password reset email queued"
        );
    }

    async fn send_verification_email(&self, email: &str, token: &str) {
        tracing::info!(
            target: "audit",
            email = email,
            token_len = token.len(),
            "verification email queued"
        );
    }
}
