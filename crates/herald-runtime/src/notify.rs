//! Account notifications.
//!
//! The notifiers send mail through a [`Mailer`] taken from the bus context
//! under [`MAILER_KEY`]. With `notifications.email_enabled = false` nothing is
//! sent and the notice is only logged, so no mailer needs to be present.

use std::sync::Arc;

use herald_core::{Context, Handler, HandlerResult, Outbox};
use tracing::info;

use crate::config::NotificationConfig;
use crate::events::{PasswordChangeRequestCreated, UserPasswordChanged};

/// Context key under which the bus exposes the mailer.
pub const MAILER_KEY: &str = "mailer";

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> HandlerResult<()>;
}

/// Mailer that writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> HandlerResult<()> {
        info!(recipient, subject, body, "Mail");
        Ok(())
    }
}

/// How a notice left the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Mail sending is disabled; the notice was logged.
    Logged,
    Sent,
}

/// Mailer for this invocation, or `None` when sending is disabled.
fn acquire_mailer(
    notifications: &NotificationConfig,
    ctx: &Context,
) -> HandlerResult<Option<Arc<dyn Mailer>>> {
    if !notifications.email_enabled {
        return Ok(None);
    }
    Ok(Some(ctx.require::<dyn Mailer>(MAILER_KEY)?))
}

// =============================================================================
// Password change request
// =============================================================================

/// Mails the password change link to the requesting user.
pub struct PasswordChangeRequestNotifier {
    notifications: NotificationConfig,
    mailer: Option<Arc<dyn Mailer>>,
}

impl PasswordChangeRequestNotifier {
    pub fn new(notifications: NotificationConfig) -> Self {
        Self {
            notifications,
            mailer: None,
        }
    }

    /// The link a user follows to pick a new password.
    pub fn link(&self, token: &str) -> String {
        self.notifications
            .link(&format!("change-password?token={token}"))
    }
}

impl Handler<PasswordChangeRequestCreated> for PasswordChangeRequestNotifier {
    type Output = Delivery;

    fn before_handle(&mut self, ctx: &Context) -> HandlerResult<()> {
        self.mailer = acquire_mailer(&self.notifications, ctx)?;
        Ok(())
    }

    fn handle(
        &mut self,
        event: &PasswordChangeRequestCreated,
        _ctx: &Context,
        _outbox: &mut Outbox,
    ) -> HandlerResult<Delivery> {
        let link = self.link(&event.token);

        let Some(mailer) = &self.mailer else {
            info!(user = %event.user_id, %link, "Mail disabled, password change link");
            return Ok(Delivery::Logged);
        };

        mailer.send(
            &event.email,
            "Password change request",
            &format!(
                "<a href=\"{link}\">Change your password</a>. The link is valid for 2 hours."
            ),
        )?;
        Ok(Delivery::Sent)
    }

    fn after_handle(&mut self, _ctx: &Context) {
        self.mailer = None;
    }
}

// =============================================================================
// Password changed
// =============================================================================

/// Tells a user their password was changed.
pub struct UserPasswordChangedNotifier {
    notifications: NotificationConfig,
    mailer: Option<Arc<dyn Mailer>>,
}

impl UserPasswordChangedNotifier {
    pub fn new(notifications: NotificationConfig) -> Self {
        Self {
            notifications,
            mailer: None,
        }
    }
}

impl Handler<UserPasswordChanged> for UserPasswordChangedNotifier {
    type Output = Delivery;

    fn before_handle(&mut self, ctx: &Context) -> HandlerResult<()> {
        self.mailer = acquire_mailer(&self.notifications, ctx)?;
        Ok(())
    }

    fn handle(
        &mut self,
        event: &UserPasswordChanged,
        _ctx: &Context,
        _outbox: &mut Outbox,
    ) -> HandlerResult<Delivery> {
        let Some(mailer) = &self.mailer else {
            info!(email = %event.email, "Mail disabled, password changed notice");
            return Ok(Delivery::Logged);
        };

        mailer.send(
            &event.email,
            "Your password was changed",
            "Your password was changed!",
        )?;
        Ok(Delivery::Sent)
    }

    fn after_handle(&mut self, _ctx: &Context) {
        self.mailer = None;
    }
}
