use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use shared::{NotificationCommand, NotificationKind};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::mail::{MailError, MailMessage, MailTransport};
use crate::templates::{plain_text, TemplateRenderer, TemplateVars};

/// Everything a message about one booking needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingContext {
    pub booking_id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: String,
    pub guest_name: String,
    pub guest_email: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
}

#[async_trait]
pub trait BookingDirectory: Send + Sync {
    /// `Ok(None)` when the booking no longer exists.
    async fn load(&self, booking_id: Uuid) -> anyhow::Result<Option<BookingContext>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BookingMissing,
    NoRecipient,
}

/// Outcome of a notification that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(SkipReason),
}

impl Delivery {
    pub fn was_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("booking lookup failed: {0}")]
    Lookup(#[source] anyhow::Error),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DispatchError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(60),
        }
    }
}

pub struct Dispatcher {
    directory: Arc<dyn BookingDirectory>,
    templates: Arc<dyn TemplateRenderer>,
    mail: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    site_url: String,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn BookingDirectory>,
        templates: Arc<dyn TemplateRenderer>,
        mail: Arc<dyn MailTransport>,
        retry: RetryPolicy,
        site_url: String,
    ) -> Self {
        Self {
            directory,
            templates,
            mail,
            retry,
            site_url,
        }
    }

    /// One attempt. Safe to repeat: nothing is written besides the outgoing mail.
    pub async fn dispatch(&self, command: &NotificationCommand) -> Result<Delivery, DispatchError> {
        let Some(booking) = self
            .directory
            .load(command.booking_id)
            .await
            .map_err(DispatchError::Lookup)?
        else {
            info!(booking_id = %command.booking_id, kind = %command.kind, "Booking no longer exists, skipping");
            return Ok(Delivery::Skipped(SkipReason::BookingMissing));
        };

        if booking.guest_email.trim().is_empty() {
            info!(booking_id = %booking.booking_id, "Guest has no email address, skipping");
            return Ok(Delivery::Skipped(SkipReason::NoRecipient));
        }

        let message = self.compose(command.kind, &booking).await;
        self.mail.send(&message).await?;

        info!(booking_id = %booking.booking_id, kind = %command.kind, "Notification sent");
        Ok(Delivery::Sent)
    }

    pub async fn dispatch_with_retry(
        &self,
        command: &NotificationCommand,
    ) -> Result<Delivery, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dispatch(command).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if attempt > self.retry.max_retries => {
                    return Err(DispatchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        booking_id = %command.booking_id,
                        kind = %command.kind,
                        attempt,
                        "Notification attempt failed, retrying in {:?}: {}",
                        self.retry.backoff,
                        e
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }

    async fn compose(&self, kind: NotificationKind, booking: &BookingContext) -> MailMessage {
        let vars = TemplateVars::new(booking, &self.site_url);
        let html = match self.templates.render(kind, &vars).await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(%kind, "Falling back to plain text: {}", e);
                None
            }
        };

        MailMessage {
            to: booking.guest_email.clone(),
            subject: kind.subject().to_string(),
            text: plain_text(kind, &vars),
            html,
        }
    }
}
