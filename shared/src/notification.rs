use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    BookingConfirmation,
    PaymentConfirmation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmation => "booking_confirmation",
            NotificationKind::PaymentConfirmation => "payment_confirmation",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmation => "Booking Confirmation",
            NotificationKind::PaymentConfirmation => {
                "Payment Confirmed - Your Booking is Confirmed"
            }
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_confirmation" => Ok(NotificationKind::BookingConfirmation),
            "payment_confirmation" => Ok(NotificationKind::PaymentConfirmation),
            other => Err(format!("unknown notification kind: {}", other)),
        }
    }
}

/// A work-queue message asking for one email about one booking.
///
/// Delivery is at-least-once; consumers deduplicate on `idempotency_key`,
/// which is stable for a given kind and booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCommand {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub booking_id: Uuid,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationCommand {
    pub fn new(kind: NotificationKind, booking_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            booking_id,
            idempotency_key: format!("{}:{}", kind, booking_id),
            created_at: Utc::now(),
        }
    }

    pub fn booking_confirmation(booking_id: Uuid) -> Self {
        Self::new(NotificationKind::BookingConfirmation, booking_id)
    }

    pub fn payment_confirmation(booking_id: Uuid) -> Self {
        Self::new(NotificationKind::PaymentConfirmation, booking_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_per_kind_and_booking() {
        let booking_id = Uuid::new_v4();
        let first = NotificationCommand::booking_confirmation(booking_id);
        let again = NotificationCommand::booking_confirmation(booking_id);
        let paid = NotificationCommand::payment_confirmation(booking_id);

        assert_ne!(first.id, again.id);
        assert_eq!(first.idempotency_key, again.idempotency_key);
        assert_ne!(first.idempotency_key, paid.idempotency_key);
        assert_eq!(
            first.idempotency_key,
            format!("booking_confirmation:{}", booking_id)
        );
    }

    #[test]
    fn survives_the_wire() {
        let cmd = NotificationCommand::payment_confirmation(Uuid::new_v4());
        let json = serde_json::to_string(&cmd).unwrap();
        let back: NotificationCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        assert!(json.contains("\"PaymentConfirmation\""));
    }
}
