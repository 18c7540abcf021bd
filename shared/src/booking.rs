use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::DateRange;
use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Statuses that still hold the listing's dates.
    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Manual confirmation by the owner.
    pub fn confirm(self) -> DomainResult<Self> {
        match self {
            BookingStatus::Pending => Ok(BookingStatus::Confirmed),
            from => Err(DomainError::InvalidTransition { from, action: "confirm" }),
        }
    }

    pub fn cancel(self) -> DomainResult<Self> {
        match self {
            BookingStatus::Pending | BookingStatus::Confirmed => Ok(BookingStatus::Cancelled),
            from => Err(DomainError::InvalidTransition { from, action: "cancel" }),
        }
    }

    pub fn complete(self) -> DomainResult<Self> {
        match self {
            BookingStatus::Confirmed => Ok(BookingStatus::Completed),
            from => Err(DomainError::InvalidTransition { from, action: "complete" }),
        }
    }

    /// A completed payment confirms the booking from any non-terminal state.
    /// Returns `None` when the booking must be left as it is.
    pub fn confirm_by_payment(self) -> Option<Self> {
        if self.is_terminal() {
            None
        } else {
            Some(BookingStatus::Confirmed)
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            // legacy spelling still present in older rows
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// The two users with rights over a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parties {
    pub guest_id: Uuid,
    pub owner_id: Uuid,
}

impl Parties {
    pub fn involves(&self, actor: Uuid) -> bool {
        actor == self.guest_id || actor == self.owner_id
    }

    pub fn authorize_confirm(&self, actor: Uuid) -> DomainResult<()> {
        if actor != self.owner_id {
            return Err(DomainError::PermissionDenied(
                "Only the property owner can confirm bookings",
            ));
        }
        Ok(())
    }

    pub fn authorize_complete(&self, actor: Uuid) -> DomainResult<()> {
        if actor != self.owner_id {
            return Err(DomainError::PermissionDenied(
                "Only the property owner can complete bookings",
            ));
        }
        Ok(())
    }

    pub fn authorize_cancel(&self, actor: Uuid) -> DomainResult<()> {
        if !self.involves(actor) {
            return Err(DomainError::PermissionDenied(
                "You do not have permission to cancel this booking",
            ));
        }
        Ok(())
    }

    /// Payment, edits and deletion belong to the guest alone.
    pub fn authorize_guest(&self, actor: Uuid) -> DomainResult<()> {
        if actor != self.guest_id {
            return Err(DomainError::PermissionDenied("Permission denied"));
        }
        Ok(())
    }
}

pub fn validate_guest_count(number_of_guests: i32, max_guests: i32) -> DomainResult<()> {
    if number_of_guests < 1 {
        return Err(DomainError::GuestCountTooLow);
    }
    if number_of_guests > max_guests {
        return Err(DomainError::GuestCountExceeded { max: max_guests });
    }
    Ok(())
}

/// Server-side price: nightly rate times whole nights.
pub fn total_price(price_per_night: &BigDecimal, stay: &DateRange) -> BigDecimal {
    price_per_night * BigDecimal::from(stay.nights())
}

pub fn ensure_reviewable(status: BookingStatus) -> DomainResult<()> {
    if status != BookingStatus::Completed {
        return Err(DomainError::ReviewBeforeCompletion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stay(a: &str, b: &str) -> DateRange {
        DateRange::new(
            NaiveDate::parse_from_str(a, "%Y-%m-%d").unwrap(),
            NaiveDate::parse_from_str(b, "%Y-%m-%d").unwrap(),
        )
        .unwrap()
    }

    fn parties() -> Parties {
        Parties {
            guest_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn manual_confirm_only_from_pending() {
        assert_eq!(BookingStatus::Pending.confirm(), Ok(BookingStatus::Confirmed));
        for from in [
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(
                from.confirm(),
                Err(DomainError::InvalidTransition { from, action: "confirm" })
            );
        }
    }

    #[test]
    fn completed_booking_cannot_be_cancelled() {
        let err = BookingStatus::Completed.cancel().unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel a booking that is completed");
        assert!(BookingStatus::Cancelled.cancel().is_err());
        assert_eq!(BookingStatus::Confirmed.cancel(), Ok(BookingStatus::Cancelled));
    }

    #[test]
    fn complete_requires_confirmed() {
        assert_eq!(BookingStatus::Confirmed.complete(), Ok(BookingStatus::Completed));
        assert!(BookingStatus::Pending.complete().is_err());
    }

    #[test]
    fn payment_never_revives_terminal_bookings() {
        assert_eq!(
            BookingStatus::Pending.confirm_by_payment(),
            Some(BookingStatus::Confirmed)
        );
        assert_eq!(
            BookingStatus::Confirmed.confirm_by_payment(),
            Some(BookingStatus::Confirmed)
        );
        assert_eq!(BookingStatus::Cancelled.confirm_by_payment(), None);
        assert_eq!(BookingStatus::Completed.confirm_by_payment(), None);
    }

    #[test]
    fn parses_both_cancel_spellings() {
        assert_eq!("canceled".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::Cancelled.as_str(), "cancelled");
        assert!("archived".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn only_owner_confirms() {
        let p = parties();
        assert!(p.authorize_confirm(p.owner_id).is_ok());
        assert!(p.authorize_confirm(p.guest_id).unwrap_err().is_permission());
    }

    #[test]
    fn either_party_cancels_but_strangers_do_not() {
        let p = parties();
        assert!(p.authorize_cancel(p.guest_id).is_ok());
        assert!(p.authorize_cancel(p.owner_id).is_ok());
        assert!(p.authorize_cancel(Uuid::new_v4()).is_err());
    }

    #[test]
    fn payment_is_guest_only() {
        let p = parties();
        assert!(p.authorize_guest(p.guest_id).is_ok());
        assert!(p.authorize_guest(p.owner_id).is_err());
    }

    #[test]
    fn guest_count_bounds() {
        assert!(validate_guest_count(4, 4).is_ok());
        assert_eq!(
            validate_guest_count(5, 4),
            Err(DomainError::GuestCountExceeded { max: 4 })
        );
        assert_eq!(validate_guest_count(0, 4), Err(DomainError::GuestCountTooLow));
    }

    #[test]
    fn price_is_nights_times_rate() {
        let rate: BigDecimal = "120.50".parse().unwrap();
        let expected: BigDecimal = "482.00".parse().unwrap();
        assert_eq!(total_price(&rate, &stay("2024-06-01", "2024-06-05")), expected);
    }

    #[test]
    fn reviews_need_completed_stay() {
        assert!(ensure_reviewable(BookingStatus::Completed).is_ok());
        assert_eq!(
            ensure_reviewable(BookingStatus::Confirmed),
            Err(DomainError::ReviewBeforeCompletion)
        );
    }
}
