use thiserror::Error;

use crate::booking::BookingStatus;

/// Rule violations raised by the pure domain layer.
///
/// The HTTP layer maps each variant onto a status code, so the messages here
/// are written to be shown to API clients as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Check-out date must be after check-in date.")]
    InvalidDateRange,

    #[error("Number of guests cannot exceed {max}.")]
    GuestCountExceeded { max: i32 },

    #[error("Number of guests must be at least 1.")]
    GuestCountTooLow,

    #[error("Cannot {action} a booking that is {from}")]
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
    },

    #[error("{0}")]
    PermissionDenied(&'static str),

    #[error("Listing is not available for the requested dates")]
    Unavailable,

    #[error("Invalid listing: {0}")]
    InvalidListing(String),

    #[error("Only completed bookings can be reviewed")]
    ReviewBeforeCompletion,
}

impl DomainError {
    pub fn is_permission(&self) -> bool {
        matches!(self, DomainError::PermissionDenied(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Unavailable)
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
