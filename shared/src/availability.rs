use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A half-open stay `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> DomainResult<Self> {
        if check_in >= check_out {
            return Err(DomainError::InvalidDateRange);
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Two stays conflict when they share at least one night. Stays that touch
    /// at the boundary (one checks out the day the other checks in) do not.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        other.check_in < self.check_out && other.check_out > self.check_in
    }
}

/// The parts of a listing that decide whether it can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    pub is_active: bool,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
}

impl ListingWindow {
    pub fn covers(&self, range: &DateRange) -> bool {
        range.check_in >= self.available_from && range.check_out <= self.available_to
    }
}

/// `booked` must hold the stays of bookings that still hold the listing
/// (pending or confirmed); callers filter by status before asking.
pub fn is_available(window: &ListingWindow, booked: &[DateRange], requested: &DateRange) -> bool {
    window.is_active
        && window.covers(requested)
        && !booked.iter().any(|existing| existing.overlaps(requested))
}
