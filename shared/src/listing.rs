use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    Apartment,
    House,
    Villa,
    Cabin,
    Resort,
    Hostel,
    Hotel,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Villa => "villa",
            PropertyType::Cabin => "cabin",
            PropertyType::Resort => "resort",
            PropertyType::Hostel => "hostel",
            PropertyType::Hotel => "hotel",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apartment" => Ok(PropertyType::Apartment),
            "house" => Ok(PropertyType::House),
            "villa" => Ok(PropertyType::Villa),
            "cabin" => Ok(PropertyType::Cabin),
            "resort" => Ok(PropertyType::Resort),
            "hostel" => Ok(PropertyType::Hostel),
            "hotel" => Ok(PropertyType::Hotel),
            other => Err(format!("unknown property type: {}", other)),
        }
    }
}

/// Listing fields whose invariants span more than one field or a decimal
/// floor. Single-field bounds are checked on the request types.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingTerms {
    pub price_per_night: BigDecimal,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
}

impl ListingTerms {
    pub fn validate(&self) -> DomainResult<()> {
        let min_price: BigDecimal = BigDecimal::new(1.into(), 2);
        if self.price_per_night < min_price {
            return Err(invalid("price_per_night must be at least 0.01"));
        }
        if self.available_from > self.available_to {
            return Err(invalid("available_from must not be after available_to"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> DomainError {
    DomainError::InvalidListing(message.to_string())
}

/// Trims tags, drops blanks and repeats while keeping the caller's order.
pub fn normalize_amenities<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }
    out
}
