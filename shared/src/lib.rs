pub mod availability;
pub mod booking;
pub mod error;
pub mod listing;
pub mod notification;
pub mod payment;
pub mod query;

pub use availability::{is_available, DateRange, ListingWindow};
pub use booking::{BookingStatus, Parties};
pub use error::{DomainError, DomainResult};
pub use listing::{ListingTerms, PropertyType};
pub use notification::{NotificationCommand, NotificationKind};
pub use payment::{GatewayEnvelope, InitializeRequest, PaymentStatus};
