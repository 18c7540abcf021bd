//! Diesel queries, one module per table. Functions take a connection rather
//! than the pool so callers can compose them inside a transaction.

pub mod bookings;
pub mod listings;
pub mod payments;
pub mod reviews;
pub mod users;

/// `%value%` for ILIKE, with the pattern metacharacters escaped.
pub(crate) fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
