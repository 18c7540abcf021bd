use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use shared::NotificationKind;
use thiserror::Error;

use crate::dispatcher::BookingContext;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    Missing(String),

    #[error("could not read template: {0}")]
    Io(#[from] std::io::Error),
}

/// Values available to `{{ name }}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateVars {
    values: Vec<(&'static str, String)>,
}

impl TemplateVars {
    pub fn new(booking: &BookingContext, site_url: &str) -> Self {
        let listing_url = format!(
            "{}/listings/{}/",
            site_url.trim_end_matches('/'),
            booking.listing_id
        );
        Self {
            values: vec![
                ("guest_name", booking.guest_name.clone()),
                ("listing_title", booking.listing_title.clone()),
                ("booking_id", booking.booking_id.to_string()),
                ("check_in", booking.check_in.to_string()),
                ("check_out", booking.check_out.to_string()),
                ("number_of_guests", booking.number_of_guests.to_string()),
                ("total_price", booking.total_price.to_string()),
                ("listing_url", listing_url),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every `{{ name }}` in `template`. Unknown names render empty;
    /// an unterminated `{{` is copied through untouched.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    out.push_str(self.get(after[..end].trim()).unwrap_or_default());
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, kind: NotificationKind, vars: &TemplateVars)
        -> Result<String, TemplateError>;
}

/// HTML templates stored as `<dir>/<kind>.html`.
pub struct FileTemplates {
    dir: Option<PathBuf>,
}

impl FileTemplates {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl TemplateRenderer for FileTemplates {
    async fn render(
        &self,
        kind: NotificationKind,
        vars: &TemplateVars,
    ) -> Result<String, TemplateError> {
        let file_name = format!("{}.html", kind);
        let Some(dir) = &self.dir else {
            return Err(TemplateError::Missing(file_name));
        };
        let path = dir.join(&file_name);
        let template = match tokio::fs::read_to_string(&path).await {
            Ok(template) => template,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TemplateError::Missing(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(vars.substitute(&template))
    }
}

/// The text body every message carries.
pub fn plain_text(kind: NotificationKind, vars: &TemplateVars) -> String {
    let template = match kind {
        NotificationKind::BookingConfirmation => {
            "Dear {{ guest_name }},\n\
             \n\
             Your booking for {{ listing_title }} has been confirmed!\n\
             \n\
             Booking Details:\n\
             - Booking ID: {{ booking_id }}\n\
             - Check-in: {{ check_in }}\n\
             - Check-out: {{ check_out }}\n\
             - Guests: {{ number_of_guests }}\n\
             - Total Price: ${{ total_price }}\n\
             \n\
             View the listing: {{ listing_url }}\n\
             \n\
             Thank you for booking with us!"
        }
        NotificationKind::PaymentConfirmation => {
            "Dear {{ guest_name }},\n\
             \n\
             Your payment of ${{ total_price }} for {{ listing_title }} has been processed successfully!\n\
             \n\
             Booking ID: {{ booking_id }}\n\
             \n\
             Your booking is now confirmed.\n\
             \n\
             Thank you for your payment!"
        }
    };
    vars.substitute(template)
}
