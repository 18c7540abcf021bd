use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Gateway status strings that mean the money has settled.
const SUCCESS_STATUSES: [&str; 3] = ["success", "completed", "paid"];

static MISSING: Option<String> = None;

/// Body of `POST {base}/transaction/initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub amount: String,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    pub return_url: String,
}

/// `booking_<id>_<unix seconds>`, unique per payment attempt.
pub fn transaction_reference(booking_id: Uuid, unix_seconds: i64) -> String {
    format!("booking_{}_{}", booking_id, unix_seconds)
}

/// The fields we read out of a gateway reply. Gateways disagree on key names,
/// so each value is looked up through a fixed list of aliases. Any key may be
/// missing and scalar values of any JSON type are accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GatewayEnvelope {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: Option<GatewayData>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GatewayData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tx_ref: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub checkout_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link: Option<String>,
    #[serde(default, rename = "checkoutUrl", deserialize_with = "lenient_string")]
    pub checkout_url_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_status: Option<String>,
}

impl GatewayEnvelope {
    /// Never fails: anything that is not an object reads as an empty envelope.
    pub fn parse(raw: &Value) -> Self {
        match raw {
            Value::Object(_) => serde_json::from_value(raw.clone()).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// `data.id`, `data.reference`, `data.tx_ref`, in that order.
    pub fn transaction_id(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        first_present([&data.id, &data.reference, &data.tx_ref])
    }

    /// `data.checkout_url`, `data.link`, `data.checkoutUrl`, in that order.
    pub fn checkout_url(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        first_present([&data.checkout_url, &data.link, &data.checkout_url_camel])
    }

    /// `data.status`, then top-level `status`, then `data.transaction_status`.
    pub fn reported_status(&self) -> Option<&str> {
        let data = self.data.as_ref();
        first_present([
            data.map_or(&MISSING, |d| &d.status),
            &self.status,
            data.map_or(&MISSING, |d| &d.transaction_status),
        ])
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self.reported_status() {
            Some(status)
                if SUCCESS_STATUSES
                    .iter()
                    .any(|ok| status.eq_ignore_ascii_case(ok)) =>
            {
                PaymentStatus::Completed
            }
            _ => PaymentStatus::Failed,
        }
    }
}

fn first_present<'a, const N: usize>(candidates: [&'a Option<String>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_data<'de, D>(deserializer: D) -> Result<Option<GatewayData>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}
