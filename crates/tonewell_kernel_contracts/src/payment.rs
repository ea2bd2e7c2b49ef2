#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::tone::{
    parse_duration_secs, ToneRequest, CUSTOM_CATEGORY_KEY, TONE_DURATION_DEFAULT_SECS,
};
use crate::ContractViolation;

pub const METADATA_KEY_CATEGORY: &str = "category";
pub const METADATA_KEY_DURATION: &str = "duration";
pub const METADATA_KEY_FREQUENCY: &str = "frequency";

/// The metadata bag attached to a checkout session. All values travel as
/// strings through the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct PaymentMetadata {
    pub category: Option<String>,
    pub duration: Option<String>,
    pub frequency: Option<String>,
}

impl PaymentMetadata {
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        Self {
            category: map.get(METADATA_KEY_CATEGORY).cloned(),
            duration: map.get(METADATA_KEY_DURATION).cloned(),
            frequency: map.get(METADATA_KEY_FREQUENCY).cloned(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (key, value) in [
            (METADATA_KEY_CATEGORY, &self.category),
            (METADATA_KEY_DURATION, &self.duration),
            (METADATA_KEY_FREQUENCY, &self.frequency),
        ] {
            out.insert(key.to_string(), value.clone().unwrap_or_default());
        }
        out
    }

    /// Converts the bag into a tone request. The bag is trusted as-is once the
    /// session is paid; nothing here checks it against the amount charged.
    /// The frequency field is only read for the custom category.
    pub fn to_tone_request(&self) -> Result<ToneRequest, ContractViolation> {
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let duration = match self.duration.as_deref().map(str::trim) {
            None | Some("") => i64::from(TONE_DURATION_DEFAULT_SECS),
            Some(raw) => parse_duration_secs(raw, "payment_metadata.duration")?,
        };
        let frequency = match self.frequency.as_deref().map(str::trim) {
            _ if category != CUSTOM_CATEGORY_KEY => None,
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                ContractViolation::InvalidValue {
                    field: "payment_metadata.frequency",
                    reason: "must be a number",
                }
            })?),
        };
        ToneRequest::v1(category, duration, frequency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "paid" => Self::Paid,
            "no_payment_required" => Self::NoPaymentRequired,
            _ => Self::Unpaid,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::NoPaymentRequired => "no_payment_required",
        }
    }
}
