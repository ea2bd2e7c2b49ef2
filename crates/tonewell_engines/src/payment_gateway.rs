#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tonewell_kernel_contracts::payment::{PaymentMetadata, PaymentStatus};

pub const STRIPE_API_BASE_DEFAULT: &str = "https://api.stripe.com";
const STRIPE_TIMEOUT_MS_DEFAULT: u64 = 10_000;
const SESSION_ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider is not configured")]
    NotConfigured,
    #[error("invalid checkout session id")]
    InvalidSessionId,
    #[error("payment provider returned http {0}")]
    HttpStatus(u16),
    #[error("payment provider transport error: {0}")]
    Transport(String),
    #[error("payment provider response malformed: {0}")]
    MalformedResponse(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub metadata: PaymentMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionStatus {
    pub id: String,
    pub payment_status: PaymentStatus,
    pub metadata: PaymentMetadata,
}

/// Hosted checkout provider. Implementations block on network IO.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError>;
}

pub struct StripeGateway {
    agent: ureq::Agent,
    api_key: SecretString,
    api_base: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_api_base(api_key, STRIPE_API_BASE_DEFAULT)
    }

    pub fn with_api_base(api_key: SecretString, api_base: &str) -> Self {
        let timeout = Duration::from_millis(STRIPE_TIMEOUT_MS_DEFAULT);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn authorization(&self) -> Result<String, PaymentError> {
        let key = self.api_key.expose_secret();
        if key.trim().is_empty() {
            return Err(PaymentError::NotConfigured);
        }
        Ok(format!("Bearer {key}"))
    }
}

impl PaymentGateway for StripeGateway {
    fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let auth = self.authorization()?;
        let fields = checkout_form_fields(request);
        let form: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let response = self
            .agent
            .post(&format!("{}/v1/checkout/sessions", self.api_base))
            .set("Authorization", &auth)
            .send_form(&form)
            .map_err(payment_error_from_ureq)?;
        let body: Value = serde_json::from_reader(response.into_reader())
            .map_err(|_| PaymentError::MalformedResponse("json_parse"))?;
        parse_checkout_session(&body)
    }

    fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError> {
        validate_session_id(session_id)?;
        let auth = self.authorization()?;
        let response = self
            .agent
            .get(&format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.api_base
            ))
            .set("Authorization", &auth)
            .call()
            .map_err(payment_error_from_ureq)?;
        let body: Value = serde_json::from_reader(response.into_reader())
            .map_err(|_| PaymentError::MalformedResponse("json_parse"))?;
        parse_session_status(&body)
    }
}

/// Form body for `POST /v1/checkout/sessions`: one card payment of one unit
/// with the tone metadata attached.
pub fn checkout_form_fields(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut fields = vec![
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("mode".to_string(), "payment".to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
    ];
    for (key, value) in request.metadata.to_map() {
        fields.push((format!("metadata[{key}]"), value));
    }
    fields.push(("success_url".to_string(), request.success_url.clone()));
    fields.push(("cancel_url".to_string(), request.cancel_url.clone()));
    fields
}

pub fn validate_session_id(session_id: &str) -> Result<(), PaymentError> {
    if session_id.is_empty()
        || session_id.len() > SESSION_ID_MAX_LEN
        || !session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PaymentError::InvalidSessionId);
    }
    Ok(())
}

pub fn parse_checkout_session(body: &Value) -> Result<CheckoutSession, PaymentError> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or(PaymentError::MalformedResponse("missing id"))?;
    let url = body
        .get("url")
        .and_then(Value::as_str)
        .ok_or(PaymentError::MalformedResponse("missing url"))?;
    Ok(CheckoutSession {
        id: id.to_string(),
        url: url.to_string(),
    })
}

pub fn parse_session_status(body: &Value) -> Result<CheckoutSessionStatus, PaymentError> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or(PaymentError::MalformedResponse("missing id"))?;
    let payment_status = body
        .get("payment_status")
        .and_then(Value::as_str)
        .map(PaymentStatus::parse)
        .unwrap_or(PaymentStatus::Unpaid);
    let mut metadata = BTreeMap::new();
    if let Some(map) = body.get("metadata").and_then(Value::as_object) {
        for (key, value) in map {
            if let Some(s) = value.as_str() {
                metadata.insert(key.clone(), s.to_string());
            }
        }
    }
    Ok(CheckoutSessionStatus {
        id: id.to_string(),
        payment_status,
        metadata: PaymentMetadata::from_map(&metadata),
    })
}

fn payment_error_from_ureq(err: ureq::Error) -> PaymentError {
    match err {
        ureq::Error::Status(status, _) => PaymentError::HttpStatus(status),
        ureq::Error::Transport(transport) => PaymentError::Transport(transport.to_string()),
    }
}
