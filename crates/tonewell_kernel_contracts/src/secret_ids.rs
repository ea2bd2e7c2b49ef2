#![forbid(unsafe_code)]

/// Keys the encrypted secret vault is allowed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecretId {
    TokenSigningKey,
    StripeApiKey,
}

impl SecretId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenSigningKey => "token_signing_key",
            Self::StripeApiKey => "stripe_api_key",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::TokenSigningKey, Self::StripeApiKey]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "token_signing_key" => Some(Self::TokenSigningKey),
            "stripe_api_key" => Some(Self::StripeApiKey),
            _ => None,
        }
    }

    pub fn allowed_key_names() -> Vec<&'static str> {
        Self::all().iter().map(|id| id.as_str()).collect()
    }
}
