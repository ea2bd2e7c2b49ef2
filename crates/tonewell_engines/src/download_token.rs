#![forbid(unsafe_code)]

//! Stateless, expiring download tokens.
//!
//! A token is `base64url(claims) "." base64url(hmac)`, where the claims are
//! the file path and the issue time in unix seconds and the MAC is
//! HMAC-SHA256 over a fixed salt plus the encoded claims. Nothing is stored
//! server side: any process holding the same secret can verify a token.
//!
//! # Security Properties
//!
//! - The path travels in plaintext but is bound by the MAC, so a holder
//!   cannot swap in another path.
//! - MAC comparison is constant-time (`subtle`).
//! - Leaking the secret makes every token forgeable until the key rotates.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const DOWNLOAD_TOKEN_MAX_AGE_SECS: u64 = 60 * 60;

const TOKEN_SALT: &[u8] = b"tonewell.download.v1";
const TOKEN_SEPARATOR: char = '.';

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("download token signature does not verify")]
    InvalidSignature,
    #[error("download token is {age_secs}s old, limit is {max_age_secs}s")]
    ExpiredToken { age_secs: i64, max_age_secs: u64 },
    #[error("download token claims could not be encoded: {0}")]
    ClaimsEncoding(String),
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct TokenClaims {
    #[serde(rename = "p")]
    path: String,
    #[serde(rename = "t")]
    issued_at_secs: u64,
}

/// Issues and verifies download tokens under one process-wide secret.
#[derive(Clone)]
pub struct DownloadTokenSigner {
    keyed_mac: HmacSha256,
}

impl std::fmt::Debug for DownloadTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DownloadTokenSigner { .. }")
    }
}

impl DownloadTokenSigner {
    pub fn new(secret: &SecretString) -> Result<Self, TokenError> {
        let raw = secret.expose_secret();
        if raw.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let keyed_mac =
            HmacSha256::new_from_slice(raw.as_bytes()).map_err(|_| TokenError::EmptySecret)?;
        Ok(Self { keyed_mac })
    }

    pub fn issue(&self, file_path: &str) -> Result<String, TokenError> {
        self.issue_at(file_path, now_unix_secs())
    }

    pub fn issue_at(&self, file_path: &str, issued_at_secs: u64) -> Result<String, TokenError> {
        let claims = TokenClaims {
            path: file_path.to_string(),
            issued_at_secs,
        };
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| TokenError::ClaimsEncoding(e.to_string()))?;
        let encoded_claims = B64URL.encode(claims_json);
        let signature = B64URL.encode(self.sign(encoded_claims.as_bytes()));
        Ok(format!("{encoded_claims}{TOKEN_SEPARATOR}{signature}"))
    }

    /// Returns the embedded path when the MAC verifies and the token is at
    /// most `max_age_secs` old.
    pub fn verify(&self, token: &str, max_age_secs: u64) -> Result<String, TokenError> {
        self.verify_at(token, max_age_secs, now_unix_secs())
    }

    pub fn verify_at(
        &self,
        token: &str,
        max_age_secs: u64,
        now_secs: u64,
    ) -> Result<String, TokenError> {
        let (encoded_claims, encoded_signature) = token
            .split_once(TOKEN_SEPARATOR)
            .ok_or(TokenError::InvalidSignature)?;
        let presented = B64URL
            .decode(encoded_signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        let expected = self.sign(encoded_claims.as_bytes());
        if !bool::from(expected.ct_eq(&presented)) {
            tracing::warn!("download token signature verification failed");
            return Err(TokenError::InvalidSignature);
        }

        let claims_raw = B64URL
            .decode(encoded_claims)
            .map_err(|_| TokenError::InvalidSignature)?;
        let claims: TokenClaims =
            serde_json::from_slice(&claims_raw).map_err(|_| TokenError::InvalidSignature)?;

        let age_secs = now_secs as i64 - claims.issued_at_secs as i64;
        if age_secs < 0 || age_secs as u64 > max_age_secs {
            return Err(TokenError::ExpiredToken {
                age_secs,
                max_age_secs,
            });
        }
        Ok(claims.path)
    }

    fn sign(&self, encoded_claims: &[u8]) -> Vec<u8> {
        let mut mac = self.keyed_mac.clone();
        mac.update(TOKEN_SALT);
        mac.update(&[TOKEN_SEPARATOR as u8]);
        mac.update(encoded_claims);
        mac.finalize().into_bytes().to_vec()
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
