#![forbid(unsafe_code)]

//! Encrypted at-rest storage for the storefront's two secrets.
//!
//! The vault file is one JSON envelope `{version, nonce, sealed}`, where
//! `sealed` is the AES-256-GCM encryption of every slot at once. Which slots
//! are filled is therefore not visible on disk. The 32-byte sealing key lives
//! next to the vault in a `.key` file created owner-only on first write.

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as B64URL};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tonewell_kernel_contracts::secret_ids::SecretId;

pub const VAULT_PATH_ENV: &str = "TONEWELL_SECRET_VAULT_PATH";

const ENVELOPE_VERSION: u8 = 1;
const SEALING_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SIGNING_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("secret value must not be blank")]
    BlankValue,
    #[error("sealing key {0} is missing while the vault exists")]
    MissingSealingKey(PathBuf),
    #[error("vault envelope version {0} is not supported")]
    UnsupportedVersion(u8),
    #[error("vault could not be unsealed")]
    Unseal,
    #[error("vault could not be sealed")]
    Seal,
    #[error("vault io: {0}")]
    Io(#[from] std::io::Error),
    #[error("vault format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("vault encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u8,
    nonce: String,
    sealed: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Slots {
    token_signing_key: Option<String>,
    stripe_api_key: Option<String>,
    signing_key_rotated_at: Option<u64>,
}

impl Slots {
    fn slot(&self, id: SecretId) -> Option<&str> {
        match id {
            SecretId::TokenSigningKey => self.token_signing_key.as_deref(),
            SecretId::StripeApiKey => self.stripe_api_key.as_deref(),
        }
    }

    fn slot_mut(&mut self, id: SecretId) -> &mut Option<String> {
        match id {
            SecretId::TokenSigningKey => &mut self.token_signing_key,
            SecretId::StripeApiKey => &mut self.stripe_api_key,
        }
    }
}

/// Which slots hold a value. Never carries the values themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultStatus {
    pub token_signing_key: bool,
    pub stripe_api_key: bool,
    pub signing_key_rotated_at: Option<u64>,
}

impl VaultStatus {
    pub fn is_set(&self, id: SecretId) -> bool {
        match id {
            SecretId::TokenSigningKey => self.token_signing_key,
            SecretId::StripeApiKey => self.stripe_api_key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecretVault {
    path: PathBuf,
    key_path: PathBuf,
}

impl SecretVault {
    /// Vault at `path`; the sealing key sits beside it with a `.key` extension.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key_path = path.with_extension("key");
        Self { path, key_path }
    }

    /// `TONEWELL_SECRET_VAULT_PATH`, else the per-user config directory.
    pub fn from_env() -> Self {
        let path = env::var(VAULT_PATH_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path);
        Self::at(path)
    }

    /// `$XDG_CONFIG_HOME/tonewell/secret_vault.json`, falling back to
    /// `~/.config`.
    pub fn default_path() -> PathBuf {
        let config_root = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        config_root.join("tonewell").join("secret_vault.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolve(&self, id: SecretId) -> Result<Option<SecretString>, VaultError> {
        let slots = self.open()?;
        Ok(slots.slot(id).map(|v| SecretString::from(v.to_string())))
    }

    pub fn status(&self) -> Result<VaultStatus, VaultError> {
        let slots = self.open()?;
        Ok(VaultStatus {
            token_signing_key: slots.token_signing_key.is_some(),
            stripe_api_key: slots.stripe_api_key.is_some(),
            signing_key_rotated_at: slots.signing_key_rotated_at,
        })
    }

    pub fn store(&self, id: SecretId, value: &SecretString) -> Result<(), VaultError> {
        let value = value.expose_secret().trim();
        if value.is_empty() {
            return Err(VaultError::BlankValue);
        }
        let mut slots = self.open()?;
        *slots.slot_mut(id) = Some(value.to_string());
        if id == SecretId::TokenSigningKey {
            slots.signing_key_rotated_at = None;
        }
        self.seal(&slots)
    }

    /// Empties one slot. Returns whether it held a value.
    pub fn clear(&self, id: SecretId) -> Result<bool, VaultError> {
        let mut slots = self.open()?;
        let had_value = slots.slot_mut(id).take().is_some();
        if had_value {
            self.seal(&slots)?;
        }
        Ok(had_value)
    }

    /// Replaces the token signing key with 32 fresh random bytes. Download
    /// links issued under the old key stop verifying once the storefront
    /// restarts.
    pub fn rotate_signing_key(&self) -> Result<(), VaultError> {
        let mut raw = [0u8; SIGNING_KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        let mut slots = self.open()?;
        slots.token_signing_key = Some(B64URL.encode(raw));
        slots.signing_key_rotated_at = Some(now_unix_secs());
        self.seal(&slots)?;
        tracing::info!(vault = %self.path.display(), "token signing key rotated");
        Ok(())
    }

    fn open(&self) -> Result<Slots, VaultError> {
        if !self.path.exists() {
            return Ok(Slots::default());
        }
        let envelope: Envelope = serde_json::from_slice(&fs::read(&self.path)?)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(envelope.version));
        }
        if !self.key_path.exists() {
            return Err(VaultError::MissingSealingKey(self.key_path.clone()));
        }
        let cipher = self.cipher()?;
        let nonce = BASE64.decode(envelope.nonce)?;
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Unseal);
        }
        let sealed = BASE64.decode(envelope.sealed)?;
        let plain = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|_| VaultError::Unseal)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    fn seal(&self, slots: &Slots) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.key_path.exists() {
            let mut key = [0u8; SEALING_KEY_LEN];
            OsRng.fill_bytes(&mut key);
            create_owner_only(&self.key_path, BASE64.encode(key).as_bytes())?;
        }
        let cipher = self.cipher()?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), serde_json::to_vec(slots)?.as_ref())
            .map_err(|_| VaultError::Seal)?;
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            nonce: BASE64.encode(nonce),
            sealed: BASE64.encode(sealed),
        };
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&envelope)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key = BASE64.decode(fs::read_to_string(&self.key_path)?.trim())?;
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Unseal)
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn create_owner_only(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
