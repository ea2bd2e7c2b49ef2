#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use tonewell_engines::download_token::DOWNLOAD_TOKEN_MAX_AGE_SECS;
use tonewell_engines::secret_vault::{SecretVault, VaultError, VAULT_PATH_ENV};
use tonewell_engines::tone_tool::ToneToolKind;
use tonewell_kernel_contracts::secret_ids::SecretId;
use tonewell_kernel_contracts::tone::CUSTOM_CATEGORY_KEY;
use tonewell_storage::artifact_store::DOWNLOADED_ARTIFACT_TTL;
use url::Url;

pub const PROFILE_ENV: &str = "TONEWELL_ENV";

const DEFAULT_PORT: u16 = 5000;
const DEV_SECRET_KEY: &str = "devkey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunProfile {
    Development,
    Production,
}

impl RunProfile {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "production" || v == "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// The dotenv file loaded for this profile, relative to the working
    /// directory.
    pub const fn env_file_name(self) -> &'static str {
        match self {
            Self::Development => ".env.development",
            Self::Production => ".env.production",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
    #[error("invalid public base url {0:?}")]
    InvalidBaseUrl(String),
    #[error("TONEWELL_SECRET_KEY (or vault token_signing_key) is required in production")]
    MissingSecretKey,
    #[error("unknown tone tool {0:?}, expected sox or native")]
    InvalidToneTool(String),
    #[error("env file {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },
    #[error("cannot resolve relative scratch dir: {0}")]
    WorkingDir(#[source] std::io::Error),
    #[error("secret vault: {0}")]
    Vault(#[from] VaultError),
}

/// Process-wide settings, read once at startup and shared read-only.
#[derive(Debug)]
pub struct StorefrontConfig {
    pub profile: RunProfile,
    pub bind: SocketAddr,
    pub public_base_url: Url,
    pub secret_key: SecretString,
    pub stripe_api_key: SecretString,
    pub price_id_preset: String,
    pub price_id_custom: String,
    pub tones_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub tone_tool: ToneToolKind,
    pub sox_program: PathBuf,
    pub download_expiry: Duration,
    pub post_download_expiry: Duration,
}

impl StorefrontConfig {
    /// Reads the process environment layered over the profile's env file
    /// (`.env.development` or `.env.production`). Process variables win.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = RunProfile::parse(env::var(PROFILE_ENV).ok().as_deref());
        let env_file = Path::new(profile.env_file_name());
        let file_vars = read_env_file(env_file)?;
        if !file_vars.is_empty() {
            tracing::info!(
                path = %env_file.display(),
                vars = file_vars.len(),
                "loaded env file"
            );
        }
        let lookup = layered_lookup(|key| env::var(key).ok(), &file_vars);
        let vault = SecretVault::at(
            lookup(VAULT_PATH_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(SecretVault::default_path),
        );
        Self::from_lookup(lookup, Some(&vault))
    }

    /// Builds the config from an arbitrary variable source. Secrets missing
    /// from the source fall back to `vault` when one is given.
    pub fn from_lookup<F>(lookup: F, vault: Option<&SecretVault>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let profile = RunProfile::parse(get(PROFILE_ENV).as_deref());

        let bind_raw = match (get("TONEWELL_HTTP_BIND"), get("PORT")) {
            (Some(bind), _) => bind,
            (None, Some(port)) => format!("0.0.0.0:{port}"),
            (None, None) => format!("127.0.0.1:{DEFAULT_PORT}"),
        };
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_raw.clone()))?;

        let base_raw = get("TONEWELL_PUBLIC_BASE_URL").unwrap_or_else(|| {
            let host = if bind.ip().is_unspecified() {
                "127.0.0.1".to_string()
            } else {
                bind.ip().to_string()
            };
            format!("http://{host}:{}/", bind.port())
        });
        let public_base_url = parse_base_url(&base_raw)?;

        let secret_key = match get("TONEWELL_SECRET_KEY") {
            Some(v) => SecretString::from(v),
            None => match vault_secret(vault, SecretId::TokenSigningKey)? {
                Some(v) => v,
                None if profile == RunProfile::Development => SecretString::from(DEV_SECRET_KEY),
                None => return Err(ConfigError::MissingSecretKey),
            },
        };
        let stripe_api_key = match get("STRIPE_API_KEY") {
            Some(v) => SecretString::from(v),
            None => vault_secret(vault, SecretId::StripeApiKey)?
                .unwrap_or_else(|| SecretString::from("")),
        };

        let tone_tool = match get("TONEWELL_TONE_TOOL") {
            Some(raw) => ToneToolKind::parse(&raw).ok_or(ConfigError::InvalidToneTool(raw))?,
            None => ToneToolKind::Sox,
        };

        Ok(Self {
            profile,
            bind,
            public_base_url,
            secret_key,
            stripe_api_key,
            price_id_preset: get("STRIPE_PRICE_ID_PRESET").unwrap_or_default(),
            price_id_custom: get("STRIPE_PRICE_ID_CUSTOM").unwrap_or_default(),
            tones_dir: get("TONEWELL_TONES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tones")),
            scratch_dir: absolutize(
                get("TONEWELL_SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(env::temp_dir),
            )?,
            tone_tool,
            sox_program: get("TONEWELL_SOX_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sox")),
            // Token lifetime and the issued-file expiry are one window.
            download_expiry: Duration::from_secs(DOWNLOAD_TOKEN_MAX_AGE_SECS),
            post_download_expiry: DOWNLOADED_ARTIFACT_TTL,
        })
    }

    /// The custom tone is priced separately from every preset.
    pub fn price_id_for(&self, category: &str) -> &str {
        if category == CUSTOM_CATEGORY_KEY {
            &self.price_id_custom
        } else {
            &self.price_id_preset
        }
    }

    pub fn download_expiry_minutes(&self) -> u64 {
        self.download_expiry.as_secs() / 60
    }
}

/// Reads `KEY=value` pairs from a dotenv file. A missing file yields none.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let env_file_error = |err: dotenvy::Error| ConfigError::EnvFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.map(|item| item.map_err(env_file_error)).collect(),
        Err(err) if err.not_found() => Ok(BTreeMap::new()),
        Err(err) => Err(env_file_error(err)),
    }
}

/// A lookup that consults `process` first and `file` second.
pub fn layered_lookup<'a, F>(
    process: F,
    file: &'a BTreeMap<String, String>,
) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |key| process(key).or_else(|| file.get(key).cloned())
}

// Artifact paths travel inside download tokens, so they must not depend on
// the working directory at redemption time.
fn absolutize(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(env::current_dir()
        .map_err(ConfigError::WorkingDir)?
        .join(path))
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash).map_err(|_| ConfigError::InvalidBaseUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

fn vault_secret(
    vault: Option<&SecretVault>,
    id: SecretId,
) -> Result<Option<SecretString>, ConfigError> {
    match vault {
        Some(vault) => Ok(vault.resolve(id)?),
        None => Ok(None),
    }
}
