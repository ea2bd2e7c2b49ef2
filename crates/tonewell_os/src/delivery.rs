#![forbid(unsafe_code)]

//! Purchase-to-download orchestration: checkout creation, payment
//! confirmation, tone generation, token issue and redemption.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::{ExposeSecret, SecretString};
use tokio::runtime::Handle;
use tonewell_engines::catalog::{CatalogEntry, CatalogGroup, ToneCatalog};
use tonewell_engines::download_token::{DownloadTokenSigner, TokenError};
use tonewell_engines::payment_gateway::{
    CheckoutSessionRequest, PaymentError, PaymentGateway, StripeGateway,
};
use tonewell_engines::synth::{SynthError, ToneSynthesizer};
use tonewell_engines::tone_tool::{NativeToneTool, SoxToneTool, ToneTool, ToneToolKind};
use tonewell_kernel_contracts::payment::{PaymentMetadata, PaymentStatus};
use tonewell_kernel_contracts::tone::{
    clamp_duration_secs, parse_duration_secs, TONE_DURATION_DEFAULT_SECS,
};
use tonewell_kernel_contracts::ContractViolation;
use tonewell_storage::artifact_store::ExpiringArtifactStore;
use tonewell_storage::asset_dir::PrebuiltAssetDir;

use crate::config::StorefrontConfig;

const DEFAULT_TONE_NAME: &str = "Your Tone";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("download token signature is invalid")]
    InvalidSignature,
    #[error("download token expired")]
    ExpiredToken,
    #[error("artifact no longer exists")]
    ArtifactMissing,
    #[error("payment status is {}", .0.as_str())]
    PaymentNotConfirmed(PaymentStatus),
    #[error("missing checkout session id")]
    MissingSessionId,
    #[error("payment lookup failed: {0}")]
    PaymentLookup(PaymentError),
    #[error("checkout creation failed: {0}")]
    CheckoutFailed(PaymentError),
    /// The checkout form was refused before any session was created.
    #[error("checkout rejected ({kind}): {reason}")]
    CheckoutRejected { kind: &'static str, reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ContractViolation),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// The flash message shown to the shopper.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownCategory(_) | Self::SynthesisFailure(_) => "Failed to generate tone.",
            Self::InvalidSignature | Self::ExpiredToken => "Download expired.",
            Self::ArtifactMissing => "File expired.",
            Self::PaymentNotConfirmed(_) => "Payment not completed.",
            Self::MissingSessionId => "Missing session ID.",
            Self::PaymentLookup(_) => "Unable to verify payment.",
            Self::CheckoutFailed(_) | Self::CheckoutRejected { .. } => {
                "Payment initialization failed."
            }
            Self::InvalidRequest(_) => "Invalid tone request.",
            Self::Internal(_) => "Error during download.",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCategory(_) => "UNKNOWN_CATEGORY",
            Self::SynthesisFailure(_) => "SYNTHESIS_FAILURE",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::ArtifactMissing => "ARTIFACT_MISSING",
            Self::PaymentNotConfirmed(_) => "PAYMENT_NOT_CONFIRMED",
            Self::MissingSessionId => "MISSING_SESSION_ID",
            Self::PaymentLookup(_) => "PAYMENT_LOOKUP_FAILED",
            Self::CheckoutFailed(_) => "CHECKOUT_FAILED",
            Self::CheckoutRejected { .. } => "CHECKOUT_REJECTED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<SynthError> for DeliveryError {
    fn from(value: SynthError) -> Self {
        match value {
            SynthError::UnknownCategory(key) => Self::UnknownCategory(key),
            other => Self::SynthesisFailure(other.to_string()),
        }
    }
}

impl From<TokenError> for DeliveryError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::ExpiredToken { .. } => Self::ExpiredToken,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::EmptySecret | TokenError::ClaimsEncoding(_) => {
                Self::Internal(value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct CheckoutForm {
    pub category: Option<String>,
    pub duration: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PurchaseReceipt {
    pub download_token: String,
    pub download_url: String,
    pub tone_name: String,
    pub tone_file: String,
    pub expires_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub file_path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CatalogListingEntry {
    pub key: &'static str,
    pub description: &'static str,
    pub preview_file: Option<&'static str>,
    pub frequencies_hz: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CatalogListing {
    pub chakras: Vec<CatalogListingEntry>,
    pub sacred: Vec<CatalogListingEntry>,
    pub noises: Vec<CatalogListingEntry>,
    pub planets: Vec<CatalogListingEntry>,
    pub custom: Vec<CatalogListingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HealthReport {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

pub struct DeliveryService {
    config: Arc<StorefrontConfig>,
    synth: ToneSynthesizer,
    store: ExpiringArtifactStore,
    assets: PrebuiltAssetDir,
    signer: DownloadTokenSigner,
    gateway: Arc<dyn PaymentGateway>,
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("profile", &self.config.profile)
            .field("synth", &self.synth)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl DeliveryService {
    pub fn new(
        config: Arc<StorefrontConfig>,
        tool: Arc<dyn ToneTool>,
        gateway: Arc<dyn PaymentGateway>,
        runtime: Handle,
    ) -> Result<Self, DeliveryError> {
        let synth = ToneSynthesizer::new(
            ToneCatalog::standard(),
            config.tones_dir.clone(),
            config.scratch_dir.clone(),
            tool,
        );
        let store = ExpiringArtifactStore::new(config.scratch_dir.clone(), runtime);
        store
            .ensure_scratch_dir()
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;
        let assets = PrebuiltAssetDir::new(config.tones_dir.clone());
        let signer = DownloadTokenSigner::new(&config.secret_key)?;
        Ok(Self {
            config,
            synth,
            store,
            assets,
            signer,
            gateway,
        })
    }

    /// Wires the configured tone tool and the Stripe gateway.
    pub fn from_config(config: Arc<StorefrontConfig>, runtime: Handle) -> Result<Self, DeliveryError> {
        let tool: Arc<dyn ToneTool> = match config.tone_tool {
            ToneToolKind::Sox => Arc::new(SoxToneTool::new(config.sox_program.clone())),
            ToneToolKind::Native => Arc::new(NativeToneTool::default()),
        };
        let gateway = Arc::new(StripeGateway::new(SecretString::from(
            config.stripe_api_key.expose_secret(),
        )));
        Self::new(config, tool, gateway, runtime)
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn create_checkout(&self, form: &CheckoutForm) -> Result<CheckoutRedirect, DeliveryError> {
        let request = self.checkout_request(form).map_err(|err| {
            tracing::warn!(kind = err.kind(), error = %err, "checkout form rejected");
            DeliveryError::CheckoutRejected {
                kind: err.kind(),
                reason: err.to_string(),
            }
        })?;
        let session = self
            .gateway
            .create_checkout_session(&request)
            .map_err(|err| {
                tracing::error!(error = %err, "checkout session creation failed");
                DeliveryError::CheckoutFailed(err)
            })?;
        tracing::info!(
            category = request.metadata.category.as_deref().unwrap_or_default(),
            session_id = %session.id,
            "checkout created"
        );
        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
        })
    }

    fn checkout_request(
        &self,
        form: &CheckoutForm,
    ) -> Result<CheckoutSessionRequest, DeliveryError> {
        let category = form
            .category
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if !self.synth.catalog().contains(&category) {
            return Err(DeliveryError::UnknownCategory(category));
        }
        let duration = match form.duration.as_deref().map(str::trim) {
            None | Some("") => TONE_DURATION_DEFAULT_SECS,
            Some(raw) => clamp_duration_secs(parse_duration_secs(raw, "checkout_form.duration")?),
        };
        let frequency = form
            .frequency
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let metadata = PaymentMetadata {
            category: Some(category.clone()),
            duration: Some(duration.to_string()),
            frequency: Some(frequency),
        };
        // Reject bad custom frequencies before the shopper pays.
        metadata.to_tone_request()?;

        Ok(CheckoutSessionRequest {
            price_id: self.config.price_id_for(&category).to_string(),
            metadata,
            success_url: format!(
                "{}?session_id={{CHECKOUT_SESSION_ID}}",
                self.public_url("success")
            ),
            cancel_url: self.public_url(""),
        })
    }

    /// Confirms payment, renders the tone and issues its download token.
    /// Blocks on the payment provider and on the tone tool.
    pub fn complete_purchase(
        &self,
        session_id: Option<&str>,
    ) -> Result<PurchaseReceipt, DeliveryError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(DeliveryError::MissingSessionId)?;
        let session = self
            .gateway
            .retrieve_checkout_session(session_id)
            .map_err(|err| {
                tracing::warn!(error = %err, "payment lookup failed");
                DeliveryError::PaymentLookup(err)
            })?;
        if session.payment_status != PaymentStatus::Paid {
            return Err(DeliveryError::PaymentNotConfirmed(session.payment_status));
        }

        // The paid session's metadata is taken verbatim; the price charged is
        // not cross-checked against the category or duration requested.
        let request = session.metadata.to_tone_request()?;
        let artifact = self.synth.generate(&request).map_err(|err| {
            tracing::error!(category = %request.category, error = %err, "tone generation failed");
            DeliveryError::from(err)
        })?;
        self.store
            .schedule_artifact_expiry(&artifact, self.config.download_expiry)
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;

        let download_token = self.signer.issue(&artifact.file_path.to_string_lossy())?;
        let tone_name = session
            .metadata
            .category
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TONE_NAME.to_string());
        Ok(PurchaseReceipt {
            download_url: self.download_url(&download_token),
            download_token,
            tone_name,
            tone_file: artifact.file_name(),
            expires_minutes: self.config.download_expiry_minutes(),
        })
    }

    pub fn redeem_download(&self, token: &str) -> Result<Redemption, DeliveryError> {
        self.redeem_download_at(token, now_unix_secs())
    }

    /// Verifies the token at `now_secs` and, on success, arms the short
    /// post-download expiry for the file.
    pub fn redeem_download_at(
        &self,
        token: &str,
        now_secs: u64,
    ) -> Result<Redemption, DeliveryError> {
        let path = self
            .signer
            .verify_at(token, self.config.download_expiry.as_secs(), now_secs)?;
        let file_path = PathBuf::from(path);
        if !self.store.artifact_exists(&file_path) {
            return Err(DeliveryError::ArtifactMissing);
        }
        self.store
            .schedule_expiry(&file_path, self.config.post_download_expiry)
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Redemption {
            file_path,
            file_name,
        })
    }

    pub fn resolve_preview(&self, filename: &str) -> Option<PathBuf> {
        self.assets.resolve(filename)
    }

    pub fn catalog_listing(&self) -> CatalogListing {
        let catalog = self.synth.catalog();
        let group = |g: CatalogGroup| -> Vec<CatalogListingEntry> {
            catalog.group(g).map(listing_entry).collect()
        };
        CatalogListing {
            chakras: group(CatalogGroup::Chakra),
            sacred: group(CatalogGroup::Sacred),
            noises: group(CatalogGroup::Noise),
            planets: group(CatalogGroup::Planet),
            custom: group(CatalogGroup::Custom),
        }
    }

    pub fn health(&self) -> HealthReport {
        let mut problems = Vec::new();
        if let Err(err) = self.store.ensure_scratch_dir() {
            problems.push(format!("scratch dir unavailable: {err}"));
        } else if is_readonly(self.store.scratch_dir()) {
            problems.push("scratch dir is read-only".to_string());
        }
        if !self.assets.is_readable() {
            problems.push(format!(
                "asset dir {} unreadable",
                self.assets.root().display()
            ));
        }
        if problems.is_empty() {
            HealthReport {
                status: "ok".to_string(),
                outcome: "HEALTHY".to_string(),
                reason: None,
            }
        } else {
            HealthReport {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(problems.join("; ")),
            }
        }
    }

    pub fn download_url(&self, token: &str) -> String {
        self.public_url(&format!("download/{token}"))
    }

    fn public_url(&self, relative: &str) -> String {
        self.config
            .public_base_url
            .join(relative)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{relative}", self.config.public_base_url))
    }
}

fn listing_entry(entry: &CatalogEntry) -> CatalogListingEntry {
    CatalogListingEntry {
        key: entry.key,
        description: entry.description,
        preview_file: entry.preview_file,
        frequencies_hz: entry.kind.frequencies_hz(),
    }
}

fn is_readonly(dir: &std::path::Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| m.permissions().readonly())
        .unwrap_or(true)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
