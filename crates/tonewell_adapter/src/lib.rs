#![forbid(unsafe_code)]

//! HTTP surface of the storefront. Handlers translate requests into
//! `DeliveryService` calls; every failure the shopper can see becomes a
//! redirect to the landing page carrying a flash message.

use std::io::IsTerminal;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tonewell_os::delivery::{
    CatalogListing, CheckoutForm, DeliveryError, DeliveryService, HealthReport, PurchaseReceipt,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const WAV_CONTENT_TYPE: &str = "audio/wav";
pub const FLASH_LEVEL_DANGER: &str = "danger";

pub type SharedDelivery = Arc<DeliveryService>;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInitialised(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}

pub fn build_router(service: SharedDelivery) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/checkout_create", post(checkout_create))
        .route("/success", get(success))
        .route("/download/:token", get(download))
        .route("/download_prebuilt/*filename", get(download_prebuilt))
        .with_state(service)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashQuery {
    pub flash: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorefrontIndex {
    pub flash: Option<FlashMessage>,
    pub catalog: CatalogListing,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

/// Body of the success page. The bare token stays out of it; the shopper
/// only ever needs the absolute link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub download_url: String,
    pub tone_name: String,
    pub tone_file: String,
    pub expires_minutes: u64,
}

impl From<PurchaseReceipt> for SuccessResponse {
    fn from(receipt: PurchaseReceipt) -> Self {
        Self {
            download_url: receipt.download_url,
            tone_name: receipt.tone_name,
            tone_file: receipt.tone_file,
            expires_minutes: receipt.expires_minutes,
        }
    }
}

/// `/?flash=<message>&level=danger`, form-encoded.
pub fn flash_location(message: &str) -> String {
    let encoded: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("flash", message)
        .append_pair("level", FLASH_LEVEL_DANGER)
        .finish();
    format!("/?{encoded}")
}

fn flash_redirect(err: &DeliveryError) -> Response {
    tracing::warn!(kind = err.kind(), error = %err, "storefront request failed");
    Redirect::to(&flash_location(err.user_message())).into_response()
}

async fn run_blocking<T, F>(service: &SharedDelivery, call: F) -> Result<T, DeliveryError>
where
    T: Send + 'static,
    F: FnOnce(&DeliveryService) -> Result<T, DeliveryError> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|err| DeliveryError::Internal(format!("blocking task failed: {err}")))?
}

async fn index(
    State(service): State<SharedDelivery>,
    Query(query): Query<FlashQuery>,
) -> Json<StorefrontIndex> {
    let flash = query
        .flash
        .filter(|m| !m.trim().is_empty())
        .map(|message| FlashMessage {
            level: query.level.unwrap_or_else(|| "info".to_string()),
            message,
        });
    Json(StorefrontIndex {
        flash,
        catalog: service.catalog_listing(),
    })
}

async fn healthz(State(service): State<SharedDelivery>) -> (StatusCode, Json<HealthReport>) {
    let report = service.health();
    let status = if report.reason.is_none() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

async fn checkout_create(
    State(service): State<SharedDelivery>,
    Form(form): Form<CheckoutForm>,
) -> Response {
    match run_blocking(&service, move |s| s.create_checkout(&form)).await {
        Ok(redirect) => Redirect::to(&redirect.url).into_response(),
        Err(err) => flash_redirect(&err),
    }
}

async fn success(
    State(service): State<SharedDelivery>,
    Query(query): Query<SuccessQuery>,
) -> Response {
    let session_id = query.session_id;
    match run_blocking(&service, move |s| s.complete_purchase(session_id.as_deref())).await {
        Ok(receipt) => Json(SuccessResponse::from(receipt)).into_response(),
        Err(err) => flash_redirect(&err),
    }
}

async fn download(State(service): State<SharedDelivery>, Path(token): Path<String>) -> Response {
    let redemption = match service.redeem_download(&token) {
        Ok(redemption) => redemption,
        Err(err) => return flash_redirect(&err),
    };
    match tokio::fs::read(&redemption.file_path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, WAV_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", redemption.file_name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => flash_redirect(&DeliveryError::Internal(format!(
            "read {}: {err}",
            redemption.file_path.display()
        ))),
    }
}

async fn download_prebuilt(
    State(service): State<SharedDelivery>,
    Path(filename): Path<String>,
) -> Response {
    let Some(path) = service.resolve_preview(&filename) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, WAV_CONTENT_TYPE.to_string()),
                (header::CONTENT_DISPOSITION, "inline".to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "prebuilt asset unreadable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
