use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tonewell_adapter::{build_router, SuccessResponse};
use tonewell_engines::payment_gateway::{
    CheckoutSession, CheckoutSessionRequest, CheckoutSessionStatus, PaymentError, PaymentGateway,
};
use tonewell_engines::tone_tool::NativeToneTool;
use tonewell_kernel_contracts::payment::{PaymentMetadata, PaymentStatus};
use tonewell_os::config::StorefrontConfig;
use tonewell_os::delivery::DeliveryService;

#[derive(Default)]
struct StubGateway {
    sessions: Mutex<BTreeMap<String, CheckoutSessionStatus>>,
    fail_create: bool,
}

impl PaymentGateway for StubGateway {
    fn create_checkout_session(
        &self,
        _request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.fail_create {
            return Err(PaymentError::Transport("provider down".to_string()));
        }
        Ok(CheckoutSession {
            id: "cs_test_route".to_string(),
            url: "https://checkout.test/pay/cs_test_route".to_string(),
        })
    }

    fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(PaymentError::HttpStatus(404))
    }
}

struct Harness {
    base: PathBuf,
    tones: PathBuf,
    addr: SocketAddr,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base);
    }
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn start(name: &str, gateway: StubGateway) -> Harness {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("tonewell-http-{name}-{suffix}"));
    let tones = base.join("tones");
    fs::create_dir_all(&tones).unwrap();

    let vars: BTreeMap<&str, String> = BTreeMap::from([
        ("TONEWELL_SECRET_KEY", "route-test-secret".to_string()),
        ("TONEWELL_PUBLIC_BASE_URL", "https://shop.test".to_string()),
        ("TONEWELL_SCRATCH_DIR", base.join("scratch").display().to_string()),
        ("TONEWELL_TONES_DIR", tones.display().to_string()),
        ("STRIPE_PRICE_ID_PRESET", "price_preset".to_string()),
        ("STRIPE_PRICE_ID_CUSTOM", "price_custom".to_string()),
    ]);
    let config = StorefrontConfig::from_lookup(|k| vars.get(k).cloned(), None).unwrap();
    let service = DeliveryService::new(
        Arc::new(config),
        Arc::new(NativeToneTool::with_sample_rate(4_000)),
        Arc::new(gateway),
        Handle::current(),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::new(service));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Harness { base, tones, addr }
}

struct Reply {
    status: u16,
    location: Option<String>,
    content_type: Option<String>,
    disposition: Option<String>,
    body: Vec<u8>,
}

fn reply(response: ureq::Response) -> Reply {
    let status = response.status();
    let location = response.header("Location").map(str::to_string);
    let content_type = response.header("Content-Type").map(str::to_string);
    let disposition = response.header("Content-Disposition").map(str::to_string);
    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body).unwrap();
    Reply {
        status,
        location,
        content_type,
        disposition,
        body,
    }
}

async fn get(url: String) -> Reply {
    tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new().redirects(0).build();
        match agent.get(&url).call() {
            Ok(response) => reply(response),
            Err(ureq::Error::Status(_, response)) => reply(response),
            Err(err) => panic!("transport error: {err}"),
        }
    })
    .await
    .unwrap()
}

async fn post_form(url: String, fields: Vec<(&'static str, &'static str)>) -> Reply {
    tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new().redirects(0).build();
        match agent.post(&url).send_form(&fields) {
            Ok(response) => reply(response),
            Err(ureq::Error::Status(_, response)) => reply(response),
            Err(err) => panic!("transport error: {err}"),
        }
    })
    .await
    .unwrap()
}

fn paid(id: &str, category: &str, duration: &str, frequency: &str) -> StubGateway {
    let gateway = StubGateway::default();
    gateway.sessions.lock().unwrap().insert(
        id.to_string(),
        CheckoutSessionStatus {
            id: id.to_string(),
            payment_status: PaymentStatus::Paid,
            metadata: PaymentMetadata {
                category: Some(category.to_string()),
                duration: Some(duration.to_string()),
                frequency: Some(frequency.to_string()),
            },
        },
    );
    gateway
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_01_index_lists_catalog_and_echoes_flash() {
    let h = start("index", StubGateway::default()).await;
    let r = get(h.url("/?flash=File+expired.&level=danger")).await;
    assert_eq!(r.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
    assert_eq!(json["flash"]["message"], "File expired.");
    assert_eq!(json["flash"]["level"], "danger");
    assert_eq!(json["catalog"]["planets"].as_array().unwrap().len(), 7);
    assert_eq!(json["catalog"]["custom"][0]["key"], "Custom");

    let plain = get(h.url("/")).await;
    let json: serde_json::Value = serde_json::from_slice(&plain.body).unwrap();
    assert!(json["flash"].is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_02_healthz_reports_healthy() {
    let h = start("health", StubGateway::default()).await;
    let r = get(h.url("/healthz")).await;
    assert_eq!(r.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["outcome"], "HEALTHY");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_03_checkout_redirects_to_provider_with_303() {
    let h = start("checkout", StubGateway::default()).await;
    let r = post_form(
        h.url("/checkout_create"),
        vec![("category", "Sun"), ("duration", "120")],
    )
    .await;
    assert_eq!(r.status, 303);
    assert_eq!(
        r.location.as_deref(),
        Some("https://checkout.test/pay/cs_test_route")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_04_checkout_failure_flashes() {
    let h = start(
        "checkout-down",
        StubGateway {
            fail_create: true,
            ..StubGateway::default()
        },
    )
    .await;
    let r = post_form(h.url("/checkout_create"), vec![("category", "Sun")]).await;
    assert_eq!(r.status, 303);
    assert_eq!(
        r.location.as_deref(),
        Some("/?flash=Payment+initialization+failed.&level=danger")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_05_success_then_download_attachment() {
    let h = start("success", paid("cs_paid", "Custom", "1", "432")).await;
    let r = get(h.url("/success?session_id=cs_paid")).await;
    assert_eq!(r.status, 200);
    let body: SuccessResponse = serde_json::from_slice(&r.body).unwrap();
    assert_eq!(body.tone_name, "Custom");
    assert_eq!(body.expires_minutes, 60);
    let token = body
        .download_url
        .strip_prefix("https://shop.test/download/")
        .unwrap()
        .to_string();

    let file = get(h.url(&format!("/download/{token}"))).await;
    assert_eq!(file.status, 200);
    assert_eq!(file.content_type.as_deref(), Some("audio/wav"));
    assert_eq!(
        file.disposition,
        Some(format!("attachment; filename=\"{}\"", body.tone_file))
    );
    assert_eq!(&file.body[..4], b"RIFF");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_06_success_and_download_failures_flash() {
    let h = start("failures", StubGateway::default()).await;
    let missing = get(h.url("/success")).await;
    assert_eq!(missing.status, 303);
    assert_eq!(
        missing.location.as_deref(),
        Some("/?flash=Missing+session+ID.&level=danger")
    );

    let unknown = get(h.url("/success?session_id=cs_nope")).await;
    assert_eq!(
        unknown.location.as_deref(),
        Some("/?flash=Unable+to+verify+payment.&level=danger")
    );

    let forged = get(h.url("/download/e30.AAAA")).await;
    assert_eq!(forged.status, 303);
    assert_eq!(
        forged.location.as_deref(),
        Some("/?flash=Download+expired.&level=danger")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_http_07_prebuilt_preview_inline_or_404() {
    let h = start("prebuilt", StubGateway::default()).await;
    fs::write(h.tones.join("Planet_Sun_preview.wav"), b"RIFF-sun").unwrap();
    fs::write(h.base.join("secret.wav"), b"RIFF-secret").unwrap();

    let ok = get(h.url("/download_prebuilt/Planet_Sun_preview.wav")).await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.content_type.as_deref(), Some("audio/wav"));
    assert_eq!(ok.disposition.as_deref(), Some("inline"));
    assert_eq!(ok.body, b"RIFF-sun");

    let missing = get(h.url("/download_prebuilt/Nope.wav")).await;
    assert_eq!(missing.status, 404);
    let escape = get(h.url("/download_prebuilt/..%2Fsecret.wav")).await;
    assert_eq!(escape.status, 404);
}
