#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tonewell_kernel_contracts::artifact::GeneratedArtifact;
use tonewell_kernel_contracts::tone::{
    clamp_duration_secs, ToneRequest, Waveform, TONE_GAIN_DB,
};
use tonewell_kernel_contracts::UnixTimeMs;

use crate::catalog::{CategoryKind, ToneCatalog};
use crate::tone_tool::{ToolError, ToneTool};

const OUTPUT_PREFIX: &str = "beat";
const INTERMEDIATE_PREFIX: &str = "tone";

static OUTPUT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
    #[error("tone synthesis failed: {0}")]
    SynthesisFailure(#[from] ToolError),
    #[error("scratch file operation failed: {0}")]
    Io(#[from] io::Error),
}

/// Turns a tone request into one playable file in the scratch directory.
///
/// Prebuilt assets are copied, never linked, so expiring the output cannot
/// touch the shared asset. Every call writes to a fresh file name.
#[derive(Clone)]
pub struct ToneSynthesizer {
    catalog: ToneCatalog,
    assets_dir: PathBuf,
    scratch_dir: PathBuf,
    tool: Arc<dyn ToneTool>,
}

impl std::fmt::Debug for ToneSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToneSynthesizer")
            .field("assets_dir", &self.assets_dir)
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

impl ToneSynthesizer {
    pub fn new(
        catalog: ToneCatalog,
        assets_dir: PathBuf,
        scratch_dir: PathBuf,
        tool: Arc<dyn ToneTool>,
    ) -> Self {
        Self {
            catalog,
            assets_dir,
            scratch_dir,
            tool,
        }
    }

    pub fn catalog(&self) -> &ToneCatalog {
        &self.catalog
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn generate(&self, request: &ToneRequest) -> Result<GeneratedArtifact, SynthError> {
        let duration_secs = clamp_duration_secs(i64::from(request.duration_secs));
        let entry = self.catalog.resolve(&request.category);

        if let Some(asset_file) = entry.and_then(|e| e.kind.asset_file()) {
            let preset = self.assets_dir.join(asset_file);
            if preset.is_file() {
                let out = self.next_output_path();
                fs::copy(&preset, &out)?;
                tracing::info!(
                    category = %request.category,
                    output = %out.display(),
                    "copied prebuilt tone"
                );
                return Ok(artifact(out));
            }
        }

        match entry.map(|e| e.kind) {
            Some(CategoryKind::CustomTone) => {
                let out = self.next_output_path();
                let frequency_hz = request.custom_frequency_hz();
                if let Err(err) = self.tool.synthesize(
                    &out,
                    duration_secs,
                    Waveform::Sine,
                    frequency_hz,
                    TONE_GAIN_DB,
                ) {
                    discard(&out);
                    return Err(err.into());
                }
                tracing::info!(
                    frequency_hz,
                    duration_secs,
                    output = %out.display(),
                    "synthesized custom tone"
                );
                Ok(artifact(out))
            }
            Some(CategoryKind::CompositeMix { frequencies_hz, .. }) => {
                let out = self.next_output_path();
                self.mix_composite(frequencies_hz, duration_secs, &out)?;
                tracing::info!(
                    category = %request.category,
                    tones = frequencies_hz.len(),
                    duration_secs,
                    output = %out.display(),
                    "mixed composite tone"
                );
                Ok(artifact(out))
            }
            Some(_) => {
                tracing::warn!(
                    category = %request.category,
                    assets_dir = %self.assets_dir.display(),
                    "prebuilt asset missing for asset-only category"
                );
                Err(SynthError::UnknownCategory(request.category.clone()))
            }
            None => Err(SynthError::UnknownCategory(request.category.clone())),
        }
    }

    fn mix_composite(
        &self,
        frequencies_hz: &[f64],
        duration_secs: u16,
        out: &Path,
    ) -> Result<(), SynthError> {
        let mut intermediates = Vec::with_capacity(frequencies_hz.len());
        let result = self.render_and_mix(frequencies_hz, duration_secs, out, &mut intermediates);
        for path in &intermediates {
            discard(path);
        }
        if let Err(err) = result {
            discard(out);
            return Err(err.into());
        }
        Ok(())
    }

    /// Tones are rendered one after another; `intermediates` collects every
    /// path handed to the tool so the caller can clean up on any outcome.
    fn render_and_mix(
        &self,
        frequencies_hz: &[f64],
        duration_secs: u16,
        out: &Path,
        intermediates: &mut Vec<PathBuf>,
    ) -> Result<(), ToolError> {
        for &raw_hz in frequencies_hz {
            let hz = round_hz(raw_hz);
            let tone_path = self.next_intermediate_path(hz);
            intermediates.push(tone_path.clone());
            self.tool
                .synthesize(&tone_path, duration_secs, Waveform::Sine, hz, TONE_GAIN_DB)?;
        }
        self.tool.mix(intermediates, out, TONE_GAIN_DB)
    }

    fn next_output_path(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{OUTPUT_PREFIX}_{}.wav", unique_suffix()))
    }

    fn next_intermediate_path(&self, hz: f64) -> PathBuf {
        self.scratch_dir
            .join(format!("{INTERMEDIATE_PREFIX}_{hz:.2}_{}.wav", unique_suffix()))
    }
}

fn artifact(file_path: PathBuf) -> GeneratedArtifact {
    GeneratedArtifact::new(file_path, UnixTimeMs(now_unix_ms()))
}

fn round_hz(hz: f64) -> f64 {
    (hz * 100.0).round() / 100.0
}

/// pid, wall-clock ms and a process-wide sequence number.
fn unique_suffix() -> String {
    let seq = OUTPUT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", std::process::id(), now_unix_ms(), seq)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "failed to discard scratch file")
        }
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
        .max(1)
}
