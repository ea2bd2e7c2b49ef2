#![forbid(unsafe_code)]

//! Offline rendering for operators: runs the synthesizer against the local
//! asset and scratch directories without touching payments.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tonewell_engines::catalog::ToneCatalog;
use tonewell_engines::synth::ToneSynthesizer;
use tonewell_engines::tone_tool::{NativeToneTool, SoxToneTool, ToneTool, ToneToolKind};
use tonewell_kernel_contracts::tone::{parse_duration_secs, ToneRequest};

pub const RENDER_USAGE: &str = "usage: tonewell render <category> <duration> [frequency]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub tones_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub tone_tool: ToneToolKind,
    pub sox_program: PathBuf,
}

impl RenderSettings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the same directory and tool variables the storefront uses.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let tone_tool = match get("TONEWELL_TONE_TOOL") {
            Some(raw) => ToneToolKind::parse(&raw)
                .ok_or_else(|| format!("unknown tone tool '{raw}'. allowed: sox, native"))?,
            None => ToneToolKind::Sox,
        };
        Ok(Self {
            tones_dir: get("TONEWELL_TONES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tones")),
            scratch_dir: get("TONEWELL_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            tone_tool,
            sox_program: get("TONEWELL_SOX_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sox")),
        })
    }

    pub fn synthesizer(&self) -> ToneSynthesizer {
        let tool: Arc<dyn ToneTool> = match self.tone_tool {
            ToneToolKind::Sox => Arc::new(SoxToneTool::new(self.sox_program.clone())),
            ToneToolKind::Native => Arc::new(NativeToneTool::default()),
        };
        ToneSynthesizer::new(
            ToneCatalog::standard(),
            self.tones_dir.clone(),
            self.scratch_dir.clone(),
            tool,
        )
    }
}

/// Renders one tone and returns the output path. The file is left in place.
pub fn execute_render_command(
    synth: &ToneSynthesizer,
    category: &str,
    duration: &str,
    frequency: Option<&str>,
) -> Result<String, String> {
    let duration_secs = parse_duration_secs(duration, "render.duration")
        .map_err(|_| format!("duration must be an integer, got '{duration}'"))?;
    let frequency_hz = frequency
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| format!("frequency must be a number, got '{raw}'"))
        })
        .transpose()?;
    let request = ToneRequest::v1(category, duration_secs, frequency_hz)
        .map_err(|e| format!("invalid tone request: {e}"))?;
    std::fs::create_dir_all(synth.scratch_dir())
        .map_err(|e| format!("failed to create scratch dir: {e}"))?;
    let artifact = synth
        .generate(&request)
        .map_err(|e| format!("render failed: {e}"))?;
    Ok(artifact.file_path.display().to_string())
}
