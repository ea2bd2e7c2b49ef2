#![forbid(unsafe_code)]

use std::f64::consts::TAU;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tonewell_kernel_contracts::tone::Waveform;

pub const NATIVE_SAMPLE_RATE_HZ: u32 = 44_100;
const STDERR_EXCERPT_MAX_CHARS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("wav render failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("mix requires at least one input")]
    EmptyMix,
    #[error("mix inputs are incompatible: {0}")]
    IncompatibleInputs(String),
}

/// Renders single tones and mixes rendered files. Both calls block until the
/// output file is complete.
pub trait ToneTool: Send + Sync {
    fn synthesize(
        &self,
        output: &Path,
        duration_secs: u16,
        waveform: Waveform,
        frequency_hz: f64,
        gain_db: f64,
    ) -> Result<(), ToolError>;

    fn mix(&self, inputs: &[PathBuf], output: &Path, gain_db: f64) -> Result<(), ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneToolKind {
    Sox,
    Native,
}

impl ToneToolKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sox" => Some(Self::Sox),
            "native" => Some(Self::Native),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sox => "sox",
            Self::Native => "native",
        }
    }
}

/// Shells out to the `sox` binary.
#[derive(Debug, Clone)]
pub struct SoxToneTool {
    program: PathBuf,
}

impl Default for SoxToneTool {
    fn default() -> Self {
        Self::new("sox")
    }
}

impl SoxToneTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn synth_args(
        output: &Path,
        duration_secs: u16,
        waveform: Waveform,
        frequency_hz: f64,
        gain_db: f64,
    ) -> Vec<String> {
        vec![
            "-n".to_string(),
            output.to_string_lossy().into_owned(),
            "synth".to_string(),
            duration_secs.to_string(),
            waveform.as_str().to_string(),
            frequency_hz.to_string(),
            "gain".to_string(),
            gain_db.to_string(),
        ]
    }

    pub fn mix_args(inputs: &[PathBuf], output: &Path, gain_db: f64) -> Vec<String> {
        let mut args = vec!["-m".to_string()];
        args.extend(inputs.iter().map(|p| p.to_string_lossy().into_owned()));
        args.push(output.to_string_lossy().into_owned());
        args.push("gain".to_string());
        args.push(gain_db.to_string());
        args
    }

    fn run(&self, args: &[String]) -> Result<(), ToolError> {
        let program = self.program.to_string_lossy().into_owned();
        tracing::debug!(%program, ?args, "invoking tone tool");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| ToolError::Launch {
                program: program.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(STDERR_EXCERPT_MAX_CHARS)
            .collect::<String>();
        Err(ToolError::NonZeroExit {
            program,
            status: output.status.to_string(),
            stderr,
        })
    }
}

impl ToneTool for SoxToneTool {
    fn synthesize(
        &self,
        output: &Path,
        duration_secs: u16,
        waveform: Waveform,
        frequency_hz: f64,
        gain_db: f64,
    ) -> Result<(), ToolError> {
        self.run(&Self::synth_args(
            output,
            duration_secs,
            waveform,
            frequency_hz,
            gain_db,
        ))
    }

    fn mix(&self, inputs: &[PathBuf], output: &Path, gain_db: f64) -> Result<(), ToolError> {
        if inputs.is_empty() {
            return Err(ToolError::EmptyMix);
        }
        self.run(&Self::mix_args(inputs, output, gain_db))
    }
}

/// Pure-Rust renderer writing 16-bit mono PCM. Mixing averages the inputs
/// before applying the gain, the same scaling `sox -m` uses.
#[derive(Debug, Clone, Copy)]
pub struct NativeToneTool {
    sample_rate_hz: u32,
}

impl Default for NativeToneTool {
    fn default() -> Self {
        Self {
            sample_rate_hz: NATIVE_SAMPLE_RATE_HZ,
        }
    }
}

impl NativeToneTool {
    pub fn with_sample_rate(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(1),
        }
    }

    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

fn db_to_amplitude(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}

fn to_pcm16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * f64::from(i16::MAX)).round() as i16
}

impl ToneTool for NativeToneTool {
    fn synthesize(
        &self,
        output: &Path,
        duration_secs: u16,
        waveform: Waveform,
        frequency_hz: f64,
        gain_db: f64,
    ) -> Result<(), ToolError> {
        let amplitude = db_to_amplitude(gain_db);
        let rate = f64::from(self.sample_rate_hz);
        let total = u64::from(duration_secs) * u64::from(self.sample_rate_hz);
        let mut writer = hound::WavWriter::create(output, self.spec())?;
        for i in 0..total {
            let phase = TAU * frequency_hz * (i as f64) / rate;
            let value = match waveform {
                Waveform::Sine => phase.sin(),
            };
            writer.write_sample(to_pcm16(value * amplitude))?;
        }
        writer.finalize()?;
        Ok(())
    }

    fn mix(&self, inputs: &[PathBuf], output: &Path, gain_db: f64) -> Result<(), ToolError> {
        if inputs.is_empty() {
            return Err(ToolError::EmptyMix);
        }
        let mut readers = Vec::with_capacity(inputs.len());
        for input in inputs {
            let reader = hound::WavReader::open(input)?;
            let spec = reader.spec();
            if spec.channels != 1
                || spec.bits_per_sample != 16
                || spec.sample_format != hound::SampleFormat::Int
                || spec.sample_rate != self.sample_rate_hz
            {
                return Err(ToolError::IncompatibleInputs(format!(
                    "{} is not 16-bit mono at {} Hz",
                    input.display(),
                    self.sample_rate_hz
                )));
            }
            readers.push(reader);
        }
        let mut streams: Vec<_> = readers
            .iter_mut()
            .map(|r| r.samples::<i16>())
            .collect();
        let scale = db_to_amplitude(gain_db) / (streams.len() as f64);
        let full_scale = f64::from(i16::MAX);
        let mut writer = hound::WavWriter::create(output, self.spec())?;
        loop {
            let mut any = false;
            let mut sum = 0.0;
            for stream in streams.iter_mut() {
                if let Some(sample) = stream.next() {
                    sum += f64::from(sample?) / full_scale;
                    any = true;
                }
            }
            if !any {
                break;
            }
            writer.write_sample(to_pcm16(sum * scale))?;
        }
        writer.finalize()?;
        Ok(())
    }
}
