#![forbid(unsafe_code)]

use std::num::IntErrorKind;

use crate::{ContractViolation, SchemaVersion, Validate};

pub const TONE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const TONE_DURATION_MIN_SECS: u16 = 1;
pub const TONE_DURATION_MAX_SECS: u16 = 360;
pub const TONE_DURATION_DEFAULT_SECS: u16 = TONE_DURATION_MAX_SECS;
pub const CUSTOM_FREQUENCY_DEFAULT_HZ: f64 = 440.0;
pub const TONE_GAIN_DB: f64 = -3.0;
pub const CUSTOM_CATEGORY_KEY: &str = "Custom";

const CATEGORY_KEY_MAX_LEN: usize = 128;
const FREQUENCY_MAX_HZ: f64 = 20_000.0;

pub fn clamp_duration_secs(raw: i64) -> u16 {
    raw.clamp(
        i64::from(TONE_DURATION_MIN_SECS),
        i64::from(TONE_DURATION_MAX_SECS),
    ) as u16
}

/// Parses a whole-second duration string. Integers beyond `i64` saturate so
/// that they clamp like any other out-of-range value.
pub fn parse_duration_secs(raw: &str, field: &'static str) -> Result<i64, ContractViolation> {
    match raw.trim().parse::<i64>() {
        Ok(secs) => Ok(secs),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(ContractViolation::InvalidValue {
                field,
                reason: "must be an integer",
            }),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
}

impl Waveform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sine => "sine",
        }
    }
}

/// One synthesis call: category key, clamped duration, and the caller's
/// frequency. Only the custom category carries a frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneRequest {
    pub schema_version: SchemaVersion,
    pub category: String,
    pub duration_secs: u16,
    pub frequency_hz: Option<f64>,
}

impl ToneRequest {
    /// Builds a request, clamping `duration_secs` into the supported range.
    /// `frequency_hz` is dropped for every category other than custom.
    pub fn v1(
        category: impl Into<String>,
        duration_secs: i64,
        frequency_hz: Option<f64>,
    ) -> Result<Self, ContractViolation> {
        let category = category.into().trim().to_string();
        let frequency_hz = frequency_hz.filter(|_| category == CUSTOM_CATEGORY_KEY);
        let r = Self {
            schema_version: TONE_CONTRACT_VERSION,
            category,
            duration_secs: clamp_duration_secs(duration_secs),
            frequency_hz,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn is_custom(&self) -> bool {
        self.category == CUSTOM_CATEGORY_KEY
    }

    pub fn custom_frequency_hz(&self) -> f64 {
        self.frequency_hz.unwrap_or(CUSTOM_FREQUENCY_DEFAULT_HZ)
    }
}

impl Validate for ToneRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != TONE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "tone_request.schema_version",
                reason: "must match TONE_CONTRACT_VERSION",
            });
        }
        if self.category.len() > CATEGORY_KEY_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "tone_request.category",
                reason: "exceeds max length",
            });
        }
        if !(TONE_DURATION_MIN_SECS..=TONE_DURATION_MAX_SECS).contains(&self.duration_secs) {
            return Err(ContractViolation::InvalidRange {
                field: "tone_request.duration_secs",
                min: f64::from(TONE_DURATION_MIN_SECS),
                max: f64::from(TONE_DURATION_MAX_SECS),
                got: f64::from(self.duration_secs),
            });
        }
        if let Some(hz) = self.frequency_hz {
            if !hz.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "tone_request.frequency_hz",
                });
            }
            if hz <= 0.0 || hz > FREQUENCY_MAX_HZ {
                return Err(ContractViolation::InvalidRange {
                    field: "tone_request.frequency_hz",
                    min: 0.0,
                    max: FREQUENCY_MAX_HZ,
                    got: hz,
                });
            }
        }
        Ok(())
    }
}
