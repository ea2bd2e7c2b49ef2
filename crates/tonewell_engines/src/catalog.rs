#![forbid(unsafe_code)]

//! Static tone taxonomy: single-frequency presets, noise beds backed only by
//! prebuilt assets, planet composites mixed on demand, and the custom tone.

use tonewell_kernel_contracts::tone::CUSTOM_CATEGORY_KEY;

const PLANET_ALIAS_PREFIX: &str = "Planet ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogGroup {
    Chakra,
    Sacred,
    Noise,
    Planet,
    Custom,
}

impl CatalogGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chakra => "chakras",
            Self::Sacred => "sacred",
            Self::Noise => "noises",
            Self::Planet => "planets",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseKind {
    Pink,
    Brown,
}

impl NoiseKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pink => "pink",
            Self::Brown => "brown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CategoryKind {
    SinglePreset {
        frequency_hz: f64,
        asset_file: &'static str,
    },
    CompositeMix {
        frequencies_hz: &'static [f64],
        asset_file: Option<&'static str>,
    },
    CustomTone,
    NoiseMarker {
        kind: NoiseKind,
        asset_file: &'static str,
    },
}

impl CategoryKind {
    pub fn asset_file(&self) -> Option<&'static str> {
        match self {
            Self::SinglePreset { asset_file, .. } | Self::NoiseMarker { asset_file, .. } => {
                Some(*asset_file)
            }
            Self::CompositeMix { asset_file, .. } => *asset_file,
            Self::CustomTone => None,
        }
    }

    pub fn frequencies_hz(&self) -> Vec<f64> {
        match self {
            Self::SinglePreset { frequency_hz, .. } => vec![*frequency_hz],
            Self::CompositeMix { frequencies_hz, .. } => frequencies_hz.to_vec(),
            Self::CustomTone | Self::NoiseMarker { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub group: CatalogGroup,
    pub kind: CategoryKind,
    pub description: &'static str,
    pub preview_file: Option<&'static str>,
}

const fn preset(
    key: &'static str,
    group: CatalogGroup,
    frequency_hz: f64,
    asset_file: &'static str,
    preview_file: &'static str,
    description: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        key,
        group,
        kind: CategoryKind::SinglePreset {
            frequency_hz,
            asset_file,
        },
        description,
        preview_file: Some(preview_file),
    }
}

const fn planet(
    key: &'static str,
    frequencies_hz: &'static [f64],
    asset_file: &'static str,
    preview_file: &'static str,
    description: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        key,
        group: CatalogGroup::Planet,
        kind: CategoryKind::CompositeMix {
            frequencies_hz,
            asset_file: Some(asset_file),
        },
        description,
        preview_file: Some(preview_file),
    }
}

static STANDARD_ENTRIES: &[CatalogEntry] = &[
    preset(
        "Root (256 Hz)",
        CatalogGroup::Chakra,
        256.0,
        "Root_256.wav",
        "Root_256_preview.wav",
        "Grounding and physical stability.",
    ),
    preset(
        "Sacral (288 Hz)",
        CatalogGroup::Chakra,
        288.0,
        "Sacral_288.wav",
        "Sacral_288_preview.wav",
        "Creativity, sensuality, and emotional flow.",
    ),
    preset(
        "Solar Plexus (320 Hz)",
        CatalogGroup::Chakra,
        320.0,
        "Solar_320.wav",
        "Solar_320_preview.wav",
        "Confidence, energy, and self-esteem.",
    ),
    preset(
        "Heart (341.3 Hz)",
        CatalogGroup::Chakra,
        341.3,
        "Heart_341.wav",
        "Heart_341_preview.wav",
        "Love, compassion, and forgiveness.",
    ),
    preset(
        "Throat (384 Hz)",
        CatalogGroup::Chakra,
        384.0,
        "Throat_384.wav",
        "Throat_384_preview.wav",
        "Communication and truth expression.",
    ),
    preset(
        "Third Eye (426.7 Hz)",
        CatalogGroup::Chakra,
        426.7,
        "ThirdEye_426.wav",
        "ThirdEye_426_preview.wav",
        "Intuition and mental clarity.",
    ),
    preset(
        "Crown (480 Hz)",
        CatalogGroup::Chakra,
        480.0,
        "Crown_480.wav",
        "Crown_480_preview.wav",
        "Spiritual connection and enlightenment.",
    ),
    preset(
        "Pi Balance (180 Hz)",
        CatalogGroup::Sacred,
        180.0,
        "Pi_180.wav",
        "Pi_180_preview.wav",
        "Centering and harmonic balance (π resonance).",
    ),
    preset(
        "Elevation (360 Hz)",
        CatalogGroup::Sacred,
        360.0,
        "Elevation_360.wav",
        "Elevation_360_preview.wav",
        "Expansion, elevation, and higher focus.",
    ),
    CatalogEntry {
        key: "Pink Noise",
        group: CatalogGroup::Noise,
        kind: CategoryKind::NoiseMarker {
            kind: NoiseKind::Pink,
            asset_file: "Pink_Noise.wav",
        },
        description: "Soft static for relaxation or focus.",
        preview_file: Some("Pink_Noise_preview.wav"),
    },
    CatalogEntry {
        key: "Brown Noise",
        group: CatalogGroup::Noise,
        kind: CategoryKind::NoiseMarker {
            kind: NoiseKind::Brown,
            asset_file: "Brown_Noise.wav",
        },
        description: "Deep grounding sound for meditation or sleep.",
        preview_file: Some("Brown_Noise_preview.wav"),
    },
    planet(
        "Sun",
        &[256.0, 320.0, 384.0, 480.0],
        "Planet_Sun.wav",
        "Planet_Sun_preview.wav",
        "Vitality, confidence, and creative power.",
    ),
    planet(
        "Moon",
        &[288.0, 341.3, 426.7],
        "Planet_Moon.wav",
        "Planet_Moon_preview.wav",
        "Emotional balance, intuition, and inner reflection.",
    ),
    planet(
        "Mercury",
        &[384.0, 480.0, 288.0],
        "Planet_Mercury.wav",
        "Planet_Mercury_preview.wav",
        "Focus, communication, and mental clarity.",
    ),
    planet(
        "Venus",
        &[341.3, 426.7, 256.0],
        "Planet_Venus.wav",
        "Planet_Venus_preview.wav",
        "Harmony, beauty, and relationships.",
    ),
    planet(
        "Mars",
        &[320.0, 384.0, 480.0],
        "Planet_Mars.wav",
        "Planet_Mars_preview.wav",
        "Action, drive, and personal strength.",
    ),
    planet(
        "Jupiter",
        &[288.0, 341.3, 426.7, 256.0],
        "Planet_Jupiter.wav",
        "Planet_Jupiter_preview.wav",
        "Expansion, optimism, and spiritual growth.",
    ),
    planet(
        "Saturn",
        &[256.0, 303.0, 384.0],
        "Planet_Saturn.wav",
        "Planet_Saturn_preview.wav",
        "Discipline, grounding, and life structure.",
    ),
    CatalogEntry {
        key: CUSTOM_CATEGORY_KEY,
        group: CatalogGroup::Custom,
        kind: CategoryKind::CustomTone,
        description: "Any frequency you choose, rendered as a pure sine tone.",
        preview_file: None,
    },
];

/// Immutable lookup table over the storefront's tone categories.
#[derive(Debug, Clone, Copy)]
pub struct ToneCatalog {
    entries: &'static [CatalogEntry],
}

impl Default for ToneCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ToneCatalog {
    pub const fn standard() -> Self {
        Self {
            entries: STANDARD_ENTRIES,
        }
    }

    /// Planet composites also answer to their storefront label,
    /// e.g. `Planet Sun`.
    pub fn resolve(&self, key: &str) -> Option<&'static CatalogEntry> {
        let key = key.trim();
        if let Some(entry) = self.entries.iter().find(|e| e.key == key) {
            return Some(entry);
        }
        let planet = key.strip_prefix(PLANET_ALIAS_PREFIX)?;
        self.entries
            .iter()
            .find(|e| e.group == CatalogGroup::Planet && e.key == planet)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    pub fn frequencies_hz(&self, key: &str) -> Option<Vec<f64>> {
        self.resolve(key).map(|e| e.kind.frequencies_hz())
    }

    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    pub fn group(&self, group: CatalogGroup) -> impl Iterator<Item = &'static CatalogEntry> {
        self.entries.iter().filter(move |e| e.group == group)
    }
}
