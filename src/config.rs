//! Loader configuration.
//!
//! A single optional `respic.toml` at the input root configures the whole
//! rewrite. All values have stock defaults; config files are sparse and only
//! override what they name. Unknown keys are rejected to catch typos early.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! # Longest-prefix aliases resolved against the input root
//! # "@photos/" = "assets/photos/"
//!
//! [art_direction]
//! transformer = "none"      # "rust" to enable art direction
//! default_ratio = "original"
//! default_size = 1.0
//! # aliases = { xs = "600", md = "1200" }
//! # [art_direction.default_transformations.600]
//! # ratio = "3:2"
//!
//! [resolution_switching]
//! resizer = "rust"          # "none" disables resolution switching
//! min_viewport = 200        # px
//! max_viewport = 3840       # px
//! max_breakpoints_count = 5
//! min_size_difference = 35  # bytes between consecutive renditions
//! support_retina = true
//!
//! [conversion]
//! converter = "rust"        # "none" disables conversion
//! [conversion.enabled_formats]
//! webp = true
//! jpg = true
//! ```
//!
//! Adapter fields name a preset in the adapter registry; the literal `"none"`
//! disables that capability (TOML has no null). Library callers can bypass
//! presets entirely by constructing [`crate::adapters::Adapters`] with their
//! own trait objects.

use crate::transformation::{TransformationMap, cap_size};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub paths: PathsConfig,
    pub art_direction: ArtDirectionConfig,
    pub resolution_switching: ResizingConfig,
    pub conversion: ConversionConfig,
}

/// Path alias table: prefix → replacement, resolved against the input root.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub aliases: BTreeMap<String, String>,
}

/// Art-direction settings consumed by transformation normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtDirectionConfig {
    /// Transformer preset name; `None` disables art direction entirely.
    #[serde(deserialize_with = "preset_name")]
    pub transformer: Option<String>,
    /// Viewport aliases applied to transformation key names.
    pub aliases: BTreeMap<String, String>,
    /// Ratio backfilled into processable transformations; `"original"`
    /// means no crop.
    pub default_ratio: String,
    /// Size backfilled into transformations missing one. Capped to
    /// `[0.1, 1.0]` at load.
    pub default_size: f64,
    /// Global default transformations applied to every opted-in image.
    pub default_transformations: TransformationMap,
}

impl Default for ArtDirectionConfig {
    fn default() -> Self {
        Self {
            transformer: None,
            aliases: BTreeMap::new(),
            default_ratio: "original".to_string(),
            default_size: 1.0,
            default_transformations: TransformationMap::new(),
        }
    }
}

/// Resolution-switching policy driving the breakpoint allocator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizingConfig {
    /// Resizer preset name; `None` returns images through unchanged.
    #[serde(deserialize_with = "preset_name")]
    pub resizer: Option<String>,
    pub min_viewport: u32,
    pub max_viewport: u32,
    /// Upper bound on breakpoints across all intervals of one image.
    pub max_breakpoints_count: u32,
    /// Minimum byte-size gap between consecutive renditions of an interval.
    pub min_size_difference: u64,
    /// Accepted for compatibility; not consumed by the allocator.
    pub support_retina: bool,
}

impl Default for ResizingConfig {
    fn default() -> Self {
        Self {
            resizer: Some("rust".to_string()),
            min_viewport: 200,
            max_viewport: 3840,
            max_breakpoints_count: 5,
            min_size_difference: 35,
            support_retina: true,
        }
    }
}

/// Per-format fan-out settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    /// Converter preset name; `None` keeps each source's detected format.
    #[serde(deserialize_with = "preset_name")]
    pub converter: Option<String>,
    pub enabled_formats: EnabledFormats,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            converter: Some("rust".to_string()),
            enabled_formats: EnabledFormats::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnabledFormats {
    pub webp: bool,
    pub jpg: bool,
}

impl Default for EnabledFormats {
    fn default() -> Self {
        Self {
            webp: true,
            jpg: true,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            art_direction: ArtDirectionConfig::default(),
            resolution_switching: ResizingConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

/// Adapter preset fields accept a registry name or the literal `"none"`.
fn preset_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(if name == "none" { None } else { Some(name) })
}

impl LoaderConfig {
    /// Parse a config from TOML text, normalize it, and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: LoaderConfig = toml::from_str(content)?;
        config.art_direction.default_size = cap_size(config.art_direction.default_size);
        config.validate()?;
        Ok(config)
    }

    /// Load `respic.toml` from `root`, falling back to defaults if absent.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join("respic.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let resizing = &self.resolution_switching;
        if resizing.min_viewport >= resizing.max_viewport {
            return Err(ConfigError::Validation(format!(
                "min_viewport ({}) must be below max_viewport ({})",
                resizing.min_viewport, resizing.max_viewport
            )));
        }
        Ok(())
    }
}
