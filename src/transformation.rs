//! Art-direction transformation normalization.
//!
//! Merges three layers into one validated, ordered list of
//! [`TransformationDescriptor`]s per image:
//!
//! 1. global default transformations from config,
//! 2. the tag's ignore directive (keep all / drop all / drop named keys),
//! 3. the tag's inline transformations, which override same-key defaults
//!    wholesale (not field by field).
//!
//! Keys may be viewport aliases (`xs` → `"600"`); after alias resolution every
//! surviving key must parse as a non-negative integer viewport or the image
//! fails with a hint that an alias declaration is probably missing. Missing
//! fields are backfilled from `default_ratio`/`default_size` and sizes are
//! clamped to `[0.1, 1.0]` rather than rejected.

use crate::config::ArtDirectionConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformationError {
    #[error(
        "'{name}' is not a valid transformation name for image {image}. \
         Have you used an alias without defining it?"
    )]
    InvalidName { name: String, image: PathBuf },
}

/// One entry of a transformation map, before defaulting.
///
/// A custom transformation substitutes a caller-supplied image verbatim; a
/// processable one crops the original by aspect ratio and scales it. The two
/// are discriminated by an explicit variant tag, never by field sniffing.
/// In config/inline syntax `path` takes precedence when both could apply.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum Transformation {
    Custom {
        path: String,
        size: Option<f64>,
    },
    Processable {
        ratio: Option<String>,
        size: Option<f64>,
    },
}

/// Breakpoint name (literal viewport or alias) → transformation.
pub type TransformationMap = BTreeMap<String, Transformation>;

/// The tag's `responsive-ad-ignore` directive.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IgnoreDefaults {
    /// Attribute absent: keep every global default.
    #[default]
    KeepAll,
    /// Bare attribute: drop every global default for this tag.
    DropAll,
    /// `="key|key"`: drop the named default keys (pre-alias-resolution names).
    Keys(Vec<String>),
}

/// Inline art-direction options decoded from one tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InlineArtDirection {
    pub transformations: TransformationMap,
    pub ignore: IgnoreDefaults,
}

/// Fully resolved and defaulted transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationDescriptor {
    /// Upper viewport bound this crop serves, in CSS px.
    pub max_viewport: u32,
    /// Scale factor, clamped to `[0.1, 1.0]`.
    pub size: f64,
    pub kind: TransformationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformationKind {
    /// Crop the original to `ratio` (`"3:2"`, or `"original"` for no crop).
    Processable { ratio: String },
    /// Use this alternate image verbatim.
    Custom { path: PathBuf },
}

/// Clamp a size factor to the supported `[0.1, 1.0]` range.
pub fn cap_size(value: f64) -> f64 {
    value.clamp(0.1, 1.0)
}

/// Replace alias keys with their configured viewport names.
fn resolve_aliases(
    transformations: TransformationMap,
    aliases: &BTreeMap<String, String>,
) -> TransformationMap {
    transformations
        .into_iter()
        .map(|(name, transformation)| {
            let resolved = aliases.get(&name).cloned().unwrap_or(name);
            (resolved, transformation)
        })
        .collect()
}

fn validate_name(name: &str, image: &Path) -> Result<u32, TransformationError> {
    // Non-negative integer viewport; anything else is an undeclared alias
    // or a typo.
    name.parse::<u32>()
        .map_err(|_| TransformationError::InvalidName {
            name: name.to_string(),
            image: image.to_path_buf(),
        })
}

/// Produce the ordered descriptor list for one image.
///
/// Returns an empty list when art direction is globally disabled (no
/// transformer configured) or when no transformation survives filtering.
pub fn normalize_transformations(
    image: &Path,
    inline: &InlineArtDirection,
    config: &ArtDirectionConfig,
) -> Result<Vec<TransformationDescriptor>, TransformationError> {
    if config.transformer.is_none() {
        return Ok(Vec::new());
    }

    let filtered_defaults: TransformationMap = match &inline.ignore {
        IgnoreDefaults::KeepAll => config.default_transformations.clone(),
        IgnoreDefaults::DropAll => TransformationMap::new(),
        IgnoreDefaults::Keys(keys) => config
            .default_transformations
            .iter()
            .filter(|(name, _)| !keys.contains(name))
            .map(|(name, transformation)| (name.clone(), transformation.clone()))
            .collect(),
    };

    // Inline entries override same-key defaults wholesale.
    let mut merged = resolve_aliases(filtered_defaults, &config.aliases);
    merged.extend(resolve_aliases(
        inline.transformations.clone(),
        &config.aliases,
    ));

    let mut descriptors = Vec::with_capacity(merged.len());
    for (name, transformation) in merged {
        let max_viewport = validate_name(&name, image)?;
        let descriptor = match transformation {
            Transformation::Custom { path, size } => TransformationDescriptor {
                max_viewport,
                size: cap_size(size.unwrap_or(config.default_size)),
                kind: TransformationKind::Custom {
                    path: PathBuf::from(path),
                },
            },
            Transformation::Processable { ratio, size } => TransformationDescriptor {
                max_viewport,
                size: cap_size(size.unwrap_or(config.default_size)),
                kind: TransformationKind::Processable {
                    ratio: ratio.unwrap_or_else(|| config.default_ratio.clone()),
                },
            },
        };
        descriptors.push(descriptor);
    }

    // Descriptors are the ascending boundaries of viewport intervals.
    descriptors.sort_by_key(|d| d.max_viewport);
    Ok(descriptors)
}
