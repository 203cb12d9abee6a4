//! Capability adapters consumed by the pipeline.
//!
//! Three traits mirror the three external operations the core delegates:
//!
//! - [`Transformer`] — art direction: one cropped/scaled source per
//!   transformation descriptor
//! - [`Resizer`] — resolution switching: resize one file to a pixel width
//! - [`Converter`] — format fan-out: re-encode one file into another format
//!
//! Adapters are stateless per call from the core's point of view; any pooling
//! or serialization of a backing resource belongs inside the implementation.
//! The production preset is [`RustAdapter`](rust_adapter::RustAdapter), pure
//! Rust via the `image` crate.
//!
//! Presets are looked up in an explicit registry keyed by name —
//! [`Adapters::from_config`]. Library callers may instead build an
//! [`Adapters`] value directly from their own trait objects.

pub mod rust_adapter;

use crate::config::LoaderConfig;
use crate::transformation::TransformationDescriptor;
use crate::types::{Breakpoint, Source, SupportedFormat};
use rust_adapter::RustAdapter;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Adapter operation failed: {0}")]
    OperationFailed(String),
    #[error("Unknown adapter preset '{0}'")]
    UnknownPreset(String),
}

/// Art-direction capability.
pub trait Transformer: Send + Sync {
    /// Produce one [`Source`] per descriptor, each already containing exactly
    /// one breakpoint (the cropped/scaled rendition) and its public URI.
    /// Generated files go under `destination_dir`.
    fn transform(
        &self,
        image_path: &Path,
        transformations: &[TransformationDescriptor],
        destination_dir: &Path,
    ) -> Result<Vec<Source>, AdapterError>;
}

/// Resolution-switching capability.
pub trait Resizer: Send + Sync {
    /// Resize `source` to `target_width`, writing a real file at
    /// `destination`. The reported width may differ slightly from the target.
    fn resize(
        &self,
        source: &Path,
        destination: &Path,
        target_width: u32,
    ) -> Result<Breakpoint, AdapterError>;
}

/// Format-conversion capability.
pub trait Converter: Send + Sync {
    /// Re-encode `source` into `format` at `destination`; `uri` is the
    /// public URI (without hash) the breakpoint should advertise.
    fn convert(
        &self,
        source: &Path,
        destination: &Path,
        uri: &str,
        format: SupportedFormat,
    ) -> Result<Breakpoint, AdapterError>;
}

/// The capability bundle one build runs with. `None` disables that stage.
#[derive(Clone, Default)]
pub struct Adapters {
    pub transformer: Option<Arc<dyn Transformer>>,
    pub resizer: Option<Arc<dyn Resizer>>,
    pub converter: Option<Arc<dyn Converter>>,
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters")
            .field("transformer", &self.transformer.is_some())
            .field("resizer", &self.resizer.is_some())
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

impl Adapters {
    /// Resolve the preset names in `config` through the registry.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            transformer: config
                .art_direction
                .transformer
                .as_deref()
                .map(transformer_preset)
                .transpose()?,
            resizer: config
                .resolution_switching
                .resizer
                .as_deref()
                .map(resizer_preset)
                .transpose()?,
            converter: config
                .conversion
                .converter
                .as_deref()
                .map(converter_preset)
                .transpose()?,
        })
    }
}

// Preset registry. One entry per shipped adapter set; extend here when a new
// backend lands.

fn transformer_preset(name: &str) -> Result<Arc<dyn Transformer>, AdapterError> {
    match name {
        "rust" => Ok(Arc::new(RustAdapter::new())),
        other => Err(AdapterError::UnknownPreset(other.to_string())),
    }
}

fn resizer_preset(name: &str) -> Result<Arc<dyn Resizer>, AdapterError> {
    match name {
        "rust" => Ok(Arc::new(RustAdapter::new())),
        other => Err(AdapterError::UnknownPreset(other.to_string())),
    }
}

fn converter_preset(name: &str) -> Result<Arc<dyn Converter>, AdapterError> {
    match name {
        "rust" => Ok(Arc::new(RustAdapter::new())),
        other => Err(AdapterError::UnknownPreset(other.to_string())),
    }
}
