//! Format conversion: fan each source out into every enabled output format.
//!
//! With a converter configured, every breakpoint of every source is
//! re-encoded once per enabled format, and one extra fallback source per
//! format is generated from the original image so the `<img>` inside the
//! `<picture>` always has a rendition even when all intervals narrowed away.
//! With the converter disabled, sources pass through with their format
//! detected from file content (magic numbers, not the path extension).

use crate::adapters::{AdapterError, Converter};
use crate::config::EnabledFormats;
use crate::pipeline::Workspace;
use crate::types::{Breakpoint, ResponsiveImage, Source, SupportedFormat, PREFERRED_FORMAT_ORDER};
use crate::uri;
use image::ImageFormat;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("Type of {0} could not be detected")]
    UndetectableFormat(String),
    #[error("Type {detected} of {path} is not supported. Supported types: webp, jpg")]
    UnsupportedFormat { path: String, detected: String },
}

/// Enabled formats in preference order, most efficient first.
fn enabled(formats: &EnabledFormats) -> Vec<SupportedFormat> {
    PREFERRED_FORMAT_ORDER
        .iter()
        .copied()
        .filter(|format| match format {
            SupportedFormat::WebP => formats.webp,
            SupportedFormat::Jpeg => formats.jpg,
        })
        .collect()
}

fn detect_format(path: &Path) -> Result<SupportedFormat, ConversionError> {
    let content = fs::read(path)?;
    let format = image::guess_format(&content)
        .map_err(|_| ConversionError::UndetectableFormat(path.display().to_string()))?;
    match format {
        ImageFormat::WebP => Ok(SupportedFormat::WebP),
        ImageFormat::Jpeg => Ok(SupportedFormat::Jpeg),
        other => Err(ConversionError::UnsupportedFormat {
            path: path.display().to_string(),
            detected: format!("{other:?}").to_lowercase(),
        }),
    }
}

fn convert_source(
    converter: &dyn Converter,
    source: &Source,
    format: SupportedFormat,
) -> Result<Source, ConversionError> {
    let breakpoints = source
        .breakpoints
        .iter()
        .map(|breakpoint| {
            let destination = breakpoint.path.with_extension(format.extension());
            let uri = uri::change_extension(&breakpoint.uri, format.extension());
            let converted =
                converter.convert(&breakpoint.path, &destination, &uri, format)?;
            // Re-encoding does not resample; the pixel width carries over.
            Ok(Breakpoint {
                width: breakpoint.width,
                ..converted
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;

    Ok(Source {
        path: source.path.clone(),
        breakpoints,
        format: Some(format),
        art_direction: source.art_direction.clone(),
    })
}

/// The per-format rendition of the original image backing the plain `<img>`.
fn fallback_source(
    converter: &dyn Converter,
    original_path: &Path,
    format: SupportedFormat,
    workspace: &Workspace,
) -> Result<Source, ConversionError> {
    let stem = original_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let file_name = format!(
        "{stem}-{}.{}",
        uri::path_tag(original_path),
        format.extension()
    );
    let destination = workspace.destination(&file_name);
    let uri = format!("/img/{file_name}");

    let breakpoint = converter.convert(original_path, &destination, &uri, format)?;
    Ok(Source {
        path: original_path.to_path_buf(),
        breakpoints: vec![breakpoint],
        format: Some(format),
        art_direction: None,
    })
}

/// Run the conversion stage over a resized image.
///
/// A `None` converter only annotates sources with their detected format.
pub fn convert_image(
    converter: Option<&dyn Converter>,
    mut image: ResponsiveImage,
    formats: &EnabledFormats,
    workspace: &Workspace,
) -> Result<ResponsiveImage, ConversionError> {
    let Some(converter) = converter else {
        for source in &mut image.sources {
            source.format = Some(detect_format(&source.path)?);
        }
        return Ok(image);
    };

    let mut converted = Vec::new();
    for format in enabled(formats) {
        for source in &image.sources {
            converted.push(convert_source(converter, source, format)?);
        }
        converted.push(fallback_source(
            converter,
            &image.original_path,
            format,
            workspace,
        )?);
    }

    image.sources = converted;
    Ok(image)
}
