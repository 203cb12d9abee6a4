//! Pure Rust adapter built on the `image` crate.
//!
//! Crop, resize and re-encode all happen in process, statically linked:
//! decoding via the crate's pure Rust decoders, resizing with `Lanczos3`,
//! art-direction crops with `resize_to_fill` (fill-resize then center-crop),
//! JPEG encoding at a fixed quality and lossless WebP.

use super::{AdapterError, Converter, Resizer, Transformer};
use crate::transformation::{TransformationDescriptor, TransformationKind};
use crate::types::{ArtDirection, Breakpoint, Source, SupportedFormat};
use crate::uri;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs;
use std::path::Path;

const JPEG_QUALITY: u8 = 80;

/// The `"rust"` preset for all three pipeline capabilities.
pub struct RustAdapter;

impl RustAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, AdapterError> {
    ImageReader::open(path)
        .map_err(AdapterError::Io)?
        .with_guessed_format()
        .map_err(AdapterError::Io)?
        .decode()
        .map_err(|e| {
            AdapterError::OperationFailed(format!("Failed to decode {}: {e}", path.display()))
        })
}

fn output_format(path: &Path) -> Result<SupportedFormat, AdapterError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Ok(SupportedFormat::Jpeg),
        "webp" => Ok(SupportedFormat::WebP),
        other => Err(AdapterError::OperationFailed(format!(
            "Unsupported output format: {other}"
        ))),
    }
}

/// Encode into an in-memory buffer so the content hash can be computed
/// before the file lands on disk.
fn encode(image: &DynamicImage, format: SupportedFormat) -> Result<Vec<u8>, AdapterError> {
    let mut buffer = Vec::new();
    let result = match format {
        SupportedFormat::Jpeg => {
            // The JPEG encoder rejects alpha channels.
            let opaque = DynamicImage::from(image.to_rgb8());
            opaque.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))
        }
        SupportedFormat::WebP => {
            let rgba = DynamicImage::from(image.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
        }
    };
    result.map_err(|e| {
        AdapterError::OperationFailed(format!("{} encode failed: {e}", format.extension()))
    })?;
    Ok(buffer)
}

fn parse_ratio(ratio: &str) -> Result<(f64, f64), AdapterError> {
    let (horizontal, vertical) = ratio
        .split_once(':')
        .ok_or_else(|| AdapterError::OperationFailed(format!("Malformed ratio: {ratio}")))?;
    let horizontal: f64 = horizontal
        .parse()
        .map_err(|_| AdapterError::OperationFailed(format!("Malformed ratio: {ratio}")))?;
    let vertical: f64 = vertical
        .parse()
        .map_err(|_| AdapterError::OperationFailed(format!("Malformed ratio: {ratio}")))?;
    if horizontal <= 0.0 || vertical <= 0.0 {
        return Err(AdapterError::OperationFailed(format!(
            "Malformed ratio: {ratio}"
        )));
    }
    Ok((horizontal, vertical))
}

impl Transformer for RustAdapter {
    fn transform(
        &self,
        image_path: &Path,
        transformations: &[TransformationDescriptor],
        destination_dir: &Path,
    ) -> Result<Vec<Source>, AdapterError> {
        let mut sources = Vec::with_capacity(transformations.len());

        for descriptor in transformations {
            let scaled_viewport = (descriptor.max_viewport as f64 * descriptor.size).ceil() as u32;

            let cropped = match &descriptor.kind {
                // Custom images are already composed; only bound their width.
                TransformationKind::Custom { path } => {
                    load_image(path)?.resize(scaled_viewport, u32::MAX, FilterType::Lanczos3)
                }
                TransformationKind::Processable { ratio } if ratio == "original" => {
                    load_image(image_path)?.resize(scaled_viewport, u32::MAX, FilterType::Lanczos3)
                }
                TransformationKind::Processable { ratio } => {
                    let (horizontal, vertical) = parse_ratio(ratio)?;
                    let crop_width = scaled_viewport;
                    let crop_height =
                        (crop_width as f64 / horizontal * vertical).ceil() as u32;
                    load_image(image_path)?.resize_to_fill(
                        crop_width,
                        crop_height,
                        FilterType::Lanczos3,
                    )
                }
            };

            let content = encode(&cropped, output_format(image_path)?)?;
            let pair = uri::transformation_uri(image_path, &content, descriptor);
            let file_name = pair.uri.rsplit('/').next().unwrap_or(&pair.uri);
            let destination = destination_dir.join(file_name);
            fs::write(&destination, &content)?;

            sources.push(Source {
                path: destination.clone(),
                breakpoints: vec![Breakpoint {
                    path: destination,
                    uri: pair.uri,
                    uri_with_hash: pair.uri_with_hash,
                    width: cropped.width(),
                }],
                format: None,
                art_direction: Some(ArtDirection {
                    max_viewport: descriptor.max_viewport,
                    size: descriptor.size,
                }),
            });
        }

        Ok(sources)
    }
}

impl Resizer for RustAdapter {
    fn resize(
        &self,
        source: &Path,
        destination: &Path,
        target_width: u32,
    ) -> Result<Breakpoint, AdapterError> {
        let image = load_image(source)?;
        let resized = image.resize(target_width, u32::MAX, FilterType::Lanczos3);

        let content = encode(&resized, output_format(destination)?)?;
        fs::write(destination, &content)?;

        let pair = uri::resizing_uri(source, &content, resized.width());
        Ok(Breakpoint {
            path: destination.to_path_buf(),
            uri: pair.uri,
            uri_with_hash: pair.uri_with_hash,
            width: resized.width(),
        })
    }
}

impl Converter for RustAdapter {
    fn convert(
        &self,
        source: &Path,
        destination: &Path,
        uri: &str,
        format: SupportedFormat,
    ) -> Result<Breakpoint, AdapterError> {
        let image = load_image(source)?;
        let content = encode(&image, format)?;
        fs::write(destination, &content)?;

        Ok(Breakpoint {
            path: destination.to_path_buf(),
            uri: uri.to_string(),
            uri_with_hash: uri::with_hash(uri, &content),
            width: image.width(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, RgbImage};
    use tempfile::TempDir;

    fn create_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let file = fs::File::create(path).unwrap();
        let writer = std::io::BufWriter::new(file);
        JpegEncoder::new(writer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
    }

    fn dimensions(path: &Path) -> (u32, u32) {
        let img = load_image(path).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        create_test_jpeg(&source, 400, 200);

        let destination = tmp.path().join("photo-b_100.jpg");
        let breakpoint = RustAdapter::new()
            .resize(&source, &destination, 100)
            .unwrap();

        assert_eq!(breakpoint.width, 100);
        assert_eq!(dimensions(&destination), (100, 50));
        assert!(breakpoint.uri.contains("-b_100"));
    }

    #[test]
    fn transform_crops_to_ratio() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        create_test_jpeg(&source, 800, 300);

        let descriptor = TransformationDescriptor {
            max_viewport: 200,
            size: 1.0,
            kind: TransformationKind::Processable {
                ratio: "1:1".to_string(),
            },
        };

        let sources = RustAdapter::new()
            .transform(&source, &[descriptor], tmp.path())
            .unwrap();

        assert_eq!(sources.len(), 1);
        let breakpoint = &sources[0].breakpoints[0];
        assert_eq!(dimensions(&breakpoint.path), (200, 200));
        assert_eq!(
            sources[0].art_direction.as_ref().unwrap().max_viewport,
            200
        );
        assert!(breakpoint.uri.contains("-tb_200-r_1_1-s_100"));
    }

    #[test]
    fn transform_original_ratio_only_scales() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        create_test_jpeg(&source, 400, 300);

        let descriptor = TransformationDescriptor {
            max_viewport: 200,
            size: 0.5,
            kind: TransformationKind::Processable {
                ratio: "original".to_string(),
            },
        };

        let sources = RustAdapter::new()
            .transform(&source, &[descriptor], tmp.path())
            .unwrap();

        // scaled viewport 100, aspect 4:3 kept
        assert_eq!(dimensions(&sources[0].breakpoints[0].path), (100, 75));
    }

    #[test]
    fn transform_custom_uses_alternate_image() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.jpg");
        let alternate = tmp.path().join("alt.jpg");
        create_test_jpeg(&original, 800, 600);
        create_test_jpeg(&alternate, 300, 100);

        let descriptor = TransformationDescriptor {
            max_viewport: 150,
            size: 1.0,
            kind: TransformationKind::Custom {
                path: alternate.clone(),
            },
        };

        let sources = RustAdapter::new()
            .transform(&original, &[descriptor], tmp.path())
            .unwrap();

        // The alternate's 3:1 aspect survives; no crop happens.
        assert_eq!(dimensions(&sources[0].breakpoints[0].path), (150, 50));
        assert!(sources[0].breakpoints[0].uri.contains("-tb_150-p-s_100"));
    }

    #[test]
    fn convert_reencodes_to_webp() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        create_test_jpeg(&source, 64, 64);

        let destination = tmp.path().join("photo.webp");
        let breakpoint = RustAdapter::new()
            .convert(&source, &destination, "/img/photo.webp", SupportedFormat::WebP)
            .unwrap();

        assert_eq!(breakpoint.uri, "/img/photo.webp");
        assert!(breakpoint.uri_with_hash.ends_with(".webp"));
        assert_eq!(breakpoint.width, 64);

        let content = fs::read(&destination).unwrap();
        assert_eq!(image::guess_format(&content).unwrap(), image::ImageFormat::WebP);
    }

    #[test]
    fn malformed_ratio_is_rejected() {
        assert!(parse_ratio("3:2").is_ok());
        assert!(parse_ratio("wide").is_err());
        assert!(parse_ratio("3:0").is_err());
        assert!(parse_ratio("-1:2").is_err());
    }
}
