//! Public URI naming for generated image files.
//!
//! Every generated file gets two URIs under `/img/`: one stable
//! (`/img/photo-9c01ab2f-b_640.jpg`) and one carrying an 8-hex content hash
//! (`/img/photo-9c01ab2f-b_640.3f2a9c01.jpg`) for cache busting. The hashed
//! form is what ends up in `srcset`. The tag right after the stem hashes the
//! source path, so same-stem images in different directories never share a
//! file name.
//!
//! Body segments identify the pipeline step that produced the file:
//! - `-b_{width}` — resolution-switching breakpoint
//! - `-tb_{viewport}-r_{h}_{v}-s_{size}` — art-direction crop (`-p` when the
//!   crop uses a caller-supplied custom image instead of a ratio)

use crate::transformation::{TransformationDescriptor, TransformationKind};
use sha2::{Digest, Sha256};
use std::path::Path;

/// URI prefix generated files are published under.
const URI_ROOT: &str = "/img";

/// Hashed and unhashed public URIs for one generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPair {
    pub uri: String,
    pub uri_with_hash: String,
}

/// First 8 hex chars of the SHA-256 of `content`.
fn short_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut hex = String::with_capacity(8);
    for byte in &digest[..4] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// 8-hex tag derived from the source path. Disambiguates generated file
/// names for images that share a stem.
pub fn path_tag(path: &Path) -> String {
    short_hash(path.to_string_lossy().as_bytes())
}

fn generate(path: &Path, content: &[u8], body: &str) -> UriPair {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let start = format!("{URI_ROOT}/{stem}-{}{body}", path_tag(path));
    UriPair {
        uri: format!("{start}{extension}"),
        uri_with_hash: format!("{start}.{}{extension}", short_hash(content)),
    }
}

/// URI for a resolution-switching breakpoint of the given pixel width.
pub fn resizing_uri(path: &Path, content: &[u8], width: u32) -> UriPair {
    generate(path, content, &format!("-b_{width}"))
}

/// URI for an art-direction crop described by `transformation`.
pub fn transformation_uri(
    path: &Path,
    content: &[u8],
    transformation: &TransformationDescriptor,
) -> UriPair {
    let size = (transformation.size * 100.0).round() as u32;
    let body = match &transformation.kind {
        TransformationKind::Custom { .. } => {
            format!("-tb_{}-p-s_{size}", transformation.max_viewport)
        }
        TransformationKind::Processable { ratio } => format!(
            "-tb_{}-r_{}-s_{size}",
            transformation.max_viewport,
            ratio.replace(':', "_")
        ),
    };
    generate(path, content, &body)
}

/// Swap the extension of a path-like URI string for `format`'s extension.
pub fn change_extension(path_or_uri: &str, extension: &str) -> String {
    match path_or_uri.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{extension}"),
        None => format!("{path_or_uri}.{extension}"),
    }
}

/// Insert a content hash into an already-built URI, before the extension.
pub fn with_hash(uri: &str, content: &[u8]) -> String {
    match uri.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}.{}.{extension}", short_hash(content)),
        None => format!("{uri}.{}", short_hash(content)),
    }
}
