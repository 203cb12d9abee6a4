//! Shared types threaded through all pipeline stages.
//!
//! A [`ResponsiveImage`] is created when a directive is parsed and handed off
//! linearly from stage to stage: art direction appends [`Source`]s, resolution
//! switching replaces them with one per viewport interval, conversion fans them
//! out per enabled format, and the renderer finally consumes them. No stage
//! shares an image with another thread; `pipeline` parallelizes across images,
//! never within one.

use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;

/// Output formats respic knows how to emit and detect.
///
/// Order of declaration is not significant; efficiency ordering lives in
/// [`SupportedFormat::preference_rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedFormat {
    WebP,
    Jpeg,
}

/// Most-efficient-first preference order used when sorting `<source>` tags.
pub const PREFERRED_FORMAT_ORDER: &[SupportedFormat] =
    &[SupportedFormat::WebP, SupportedFormat::Jpeg];

impl SupportedFormat {
    /// File extension (also the config key), without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            SupportedFormat::WebP => "webp",
            SupportedFormat::Jpeg => "jpg",
        }
    }

    /// MIME type for the `<source type="...">` attribute.
    pub fn mime_type(self) -> &'static str {
        match self {
            SupportedFormat::WebP => "image/webp",
            SupportedFormat::Jpeg => "image/jpeg",
        }
    }

    /// Position in the efficiency preference order (lower sorts first).
    pub fn preference_rank(self) -> usize {
        PREFERRED_FORMAT_ORDER
            .iter()
            .position(|f| *f == self)
            .unwrap_or(PREFERRED_FORMAT_ORDER.len())
    }
}

/// One concretely generated image file plus its publishable locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    /// Where the generated file lives on disk (workspace path).
    pub path: PathBuf,
    /// Public URI without the content hash.
    pub uri: String,
    /// Public URI with the content hash segment, used in `srcset`.
    pub uri_with_hash: String,
    /// Actual pixel width reported by the adapter.
    pub width: u32,
}

/// Art-direction metadata attached to a [`Source`].
///
/// Only sources carrying this render `media`/`sizes` attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtDirection {
    /// Upper bound of the viewport interval this source serves, in CSS px.
    pub max_viewport: u32,
    /// Scale factor in `[0.1, 1.0]` (fraction of the viewport width).
    pub size: f64,
}

/// One `<source>`-to-be: a set of breakpoints for a viewport interval,
/// optionally specialized per format by the conversion stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// Backing file the breakpoints were generated from.
    pub path: PathBuf,
    pub breakpoints: Vec<Breakpoint>,
    /// Set by the conversion stage (or by format detection when conversion
    /// is disabled). `None` until then.
    pub format: Option<SupportedFormat>,
    /// Present on sources produced by art direction or anchored to a
    /// viewport interval by the allocator.
    pub art_direction: Option<ArtDirection>,
}

impl Source {
    /// Plain source with no art-direction metadata.
    pub fn plain(path: PathBuf, breakpoints: Vec<Breakpoint>) -> Self {
        Self {
            path,
            breakpoints,
            format: None,
            art_direction: None,
        }
    }
}

/// Ascending `max_viewport`; sources without art direction sort last.
pub fn by_increasing_max_viewport(a: &Source, b: &Source) -> Ordering {
    match (&a.art_direction, &b.art_direction) {
        (Some(a), Some(b)) => a.max_viewport.cmp(&b.max_viewport),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

/// Most efficient format first; sources without a format sort last.
pub fn by_most_efficient_format(a: &Source, b: &Source) -> Ordering {
    let rank = |s: &Source| {
        s.format
            .map(SupportedFormat::preference_rank)
            .unwrap_or(usize::MAX)
    };
    rank(a).cmp(&rank(b))
}

/// Ascending pixel width, for `srcset` entries.
pub fn by_increasing_width(a: &Breakpoint, b: &Breakpoint) -> Ordering {
    a.width.cmp(&b.width)
}

/// Aggregate root for one rewritten `<img>` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsiveImage {
    /// Absolute path the tag's `src` resolved to.
    pub original_path: PathBuf,
    pub sources: Vec<Source>,
}

impl ResponsiveImage {
    pub fn new(original_path: PathBuf) -> Self {
        Self {
            original_path,
            sources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(format: Option<SupportedFormat>, max_viewport: Option<u32>) -> Source {
        Source {
            path: PathBuf::from("/img/a.jpg"),
            breakpoints: Vec::new(),
            format,
            art_direction: max_viewport.map(|max_viewport| ArtDirection {
                max_viewport,
                size: 1.0,
            }),
        }
    }

    #[test]
    fn webp_ranks_before_jpeg() {
        assert!(SupportedFormat::WebP.preference_rank() < SupportedFormat::Jpeg.preference_rank());
    }

    #[test]
    fn mime_types() {
        assert_eq!(SupportedFormat::WebP.mime_type(), "image/webp");
        assert_eq!(SupportedFormat::Jpeg.mime_type(), "image/jpeg");
    }

    #[test]
    fn viewport_sort_puts_plain_sources_last() {
        let mut sources = vec![
            source(None, None),
            source(None, Some(1200)),
            source(None, Some(600)),
        ];
        sources.sort_by(by_increasing_max_viewport);

        let viewports: Vec<Option<u32>> = sources
            .iter()
            .map(|s| s.art_direction.as_ref().map(|ad| ad.max_viewport))
            .collect();
        assert_eq!(viewports, vec![Some(600), Some(1200), None]);
    }

    #[test]
    fn format_sort_is_stable_for_equal_ranks() {
        let mut sources = vec![
            source(Some(SupportedFormat::Jpeg), Some(600)),
            source(Some(SupportedFormat::WebP), Some(1200)),
            source(Some(SupportedFormat::WebP), Some(600)),
        ];
        sources.sort_by(by_increasing_max_viewport);
        sources.sort_by(by_most_efficient_format);

        let formats: Vec<_> = sources.iter().map(|s| s.format.unwrap()).collect();
        assert_eq!(
            formats,
            vec![
                SupportedFormat::WebP,
                SupportedFormat::WebP,
                SupportedFormat::Jpeg
            ]
        );
        // Within webp, viewport order survives the stable sort
        assert_eq!(sources[0].art_direction.as_ref().unwrap().max_viewport, 600);
    }
}
