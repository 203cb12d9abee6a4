//! `<picture>` markup generation and document reassembly.
//!
//! Uses [maud](https://maud.lambda.xyz/) for the generated markup. The
//! original `<img>` tag is always kept verbatim as the `<picture>` fallback
//! so author attributes (alt, loading, data-*) survive the rewrite; only its
//! `class` attribute is rewritten when an override asks for it.

use crate::parse::{ParsedDocument, placeholder};
use crate::types::{
    Breakpoint, ResponsiveImage, Source, by_increasing_max_viewport, by_increasing_width,
    by_most_efficient_format,
};
use maud::{Markup, PreEscaped, html};
use regex::Regex;
use std::sync::LazyLock;

static CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="([^"]+)""#).unwrap());
static IMG_CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"responsive-img-class(?:="([^"]*)")?"#).unwrap());
static PICTURE_CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"responsive-picture-class(?:="([^"]*)")?"#).unwrap());

/// Class for a generated element: the override attribute wins when present
/// (an empty value clears the class), otherwise the original tag's class
/// carries over.
fn resolve_class(tag: &str, override_pattern: &Regex) -> String {
    let original_class = CLASS_PATTERN
        .captures(tag)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    match override_pattern.captures(tag) {
        Some(captures) => captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        None => original_class,
    }
}

fn srcset(breakpoints: &[Breakpoint]) -> String {
    if breakpoints.len() == 1 {
        return breakpoints[0].uri_with_hash.clone();
    }

    let mut sorted = breakpoints.to_vec();
    sorted.sort_by(by_increasing_width);
    sorted
        .iter()
        .map(|b| format!("{} {}w", b.uri_with_hash, b.width))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The `sizes` hint: fractional sizes are a viewport percentage, sizes above
/// one are an absolute pixel width.
fn sizes_attribute(size: f64) -> String {
    if size > 1.0 {
        format!("{size}px")
    } else {
        format!("{}vw", (size * 100.0).round())
    }
}

fn source_tag(source: &Source) -> Markup {
    let mime = source.format.map(|f| f.mime_type()).unwrap_or_default();
    let sizes = source
        .art_direction
        .as_ref()
        .map(|ad| sizes_attribute(ad.size));
    let media = source
        .art_direction
        .as_ref()
        .map(|ad| format!("(max-width: {}px)", ad.max_viewport));

    html! {
        source type=(mime) sizes=[sizes] media=[media] srcset=(srcset(&source.breakpoints));
    }
}

/// Build the `<picture>` replacement for one image.
///
/// Sources are ordered by format preference first, then ascending viewport
/// within a format, so the browser picks the most efficient format it
/// understands and the narrowest source that covers its viewport.
fn picture_markup(image: &ResponsiveImage, original_tag: &str) -> String {
    let picture_class = resolve_class(original_tag, &PICTURE_CLASS_PATTERN);
    let img_class = resolve_class(original_tag, &IMG_CLASS_PATTERN);

    let mut sources = image.sources.clone();
    sources.sort_by(by_increasing_max_viewport);
    sources.sort_by(by_most_efficient_format);

    let fallback_img = CLASS_PATTERN
        .replace(original_tag, regex::NoExpand(&format!(r#"class="{img_class}""#)))
        .into_owned();

    let markup = html! {
        picture class=(picture_class) {
            @for source in &sources {
                (source_tag(source))
            }
            (PreEscaped(fallback_img))
        }
    };
    markup.into_string()
}

/// Replace every placeholder in `document` with its final markup.
///
/// Images absent from `images` (failed or skipped) get their original tag
/// back, as does any image that ended up with zero sources, so one bad image
/// never breaks its siblings.
pub fn render_document(document: &ParsedDocument, images: &[ResponsiveImage]) -> String {
    let mut text = document.text.clone();

    for directive in &document.directives {
        let Some(tag) = document.original_tag(&directive.path) else {
            continue;
        };

        let replacement = match images
            .iter()
            .find(|image| image.original_path == directive.path)
        {
            Some(image) if !image.sources.is_empty() => picture_markup(image, tag),
            _ => tag.to_string(),
        };

        text = text.replacen(&placeholder(&directive.path), &replacement, 1);
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::types::{ArtDirection, SupportedFormat};
    use std::path::{Path, PathBuf};

    fn breakpoint(uri_with_hash: &str, width: u32) -> Breakpoint {
        Breakpoint {
            path: PathBuf::from(format!("/tmp{uri_with_hash}")),
            uri: uri_with_hash.to_string(),
            uri_with_hash: uri_with_hash.to_string(),
            width,
        }
    }

    fn art_source(
        viewport: u32,
        size: f64,
        format: SupportedFormat,
        breakpoints: Vec<Breakpoint>,
    ) -> Source {
        Source {
            path: PathBuf::from("/images/photo.jpg"),
            breakpoints,
            format: Some(format),
            art_direction: Some(ArtDirection {
                max_viewport: viewport,
                size,
            }),
        }
    }

    fn parse_single(html: &str) -> ParsedDocument {
        parse(
            Path::new("/ctx"),
            Path::new("/"),
            html,
            &std::collections::BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn srcset_joins_by_increasing_width() {
        let breakpoints = vec![
            breakpoint("/img/photo-b_1200.aaaa.jpg", 1200),
            breakpoint("/img/photo-b_600.bbbb.jpg", 600),
        ];
        assert_eq!(
            srcset(&breakpoints),
            "/img/photo-b_600.bbbb.jpg 600w, /img/photo-b_1200.aaaa.jpg 1200w"
        );
    }

    #[test]
    fn single_breakpoint_srcset_omits_width_descriptor() {
        let breakpoints = vec![breakpoint("/img/photo.cccc.jpg", 800)];
        assert_eq!(srcset(&breakpoints), "/img/photo.cccc.jpg");
    }

    #[test]
    fn sizes_attribute_is_viewport_relative_below_one() {
        assert_eq!(sizes_attribute(0.5), "50vw");
        assert_eq!(sizes_attribute(1.0), "100vw");
        assert_eq!(sizes_attribute(2.0), "2px");
    }

    #[test]
    fn renders_picture_with_webp_sources_first() {
        let document =
            parse_single(r#"<p><img responsive src="/images/photo.jpg" /></p>"#);

        let mut image = ResponsiveImage::new(PathBuf::from("/images/photo.jpg"));
        image.sources.push(art_source(
            600,
            1.0,
            SupportedFormat::Jpeg,
            vec![breakpoint("/img/photo-b_400.dddd.jpg", 400)],
        ));
        image.sources.push(art_source(
            600,
            1.0,
            SupportedFormat::WebP,
            vec![breakpoint("/img/photo-b_400.dddd.webp", 400)],
        ));

        let output = render_document(&document, &[image]);

        assert!(output.contains("<picture"));
        let webp = output.find(r#"type="image/webp""#).unwrap();
        let jpeg = output.find(r#"type="image/jpeg""#).unwrap();
        assert!(webp < jpeg);
        assert!(output.contains(r#"media="(max-width: 600px)""#));
        assert!(output.contains(r#"sizes="100vw""#));
        // Original tag survives inside the picture as the fallback.
        assert!(output.contains(r#"<img responsive src="/images/photo.jpg" />"#));
    }

    #[test]
    fn class_carries_over_to_picture_and_img() {
        let document =
            parse_single(r#"<img responsive class="hero" src="/images/photo.jpg" />"#);

        let mut image = ResponsiveImage::new(PathBuf::from("/images/photo.jpg"));
        image.sources.push(art_source(
            600,
            1.0,
            SupportedFormat::Jpeg,
            vec![breakpoint("/img/photo.eeee.jpg", 600)],
        ));

        let output = render_document(&document, &[image]);
        assert!(output.contains(r#"<picture class="hero">"#));
        assert!(output.contains(r#"class="hero" src="/images/photo.jpg""#));
    }

    #[test]
    fn class_overrides_replace_and_clear() {
        let document = parse_single(
            r#"<img responsive class="hero" responsive-img-class="inner" responsive-picture-class src="/images/photo.jpg" />"#,
        );

        let mut image = ResponsiveImage::new(PathBuf::from("/images/photo.jpg"));
        image.sources.push(art_source(
            600,
            1.0,
            SupportedFormat::Jpeg,
            vec![breakpoint("/img/photo.ffff.jpg", 600)],
        ));

        let output = render_document(&document, &[image]);
        // Bare responsive-picture-class clears the inherited class.
        assert!(output.contains(r#"<picture class="">"#));
        assert!(output.contains(r#"class="inner""#));
    }

    #[test]
    fn image_without_sources_keeps_original_tag() {
        let document =
            parse_single(r#"<div><img responsive src="/images/photo.jpg" /></div>"#);

        let image = ResponsiveImage::new(PathBuf::from("/images/photo.jpg"));
        let output = render_document(&document, &[image]);

        assert_eq!(
            output,
            r#"<div><img responsive src="/images/photo.jpg" /></div>"#
        );
    }

    #[test]
    fn failed_image_restores_tag_while_sibling_renders() {
        let document = parse_single(
            r#"<img responsive src="/images/ok.jpg" /><img responsive src="/images/broken.jpg" />"#,
        );

        let mut ok = ResponsiveImage::new(PathBuf::from("/images/ok.jpg"));
        ok.sources.push(art_source(
            600,
            1.0,
            SupportedFormat::Jpeg,
            vec![breakpoint("/img/ok.abcd.jpg", 600)],
        ));

        // broken.jpg is absent from the rendered set entirely.
        let output = render_document(&document, &[ok]);

        assert!(output.contains("<picture"));
        assert!(output.contains(r#"<img responsive src="/images/broken.jpg" />"#));
        assert!(!output.contains("[[responsive:"));
    }

    #[test]
    fn plain_source_renders_without_media_or_sizes() {
        let document = parse_single(r#"<img responsive src="/images/photo.jpg" />"#);

        let mut image = ResponsiveImage::new(PathBuf::from("/images/photo.jpg"));
        image.sources.push(Source {
            path: PathBuf::from("/images/photo.jpg"),
            breakpoints: vec![breakpoint("/img/photo.9999.webp", 0)],
            format: Some(SupportedFormat::WebP),
            art_direction: None,
        });

        let output = render_document(&document, &[image]);
        assert!(!output.contains("media="));
        assert!(!output.contains("sizes="));
        assert!(output.contains(r#"srcset="/img/photo.9999.webp""#));
    }
}
