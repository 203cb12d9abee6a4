//! Directive extraction from template source text.
//!
//! Finds self-closing `<img ... />` tags that opt in to rewriting (they must
//! carry both a `responsive` flag and a `src`), decodes their inline
//! art-direction options, and replaces each tag with an opaque placeholder
//! (`[[responsive:/abs/path.jpg]]`) keyed by the resolved image path. The
//! original tag text is retained in the returned [`ParsedDocument`] so the
//! renderer can splice it back verbatim — placeholder substitution is fully
//! reversible.
//!
//! ## Inline syntax (stable contract)
//!
//! - `responsive` — opt-in flag, required together with `src`
//! - `responsive-ad="name_(opt=val,opt=val);name_(...)"` — inline
//!   transformations; `path=` wins over `ratio=`/`size=`, a segment with
//!   neither is a fatal decode error
//! - `responsive-ad-ignore` — bare: drop all global defaults;
//!   `="key|key"`: drop the named ones; absent: keep all. Its presence opts
//!   the tag into art direction even without `responsive-ad`
//!
//! An image path may start with a configured alias (longest prefix wins,
//! resolved against the root context); otherwise it is resolved relative to
//! the directory of the document being processed.

use crate::transformation::{
    IgnoreDefaults, InlineArtDirection, Transformation, TransformationMap,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Inline transformation '{name}' for image {image} has no valid options")]
    InvalidInlineOptions { name: String, image: String },
    #[error("Inline transformation '{name}' for image {image} has a malformed option '{option}'")]
    MalformedOption {
        name: String,
        image: String,
        option: String,
    },
}

// The regex crate has no lookahead, so the tag test is decomposed into one
// pattern per attribute; only the first match of each is significant.
static IMAGES_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<img.*?/>").unwrap());
static RESPONSIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sresponsive(?:="[^"]*")?[\s/>]"#).unwrap());
static SRC_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\ssrc="([^"]+)""#).unwrap());
static ART_DIRECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sresponsive-ad(?:="([^"]*)")?[\s/>]"#).unwrap());
static ART_DIRECTION_IGNORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sresponsive-ad-ignore(?:="([^"]*)")?[\s/>]"#).unwrap());

/// One recognized `<img>` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDirective {
    /// Absolute path the `src` attribute resolved to.
    pub path: PathBuf,
    /// Present when the tag carried `responsive-ad` (bare or valued) or a
    /// standalone `responsive-ad-ignore`. Images with neither skip art
    /// direction entirely, including global defaults.
    pub art_direction: Option<InlineArtDirection>,
}

/// Result of parsing one document: placeholder-bearing text, the ordered
/// directives, and the original tag text for later reuse.
///
/// This is the per-build context object; nothing about a parse survives in
/// module state, so concurrent builds never observe each other.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub text: String,
    pub directives: Vec<ImageDirective>,
    original_tags: HashMap<PathBuf, String>,
}

impl ParsedDocument {
    /// The untouched tag text for a resolved image path.
    pub fn original_tag(&self, path: &Path) -> Option<&str> {
        self.original_tags.get(path).map(String::as_str)
    }
}

/// Placeholder token for a resolved image path.
pub fn placeholder(path: &Path) -> String {
    format!("[[responsive:{}]]", path.display())
}

/// Resolve an image path against the alias table (longest prefix first,
/// relative to `root_context`) or, failing that, against the directory of
/// the current document.
pub fn resolve_image_path(
    root_context: &Path,
    context: &Path,
    image_path: &str,
    aliases: &BTreeMap<String, String>,
) -> PathBuf {
    let mut candidates: Vec<(&String, &String)> = aliases.iter().collect();
    candidates.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));

    for (alias, value) in candidates {
        if let Some(rest) = image_path.strip_prefix(alias.as_str()) {
            return root_context.join(value).join(rest.trim_start_matches('/'));
        }
    }

    context.join(image_path)
}

/// Decode the `name_(opt=val,...)` inline transformation mini-language.
pub fn decode_transformations(
    image_path: &str,
    encoded: &str,
) -> Result<TransformationMap, ParseError> {
    let mut transformations = TransformationMap::new();

    for segment in encoded.split(';').filter(|s| !s.is_empty()) {
        let (name, encoded_options) = segment.split_once('_').unwrap_or((segment, ""));
        let bare = encoded_options
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(encoded_options);

        let mut options: HashMap<&str, &str> = HashMap::new();
        for option in bare.split(',').filter(|o| !o.is_empty()) {
            let Some((key, value)) = option.split_once('=') else {
                return Err(ParseError::MalformedOption {
                    name: name.to_string(),
                    image: image_path.to_string(),
                    option: option.to_string(),
                });
            };
            options.insert(key, value);
        }

        let size = options
            .get("size")
            .map(|raw| {
                raw.parse::<f64>().map_err(|_| ParseError::MalformedOption {
                    name: name.to_string(),
                    image: image_path.to_string(),
                    option: format!("size={raw}"),
                })
            })
            .transpose()?;

        // Custom transformations take precedence over other options.
        let transformation = if let Some(path) = options.get("path") {
            Transformation::Custom {
                path: (*path).to_string(),
                size,
            }
        } else if options.contains_key("ratio") || size.is_some() {
            Transformation::Processable {
                ratio: options.get("ratio").map(|r| (*r).to_string()),
                size,
            }
        } else {
            return Err(ParseError::InvalidInlineOptions {
                name: name.to_string(),
                image: image_path.to_string(),
            });
        };

        transformations.insert(name.to_string(), transformation);
    }

    Ok(transformations)
}

/// Inverse of [`decode_transformations`]; keys are emitted in map order.
pub fn encode_transformations(transformations: &TransformationMap) -> String {
    let mut segments = Vec::with_capacity(transformations.len());
    for (name, transformation) in transformations {
        let mut options = Vec::new();
        match transformation {
            Transformation::Custom { path, size } => {
                options.push(format!("path={path}"));
                if let Some(size) = size {
                    options.push(format!("size={size}"));
                }
            }
            Transformation::Processable { ratio, size } => {
                if let Some(ratio) = ratio {
                    options.push(format!("ratio={ratio}"));
                }
                if let Some(size) = size {
                    options.push(format!("size={size}"));
                }
            }
        }
        segments.push(format!("{name}_({})", options.join(",")));
    }
    segments.join(";")
}

fn decode_ignore(tag: &str) -> IgnoreDefaults {
    match ART_DIRECTION_IGNORE_PATTERN.captures(tag) {
        None => IgnoreDefaults::KeepAll,
        Some(captures) => match captures.get(1) {
            None => IgnoreDefaults::DropAll,
            Some(keys) => {
                IgnoreDefaults::Keys(keys.as_str().split('|').map(str::to_string).collect())
            }
        },
    }
}

/// Extract every opted-in image tag from `source`, replacing each with its
/// placeholder and recording the original tag text.
pub fn parse(
    context: &Path,
    root_context: &Path,
    source: &str,
    aliases: &BTreeMap<String, String>,
) -> Result<ParsedDocument, ParseError> {
    let mut document = ParsedDocument {
        text: source.to_string(),
        ..ParsedDocument::default()
    };

    let tags: Vec<String> = IMAGES_PATTERN
        .find_iter(source)
        .map(|m| m.as_str().to_string())
        .collect();

    for tag in tags {
        // Both attributes are required; anything else is left untouched.
        if !RESPONSIVE_PATTERN.is_match(&tag) {
            continue;
        }
        let Some(src) = SRC_PATTERN.captures(&tag).and_then(|c| c.get(1)) else {
            continue;
        };
        let image_path = src.as_str();

        let resolved = resolve_image_path(root_context, context, image_path, aliases);

        let art_direction = match ART_DIRECTION_PATTERN.captures(&tag) {
            Some(captures) => {
                let transformations = match captures.get(1) {
                    Some(encoded) => decode_transformations(image_path, encoded.as_str())?,
                    None => TransformationMap::new(),
                };
                Some(InlineArtDirection {
                    transformations,
                    ignore: decode_ignore(&tag),
                })
            }
            // The ignore modifier alone still opts the tag in; it prunes
            // the global defaults rather than switching art direction off.
            None if ART_DIRECTION_IGNORE_PATTERN.is_match(&tag) => Some(InlineArtDirection {
                transformations: TransformationMap::new(),
                ignore: decode_ignore(&tag),
            }),
            None => None,
        };

        document.text = document.text.replacen(&tag, &placeholder(&resolved), 1);
        document.original_tags.insert(resolved.clone(), tag);
        document.directives.push(ImageDirective {
            path: resolved,
            art_direction,
        });
    }

    Ok(document)
}
