//! # Respic
//!
//! Rewrites `<img>` tags in HTML documents into responsive `<picture>`
//! markup, generating every rendition the markup refers to. Documents opt in
//! per tag with a `responsive` attribute; everything else is configured in
//! `respic.toml` or overridden inline on the tag.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! Each opted-in image flows through four stages:
//!
//! ```text
//! 1. Parse       document text  →  image directives + placeholders
//! 2. Transform   original image →  art-directed crops (one per viewport cap)
//! 3. Resize      crops          →  resolution-switching breakpoints
//! 4. Convert     breakpoints    →  one source per enabled output format
//! ```
//!
//! The stages hand each other plain data ([`types::ResponsiveImage`] growing
//! richer at every step), so each one is testable in isolation and any stage
//! can be disabled by configuring its adapter to `"none"`.
//!
//! Images of a document are processed in parallel and isolated from each
//! other: a failing image keeps its original tag, its siblings complete.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`parse`] | Finds opted-in `<img>` tags, decodes inline options, leaves placeholders |
//! | [`transformation`] | Normalizes configured and inline crops into flat descriptors |
//! | [`resizing`] | Allocates breakpoint widths across viewport intervals, adaptively narrowed |
//! | [`conversion`] | Fans sources out per output format, adds the fallback rendition |
//! | [`render`] | Generates the `<picture>` markup with Maud and reassembles the document |
//! | [`pipeline`] | Orchestrates the stages per document, isolates per-image failures |
//! | [`adapters`] | `Transformer`/`Resizer`/`Converter` traits plus the pure Rust preset |
//! | [`config`] | `respic.toml` loading, defaults, and validation |
//! | [`uri`] | Content-hashed `/img/` URI naming shared by all generating stages |
//! | [`types`] | Shared pipeline data: sources, breakpoints, format ordering |
//! | [`output`] | CLI output formatting for build and check runs |
//!
//! # Design Decisions
//!
//! ## Adapters As Traits
//!
//! The three expensive operations (crop, resize, re-encode) sit behind
//! object-safe traits resolved from config by name. The default `"rust"`
//! preset is pure Rust via the [`image`](https://docs.rs/image) crate, so a
//! build needs no external binaries; tests swap in mocks to drive edge cases
//! like the adaptive narrowing loop without encoding a single pixel.
//!
//! ## Maud Over String Templates
//!
//! The generated markup is built with [Maud](https://maud.lambda.xyz/):
//! malformed HTML is a compile error and interpolated attribute values are
//! escaped by default. The one exception is the original `<img>` tag, which
//! is deliberately re-emitted verbatim inside the `<picture>` so author
//! attributes survive the rewrite.

pub mod adapters;
pub mod config;
pub mod conversion;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod resizing;
pub mod transformation;
pub mod types;
pub mod uri;
