//! The per-document processing pipeline: parse, transform, resize, convert,
//! render.
//!
//! Images of one document are processed in parallel with rayon. Each image is
//! isolated: a failure is recorded and its tag restored verbatim, while the
//! remaining images complete normally.

use crate::adapters::{AdapterError, Adapters};
use crate::config::LoaderConfig;
use crate::conversion::{ConversionError, convert_image};
use crate::parse::{ImageDirective, ParseError, parse, resolve_image_path};
use crate::render::render_document;
use crate::resizing::{ResizeError, resize_image};
use crate::transformation::{
    TransformationError, TransformationKind, normalize_transformations,
};
use crate::types::ResponsiveImage;
use crate::uri;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Transformation(#[from] TransformationError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Resize(#[from] ResizeError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Directory the generated image files are written to, served as `/img/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    images_dir: PathBuf,
}

impl Workspace {
    pub fn at(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            images_dir: dir.to_path_buf(),
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn destination(&self, file_name: &str) -> PathBuf {
        self.images_dir.join(file_name)
    }

    /// Zero-byte placeholder backing the synthetic bottom interval delimiter.
    /// It is only ever measured, never published, so it lives outside the
    /// output tree.
    pub fn empty_image(&self) -> io::Result<PathBuf> {
        let tag = uri::path_tag(&self.images_dir);
        let path = std::env::temp_dir().join(format!("respic-empty-{tag}.jpg"));
        if !path.exists() {
            fs::write(&path, [])?;
        }
        Ok(path)
    }
}

/// One image that could not be processed. Its original tag stays in the
/// output document.
#[derive(Debug)]
pub struct ImageFailure {
    pub path: PathBuf,
    pub error: PipelineError,
}

/// Everything one document's run produced.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub html: String,
    pub images: Vec<ResponsiveImage>,
    pub failures: Vec<ImageFailure>,
}

pub struct Pipeline {
    config: LoaderConfig,
    adapters: Adapters,
    workspace: Workspace,
    root_context: PathBuf,
}

impl Pipeline {
    pub fn new(
        config: LoaderConfig,
        adapters: Adapters,
        workspace: Workspace,
        root_context: PathBuf,
    ) -> Self {
        Self {
            config,
            adapters,
            workspace,
            root_context,
        }
    }

    /// Run the full pipeline over one document's text. `context` is the
    /// directory the document lives in; relative `src` paths resolve
    /// against it.
    pub fn process_document(
        &self,
        context: &Path,
        source: &str,
    ) -> Result<DocumentOutcome, PipelineError> {
        let document = parse(
            context,
            &self.root_context,
            source,
            &self.config.paths.aliases,
        )?;

        let results: Vec<(PathBuf, Result<ResponsiveImage, PipelineError>)> = document
            .directives
            .par_iter()
            .map(|directive| (directive.path.clone(), self.process_image(context, directive)))
            .collect();

        let mut images = Vec::new();
        let mut failures = Vec::new();
        for (path, result) in results {
            match result {
                Ok(image) => images.push(image),
                Err(error) => failures.push(ImageFailure { path, error }),
            }
        }

        let html = render_document(&document, &images);
        Ok(DocumentOutcome {
            html,
            images,
            failures,
        })
    }

    fn process_image(
        &self,
        context: &Path,
        directive: &ImageDirective,
    ) -> Result<ResponsiveImage, PipelineError> {
        let mut image = ResponsiveImage::new(directive.path.clone());

        // Only tags carrying `responsive-ad` opt into art direction; for the
        // rest even the global defaults stay off.
        if let (Some(inline), Some(transformer)) = (
            &directive.art_direction,
            self.adapters.transformer.as_deref(),
        ) {
            let mut descriptors =
                normalize_transformations(&directive.path, inline, &self.config.art_direction)?;
            // Custom transformation paths resolve exactly like `src`
            // attributes: alias table first, then the document directory.
            for descriptor in &mut descriptors {
                if let TransformationKind::Custom { path } = &mut descriptor.kind {
                    let raw = path.to_string_lossy().into_owned();
                    *path = resolve_image_path(
                        &self.root_context,
                        context,
                        &raw,
                        &self.config.paths.aliases,
                    );
                }
            }
            if !descriptors.is_empty() {
                image.sources = transformer.transform(
                    &directive.path,
                    &descriptors,
                    self.workspace.images_dir(),
                )?;
            }
        }

        let image = resize_image(
            self.adapters.resizer.as_deref(),
            image,
            &self.config.resolution_switching,
            self.config.art_direction.default_size,
            &self.workspace,
        )?;

        let image = convert_image(
            self.adapters.converter.as_deref(),
            image,
            &self.config.conversion.enabled_formats,
            &self.workspace,
        )?;

        Ok(image)
    }
}
