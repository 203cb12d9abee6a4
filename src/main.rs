use clap::{Parser, Subcommand};
use respic::adapters::Adapters;
use respic::config::LoaderConfig;
use respic::output;
use respic::parse;
use respic::pipeline::{Pipeline, Workspace};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "respic")]
#[command(about = "Rewrites <img> tags into responsive <picture> markup")]
#[command(long_about = "\
Rewrites <img> tags into responsive <picture> markup

Documents opt in per tag: an <img> carrying the `responsive` attribute gets
art-directed crops, resolution-switching breakpoints and per-format sources
generated for it, and is replaced by an equivalent <picture> element. Plain
<img> tags are left untouched.

Inline attributes:

  responsive                      opt the tag in
  responsive-ad=\"600_(ratio=3:2)\" add or override art-direction crops
  responsive-ad-ignore[=\"a|b\"]    drop configured default crops
  responsive-img-class=\"cls\"      class for the fallback <img>
  responsive-picture-class=\"cls\"  class for the generated <picture>

Configuration is read from respic.toml in the source root.")]
#[command(version)]
struct Cli {
    /// Source directory scanned for HTML documents
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process all documents and write the rewritten site
    Build,
    /// Parse all documents without generating anything
    Check,
}

/// Entry in the build manifest, one per document.
#[derive(Serialize)]
struct ManifestEntry {
    document: PathBuf,
    images: Vec<respic::types::ResponsiveImage>,
    failures: Vec<ManifestFailure>,
}

#[derive(Serialize)]
struct ManifestFailure {
    path: PathBuf,
    error: String,
}

fn normalized(path: &Path) -> &Path {
    path.strip_prefix(".").unwrap_or(path)
}

/// All `.html`/`.htm` files under `source`, skipping the output directory
/// when it is nested inside the source tree.
fn find_documents(source: &Path, output: &Path) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = WalkDir::new(source)
        .into_iter()
        .filter_entry(|entry| normalized(entry.path()) != normalized(output))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        })
        .map(|entry| entry.into_path())
        .collect();
    documents.sort();
    documents
}

fn relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn build(cli: &Cli) -> Result<usize, Box<dyn std::error::Error>> {
    let config = LoaderConfig::load(&cli.source)?;
    let adapters = Adapters::from_config(&config)?;
    let workspace = Workspace::at(&cli.output.join("img"))?;
    let pipeline = Pipeline::new(config, adapters, workspace, cli.source.clone());

    let documents = find_documents(&cli.source, &cli.output);
    let mut manifest = Vec::with_capacity(documents.len());
    let mut total_images = 0;
    let mut total_failures = 0;

    for (position, document) in documents.iter().enumerate() {
        let context = document.parent().unwrap_or(&cli.source);
        let source_text = std::fs::read_to_string(document)?;
        let outcome = pipeline.process_document(context, &source_text)?;

        let destination = cli.output.join(relative(document, &cli.source));
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&destination, &outcome.html)?;

        output::print_document(position + 1, relative(document, &cli.source), &outcome);

        total_images += outcome.images.len();
        total_failures += outcome.failures.len();
        manifest.push(ManifestEntry {
            document: relative(document, &cli.source).to_path_buf(),
            images: outcome.images,
            failures: outcome
                .failures
                .into_iter()
                .map(|f| ManifestFailure {
                    path: f.path,
                    error: f.error.to_string(),
                })
                .collect(),
        });
    }

    let manifest_path = cli.output.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    println!();
    println!(
        "{}",
        output::format_build_summary(documents.len(), total_images, total_failures)
    );
    Ok(total_failures)
}

fn check(cli: &Cli) -> Result<usize, Box<dyn std::error::Error>> {
    let config = LoaderConfig::load(&cli.source)?;
    let documents = find_documents(&cli.source, &cli.output);
    let mut total_directives = 0;
    let mut total_errors = 0;

    for (position, document) in documents.iter().enumerate() {
        let context = document.parent().unwrap_or(&cli.source);
        let source_text = std::fs::read_to_string(document)?;
        let shown = relative(document, &cli.source);

        match parse::parse(context, &cli.source, &source_text, &config.paths.aliases) {
            Ok(parsed) => {
                println!(
                    "{:0>3} {}: {} responsive image tag{}",
                    position + 1,
                    shown.display(),
                    parsed.directives.len(),
                    if parsed.directives.len() == 1 { "" } else { "s" }
                );
                total_directives += parsed.directives.len();
            }
            Err(error) => {
                println!("{:0>3} {}: FAILED ({})", position + 1, shown.display(), error);
                total_errors += 1;
            }
        }
    }

    println!();
    println!(
        "{}",
        output::format_check_summary(documents.len(), total_directives)
    );
    Ok(total_errors)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let failures = match cli.command {
        Command::Build => build(&cli)?,
        Command::Check => check(&cli)?,
    };

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
