//! Resolution-switching breakpoint allocation.
//!
//! Narrow viewports (phones) are the most bandwidth-constrained, so they get
//! the finest breakpoint granularity. The allocator builds one interval per
//! pair of consecutive art-direction boundaries (synthesizing boundaries at
//! `min_viewport` and `max_viewport` when the art-direction set doesn't touch
//! them), splits the breakpoint budget evenly with the remainder going to the
//! lowest intervals, and then adaptively narrows: whenever two consecutive
//! renditions of an interval differ by fewer than `min_size_difference`
//! bytes, the interval gives one slot up — donated forward to the next
//! interval, or discarded if it is the last — and regenerates. An interval
//! narrowed to zero contributes no source.
//!
//! Intervals of one image are processed strictly in ascending index order;
//! the forward donation makes later intervals depend on earlier ones.
//! The total number of generated breakpoints never exceeds the budget.

use crate::adapters::{AdapterError, Resizer};
use crate::config::ResizingConfig;
use crate::pipeline::Workspace;
use crate::types::{
    ArtDirection, Breakpoint, ResponsiveImage, Source, by_increasing_max_viewport,
};
use crate::uri;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("Cannot measure generated image {path}: {source}")]
    Unmeasurable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A viewport boundary scoping breakpoint generation.
///
/// The delimiter width cannot be derived in isolation: both ends of an
/// interval scale by the *end* delimiter's size so spacing stays coherent
/// across crop-ratio changes.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalDelimiter {
    pub path: PathBuf,
    pub size: f64,
    pub viewport: u32,
}

/// The span between two consecutive delimiters, with derived pixel widths
/// and a mutable breakpoint allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizingInterval {
    pub start: IntervalDelimiter,
    pub end: IntervalDelimiter,
    pub start_width: u32,
    pub end_width: u32,
    pub breakpoints_count: u32,
}

fn scaled_width(viewport: u32, size: f64) -> u32 {
    (viewport as f64 * size).ceil() as u32
}

/// Build the delimiter sequence for one image: a synthetic delimiter at
/// `min_viewport`, every art-direction boundary strictly inside the range,
/// and a synthetic delimiter at `max_viewport`.
pub fn generate_interval_delimiters(
    art_sources: &[Source],
    original_path: &Path,
    policy: &ResizingConfig,
    default_size: f64,
    empty_image: &Path,
) -> Vec<IntervalDelimiter> {
    let delimiters: Vec<IntervalDelimiter> = art_sources
        .iter()
        .filter_map(|source| {
            source.art_direction.as_ref().map(|ad| IntervalDelimiter {
                path: source.path.clone(),
                size: ad.size,
                viewport: ad.max_viewport,
            })
        })
        .collect();

    let first_above_min = delimiters
        .iter()
        .find(|d| d.viewport > policy.min_viewport);
    let last_above_max = delimiters
        .iter()
        .filter(|d| d.viewport > policy.max_viewport)
        .next_back();

    // The bottom delimiter must measure as zero bytes when no art-direction
    // source covers it, hence the empty placeholder image.
    let min_delimiter = match first_above_min {
        Some(delimiter) => IntervalDelimiter {
            viewport: policy.min_viewport,
            ..delimiter.clone()
        },
        None => IntervalDelimiter {
            path: empty_image.to_path_buf(),
            size: default_size,
            viewport: policy.min_viewport,
        },
    };

    let max_delimiter = match last_above_max {
        Some(delimiter) => IntervalDelimiter {
            viewport: policy.max_viewport,
            ..delimiter.clone()
        },
        None => IntervalDelimiter {
            path: original_path.to_path_buf(),
            size: default_size,
            viewport: policy.max_viewport,
        },
    };

    let within_range = delimiters
        .into_iter()
        .filter(|d| d.viewport > policy.min_viewport && d.viewport < policy.max_viewport);

    let mut all = vec![min_delimiter];
    all.extend(within_range);
    all.push(max_delimiter);
    all
}

/// Pair up consecutive delimiters and split the breakpoint budget:
/// `floor(budget / count)` each, one extra to the lowest intervals for the
/// remainder, so low viewports win ties.
pub fn generate_intervals(
    delimiters: &[IntervalDelimiter],
    max_breakpoints: u32,
) -> Vec<ResizingInterval> {
    let interval_count = delimiters.len().saturating_sub(1) as u32;
    if interval_count == 0 {
        return Vec::new();
    }

    let per_interval = max_breakpoints / interval_count;
    let remainder = max_breakpoints % interval_count;

    delimiters
        .windows(2)
        .enumerate()
        .map(|(index, pair)| {
            let (start, end) = (&pair[0], &pair[1]);
            let extra = if remainder >= index as u32 + 1 { 1 } else { 0 };
            ResizingInterval {
                start: start.clone(),
                end: end.clone(),
                // Both widths scale by the end delimiter's size.
                start_width: scaled_width(start.viewport, end.size),
                end_width: scaled_width(end.viewport, end.size),
                breakpoints_count: per_interval + extra,
            }
        })
        .collect()
}

fn measure(path: &Path) -> Result<u64, ResizeError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| ResizeError::Unmeasurable {
            path: path.to_path_buf(),
            source,
        })
}

/// Candidate widths for an interval: evenly spaced between the delimiter
/// widths, exclusive of both endpoints.
fn candidate_widths(interval: &ResizingInterval) -> Vec<u32> {
    let count = interval.breakpoints_count;
    let span = interval.end_width.saturating_sub(interval.start_width);
    let unit = span / (count + 1);
    (1..=count)
        .map(|step| interval.start_width + unit * step)
        .collect()
}

/// Generate breakpoints for `intervals[index]`, narrowing adaptively.
///
/// Returns the surviving breakpoints, or an empty vector if the interval
/// narrowed to zero. May increment the next interval's count (forward
/// donation), which is why intervals are processed in ascending order.
fn generate_interval_breakpoints(
    resizer: &dyn Resizer,
    min_size_difference: u64,
    intervals: &mut [ResizingInterval],
    index: usize,
    workspace: &Workspace,
) -> Result<Vec<Breakpoint>, ResizeError> {
    loop {
        let interval = &intervals[index];
        let source_path = interval.end.path.clone();
        let stem = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let extension = source_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("img");
        // Same-stem images are processed in parallel; the path tag keeps
        // their renditions apart. Must match the adapter's URI naming.
        let tag = uri::path_tag(&source_path);

        let mut breakpoints = Vec::with_capacity(interval.breakpoints_count as usize);
        for width in candidate_widths(interval) {
            let destination =
                workspace.destination(&format!("{stem}-{tag}-b_{width}.{extension}"));
            breakpoints.push(resizer.resize(&source_path, &destination, width)?);
        }

        // Measure start delimiter, candidates, end delimiter in ascending
        // order and look for a gap below the threshold.
        let mut sizes = Vec::with_capacity(breakpoints.len() + 2);
        sizes.push(measure(&intervals[index].start.path)?);
        for breakpoint in &breakpoints {
            sizes.push(measure(&breakpoint.path)?);
        }
        sizes.push(measure(&intervals[index].end.path)?);

        let too_narrow = sizes
            .windows(2)
            .any(|pair| (pair[1] as i64 - pair[0] as i64) < min_size_difference as i64);

        if !too_narrow {
            return Ok(breakpoints);
        }

        // Over-subscribed: give one slot up, donating it forward.
        intervals[index].breakpoints_count -= 1;
        if let Some(next) = intervals.get_mut(index + 1) {
            next.breakpoints_count += 1;
        }
        if intervals[index].breakpoints_count == 0 {
            return Ok(Vec::new());
        }
    }
}

/// Run the allocator over one image, one source per surviving interval.
///
/// A `None` resizer short-circuits: the image passes through unchanged.
pub fn resize_image(
    resizer: Option<&dyn Resizer>,
    mut image: ResponsiveImage,
    policy: &ResizingConfig,
    default_size: f64,
    workspace: &Workspace,
) -> Result<ResponsiveImage, ResizeError> {
    let Some(resizer) = resizer else {
        return Ok(image);
    };

    let mut art_sources: Vec<Source> = image
        .sources
        .iter()
        .filter(|s| s.art_direction.is_some())
        .cloned()
        .collect();
    art_sources.sort_by(by_increasing_max_viewport);

    let empty_image = workspace.empty_image()?;
    let delimiters = generate_interval_delimiters(
        &art_sources,
        &image.original_path,
        policy,
        default_size,
        &empty_image,
    );
    let mut intervals = generate_intervals(&delimiters, policy.max_breakpoints_count);

    // Interval sources are keyed by end-delimiter viewport: reuse the
    // art-direction source for that viewport when one exists (retaining its
    // crop metadata), otherwise synthesize one from the original image.
    let mut sources = art_sources;

    for index in 0..intervals.len() {
        if intervals[index].breakpoints_count == 0 {
            continue;
        }

        let breakpoints = generate_interval_breakpoints(
            resizer,
            policy.min_size_difference,
            &mut intervals,
            index,
            workspace,
        )?;
        if breakpoints.is_empty() {
            continue;
        }

        let end_viewport = intervals[index].end.viewport;
        match sources.iter_mut().find(|s| {
            s.art_direction
                .as_ref()
                .is_some_and(|ad| ad.max_viewport == end_viewport)
        }) {
            Some(existing) => existing.breakpoints.extend(breakpoints),
            None => sources.push(Source {
                path: image.original_path.clone(),
                breakpoints,
                format: None,
                art_direction: Some(ArtDirection {
                    max_viewport: end_viewport,
                    size: default_size,
                }),
            }),
        }
    }

    image.sources = sources;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::{FailingResizer, MockResizer};
    use std::fs;
    use tempfile::TempDir;

    fn policy(min: u32, max: u32, budget: u32, min_diff: u64) -> ResizingConfig {
        ResizingConfig {
            resizer: Some("rust".to_string()),
            min_viewport: min,
            max_viewport: max,
            max_breakpoints_count: budget,
            min_size_difference: min_diff,
            support_retina: true,
        }
    }

    fn art_source(dir: &Path, viewport: u32, size: f64, bytes: usize) -> Source {
        let path = dir.join(format!("crop-{viewport}.jpg"));
        fs::write(&path, vec![0u8; bytes]).unwrap();
        Source {
            path,
            breakpoints: Vec::new(),
            format: None,
            art_direction: Some(ArtDirection {
                max_viewport: viewport,
                size,
            }),
        }
    }

    fn delimiter(viewport: u32) -> IntervalDelimiter {
        IntervalDelimiter {
            path: PathBuf::from("/p.jpg"),
            size: 1.0,
            viewport,
        }
    }

    #[test]
    fn synthesizes_delimiters_at_both_ends() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![
            art_source(tmp.path(), 600, 1.0, 10),
            art_source(tmp.path(), 1200, 1.0, 10),
            art_source(tmp.path(), 1920, 1.0, 10),
        ];

        let delimiters = generate_interval_delimiters(
            &sources,
            Path::new("/orig.jpg"),
            &policy(200, 2400, 5, 35),
            1.0,
            Path::new("/empty.jpg"),
        );

        let viewports: Vec<u32> = delimiters.iter().map(|d| d.viewport).collect();
        assert_eq!(viewports, vec![200, 600, 1200, 1920, 2400]);
        // 4 intervals from 5 delimiters
        assert_eq!(generate_intervals(&delimiters, 5).len(), 4);
    }

    #[test]
    fn min_delimiter_borrows_first_covering_source() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![art_source(tmp.path(), 600, 0.5, 10)];

        let delimiters = generate_interval_delimiters(
            &sources,
            Path::new("/orig.jpg"),
            &policy(200, 3840, 5, 35),
            1.0,
            Path::new("/empty.jpg"),
        );

        assert_eq!(delimiters[0].viewport, 200);
        assert_eq!(delimiters[0].size, 0.5);
        assert_eq!(delimiters[0].path, sources[0].path);
    }

    #[test]
    fn empty_art_direction_uses_placeholder_and_original() {
        let delimiters = generate_interval_delimiters(
            &[],
            Path::new("/orig.jpg"),
            &policy(200, 3840, 5, 35),
            1.0,
            Path::new("/empty.jpg"),
        );

        assert_eq!(delimiters.len(), 2);
        assert_eq!(delimiters[0].path, PathBuf::from("/empty.jpg"));
        assert_eq!(delimiters[1].path, PathBuf::from("/orig.jpg"));
    }

    #[test]
    fn budget_remainder_favors_low_intervals() {
        let delimiters: Vec<_> = [200, 600, 1200, 3840].iter().map(|v| delimiter(*v)).collect();
        let intervals = generate_intervals(&delimiters, 5);

        let counts: Vec<u32> = intervals.iter().map(|i| i.breakpoints_count).collect();
        // floor(5/3)=1 each, remainder 2 to the first two
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(counts.iter().sum::<u32>(), 5);
    }

    #[test]
    fn widths_scale_by_end_delimiter_size() {
        let delimiters = vec![
            IntervalDelimiter {
                path: PathBuf::from("/a.jpg"),
                size: 1.0,
                viewport: 200,
            },
            IntervalDelimiter {
                path: PathBuf::from("/b.jpg"),
                size: 0.5,
                viewport: 601,
            },
        ];
        let intervals = generate_intervals(&delimiters, 2);

        // Both ends use the end delimiter's 0.5, ceiling-rounded
        assert_eq!(intervals[0].start_width, 100);
        assert_eq!(intervals[0].end_width, 301);
    }

    #[test]
    fn no_resizer_returns_image_unchanged() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let mut image = ResponsiveImage::new(PathBuf::from("/orig.jpg"));
        image.sources.push(Source::plain(
            PathBuf::from("/orig.jpg"),
            Vec::new(),
        ));

        let expected = image.clone();
        let result =
            resize_image(None, image, &policy(200, 3840, 5, 35), 1.0, &workspace).unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn generates_sources_within_budget() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let original = tmp.path().join("orig.jpg");
        // Large enough that the top delimiter clears the widest rendition.
        fs::write(&original, vec![0u8; 400_000]).unwrap();

        let image = ResponsiveImage::new(original);
        // Every gap clears the threshold: widths step by hundreds of pixels
        // and each pixel costs 10 bytes.
        let resizer = MockResizer::new(10);

        let result = resize_image(
            Some(&resizer),
            image,
            &policy(200, 3840, 5, 35),
            1.0,
            &workspace,
        )
        .unwrap();

        // No art direction: one synthesized source anchored to the original.
        assert_eq!(result.sources.len(), 1);
        let source = &result.sources[0];
        assert_eq!(source.art_direction.as_ref().unwrap().max_viewport, 3840);
        assert_eq!(source.breakpoints.len(), 5);

        let mut widths: Vec<u32> = source.breakpoints.iter().map(|b| b.width).collect();
        let sorted = {
            let mut w = widths.clone();
            w.sort_unstable();
            w
        };
        widths.sort_unstable();
        assert_eq!(widths, sorted);
        // Interior widths only, never the endpoints
        assert!(widths.iter().all(|w| *w > 200 && *w < 3840));
    }

    #[test]
    fn narrowing_donates_forward_and_total_never_grows() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let original = tmp.path().join("orig.jpg");
        fs::write(&original, vec![0u8; 1000]).unwrap();

        let mut image = ResponsiveImage::new(original);
        image
            .sources
            .push(art_source(tmp.path(), 600, 1.0, 500));

        // Zero factor: every rendition is 0 bytes, every gap is too narrow,
        // so each interval drains to zero and donates forward until the last
        // interval discards the whole budget.
        let resizer = MockResizer::new(0);

        let result = resize_image(
            Some(&resizer),
            image,
            &policy(200, 3840, 4, 35),
            1.0,
            &workspace,
        )
        .unwrap();

        // Both intervals narrowed to zero: no breakpoints anywhere.
        let total: usize = result.sources.iter().map(|s| s.breakpoints.len()).sum();
        assert_eq!(total, 0);
        // The first interval's drained slots were each retried in the second,
        // so the resizer saw the donation happen: 2+1 candidates in interval
        // one (counts 2, then 1), then 2+1+...  in interval two.
        assert!(resizer.resize_count() > 0);
    }

    #[test]
    fn interval_source_reuses_art_direction_metadata() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let original = tmp.path().join("orig.jpg");
        fs::write(&original, vec![0u8; 400_000]).unwrap();

        let mut image = ResponsiveImage::new(original.clone());
        // The narrow crop is delimiter to its own interval on both sides, so
        // with the linear mock that interval always narrows away and donates
        // its slot to the 600..1200 interval.
        image.sources.push(art_source(tmp.path(), 600, 1.0, 1000));
        image.sources.push(art_source(tmp.path(), 1200, 0.75, 20_000));

        // Budget 2 over 3 intervals: counts 1, 1, 0.
        let resizer = MockResizer::new(10);
        let result = resize_image(
            Some(&resizer),
            image,
            &policy(200, 3840, 2, 35),
            1.0,
            &workspace,
        )
        .unwrap();

        // The 1200 source kept its size metadata and gained breakpoints.
        let crop = result
            .sources
            .iter()
            .find(|s| s.art_direction.as_ref().unwrap().max_viewport == 1200)
            .unwrap();
        assert_eq!(crop.art_direction.as_ref().unwrap().size, 0.75);
        assert_eq!(crop.breakpoints.len(), 2);
        // Renditions come from the crop, scaled by its size.
        assert!(crop
            .breakpoints
            .iter()
            .all(|b| b.width > 450 && b.width < 900));

        // The top interval got no budget, so no source was synthesized.
        assert!(!result
            .sources
            .iter()
            .any(|s| s.art_direction.as_ref().unwrap().max_viewport == 3840));
    }

    #[test]
    fn same_stem_images_resize_to_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let resizer = MockResizer::new(10);

        let mut paths = Vec::new();
        for dir in ["posts", "about"] {
            let sub = tmp.path().join(dir);
            fs::create_dir_all(&sub).unwrap();
            let original = sub.join("photo.jpg");
            fs::write(&original, vec![0u8; 400_000]).unwrap();

            let result = resize_image(
                Some(&resizer),
                ResponsiveImage::new(original),
                &policy(200, 3840, 2, 35),
                1.0,
                &workspace,
            )
            .unwrap();
            paths.extend(
                result
                    .sources
                    .iter()
                    .flat_map(|s| s.breakpoints.iter().map(|b| b.path.clone())),
            );
        }

        // Two breakpoints per image, none shared.
        assert_eq!(paths.len(), 4);
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn adapter_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let image = ResponsiveImage::new(tmp.path().join("orig.jpg"));

        let result = resize_image(
            Some(&FailingResizer),
            image,
            &policy(200, 3840, 5, 35),
            1.0,
            &workspace,
        );
        assert!(matches!(result, Err(ResizeError::Adapter(_))));
    }

    #[test]
    fn unmeasurable_breakpoint_is_fatal() {
        struct GhostResizer;
        impl Resizer for GhostResizer {
            fn resize(
                &self,
                source: &Path,
                destination: &Path,
                target_width: u32,
            ) -> Result<Breakpoint, AdapterError> {
                // Reports a breakpoint without creating the file.
                Ok(Breakpoint {
                    path: destination.to_path_buf(),
                    uri: String::new(),
                    uri_with_hash: String::new(),
                    width: target_width,
                })
            }
        }

        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::at(tmp.path()).unwrap();
        let original = tmp.path().join("orig.jpg");
        fs::write(&original, vec![0u8; 100]).unwrap();
        let image = ResponsiveImage::new(original);

        let result = resize_image(
            Some(&GhostResizer),
            image,
            &policy(200, 3840, 2, 35),
            1.0,
            &workspace,
        );
        assert!(matches!(result, Err(ResizeError::Unmeasurable { .. })));
    }
}
