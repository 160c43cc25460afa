//! The ranking pipeline: detect, score, rank, name and place.
//!
//! Decoding, detection and scoring run on a bounded rayon pool; the detector
//! itself sits behind a mutex so one worker uses it at a time. Ranking waits
//! for every image to be scored, and placement starts once the full plan is
//! known.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::color_utils::{colors, progress::create_batch_progress_bar, symbols};
use crate::config::{NoRegionPolicy, RankConfig};
use crate::detector::Detector;
use crate::focus_measure::Method;
use crate::naming::NamingPolicy;
use crate::onnx_session::ModelInfo;
use crate::placement::{
    check_destinations, place, Placement, PlacementAction, PlacementFailure, PlacementSummary,
};
use crate::progress::finish_progress_bar;
use crate::ranker::{rank, RankedEntry};
use crate::region::Region;
use crate::region_scorer::{score_image, Aggregation, ClassFilter, ImageScores};

/// Everything the pipeline needs besides the detector
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub methods: Vec<Method>,
    pub class_filter: ClassFilter,
    pub naming: NamingPolicy,
    pub action: PlacementAction,
    pub aggregation: Aggregation,
    pub no_region: NoRegionPolicy,
    pub output_dir: PathBuf,
    pub force: bool,
    pub dry_run: bool,
    /// Worker threads; `None` uses rayon's default
    pub jobs: Option<usize>,
}

impl PipelineOptions {
    /// Defaults for every policy, writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            methods: Method::all(),
            class_filter: ClassFilter::All,
            naming: NamingPolicy::default(),
            action: PlacementAction::Copy,
            aggregation: Aggregation::Max,
            no_region: NoRegionPolicy::Include,
            output_dir: output_dir.into(),
            force: false,
            dry_run: false,
            jobs: None,
        }
    }
}

impl From<&RankConfig> for PipelineOptions {
    fn from(config: &RankConfig) -> Self {
        Self {
            methods: config.methods.clone(),
            class_filter: config.class_filter.clone(),
            naming: config.naming,
            action: config.action,
            aggregation: config.aggregation,
            no_region: config.no_region,
            output_dir: config.base.output_dir.clone(),
            force: config.base.force,
            dry_run: config.dry_run,
            jobs: config.jobs,
        }
    }
}

/// What happened to one discovered image during scoring
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Scored {
        path: PathBuf,
        scores: ImageScores,
        detections: usize,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
}

impl ImageOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ImageOutcome::Scored { path, .. } | ImageOutcome::Failed { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedImage {
    pub path: PathBuf,
    pub error: String,
}

/// Per-run problems that did not stop the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Images that could not be decoded or run through the detector
    pub failed: Vec<FailedImage>,
    /// Images where no region passed the class filter
    pub no_region: Vec<PathBuf>,
    /// Whether no-region images were left out of the rankings
    pub no_region_excluded: bool,
}

/// One method's full ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodRanking {
    pub method: Method,
    pub entries: Vec<RankedEntry>,
}

/// Destinations for every entry that could be named, and the entries that could not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementPlan {
    pub placements: Vec<Placement>,
    pub unnamed: Vec<PlacementFailure>,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub images_discovered: usize,
    pub images_scored: usize,
    /// Detections reported across all scored images, before class filtering
    pub detections_found: usize,
    pub rankings: Vec<MethodRanking>,
    pub plan: Vec<Placement>,
    pub placement: PlacementSummary,
    pub diagnostics: Diagnostics,
    pub elapsed_ms: f64,
}

impl RunResult {
    /// True when at least one placement failed
    pub fn has_failures(&self) -> bool {
        self.placement.failed() > 0
    }
}

pub struct Pipeline<D: Detector> {
    detector: Mutex<D>,
    options: PipelineOptions,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(detector: D, options: PipelineOptions) -> Self {
        Self {
            detector: Mutex::new(detector),
            options,
        }
    }

    /// Information about the detector's model, if it has one
    pub fn model_info(&self) -> Option<ModelInfo> {
        self.detector
            .lock()
            .ok()
            .and_then(|detector| detector.model_info().cloned())
    }

    fn detect(&self, image: &image::DynamicImage) -> Result<Vec<Region>> {
        let detections = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| anyhow!("Detector lock poisoned by a panicked worker"))?;
            detector.detect(image)?
        };

        let (width, height) = (image.width(), image.height());
        Ok(detections
            .iter()
            .filter_map(|detection| Region::from_detection(detection, width, height))
            .collect())
    }

    /// Decode, detect and score a single image
    pub fn score_path(&self, path: &Path) -> Result<(ImageScores, usize)> {
        let start = Instant::now();
        let image = image::open(path)
            .with_context(|| format!("Failed to decode image: {}", path.display()))?;
        let regions = self
            .detect(&image)
            .with_context(|| format!("Detector failed on {}", path.display()))?;
        let scores = score_image(
            &image,
            &regions,
            &self.options.class_filter,
            &self.options.methods,
            self.options.aggregation,
        );

        debug!(
            "Scored {} ({} regions, {} qualifying) in {:.1}ms: {}",
            path.display(),
            regions.len(),
            scores.qualifying_regions,
            start.elapsed().as_secs_f64() * 1000.0,
            scores
                .scores
                .iter()
                .map(|(method, score)| format!("{method}={score:.2}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok((scores, regions.len()))
    }

    /// Score every image, returning outcomes in the order of `paths`.
    pub fn score_images(&self, paths: &[PathBuf]) -> Result<Vec<ImageOutcome>> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.options.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder
            .build()
            .context("Failed to build the scoring thread pool")?;

        let progress_bar = create_batch_progress_bar(paths.len());

        let outcomes = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let outcome = match self.score_path(path) {
                        Ok((scores, detections)) => ImageOutcome::Scored {
                            path: path.clone(),
                            scores,
                            detections,
                        },
                        Err(e) => {
                            warn!(
                                "{}Skipping {}: {}",
                                symbols::warning(),
                                path.display(),
                                colors::warning_level(&format!("{e:#}"))
                            );
                            ImageOutcome::Failed {
                                path: path.clone(),
                                error: format!("{e:#}"),
                            }
                        }
                    };
                    if let Some(pb) = &progress_bar {
                        pb.inc(1);
                    }
                    outcome
                })
                .collect::<Vec<_>>()
        });

        if let Some(pb) = &progress_bar {
            finish_progress_bar(pb);
        }
        Ok(outcomes)
    }

    /// Build one ranking per active method from the scoring outcomes.
    pub fn rank_outcomes(&self, outcomes: &[ImageOutcome]) -> (Vec<MethodRanking>, Diagnostics) {
        let mut diagnostics = Diagnostics {
            no_region_excluded: self.options.no_region == NoRegionPolicy::Exclude,
            ..Default::default()
        };
        let mut rankable: Vec<(&Path, &ImageScores)> = Vec::new();

        for outcome in outcomes {
            match outcome {
                ImageOutcome::Scored { path, scores, .. } => {
                    if scores.no_qualifying_region() {
                        info!(
                            "{}No qualifying region in {}",
                            symbols::no_region(),
                            path.display()
                        );
                        diagnostics.no_region.push(path.clone());
                        if self.options.no_region == NoRegionPolicy::Exclude {
                            continue;
                        }
                    }
                    rankable.push((path, scores));
                }
                ImageOutcome::Failed { path, error } => diagnostics.failed.push(FailedImage {
                    path: path.clone(),
                    error: error.clone(),
                }),
            }
        }

        let rankings = self
            .options
            .methods
            .iter()
            .map(|&method| {
                let scored: Vec<(PathBuf, f64)> = rankable
                    .iter()
                    .map(|(path, scores)| (path.to_path_buf(), scores.get(method)))
                    .collect();
                MethodRanking {
                    method,
                    entries: rank(&scored),
                }
            })
            .collect();

        (rankings, diagnostics)
    }

    fn destination_name(&self, method: Method, entry: &RankedEntry) -> Result<String> {
        let original = entry
            .source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Source has no UTF-8 file name: {}", entry.source.display()))?;
        self.options.naming.name_for(method, entry, original)
    }

    /// Compute every destination.
    ///
    /// An entry that cannot be named becomes a failure of its own. Fails if two
    /// entries would share a destination.
    pub fn plan_placements(&self, rankings: &[MethodRanking]) -> Result<PlacementPlan> {
        let mut plan = PlacementPlan::default();
        for ranking in rankings {
            for entry in &ranking.entries {
                match self.destination_name(ranking.method, entry) {
                    Ok(name) => plan.placements.push(Placement {
                        method: ranking.method,
                        rank: entry.rank,
                        score: entry.score,
                        source: entry.source.clone(),
                        destination: self.options.output_dir.join(name),
                    }),
                    Err(e) => {
                        warn!(
                            "{}Cannot name {}: {e:#}",
                            symbols::warning(),
                            entry.source.display()
                        );
                        plan.unnamed.push(PlacementFailure {
                            source: entry.source.clone(),
                            destination: self.options.output_dir.clone(),
                            error: format!("{e:#}"),
                        });
                    }
                }
            }
        }
        check_destinations(&plan.placements)?;
        Ok(plan)
    }

    /// Carry out the plan. Individual failures are collected, not fatal.
    pub fn place_all(&self, plan: &PlacementPlan) -> PlacementSummary {
        let mut summary = PlacementSummary {
            action: self.options.action,
            planned: plan.placements.len() + plan.unnamed.len(),
            dry_run: self.options.dry_run,
            failures: plan.unnamed.clone(),
            ..Default::default()
        };

        if self.options.dry_run {
            for placement in &plan.placements {
                info!(
                    "{}{} {} -> {}",
                    symbols::dry_run(),
                    self.options.action,
                    placement.source.display(),
                    placement.destination.display()
                );
            }
            return summary;
        }

        let results: Vec<Result<(), PlacementFailure>> = plan
            .placements
            .par_iter()
            .map(|placement| {
                place(
                    &placement.source,
                    &placement.destination,
                    self.options.action,
                    self.options.force,
                )
                .map_err(|e| PlacementFailure {
                    source: placement.source.clone(),
                    destination: placement.destination.clone(),
                    error: format!("{e:#}"),
                })
            })
            .collect();

        for result in results {
            match result {
                Ok(()) => summary.placed += 1,
                Err(failure) => {
                    warn!(
                        "{}Failed to place {}: {}",
                        symbols::warning(),
                        failure.destination.display(),
                        colors::warning_level(&failure.error)
                    );
                    summary.failures.push(failure);
                }
            }
        }
        summary
    }

    /// Run all stages over already-discovered images
    pub fn run(&self, paths: &[PathBuf]) -> Result<RunResult> {
        let start = Instant::now();

        let outcomes = self.score_images(paths)?;
        let (rankings, diagnostics) = self.rank_outcomes(&outcomes);
        let plan = self.plan_placements(&rankings)?;
        let placement = self.place_all(&plan);

        let (images_scored, detections_found) =
            outcomes.iter().fold((0, 0), |(scored, found), outcome| match outcome {
                ImageOutcome::Scored { detections, .. } => (scored + 1, found + detections),
                ImageOutcome::Failed { .. } => (scored, found),
            });

        Ok(RunResult {
            images_discovered: paths.len(),
            images_scored,
            detections_found,
            rankings,
            plan: plan.placements,
            placement,
            diagnostics,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
