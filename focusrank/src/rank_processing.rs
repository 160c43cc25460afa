//! Drives the `rank` command: discovery, detector setup, the pipeline run and
//! the optional run report.

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{info, warn};
use std::time::Instant;

use crate::color_utils::{colors, symbols};
use crate::config::{DetectorKind, RankConfig};
use crate::detector::{Detector, WholeImageDetector};
use crate::image_input::{collect_images_from_sources, source_kind, ImageInputConfig};
use crate::pipeline::{Pipeline, PipelineOptions, RunResult};
use crate::report::{
    collect_env_vars, report_path, save_report, ExecutionContext, InputSummary, RunReport,
    SystemInfo,
};
use crate::yolo::YoloDetector;

/// Run the `rank` command end to end.
///
/// Returns `Ok(None)` when discovery found nothing to rank.
pub fn run_rank_processing(config: &RankConfig) -> Result<Option<RunResult>> {
    let start_timestamp = Utc::now();

    let image_config = ImageInputConfig::from_strict_flag(config.base.strict);
    let image_files = collect_images_from_sources(&config.base.sources, &image_config)?;
    if image_files.is_empty() {
        warn!("{}No valid images found to rank", symbols::warning());
        return Ok(None);
    }

    info!(
        "{}Found {} image(s) to rank",
        symbols::resources_found(),
        image_files.len()
    );

    let options = PipelineOptions::from(config);
    let result = match config.detector {
        DetectorKind::WholeImage => {
            run_with_detector(WholeImageDetector, options, &image_files, config, start_timestamp)?
        }
        DetectorKind::Yolo => {
            let model_path = config
                .model_path
                .as_deref()
                .ok_or_else(|| anyhow!("The yolo detector needs a model path"))?;
            let detector = YoloDetector::load(
                model_path,
                &config.base.device,
                config.confidence,
                config.iou_threshold,
            )?;
            info!(
                "{}Loaded model {}",
                symbols::model_loaded(),
                model_path.display()
            );
            run_with_detector(detector, options, &image_files, config, start_timestamp)?
        }
    };

    Ok(Some(result))
}

fn run_with_detector<D: Detector>(
    detector: D,
    options: PipelineOptions,
    image_files: &[std::path::PathBuf],
    config: &RankConfig,
    start_timestamp: chrono::DateTime<Utc>,
) -> Result<RunResult> {
    let framework_start = Instant::now();
    let detector_name = detector.name().to_string();
    let pipeline = Pipeline::new(detector, options);

    let result = pipeline.run(image_files)?;
    log_summary(&result);

    if !config.base.skip_metadata {
        let report = RunReport::new(
            ExecutionContext {
                timestamp: start_timestamp,
                focusrank_version: env!("CARGO_PKG_VERSION").to_string(),
                command_line: std::env::args().collect(),
                exit_code: if result.has_failures() { 1 } else { 0 },
                total_processing_time_ms: framework_start.elapsed().as_secs_f64() * 1000.0,
                env_vars: collect_env_vars(),
            },
            toml::Value::try_from(config)?,
            SystemInfo {
                device_requested: config.base.device.clone(),
                detector: detector_name,
                model: pipeline.model_info(),
            },
            InputSummary {
                sources: config.base.sources.clone(),
                source_types: config.base.sources.iter().map(|s| source_kind(s)).collect(),
                strict_mode: config.base.strict,
                images_found: result.images_discovered,
                images_scored: result.images_scored,
                images_failed: result.diagnostics.failed.len(),
                detections_found: result.detections_found,
            },
            &result,
        );
        let path = report_path(&config.base.output_dir);
        if config.dry_run {
            info!(
                "{}Would write run report to {}",
                symbols::dry_run(),
                path.display()
            );
        } else {
            save_report(&report, &path)?;
            log::debug!("📋 Saved run report to: {}", path.display());
        }
    }

    Ok(result)
}

fn log_summary(result: &RunResult) {
    for ranking in &result.rankings {
        if let Some(best) = ranking.entries.first() {
            info!(
                "{}{}: best {} (score {:.2})",
                symbols::ranking_result(),
                colors::emphasis(ranking.method.key()),
                best.source.display(),
                best.score
            );
        }
    }

    let diagnostics = &result.diagnostics;
    if !diagnostics.no_region.is_empty() {
        info!(
            "{} of {} images had no qualifying region{}",
            diagnostics.no_region.len(),
            result.images_discovered,
            if diagnostics.no_region_excluded {
                " and were left out"
            } else {
                ""
            }
        );
    }
    if !diagnostics.failed.is_empty() {
        warn!(
            "{}{} of {} images could not be scored",
            symbols::warning(),
            diagnostics.failed.len(),
            result.images_discovered
        );
    }

    let placement = &result.placement;
    if placement.dry_run {
        info!(
            "{}Planned {} placement(s), nothing written",
            symbols::dry_run(),
            placement.planned
        );
    } else if placement.failed() == 0 {
        info!(
            "{}Placed {} file(s) in {:.1}s",
            symbols::completed_successfully(),
            placement.placed,
            result.elapsed_ms / 1000.0
        );
    } else {
        warn!(
            "{}Placed {} of {} file(s); {} failed",
            symbols::completed_partially_successfully(),
            placement.placed,
            placement.planned,
            placement.failed()
        );
    }
}
