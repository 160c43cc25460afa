//! Configuration layer separating CLI arguments from the internal pipeline configuration.
//!
//! - `GlobalArgs`: options shared by every subcommand
//! - `RankCommand`: arguments of the `rank` subcommand
//! - `BaseConfig` / `RankConfig`: validated internal configuration built with `from_args`

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::focus_measure::Method;
use crate::naming::{NamingMode, NamingPolicy, DEFAULT_PAD_WIDTH};
use crate::placement::PlacementAction;
use crate::region_scorer::{Aggregation, ClassFilter};

/// Environment variable consulted when `--model-path` is not given
pub const MODEL_PATH_ENV: &str = "FOCUSRANK_MODEL_PATH";

/// What happens to images in which no region qualified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoRegionPolicy {
    /// Rank with score 0
    #[default]
    Include,
    /// Leave out of every ranking
    Exclude,
}

impl std::str::FromStr for NoRegionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include" => Ok(NoRegionPolicy::Include),
            "exclude" => Ok(NoRegionPolicy::Exclude),
            _ => Err(format!(
                "Unknown no-region policy: {s} (expected include or exclude)"
            )),
        }
    }
}

/// Which detector produces regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    /// YOLOv8 ONNX model
    #[default]
    Yolo,
    /// One region covering the whole frame
    WholeImage,
}

impl std::str::FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yolo" => Ok(DetectorKind::Yolo),
            "whole-image" | "whole" => Ok(DetectorKind::WholeImage),
            _ => Err(format!(
                "Unknown detector: {s} (expected yolo or whole-image)"
            )),
        }
    }
}

/// Parse focus methods from a comma-separated string, or `all`
pub fn parse_methods(s: &str) -> Result<Vec<Method>, String> {
    if s.trim().to_lowercase() == "all" {
        return Ok(Method::all());
    }

    let mut methods = Vec::new();
    for key in s.split(',') {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let method: Method = key.parse()?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }

    if methods.is_empty() {
        return Err("No focus methods specified".to_string());
    }

    // Canonical order so output does not depend on argument order
    methods.sort();
    Ok(methods)
}

/// Parse the class filter from a comma-separated list of names or ids, or `all`
pub fn parse_class_filter(s: &str) -> Result<ClassFilter, String> {
    if s.trim().to_lowercase() == "all" {
        return Ok(ClassFilter::All);
    }

    let labels: HashSet<String> = s
        .split(',')
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect();

    if labels.is_empty() {
        return Err("No valid classes specified".to_string());
    }

    Ok(ClassFilter::Only(labels))
}

/// Parse probability value (must be between 0.0 and 1.0)
pub fn parse_probability(s: &str) -> Result<f32, String> {
    let val = s
        .parse::<f32>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(0.0..=1.0).contains(&val) {
        return Err(format!("Must be between 0.0 and 1.0, got {val}"));
    }
    Ok(val)
}

/// Parse the zero-padding width of numeric name fields (1-12)
pub fn parse_pad_width(s: &str) -> Result<usize, String> {
    let val = s
        .parse::<usize>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(1..=12).contains(&val) {
        return Err(format!("Pad width must be between 1 and 12, got {val}"));
    }
    Ok(val)
}

/// Global CLI arguments that apply to all focusrank commands
#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory receiving the ranked images
    #[arg(long, default_value = "output", global = true)]
    pub output_dir: String,

    /// Write a focusrank.toml run report into the output directory
    #[arg(long, global = true)]
    pub metadata: bool,

    /// Verbosity level (-q/--quiet, -v/-vv/-vvv for info/debug/trace)
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// Use permissive mode for input validation (warn instead of error for unsupported files)
    #[arg(long, global = true)]
    pub permissive: bool,

    /// Device to use for inference (auto, cpu, coreml)
    #[arg(long, default_value = "auto", global = true)]
    pub device: String,

    /// Disable colored output (also respects NO_COLOR and FOCUSRANK_NO_COLOR env vars)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Overwrite files that already exist in the output directory
    #[arg(long, global = true)]
    pub force: bool,
}

/// Configuration common to all commands
#[derive(Debug, Clone, Serialize)]
pub struct BaseConfig {
    /// Input sources (images, directories or glob patterns)
    pub sources: Vec<String>,
    /// Device for inference
    pub device: String,
    pub output_dir: PathBuf,
    /// Whether to skip the run report
    pub skip_metadata: bool,
    /// Use strict mode (fail if files are not found or are unsupported). Opposite of `--permissive`.
    pub strict: bool,
    /// Overwrite existing destinations
    pub force: bool,
}

impl From<GlobalArgs> for BaseConfig {
    fn from(global: GlobalArgs) -> Self {
        Self {
            sources: Vec::new(), // Sources come from the command
            device: global.device,
            output_dir: PathBuf::from(global.output_dir),
            skip_metadata: !global.metadata,
            strict: !global.permissive,
            force: global.force,
        }
    }
}

/// CLI command for ranking images by sharpness (only command-specific arguments)
#[derive(Parser, Debug, Clone)]
pub struct RankCommand {
    /// Path(s) to input images or directories. Supports glob patterns like *.jpg
    #[arg(value_name = "IMAGES_OR_DIRS", required = true)]
    pub sources: Vec<String>,

    /// Focus methods as a comma-separated list (laplacian,tenengrad,brenner,fft,gradient) or 'all'
    #[arg(short, long, default_value = "all", value_name = "METHODS")]
    pub methods: String,

    /// Detector classes to score as a comma-separated list of names or ids, or 'all'
    #[arg(long, default_value = "all", value_name = "CLASSES")]
    pub classes: String,

    /// Output naming: 'rank' ({method}__{rank}__{name}) or 'score' (S{score}__{name})
    #[arg(long, default_value = "rank")]
    pub naming: NamingMode,

    /// How ranked images reach the output directory (copy, move, link)
    #[arg(long, default_value = "copy")]
    pub action: PlacementAction,

    /// Zero-padding width of the rank or score field
    #[arg(long, default_value_t = DEFAULT_PAD_WIDTH, value_parser = parse_pad_width)]
    pub pad_width: usize,

    /// How region scores combine into an image score (max, mean)
    #[arg(long, default_value = "max")]
    pub aggregation: Aggregation,

    /// Images without a qualifying region: 'include' with score 0 or 'exclude'
    #[arg(long, default_value = "include")]
    pub no_region: NoRegionPolicy,

    /// Region detector (yolo, whole-image)
    #[arg(long, default_value = "yolo")]
    pub detector: DetectorKind,

    /// Path to the YOLOv8 ONNX model (falls back to FOCUSRANK_MODEL_PATH)
    #[arg(long)]
    pub model_path: Option<String>,

    /// Confidence threshold for detections (0.0-1.0)
    #[arg(short, long, default_value = "0.25", value_parser = parse_probability)]
    pub confidence: f32,

    /// IoU threshold for non-maximum suppression (0.0-1.0)
    #[arg(long, default_value = "0.7", value_parser = parse_probability)]
    pub iou_threshold: f32,

    /// Worker threads for decoding and scoring (default: available cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Compute names and report the plan without touching any file
    #[arg(long)]
    pub dry_run: bool,
}

/// Internal configuration for a ranking run
#[derive(Debug, Clone, Serialize)]
pub struct RankConfig {
    #[serde(skip)]
    pub base: BaseConfig,
    /// Active methods in canonical order
    pub methods: Vec<Method>,
    pub class_filter: ClassFilter,
    pub naming: NamingPolicy,
    pub action: PlacementAction,
    pub aggregation: Aggregation,
    pub no_region: NoRegionPolicy,
    pub detector: DetectorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    pub confidence: f32,
    pub iou_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    pub dry_run: bool,
}

impl RankConfig {
    /// Create configuration from global args and command-specific args
    pub fn from_args(global: GlobalArgs, cmd: RankCommand) -> Result<Self, String> {
        let model_path = cmd
            .model_path
            .clone()
            .or_else(|| std::env::var(MODEL_PATH_ENV).ok().filter(|p| !p.is_empty()));
        Self::from_args_with_model(global, cmd, model_path)
    }

    fn from_args_with_model(
        global: GlobalArgs,
        cmd: RankCommand,
        model_path: Option<String>,
    ) -> Result<Self, String> {
        let methods = parse_methods(&cmd.methods)?;
        let class_filter = parse_class_filter(&cmd.classes)?;

        if cmd.naming == NamingMode::Score && methods.len() != 1 {
            return Err(
                "Score naming drops the method from the name; choose exactly one method with --methods"
                    .to_string(),
            );
        }
        if cmd.action == PlacementAction::Move && methods.len() != 1 {
            return Err(
                "--action move places each image once; choose exactly one method with --methods"
                    .to_string(),
            );
        }
        if cmd.detector == DetectorKind::Yolo && model_path.is_none() {
            return Err(format!(
                "The yolo detector needs a model: pass --model-path or set {MODEL_PATH_ENV}"
            ));
        }
        if cmd.jobs == Some(0) {
            return Err("--jobs must be at least 1".to_string());
        }

        let mut base: BaseConfig = global.into();
        base.sources = cmd.sources;

        Ok(Self {
            base,
            methods,
            class_filter,
            naming: NamingPolicy {
                mode: cmd.naming,
                pad_width: cmd.pad_width,
            },
            action: cmd.action,
            aggregation: cmd.aggregation,
            no_region: cmd.no_region,
            detector: cmd.detector,
            model_path: model_path.map(PathBuf::from),
            confidence: cmd.confidence,
            iou_threshold: cmd.iou_threshold,
            jobs: cmd.jobs,
            dry_run: cmd.dry_run,
        })
    }
}
