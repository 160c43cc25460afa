//! The `focusrank.toml` run report written with `--metadata`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::image_input::SourceKind;
use crate::onnx_session::ModelInfo;
use crate::pipeline::{Diagnostics, RunResult};
use crate::placement::PlacementSummary;

pub const REPORT_FILE_NAME: &str = "focusrank.toml";

#[derive(Serialize, Debug, Clone)]
pub struct ExecutionContext {
    pub timestamp: DateTime<Utc>,
    pub focusrank_version: String,
    pub command_line: Vec<String>,
    pub exit_code: i32,
    pub total_processing_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SystemInfo {
    pub device_requested: String,
    pub detector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
}

#[derive(Serialize, Debug, Clone)]
pub struct InputSummary {
    pub sources: Vec<String>,
    pub source_types: Vec<SourceKind>,
    pub strict_mode: bool,
    pub images_found: usize,
    pub images_scored: usize,
    pub images_failed: usize,
    pub detections_found: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct ReportEntry {
    pub rank: usize,
    pub score: f64,
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Serialize, Debug, Clone)]
pub struct RunReport {
    pub execution: ExecutionContext,
    pub config: toml::Value,
    pub system: SystemInfo,
    pub input: InputSummary,
    /// Method key -> entries in rank order
    pub rankings: BTreeMap<String, Vec<ReportEntry>>,
    pub diagnostics: Diagnostics,
    pub placement: PlacementSummary,
}

impl RunReport {
    pub fn new(
        execution: ExecutionContext,
        config: toml::Value,
        system: SystemInfo,
        input: InputSummary,
        result: &RunResult,
    ) -> Self {
        let mut rankings: BTreeMap<String, Vec<ReportEntry>> = BTreeMap::new();
        for placement in &result.plan {
            rankings
                .entry(placement.method.key().to_string())
                .or_default()
                .push(ReportEntry {
                    rank: placement.rank,
                    score: placement.score,
                    source: placement.source.clone(),
                    destination: placement.destination.clone(),
                });
        }

        Self {
            execution,
            config,
            system,
            input,
            rankings,
            diagnostics: result.diagnostics.clone(),
            placement: result.placement.clone(),
        }
    }
}

/// Collect `FOCUSRANK_*` environment variables that are present and non-empty
pub fn collect_env_vars() -> Option<BTreeMap<String, String>> {
    let vars: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, value)| key.starts_with("FOCUSRANK_") && !value.is_empty())
        .collect();
    if vars.is_empty() {
        None
    } else {
        Some(vars)
    }
}

pub fn report_path(output_dir: &Path) -> PathBuf {
    output_dir.join(REPORT_FILE_NAME)
}

/// Serialise and write the report, creating the output directory if needed
pub fn save_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(report).map_err(|e| {
        log::debug!("Report that failed to serialize: {report:#?}");
        anyhow::anyhow!("Failed to serialize run report to TOML: {e}")
    })?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write run report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus_measure::Method;
    use crate::placement::{Placement, PlacementAction};
    use tempfile::TempDir;

    fn sample_result() -> RunResult {
        let plan = vec![
            Placement {
                method: Method::Laplacian,
                rank: 1,
                score: 812.5,
                source: PathBuf::from("cars/c.jpg"),
                destination: PathBuf::from("output/laplacian__001__c.jpg"),
            },
            Placement {
                method: Method::Laplacian,
                rank: 2,
                score: 0.0,
                source: PathBuf::from("cars/a.jpg"),
                destination: PathBuf::from("output/laplacian__002__a.jpg"),
            },
        ];
        RunResult {
            images_discovered: 2,
            images_scored: 2,
            detections_found: 1,
            rankings: Vec::new(),
            placement: PlacementSummary {
                action: PlacementAction::Copy,
                planned: plan.len(),
                placed: plan.len(),
                dry_run: false,
                failures: Vec::new(),
            },
            plan,
            diagnostics: Diagnostics {
                no_region: vec![PathBuf::from("cars/a.jpg")],
                ..Default::default()
            },
            elapsed_ms: 12.0,
        }
    }

    fn sample_report() -> RunReport {
        RunReport::new(
            ExecutionContext {
                timestamp: Utc::now(),
                focusrank_version: "0.1.0".to_string(),
                command_line: vec!["focusrank".to_string(), "rank".to_string()],
                exit_code: 0,
                total_processing_time_ms: 12.0,
                env_vars: None,
            },
            toml::toml! {
                methods = ["laplacian"]
                aggregation = "max"
            }
            .into(),
            SystemInfo {
                device_requested: "auto".to_string(),
                detector: "whole-image".to_string(),
                model: None,
            },
            InputSummary {
                sources: vec!["cars".to_string()],
                source_types: vec![SourceKind::Directory],
                strict_mode: true,
                images_found: 2,
                images_scored: 2,
                images_failed: 0,
                detections_found: 1,
            },
            &sample_result(),
        )
    }

    #[test]
    fn test_report_groups_rankings_by_method() {
        let report = sample_report();
        let entries = &report.rankings["laplacian"];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].source, PathBuf::from("cars/a.jpg"));
    }

    #[test]
    fn test_report_round_trips_through_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = report_path(&temp_dir.path().join("output"));
        save_report(&sample_report(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: toml::Value = toml::from_str(&content).unwrap();
        assert_eq!(
            parsed["rankings"]["laplacian"][0]["destination"].as_str(),
            Some("output/laplacian__001__c.jpg")
        );
        assert_eq!(parsed["system"]["detector"].as_str(), Some("whole-image"));
        assert_eq!(parsed["input"]["source_types"][0].as_str(), Some("directory"));
        assert_eq!(parsed["input"]["detections_found"].as_integer(), Some(1));
        assert_eq!(parsed["placement"]["action"].as_str(), Some("copy"));
        assert_eq!(
            parsed["diagnostics"]["no_region"][0].as_str(),
            Some("cars/a.jpg")
        );
    }

    #[test]
    fn test_collect_env_vars() {
        std::env::set_var("FOCUSRANK_TEST_VAR", "value1");
        std::env::set_var("FOCUSRANK_EMPTY_VAR", "");
        let vars = collect_env_vars().unwrap();
        std::env::remove_var("FOCUSRANK_TEST_VAR");
        std::env::remove_var("FOCUSRANK_EMPTY_VAR");

        assert_eq!(vars.get("FOCUSRANK_TEST_VAR"), Some(&"value1".to_string()));
        assert!(!vars.contains_key("FOCUSRANK_EMPTY_VAR"));
    }
}
