use crate::color_utils::symbols;
use anyhow::{Context, Result};
use log::Level;
use ort::{
    execution_providers::{CPUExecutionProvider, CoreMLExecutionProvider, ExecutionProvider},
    logging::LogLevel,
    session::Session,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

fn log_level_from_ort(level: LogLevel) -> Level {
    match level {
        LogLevel::Verbose => Level::Trace,
        LogLevel::Info => Level::Trace,
        LogLevel::Warning => Level::Debug,
        LogLevel::Error => Level::Info,
        LogLevel::Fatal => Level::Error,
    }
}

fn ort_level_from_log(level: Level) -> LogLevel {
    match level {
        // ONNX info output is closer to trace
        Level::Trace => LogLevel::Verbose,
        Level::Debug => LogLevel::Warning,
        Level::Info => LogLevel::Error,
        Level::Warn => LogLevel::Error,
        Level::Error => LogLevel::Fatal,
    }
}

/// Facts about the loaded model, recorded in the run report
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_path: String,
    pub model_size_bytes: usize,
    pub model_checksum: String,
    pub execution_providers: Vec<String>,
    pub device_selected: String,
    pub device_selection_reason: String,
    pub load_time_ms: f64,
}

/// Device selection result
#[derive(Debug, Clone)]
pub struct DeviceSelection {
    pub device: String,
    pub reason: String,
}

/// Determine optimal device based on user preference
pub fn determine_optimal_device(requested_device: &str) -> DeviceSelection {
    match requested_device {
        "auto" => {
            let coreml = CoreMLExecutionProvider::default();
            match coreml.is_available() {
                Ok(true) => DeviceSelection {
                    device: "coreml".to_string(),
                    reason: "Auto-selected CoreML (available)".to_string(),
                },
                _ => DeviceSelection {
                    device: "cpu".to_string(),
                    reason: "Auto-selected CPU (CoreML not available)".to_string(),
                },
            }
        }
        other => DeviceSelection {
            device: other.to_string(),
            reason: format!("User explicitly chose {other}"),
        },
    }
}

/// MD5 of a byte buffer as lowercase hex
pub fn calculate_md5_bytes(bytes: &[u8]) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(bytes);
    let result = hasher.compute();
    format!("{result:x}")
}

/// Load an ONNX model from disk into a session on the requested device.
///
/// ONNX Runtime's own log output is re-logged through `log` at a level that
/// follows what is currently enabled.
pub fn create_onnx_session(model_path: &Path, requested_device: &str) -> Result<(Session, ModelInfo)> {
    let load_start = std::time::Instant::now();
    let bytes = fs::read(model_path)
        .with_context(|| format!("Failed to read model file: {}", model_path.display()))?;

    let selection = determine_optimal_device(requested_device);
    let execution_providers = match selection.device.as_str() {
        "coreml" => match CoreMLExecutionProvider::default().is_available() {
            Ok(true) => vec![
                CoreMLExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            _ => {
                log::warn!(
                    "{}CoreML not available, falling back to CPU",
                    symbols::warning()
                );
                vec![CPUExecutionProvider::default().build()]
            }
        },
        "cpu" => {
            log::debug!("🖥️  Using CPU execution provider");
            vec![CPUExecutionProvider::default().build()]
        }
        other => {
            log::warn!("{}Unknown device '{other}', using CPU", symbols::warning());
            vec![CPUExecutionProvider::default().build()]
        }
    };

    let ep_names: Vec<String> = execution_providers
        .iter()
        .map(|ep| format!("{ep:?}"))
        .collect();

    let ort_log_level = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
    ]
    .into_iter()
    .find(|&lvl| log::log_enabled!(lvl))
    .map(ort_level_from_log)
    .unwrap_or(LogLevel::Fatal);

    let session = Session::builder()
        .map_err(|e| anyhow::anyhow!("Failed to create session builder: {}", e))?
        .with_logger(Box::new(|level, _, _, _, msg| {
            log::log!(log_level_from_ort(level), "[onnx] {msg}")
        }))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?
        .with_log_level(ort_log_level)
        .map_err(|e| anyhow::anyhow!("Failed to set log level: {}", e))?
        .with_execution_providers(execution_providers)
        .map_err(|e| anyhow::anyhow!("Failed to set execution providers: {}", e))?
        .commit_from_memory(&bytes)
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to load model from {}: {}",
                model_path.display(),
                e
            )
        })?;

    let model_info = ModelInfo {
        model_path: model_path.display().to_string(),
        model_size_bytes: bytes.len(),
        model_checksum: calculate_md5_bytes(&bytes),
        execution_providers: ep_names,
        device_selected: selection.device,
        device_selection_reason: selection.reason,
        load_time_ms: load_start.elapsed().as_secs_f64() * 1000.0,
    };

    log::debug!(
        "{} Execution providers registered: {}",
        symbols::system_setup(),
        model_info.execution_providers.join(" -> ")
    );

    Ok((session, model_info))
}
