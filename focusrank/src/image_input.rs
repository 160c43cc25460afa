//! Image discovery from files, directories and glob patterns.
//!
//! The returned list is sorted and de-duplicated. That order is the discovery
//! order used to break ranking ties.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::color_utils::symbols;

/// Configuration for image collection behavior
#[derive(Debug, Clone)]
pub struct ImageInputConfig {
    pub require_glob_matches: bool,
    pub strict_mode: bool,
}

impl Default for ImageInputConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl ImageInputConfig {
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            require_glob_matches: true,
        }
    }

    pub fn permissive() -> Self {
        Self {
            strict_mode: false,
            require_glob_matches: false,
        }
    }

    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Self::strict()
        } else {
            Self::permissive()
        }
    }
}

/// How a source argument was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Directory,
    Glob,
}

fn looks_like_glob(source: &str) -> bool {
    source.contains('*') || source.contains('?') || source.contains('[')
}

/// Classify a source argument
pub fn source_kind(source: &str) -> SourceKind {
    let path = Path::new(source);
    if path.is_dir() {
        SourceKind::Directory
    } else if !path.exists() && looks_like_glob(source) {
        SourceKind::Glob
    } else {
        SourceKind::File
    }
}

/// Check if a file is a supported image format
/// Supports: jpg, jpeg, png, webp, bmp, tiff, tif
pub fn is_supported_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => matches!(
            ext.to_string_lossy().to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tiff" | "tif"
        ),
        None => false,
    }
}

/// Find all image files in a directory (non-recursive)
pub fn find_images_in_directory(dir_path: &Path) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image_file(&path) {
            image_files.push(path);
        }
    }
    image_files.sort();
    Ok(image_files)
}

/// Report a problem with a source: an error in strict mode, a warning otherwise
fn reject_source(config: &ImageInputConfig, message: String) -> Result<()> {
    if config.strict_mode {
        Err(anyhow!(message))
    } else {
        log::warn!("{}{message}", symbols::warning());
        Ok(())
    }
}

/// Collect all image files from multiple sources (files, directories, or glob patterns)
pub fn collect_images_from_sources(
    sources: &[String],
    config: &ImageInputConfig,
) -> Result<Vec<PathBuf>> {
    let mut all_image_files = Vec::new();

    for source in sources {
        let source_path = Path::new(source);

        if source_path.is_file() {
            if is_supported_image_file(source_path) {
                all_image_files.push(source_path.to_path_buf());
            } else {
                reject_source(
                    config,
                    format!(
                        "File is not a supported image format: {}",
                        source_path.display()
                    ),
                )?;
            }
        } else if source_path.is_dir() {
            all_image_files.extend(find_images_in_directory(source_path)?);
        } else if !looks_like_glob(source) {
            reject_source(config, format!("File does not exist: {source}"))?;
        } else {
            match glob::glob(source) {
                Ok(paths) => {
                    let mut found_any = false;
                    for path_result in paths {
                        match path_result {
                            Ok(path) => {
                                if path.is_file() && is_supported_image_file(&path) {
                                    all_image_files.push(path);
                                    found_any = true;
                                }
                            }
                            Err(e) => {
                                log::warn!(
                                    "{}Error reading path in glob {source}: {e}",
                                    symbols::warning()
                                );
                            }
                        }
                    }
                    if !found_any && config.require_glob_matches {
                        return Err(anyhow!("No image files found matching pattern: {source}"));
                    }
                }
                Err(_) => {
                    reject_source(
                        config,
                        format!(
                            "Source path does not exist and is not a valid glob pattern: {source}"
                        ),
                    )?;
                }
            }
        }
    }

    all_image_files.sort();
    all_image_files.dedup();

    if all_image_files.is_empty() && config.strict_mode {
        return Err(anyhow!("No image files found in the specified sources"));
    }

    Ok(all_image_files)
}
