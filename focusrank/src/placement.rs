//! Placing ranked images into the output directory.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::focus_measure::Method;

/// How a source file reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementAction {
    #[default]
    Copy,
    Move,
    /// Symbolic link pointing at the canonical source path
    Link,
}

impl std::str::FromStr for PlacementAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Ok(PlacementAction::Copy),
            "move" => Ok(PlacementAction::Move),
            "link" | "symlink" => Ok(PlacementAction::Link),
            _ => Err(format!(
                "Unknown placement action: {s} (expected copy, move or link)"
            )),
        }
    }
}

impl std::fmt::Display for PlacementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlacementAction::Copy => "copy",
            PlacementAction::Move => "move",
            PlacementAction::Link => "link",
        };
        write!(f, "{name}")
    }
}

/// One planned file operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub method: Method,
    pub rank: usize,
    pub score: f64,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// A placement that could not be carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: String,
}

/// Outcome of carrying out a whole plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlacementSummary {
    pub action: PlacementAction,
    pub planned: usize,
    pub placed: usize,
    pub dry_run: bool,
    pub failures: Vec<PlacementFailure>,
}

impl PlacementSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Reject plans where two entries share a destination.
pub fn check_destinations(plan: &[Placement]) -> Result<()> {
    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    for placement in plan {
        if let Some(first) = seen.insert(&placement.destination, &placement.source) {
            return Err(anyhow!(
                "Output path collision detected: {} and {} both map to {}",
                first.display(),
                placement.source.display(),
                placement.destination.display()
            ));
        }
    }
    Ok(())
}

/// Carry out one placement.
///
/// An existing destination is an error unless `force` is set, in which case
/// it is replaced.
pub fn place(source: &Path, destination: &Path, action: PlacementAction, force: bool) -> Result<()> {
    if destination.symlink_metadata().is_ok() {
        if !force {
            return Err(anyhow!(
                "Destination already exists: {} (use --force to overwrite)",
                destination.display()
            ));
        }
        fs::remove_file(destination).with_context(|| {
            format!("Failed to remove existing file: {}", destination.display())
        })?;
    }

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }

    match action {
        PlacementAction::Copy => {
            fs::copy(source, destination).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    source.display(),
                    destination.display()
                )
            })?;
        }
        PlacementAction::Move => move_file(source, destination)?,
        PlacementAction::Link => {
            let target = source
                .canonicalize()
                .with_context(|| format!("Failed to resolve source: {}", source.display()))?;
            symlink(&target, destination).with_context(|| {
                format!(
                    "Failed to link {} to {}",
                    destination.display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems
    fs::copy(source, destination).with_context(|| {
        format!(
            "Failed to move {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    fs::remove_file(source)
        .with_context(|| format!("Failed to remove moved source: {}", source.display()))?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
