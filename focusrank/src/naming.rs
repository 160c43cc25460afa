//! Output file naming.
//!
//! Two encodings exist and both are parsed by downstream tools, so the format
//! (field order, `__` separators, zero padding) must not change:
//! - rank-encoded: `{method}__{rank:0W}__{original}`
//! - score-encoded: `S{round(score):0W}__{original}`

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::focus_measure::Method;
use crate::ranker::RankedEntry;

pub const SEPARATOR: &str = "__";
pub const DEFAULT_PAD_WIDTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// Encode the 1-based rank and method key
    #[default]
    Rank,
    /// Encode the rounded raw score
    Score,
}

impl std::str::FromStr for NamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rank" => Ok(NamingMode::Rank),
            "score" => Ok(NamingMode::Score),
            _ => Err(format!("Unknown naming mode: {s} (expected rank or score)")),
        }
    }
}

/// Naming configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NamingPolicy {
    pub mode: NamingMode,
    pub pad_width: usize,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            mode: NamingMode::Rank,
            pad_width: DEFAULT_PAD_WIDTH,
        }
    }
}

impl NamingPolicy {
    /// Canonical output name for a ranked entry
    pub fn name_for(&self, method: Method, entry: &RankedEntry, original: &str) -> Result<String> {
        match self.mode {
            NamingMode::Rank => rank_encoded_name(method, entry.rank, original, self.pad_width),
            NamingMode::Score => score_encoded_name(entry.score, original, self.pad_width),
        }
    }
}

fn check_original(original: &str) -> Result<()> {
    if original.is_empty() {
        return Err(anyhow!("Original file name is empty"));
    }
    if original.contains('/') || original.contains('\\') {
        return Err(anyhow!(
            "Original file name must not contain path separators: {original}"
        ));
    }
    Ok(())
}

/// `{method}__{rank:0W}__{original}`
pub fn rank_encoded_name(
    method: Method,
    rank: usize,
    original: &str,
    pad_width: usize,
) -> Result<String> {
    check_original(original)?;
    if rank == 0 {
        return Err(anyhow!("Ranks are 1-based, got 0"));
    }
    Ok(format!(
        "{}{SEPARATOR}{rank:0pad_width$}{SEPARATOR}{original}",
        method.key()
    ))
}

/// `S{round(score):0W}__{original}`, rounding to the nearest integer
pub fn score_encoded_name(score: f64, original: &str, pad_width: usize) -> Result<String> {
    check_original(original)?;
    if !score.is_finite() || score < 0.0 {
        return Err(anyhow!("Score must be a finite non-negative number, got {score}"));
    }
    let rounded = score.round() as u64;
    Ok(format!("S{rounded:0pad_width$}{SEPARATOR}{original}"))
}

/// Fields recovered from a generated name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedName {
    Rank {
        method: Method,
        rank: usize,
        original: String,
    },
    Score {
        score: u64,
        original: String,
    },
}

impl ParsedName {
    pub fn original(&self) -> &str {
        match self {
            ParsedName::Rank { original, .. } | ParsedName::Score { original, .. } => original,
        }
    }
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse a rank- or score-encoded name.
///
/// Only the leading fields are split off, so an original name that itself
/// contains `__` survives intact.
pub fn parse_name(name: &str) -> Option<ParsedName> {
    if let Some((head, rest)) = name.split_once(SEPARATOR) {
        if let Ok(method) = head.parse::<Method>() {
            if head == method.key() {
                let (rank, original) = rest.split_once(SEPARATOR)?;
                let rank = parse_digits::<usize>(rank)?;
                if rank == 0 || original.is_empty() {
                    return None;
                }
                return Some(ParsedName::Rank {
                    method,
                    rank,
                    original: original.to_string(),
                });
            }
        }

        if let Some(digits) = head.strip_prefix('S') {
            let score = parse_digits::<u64>(digits)?;
            if rest.is_empty() {
                return None;
            }
            return Some(ParsedName::Score {
                score,
                original: rest.to_string(),
            });
        }
    }
    None
}
