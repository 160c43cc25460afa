//! Per-image scoring: filter detected regions by class, measure every crop, and
//! aggregate the per-region scores into one score per focus method.

use image::DynamicImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::focus_measure::{gray_from_rgb, Method};
use crate::region::Region;

/// Which detected classes count as regions of interest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClassFilter {
    #[default]
    All,
    /// Lowercased class names or numeric class ids
    Only(HashSet<String>),
}

impl ClassFilter {
    pub fn accepts(&self, region: &Region) -> bool {
        match self {
            ClassFilter::All => true,
            ClassFilter::Only(labels) => {
                labels.contains(&region.class_name.to_lowercase())
                    || labels.contains(&region.class_id.to_string())
            }
        }
    }
}

impl Serialize for ClassFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClassFilter::All => serializer.serialize_str("all"),
            ClassFilter::Only(labels) => {
                let mut sorted: Vec<&String> = labels.iter().collect();
                sorted.sort();
                serializer.collect_seq(sorted)
            }
        }
    }
}

/// How per-region scores combine into a per-image score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Sharpest region wins
    #[default]
    Max,
    Mean,
}

impl std::str::FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(Aggregation::Max),
            "mean" => Ok(Aggregation::Mean),
            _ => Err(format!("Unknown aggregation: {s} (expected max or mean)")),
        }
    }
}

/// Scores for one image across the active methods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageScores {
    pub scores: BTreeMap<Method, f64>,
    /// Regions that passed the class filter and had non-zero area
    pub qualifying_regions: usize,
}

impl ImageScores {
    /// True when no region qualified and every score is the zero floor
    pub fn no_qualifying_region(&self) -> bool {
        self.qualifying_regions == 0
    }

    pub fn get(&self, method: Method) -> f64 {
        self.scores.get(&method).copied().unwrap_or(0.0)
    }
}

/// Score one decoded image from its detected regions.
///
/// Regions are expected to be clipped already; any region that does not fit
/// inside the image or has zero area is skipped.
pub fn score_image(
    image: &DynamicImage,
    regions: &[Region],
    filter: &ClassFilter,
    methods: &[Method],
    aggregation: Aggregation,
) -> ImageScores {
    let (width, height) = (image.width(), image.height());

    let mut per_method: BTreeMap<Method, Vec<f64>> =
        methods.iter().map(|&m| (m, Vec::new())).collect();
    let mut qualifying_regions = 0;

    for region in regions {
        if !filter.accepts(region) {
            continue;
        }
        if region.x2 <= region.x1
            || region.y2 <= region.y1
            || region.x2 > width
            || region.y2 > height
        {
            continue;
        }
        qualifying_regions += 1;

        let crop = image.crop_imm(region.x1, region.y1, region.width(), region.height());
        let gray = gray_from_rgb(&crop.to_rgb8());
        for (method, values) in per_method.iter_mut() {
            values.push(method.measure(&gray));
        }
    }

    let scores = per_method
        .into_iter()
        .map(|(method, values)| {
            let score = if values.is_empty() {
                0.0
            } else {
                match aggregation {
                    Aggregation::Max => values.iter().copied().fold(0.0, f64::max),
                    Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
                }
            };
            (method, score)
        })
        .collect();

    ImageScores {
        scores,
        qualifying_regions,
    }
}
