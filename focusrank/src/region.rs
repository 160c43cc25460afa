use serde::Serialize;

/// Raw detector output in floating-point pixel coordinates of the source image
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &Detection) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A detection clipped to integer pixel bounds of its image.
///
/// Invariant: `x1 < x2 <= width` and `y1 < y2 <= height`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
}

impl Region {
    /// Clip a detection to a `width` x `height` image.
    ///
    /// Returns `None` when the clipped box has zero area.
    pub fn from_detection(detection: &Detection, width: u32, height: u32) -> Option<Region> {
        if !(detection.x1.is_finite()
            && detection.y1.is_finite()
            && detection.x2.is_finite()
            && detection.y2.is_finite())
        {
            return None;
        }

        // Truncate towards zero
        let clip = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
        let x1 = clip(detection.x1, width);
        let y1 = clip(detection.y1, height);
        let x2 = clip(detection.x2, width);
        let y2 = clip(detection.y2, height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Region {
            x1,
            y1,
            x2,
            y2,
            class_id: detection.class_id,
            class_name: detection.class_name.clone(),
            confidence: detection.confidence.clamp(0.0, 1.0),
        })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}
