use std::fmt;

use super::frame::CropRect;

/// Bounding box as `[x1, y1, x2, y2]` in pixel coordinates.
pub type BBox = [f64; 4];

/// Which kind of detector produced a region.
///
/// Resolved once when the region is built so downstream stages never
/// have to infer it from the shape of a model's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionSource {
    Object,
    Face,
}

impl RegionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionSource::Object => "object",
            RegionSource::Face => "face",
        }
    }
}

impl fmt::Display for RegionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector's raw output: a labeled, confidence-scored bounding box.
///
/// Construction normalizes the box so `x2 >= x1` and `y2 >= y1`, and clamps
/// the confidence into `[0, 1]`; every region in the system satisfies both.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    bbox: BBox,
    label: String,
    confidence: f64,
    source: RegionSource,
    track_id: Option<u32>,
}

impl Region {
    pub fn new(bbox: BBox, label: impl Into<String>, confidence: f64, source: RegionSource) -> Self {
        let [ax, ay, bx, by] = bbox;
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            bbox: [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)],
            label: label.into(),
            confidence,
            source,
            track_id: None,
        }
    }

    /// Attaches a multi-frame tracker id supplied by the detector itself.
    pub fn with_track_id(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> RegionSource {
        self.source
    }

    pub fn track_id(&self) -> Option<u32> {
        self.track_id
    }

    pub fn width(&self) -> f64 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f64 {
        self.bbox[3] - self.bbox[1]
    }

    pub fn iou(&self, other: &Region) -> f64 {
        bbox_iou(&self.bbox, &other.bbox)
    }

    /// Integer crop rectangle clamped to a `frame_w` x `frame_h` image.
    ///
    /// Returns `None` when nothing with positive area remains after
    /// clamping (degenerate or fully out-of-bounds boxes).
    pub fn crop_rect(&self, frame_w: u32, frame_h: u32) -> Option<CropRect> {
        if !self.bbox.iter().all(|v| v.is_finite()) {
            return None;
        }
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let x1 = clamp(self.bbox[0], frame_w);
        let y1 = clamp(self.bbox[1], frame_h);
        let x2 = clamp(self.bbox[2], frame_w);
        let y2 = clamp(self.bbox[3], frame_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(CropRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &BBox, b: &BBox) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
