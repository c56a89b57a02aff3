use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Axis-aligned bounding box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Geometric description of one labelled region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub region_id: u32,
    /// Pixels enclosed by the outer boundary, holes included.
    pub area: u32,
    pub perimeter: f32,
    pub bounding_box: BoundingBox,
    pub centroid: (f32, f32),
    pub circularity: f32,
    pub extent: f32,
    pub aspect_ratio: f32,
    pub touches_border: bool,
    pub has_inner_hole: bool,
    pub hole_ratio: f32,
}

impl FeatureRecord {
    /// Fill in the derived shape ratios from the measured quantities.
    #[allow(clippy::too_many_arguments)]
    pub fn from_measurements(
        region_id: u32,
        area: u32,
        perimeter: f32,
        bounding_box: BoundingBox,
        centroid: (f32, f32),
        largest_hole: u32,
        touches_border: bool,
        min_hole_ratio: f32,
    ) -> Self {
        let area_f = area as f32;
        let circularity = if perimeter > 0.0 {
            4.0 * std::f32::consts::PI * area_f / (perimeter * perimeter)
        } else {
            0.0
        };
        let box_area = bounding_box.area();
        let extent = if box_area > 0 {
            area_f / box_area as f32
        } else {
            0.0
        };
        let w = bounding_box.width as f32;
        let h = bounding_box.height as f32;
        let aspect_ratio = if w.min(h) > 0.0 { w.max(h) / w.min(h) } else { 0.0 };
        let hole_ratio = if area > 0 {
            largest_hole as f32 / area_f
        } else {
            0.0
        };

        Self {
            region_id,
            area,
            perimeter,
            bounding_box,
            centroid,
            circularity,
            extent,
            aspect_ratio,
            touches_border,
            has_inner_hole: hole_ratio >= min_hole_ratio && largest_hole > 0,
            hole_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    Nut,
    Bolt,
    Screw,
    Washer,
    Unknown,
}

impl PartType {
    pub const ALL: [PartType; 5] = [
        PartType::Nut,
        PartType::Bolt,
        PartType::Screw,
        PartType::Washer,
        PartType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartType::Nut => "nut",
            PartType::Bolt => "bolt",
            PartType::Screw => "screw",
            PartType::Washer => "washer",
            PartType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub feature: FeatureRecord,
    pub part_type: PartType,
    pub confidence: f32,
}

/// Outcome of analysing one image. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: OffsetDateTime,
    pub objects: Vec<DetectedObject>,
    pub count: usize,
    pub mean_confidence: f32,
    pub per_type_counts: BTreeMap<PartType, usize>,
}

impl FrameResult {
    /// Aggregate the objects that clear `min_confidence`.
    ///
    /// Survivors are ordered by confidence, highest first, ties by region id.
    pub fn build(
        timestamp: OffsetDateTime,
        objects: Vec<DetectedObject>,
        min_confidence: f32,
    ) -> Self {
        let mut objects: Vec<DetectedObject> = objects
            .into_iter()
            .filter(|o| o.confidence >= min_confidence)
            .collect();
        objects.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.feature.region_id.cmp(&b.feature.region_id))
        });

        let mut per_type_counts: BTreeMap<PartType, usize> =
            PartType::ALL.iter().map(|t| (*t, 0)).collect();
        for object in &objects {
            *per_type_counts.entry(object.part_type).or_insert(0) += 1;
        }

        let count = objects.len();
        let mean_confidence = if count > 0 {
            objects.iter().map(|o| o.confidence).sum::<f32>() / count as f32
        } else {
            0.0
        };

        Self {
            timestamp,
            objects,
            count,
            mean_confidence,
            per_type_counts,
        }
    }

    pub fn count_of(&self, part_type: PartType) -> usize {
        self.per_type_counts.get(&part_type).copied().unwrap_or(0)
    }
}

pub(crate) fn serialize_rfc3339<S: Serializer>(
    timestamp: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = timestamp
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}
