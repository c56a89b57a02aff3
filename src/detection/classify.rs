//! Shape-band part classification.
//!
//! Matchers are tried in a fixed order, Washer → Nut → Bolt → Screw, and the
//! first whose bands all contain the region's features wins. The washer's hole
//! signature goes first so compact rings are never taken for nuts.

use crate::config::{Band, ClassifierConfig};
use crate::models::{DetectedObject, FeatureRecord, PartType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeFeature {
    HoleRatio,
    Circularity,
    Extent,
    AspectRatio,
}

impl ShapeFeature {
    fn value(&self, feature: &FeatureRecord) -> f32 {
        match self {
            ShapeFeature::HoleRatio => feature.hole_ratio,
            ShapeFeature::Circularity => feature.circularity,
            ShapeFeature::Extent => feature.extent,
            ShapeFeature::AspectRatio => feature.aspect_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Feature value must lie inside the band; scored by how centred it is.
    Within(ShapeFeature, Band),
    /// Feature value must reach `band.min`; the score rises towards `band.max`.
    AtLeast(ShapeFeature, Band),
    /// Feature value must lie inside the band; scored by closeness to the target.
    Near(ShapeFeature, Band, f32),
    /// Region must (or must not) have an inner hole. Pass/fail only.
    Hole(bool),
}

impl Criterion {
    fn satisfied(&self, feature: &FeatureRecord) -> bool {
        match self {
            Criterion::Within(f, band) | Criterion::Near(f, band, _) => {
                band.contains(f.value(feature))
            }
            Criterion::AtLeast(f, band) => f.value(feature) >= band.min,
            Criterion::Hole(required) => feature.has_inner_hole == *required,
        }
    }

    fn centring(&self, feature: &FeatureRecord) -> Option<f32> {
        match self {
            Criterion::Within(f, band) => Some(band.centring(f.value(feature))),
            Criterion::AtLeast(f, band) => Some(band.rising(f.value(feature))),
            Criterion::Near(f, band, target) => Some(band.closeness(f.value(feature), *target)),
            Criterion::Hole(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub part_type: PartType,
    pub criteria: Vec<Criterion>,
}

impl Matcher {
    /// A full match scores in `[floor, 1]` by mean band centring; a partial
    /// match scores `floor * satisfied / total`, strictly below any full match.
    pub fn evaluate(&self, feature: &FeatureRecord, floor: f32) -> MatchOutcome {
        let total = self.criteria.len();
        let satisfied = self.criteria.iter().filter(|c| c.satisfied(feature)).count();

        if total > 0 && satisfied == total {
            let scores: Vec<f32> = self.criteria.iter().filter_map(|c| c.centring(feature)).collect();
            let centring = if scores.is_empty() {
                1.0
            } else {
                scores.iter().sum::<f32>() / scores.len() as f32
            };
            MatchOutcome {
                matched: true,
                confidence: (floor + (1.0 - floor) * centring).clamp(0.0, 1.0),
            }
        } else {
            let fraction = if total == 0 { 0.0 } else { satisfied as f32 / total as f32 };
            MatchOutcome {
                matched: false,
                confidence: floor * fraction,
            }
        }
    }
}

pub struct Classifier {
    matchers: Vec<Matcher>,
    floor: f32,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        use Criterion::{AtLeast, Hole, Near, Within};
        use ShapeFeature::*;

        let matchers = vec![
            Matcher {
                part_type: PartType::Washer,
                criteria: vec![
                    Hole(true),
                    Within(HoleRatio, config.washer.hole_ratio),
                    Within(Circularity, config.washer.circularity),
                ],
            },
            Matcher {
                part_type: PartType::Nut,
                criteria: vec![
                    Hole(false),
                    Near(AspectRatio, config.nut.aspect_ratio, config.nut.aspect_target),
                    AtLeast(Extent, config.nut.extent),
                    Within(Circularity, config.nut.circularity),
                ],
            },
            Matcher {
                part_type: PartType::Bolt,
                criteria: vec![
                    Within(AspectRatio, config.bolt.aspect_ratio),
                    AtLeast(Extent, config.bolt.extent),
                ],
            },
            Matcher {
                part_type: PartType::Screw,
                criteria: vec![
                    Within(AspectRatio, config.screw.aspect_ratio),
                    Within(Extent, config.screw.extent),
                    Within(Circularity, config.screw.circularity),
                ],
            },
        ];

        Self {
            matchers,
            floor: config.match_floor,
        }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn classify(&self, feature: &FeatureRecord) -> (PartType, f32) {
        let mut best_partial = 0.0f32;
        for matcher in &self.matchers {
            let outcome = matcher.evaluate(feature, self.floor);
            if outcome.matched {
                return (matcher.part_type, outcome.confidence);
            }
            best_partial = best_partial.max(outcome.confidence);
        }
        (PartType::Unknown, best_partial)
    }

    pub fn classify_all(&self, features: Vec<FeatureRecord>) -> Vec<DetectedObject> {
        features
            .into_iter()
            .map(|feature| {
                let (part_type, confidence) = self.classify(&feature);
                DetectedObject {
                    feature,
                    part_type,
                    confidence,
                }
            })
            .collect()
    }
}
