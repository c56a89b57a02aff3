use log::debug;

use crate::config::FilterConfig;
use crate::models::FeatureRecord;

/// Why a candidate region was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooSmall,
    TooLarge,
    Circularity,
    Extent,
    TouchesBorder,
}

/// First rule `feature` breaks, if any.
pub fn rejection(feature: &FeatureRecord, image_area: u64, config: &FilterConfig) -> Option<Rejection> {
    let (min_area, max_area) = config.area_bounds(image_area);
    let area = feature.area as f32;
    if area < min_area {
        Some(Rejection::TooSmall)
    } else if area > max_area {
        Some(Rejection::TooLarge)
    } else if !config.circularity.contains(feature.circularity) {
        Some(Rejection::Circularity)
    } else if !config.extent.contains(feature.extent) {
        Some(Rejection::Extent)
    } else if feature.touches_border {
        Some(Rejection::TouchesBorder)
    } else {
        None
    }
}

/// Keep the regions that look like whole, plausibly sized parts
pub fn filter_objects(
    features: &[FeatureRecord],
    image_area: u64,
    config: &FilterConfig,
) -> Vec<FeatureRecord> {
    features
        .iter()
        .filter(|f| match rejection(f, image_area, config) {
            None => true,
            Some(reason) => {
                debug!(
                    "region {} rejected: {:?} (area={}, circ={:.3}, extent={:.3})",
                    f.region_id, reason, f.area, f.circularity, f.extent
                );
                false
            }
        })
        .cloned()
        .collect()
}
