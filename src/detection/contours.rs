use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::config::FeatureConfig;
use crate::detection::segmentation::LabelMap;
use crate::models::{BoundingBox, FeatureRecord};

#[derive(Debug, Clone, Copy)]
struct RegionExtent {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixel_count: u32,
    sum_x: u64,
    sum_y: u64,
}

impl RegionExtent {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixel_count: 0,
            sum_x: 0,
            sum_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixel_count += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Measure every labelled region, in label order.
pub fn extract_features(labels: &LabelMap, config: &FeatureConfig) -> Vec<FeatureRecord> {
    let mut regions: Vec<Option<RegionExtent>> = vec![None; labels.region_count() as usize + 1];

    for y in 0..labels.height() {
        for x in 0..labels.width() {
            let label = labels.get(x, y) as usize;
            if label == 0 {
                continue; // Skip background
            }
            regions[label]
                .get_or_insert_with(|| RegionExtent::new(x, y))
                .add(x, y);
        }
    }

    regions
        .iter()
        .enumerate()
        .filter_map(|(label, region)| region.map(|r| (label as u32, r)))
        .map(|(label, region)| measure_region(labels, label, &region, config))
        .collect()
}

fn measure_region(
    labels: &LabelMap,
    label: u32,
    region: &RegionExtent,
    config: &FeatureConfig,
) -> FeatureRecord {
    let (w, h) = (region.width(), region.height());

    // One pixel of padding keeps the traced boundary and the exterior closed.
    let mask = GrayImage::from_fn(w + 2, h + 2, |cx, cy| {
        let inside = cx >= 1
            && cy >= 1
            && cx <= w
            && cy <= h
            && labels.get(region.min_x + cx - 1, region.min_y + cy - 1) == label;
        if inside { Luma([255]) } else { Luma([0]) }
    });

    let perimeter = outer_perimeter(&mask);
    let (hole_total, largest_hole) = hole_areas(&mask);

    let margin = config.border_margin;
    let touches_border = region.min_x <= margin
        || region.min_y <= margin
        || region.max_x + margin >= labels.width() - 1
        || region.max_y + margin >= labels.height() - 1;

    let n = region.pixel_count as f32;
    let centroid = (region.sum_x as f32 / n, region.sum_y as f32 / n);
    let bounding_box = BoundingBox {
        x: region.min_x,
        y: region.min_y,
        width: w,
        height: h,
    };

    FeatureRecord::from_measurements(
        label,
        region.pixel_count + hole_total,
        perimeter,
        bounding_box,
        centroid,
        largest_hole,
        touches_border,
        config.min_hole_ratio,
    )
}

/// Length of the longest outer boundary, counting diagonal steps as √2.
fn outer_perimeter(mask: &GrayImage) -> f32 {
    find_contours::<i32>(mask)
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .map(|c| chain_length(&c.points))
        .fold(0.0, f32::max)
}

fn chain_length(points: &[Point<i32>]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| {
            let dx = (a.x - b.x) as f32;
            let dy = (a.y - b.y) as f32;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Total and largest area of background pockets not connected to the exterior.
fn hole_areas(mask: &GrayImage) -> (u32, u32) {
    let inverted = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] == 0 { Luma([255]) } else { Luma([0]) }
    });
    let components = connected_components(&inverted, Connectivity::Four, Luma([0u8]));
    // The padding ring is always background, so (0, 0) names the exterior.
    let exterior = components.get_pixel(0, 0)[0];

    let mut sizes: Vec<u32> = Vec::new();
    for pixel in components.pixels() {
        let id = pixel[0];
        if id == 0 || id == exterior {
            continue;
        }
        let id = id as usize;
        if sizes.len() <= id {
            sizes.resize(id + 1, 0);
        }
        sizes[id] += 1;
    }
    let total = sizes.iter().sum();
    let largest = sizes.iter().copied().max().unwrap_or(0);
    (total, largest)
}
