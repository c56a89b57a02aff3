//! Foreground extraction and touching-object separation.
//!
//! The normalized intensity image is binarized with a Gaussian-weighted
//! adaptive threshold, cleaned with an opening and a closing, and turned into
//! a Euclidean distance map. Local maxima of that map seed a priority flood
//! (marker-based watershed) that assigns every foreground pixel to one seed;
//! pixels reached by two floods become one-pixel separators. Basins whose
//! shared pass is nearly as high as their peaks lie on the same ridge (a bolt
//! shaft, a washer ring) and are merged back into one region.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use image::imageops::invert;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::{Norm, euclidean_squared_distance_transform};
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};
use log::debug;

use crate::config::SegmentationConfig;

const FOREGROUND: u8 = 255;
const SEPARATOR: u32 = u32::MAX;

/// Per-pixel region ids: 0 is background or separator, 1..=K are regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<u32>,
    region_count: u32,
}

impl LabelMap {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![0; width as usize * height as usize],
            region_count: 0,
        }
    }

    /// Wrap a raster of labels (row-major, `width * height` long).
    pub fn from_labels(width: u32, height: u32, labels: Vec<u32>) -> Self {
        assert_eq!(labels.len(), width as usize * height as usize, "label raster size mismatch");
        let region_count = labels.iter().copied().max().unwrap_or(0);
        Self {
            width,
            height,
            labels,
            region_count,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn region_count(&self) -> u32 {
        self.region_count
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// False-colour rendering for debug output.
    pub fn to_color_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| match self.get(x, y) {
            0 => Rgb([0, 0, 0]),
            label => {
                let h = label.wrapping_mul(2_654_435_761);
                Rgb([
                    64 + (h >> 24) as u8 % 192,
                    64 + (h >> 16) as u8 % 192,
                    64 + (h >> 8) as u8 % 192,
                ])
            }
        })
    }
}

/// Intermediate products of one segmentation run.
pub struct Segmentation {
    pub binary: GrayImage,
    pub cleaned: GrayImage,
    pub labels: LabelMap,
}

pub fn segment(normalized: &GrayImage, config: &SegmentationConfig) -> LabelMap {
    segment_with_stages(normalized, config).labels
}

pub fn segment_with_stages(normalized: &GrayImage, config: &SegmentationConfig) -> Segmentation {
    let binary = binarize(normalized, config.block_size, config.threshold_offset);
    let cleaned = clean_mask(&binary, config.morph_radius);
    let (width, height) = cleaned.dimensions();

    let dist = squared_distance_transform(&cleaned);
    let markers = find_markers(&dist, width, height, config);
    debug!(
        "segmentation: {} foreground px, {} markers",
        cleaned.pixels().filter(|p| p[0] == FOREGROUND).count(),
        markers.len()
    );

    let labels = if markers.is_empty() {
        LabelMap::empty(width, height)
    } else {
        watershed(&cleaned, &dist, &markers, config.merge_ratio)
    };
    debug!("segmentation: {} regions", labels.region_count());

    Segmentation {
        binary,
        cleaned,
        labels,
    }
}

/// Gaussian adaptive threshold; dark pixels become foreground (255).
pub fn binarize(img: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(img, sigma.max(0.5));
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0] as f32;
        let t = local_mean.get_pixel(x, y)[0] as f32 - offset;
        if v <= t { Luma([FOREGROUND]) } else { Luma([0]) }
    })
}

/// Opening drops specks, closing fills pinholes inside a silhouette.
pub fn clean_mask(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }
    let opened = open(binary, Norm::LInf, radius);
    close(&opened, Norm::LInf, radius)
}

/// Squared Euclidean distance from every foreground pixel to the nearest
/// background pixel. Background pixels get 0; an image with no background at
/// all gets a value larger than any real distance.
pub fn squared_distance_transform(mask: &GrayImage) -> Vec<u64> {
    let (width, height) = mask.dimensions();
    let far = width as u64 * width as u64 + height as u64 * height as u64 + 1;

    // Distances are measured to non-zero pixels, so background must be the lit side.
    let mut background = mask.clone();
    invert(&mut background);
    euclidean_squared_distance_transform(&background)
        .pixels()
        .map(|p| if p[0].is_finite() { (p[0] as u64).min(far) } else { far })
        .collect()
}

/// Seed pixel for one basin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub x: u32,
    pub y: u32,
    /// Squared distance to background at the seed.
    pub height_sq: u64,
}

/// Local maxima of the distance map, at least `min_peak_distance` apart.
pub fn find_markers(dist: &[u64], width: u32, height: u32, config: &SegmentationConfig) -> Vec<Marker> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let radius = config.min_peak_distance as usize;
    let min_height_sq = (config.min_peak_height * config.min_peak_height) as f64;
    let window_max = max_filter(dist, w, h, radius);

    let mut candidates: Vec<Marker> = dist
        .iter()
        .enumerate()
        .filter(|&(i, &sq)| sq > 0 && sq as f64 >= min_height_sq && sq == window_max[i])
        .map(|(i, &sq)| Marker {
            x: (i % w) as u32,
            y: (i / w) as u32,
            height_sq: sq,
        })
        .collect();
    // Highest first; equal heights in raster order.
    candidates.sort_by(|a, b| {
        b.height_sq
            .cmp(&a.height_sq)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });

    let min_sep_sq = (radius * radius) as i64;
    let mut kept: Vec<Marker> = Vec::new();
    for candidate in candidates {
        let crowded = kept.iter().any(|m| {
            let dx = m.x as i64 - candidate.x as i64;
            let dy = m.y as i64 - candidate.y as i64;
            dx * dx + dy * dy <= min_sep_sq
        });
        if !crowded {
            kept.push(candidate);
        }
    }
    kept
}

/// Square-window maximum, separable into a row pass and a column pass.
fn max_filter(values: &[u64], w: usize, h: usize, radius: usize) -> Vec<u64> {
    let mut rows = vec![0u64; values.len()];
    for y in 0..h {
        let row = &values[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            rows[y * w + x] = row[lo..=hi].iter().copied().max().unwrap_or(0);
        }
    }
    let mut out = vec![0u64; values.len()];
    for x in 0..w {
        for y in 0..h {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(h - 1);
            out[y * w + x] = (lo..=hi).map(|yy| rows[yy * w + x]).max().unwrap_or(0);
        }
    }
    out
}

fn neighbors4(idx: usize, w: usize, h: usize) -> impl Iterator<Item = usize> {
    let (x, y) = (idx % w, idx / w);
    let left = (x > 0).then(|| idx - 1);
    let right = (x + 1 < w).then(|| idx + 1);
    let up = (y > 0).then(|| idx - w);
    let down = (y + 1 < h).then(|| idx + w);
    [left, right, up, down].into_iter().flatten()
}

/// Marker-seeded priority flood over the negated distance map.
fn watershed(mask: &GrayImage, dist: &[u64], markers: &[Marker], merge_ratio: f32) -> LabelMap {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let foreground: Vec<bool> = mask.pixels().map(|p| p[0] == FOREGROUND).collect();

    let mut labels = vec![0u32; w * h];
    let mut queued = vec![false; w * h];
    let mut heap: BinaryHeap<(u64, Reverse<u64>, usize)> = BinaryHeap::new();
    let mut seq = 0u64;

    for (i, marker) in markers.iter().enumerate() {
        let idx = marker.y as usize * w + marker.x as usize;
        labels[idx] = i as u32 + 1;
        queued[idx] = true;
    }
    for marker in markers {
        let idx = marker.y as usize * w + marker.x as usize;
        for n in neighbors4(idx, w, h) {
            if foreground[n] && !queued[n] {
                queued[n] = true;
                heap.push((dist[n], Reverse(seq), n));
                seq += 1;
            }
        }
    }

    // Highest separator value seen between each pair of basins.
    let mut passes: BTreeMap<(u32, u32), u64> = BTreeMap::new();

    while let Some((height_sq, _, idx)) = heap.pop() {
        let mut seen = [0u32; 4];
        let mut count = 0;
        for n in neighbors4(idx, w, h) {
            let label = labels[n];
            if label != 0 && label != SEPARATOR && !seen[..count].contains(&label) {
                seen[count] = label;
                count += 1;
            }
        }
        match count {
            0 => {}
            1 => {
                labels[idx] = seen[0];
                for n in neighbors4(idx, w, h) {
                    if foreground[n] && !queued[n] {
                        queued[n] = true;
                        heap.push((dist[n], Reverse(seq), n));
                        seq += 1;
                    }
                }
            }
            _ => {
                labels[idx] = SEPARATOR;
                for i in 0..count {
                    for j in (i + 1)..count {
                        let key = (seen[i].min(seen[j]), seen[i].max(seen[j]));
                        let pass = passes.entry(key).or_insert(0);
                        *pass = (*pass).max(height_sq);
                    }
                }
            }
        }
    }

    let mut roots: Vec<u32> = (0..=markers.len() as u32).collect();
    for (&(a, b), &pass) in &passes {
        let peak_a = (markers[a as usize - 1].height_sq as f64).sqrt();
        let peak_b = (markers[b as usize - 1].height_sq as f64).sqrt();
        if (pass as f64).sqrt() >= merge_ratio as f64 * peak_a.min(peak_b) {
            union(&mut roots, a, b);
        }
    }
    for label in labels.iter_mut() {
        if *label != 0 && *label != SEPARATOR {
            *label = find(&mut roots, *label);
        }
    }

    reclaim_separators(&mut labels, w, h);
    compact(labels, width, height)
}

fn find(roots: &mut [u32], label: u32) -> u32 {
    let mut root = label;
    while roots[root as usize] != root {
        root = roots[root as usize];
    }
    let mut current = label;
    while roots[current as usize] != root {
        let next = roots[current as usize];
        roots[current as usize] = root;
        current = next;
    }
    root
}

fn union(roots: &mut [u32], a: u32, b: u32) {
    let ra = find(roots, a);
    let rb = find(roots, b);
    if ra != rb {
        let (keep, drop) = (ra.min(rb), ra.max(rb));
        roots[drop as usize] = keep;
    }
}

/// Give separator pixels back to their region when every labelled neighbour
/// now belongs to the same merged basin.
fn reclaim_separators(labels: &mut [u32], w: usize, h: usize) {
    loop {
        let mut changed = false;
        for idx in 0..labels.len() {
            if labels[idx] != SEPARATOR {
                continue;
            }
            let mut owner: Option<u32> = None;
            let mut contested = false;
            for n in neighbors4(idx, w, h) {
                let label = labels[n];
                if label == 0 || label == SEPARATOR {
                    continue;
                }
                match owner {
                    None => owner = Some(label),
                    Some(o) if o != label => contested = true,
                    Some(_) => {}
                }
            }
            if let (Some(o), false) = (owner, contested) {
                labels[idx] = o;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Renumber regions 1..=K in raster order of first appearance; separators become 0.
fn compact(labels: Vec<u32>, width: u32, height: u32) -> LabelMap {
    let mut mapping: BTreeMap<u32, u32> = BTreeMap::new();
    let mut next = 0u32;
    let labels = labels
        .into_iter()
        .map(|label| match label {
            0 | SEPARATOR => 0,
            label => *mapping.entry(label).or_insert_with(|| {
                next += 1;
                next
            }),
        })
        .collect();
    LabelMap {
        width,
        height,
        labels,
        region_count: next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc_mask(width: u32, height: u32, discs: &[(i64, i64, i64)]) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let inside = discs.iter().any(|&(cx, cy, r)| {
                let dx = x as i64 - cx;
                let dy = y as i64 - cy;
                dx * dx + dy * dy <= r * r
            });
            if inside { Luma([FOREGROUND]) } else { Luma([0]) }
        })
    }

    #[test]
    fn distance_is_zero_outside_and_grows_inward() {
        let mask = disc_mask(40, 30, &[(20, 15, 9)]);
        let dist = squared_distance_transform(&mask);
        assert_eq!(dist[0], 0);
        // Nearest background to the centre of a radius-9 disc is at offset (9, 1).
        assert_eq!(dist[15 * 40 + 20], 82);
        assert!(dist[15 * 40 + 20] > dist[15 * 40 + 14]);
    }

    #[test]
    fn mask_without_background_is_far_everywhere() {
        let mask = GrayImage::from_pixel(8, 6, Luma([FOREGROUND]));
        let dist = squared_distance_transform(&mask);
        assert!(dist.iter().all(|&d| d == 8 * 8 + 6 * 6 + 1));
    }

    #[test]
    fn single_disc_gets_single_marker() {
        let mask = disc_mask(60, 60, &[(30, 30, 15)]);
        let dist = squared_distance_transform(&mask);
        let markers = find_markers(&dist, 60, 60, &SegmentationConfig::default());
        assert_eq!(markers.len(), 1);
        assert_eq!((markers[0].x, markers[0].y), (30, 30));
    }

    #[test]
    fn overlapping_discs_are_split() {
        let mask = disc_mask(120, 80, &[(40, 40, 20), (72, 40, 20)]);
        let dist = squared_distance_transform(&mask);
        let markers = find_markers(&dist, 120, 80, &SegmentationConfig::default());
        let labels = watershed(&mask, &dist, &markers, 0.75);
        assert_eq!(labels.region_count(), 2);
        assert_ne!(labels.get(40, 40), labels.get(72, 40));
        assert_eq!(labels.get(56, 40), 0);
    }

    #[test]
    fn elongated_bar_stays_whole() {
        let mask = GrayImage::from_fn(100, 40, |x, y| {
            if (10..90).contains(&x) && (14..26).contains(&y) {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        });
        let dist = squared_distance_transform(&mask);
        let markers = find_markers(&dist, 100, 40, &SegmentationConfig::default());
        assert!(markers.len() > 1);
        let labels = watershed(&mask, &dist, &markers, 0.75);
        assert_eq!(labels.region_count(), 1);
        for x in 10..90 {
            for y in 14..26 {
                assert_eq!(labels.get(x, y), 1, "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn ring_stays_whole() {
        let mask = GrayImage::from_fn(60, 60, |x, y| {
            let dx = x as i64 - 30;
            let dy = y as i64 - 30;
            let d2 = dx * dx + dy * dy;
            if d2 <= 18 * 18 && d2 > 7 * 7 { Luma([FOREGROUND]) } else { Luma([0]) }
        });
        let dist = squared_distance_transform(&mask);
        let markers = find_markers(&dist, 60, 60, &SegmentationConfig::default());
        let labels = watershed(&mask, &dist, &markers, 0.75);
        assert_eq!(labels.region_count(), 1);
        assert_eq!(labels.get(30, 30), 0);
    }

    #[test]
    fn blank_frame_has_no_regions() {
        let img = GrayImage::from_pixel(128, 128, Luma([200]));
        let labels = segment(&img, &SegmentationConfig::default());
        assert_eq!(labels.region_count(), 0);
    }

    #[test]
    fn binarize_marks_dark_blob() {
        let img = GrayImage::from_fn(80, 80, |x, y| {
            let dx = x as i64 - 40;
            let dy = y as i64 - 40;
            if dx * dx + dy * dy <= 100 { Luma([40]) } else { Luma([200]) }
        });
        let binary = binarize(&img, 51, 5.0);
        assert_eq!(binary.get_pixel(40, 40)[0], FOREGROUND);
        assert_eq!(binary.get_pixel(5, 5)[0], 0);
    }
}
