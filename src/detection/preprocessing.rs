use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::bilateral_filter;

use crate::config::PreprocessConfig;
use crate::error::{AnalysisError, Result};

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Grayscale conversion, illumination correction and edge-preserving smoothing.
pub fn normalize(img: &DynamicImage, config: &PreprocessConfig) -> Result<GrayImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AnalysisError::InvalidImage(format!(
            "zero-sized image {}x{}",
            img.width(),
            img.height()
        )));
    }
    let gray = to_grayscale(img);
    let equalized = equalize_clahe(&gray, config.clahe_tile_size, config.clahe_clip_limit);
    Ok(bilateral_smooth(
        &equalized,
        config.smoothing_radius,
        config.sigma_color,
        config.sigma_space,
    ))
}

/// Contrast-limited adaptive histogram equalization.
///
/// Each `tile_size` square gets its own clipped-histogram lookup table; every
/// pixel is remapped by blending the tables of the four tile centres around it.
pub fn equalize_clahe(img: &GrayImage, tile_size: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || tile_size == 0 {
        return img.clone();
    }

    let cols = width.div_ceil(tile_size);
    let rows = height.div_ceil(tile_size);
    let mut luts = Vec::with_capacity((cols * rows) as usize);

    for ty in 0..rows {
        for tx in 0..cols {
            let x0 = tx * tile_size;
            let y0 = ty * tile_size;
            let x1 = (x0 + tile_size).min(width);
            let y1 = (y0 + tile_size).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let total = (x1 - x0) * (y1 - y0);
            if clip_limit > 0.0 {
                clip_histogram(&mut hist, total, clip_limit);
            }
            luts.push(cumulative_lut(&hist, total));
        }
    }

    let tile = tile_size as f32;
    // Index of the tile centre at or before `p`, and the blend weight towards the next one.
    let locate = |p: u32, count: u32| -> (usize, usize, f32) {
        let f = (p as f32 + 0.5) / tile - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let i0 = (f.floor() as u32).min(count - 1);
        let i1 = (i0 + 1).min(count - 1);
        let weight = if i0 == i1 { 0.0 } else { f - i0 as f32 };
        (i0 as usize, i1 as usize, weight)
    };

    let cols_us = cols as usize;
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (r0, r1, wy) = locate(y, rows);
        for x in 0..width {
            let (c0, c1, wx) = locate(x, cols);
            let v = img.get_pixel(x, y)[0] as usize;
            let top = luts[r0 * cols_us + c0][v] as f32 * (1.0 - wx)
                + luts[r0 * cols_us + c1][v] as f32 * wx;
            let bottom = luts[r1 * cols_us + c0][v] as f32 * (1.0 - wx)
                + luts[r1 * cols_us + c1][v] as f32 * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Clip every bin at `clip_limit` times the uniform bin height and spread the
/// excess evenly, the remainder going to the lowest bins.
fn clip_histogram(hist: &mut [u32; 256], total: u32, clip_limit: f32) {
    let clip = ((total as f32 / 256.0) * clip_limit).ceil().max(1.0) as u32;
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }
}

fn cumulative_lut(hist: &[u32; 256], total: u32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if total == 0 {
        return lut;
    }
    let scale = 255.0 / total as f32;
    let mut running = 0u32;
    for (i, count) in hist.iter().enumerate() {
        running += count;
        lut[i] = (running as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Bilateral filter over a `2 * radius + 1` window, so strong edges are not smeared.
pub fn bilateral_smooth(img: &GrayImage, radius: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    bilateral_filter(img, 2 * radius + 1, sigma_color, sigma_space)
}
