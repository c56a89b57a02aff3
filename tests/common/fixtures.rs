use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub const TRAY_SIZE: u32 = 240;
pub const TRAY: Rgb<u8> = Rgb([200, 200, 200]);
pub const PART: Rgb<u8> = Rgb([40, 40, 40]);

/// Centres of the five washers laid out by [`five_washers`].
pub const WASHER_CENTRES: [(i64, i64); 5] = [(50, 50), (190, 50), (120, 120), (50, 190), (190, 190)];

/// Synthetic light tray with dark parts painted onto it.
pub struct Tray {
    img: RgbImage,
}

impl Tray {
    pub fn new() -> Self {
        Self {
            img: RgbImage::from_pixel(TRAY_SIZE, TRAY_SIZE, TRAY),
        }
    }

    fn paint(mut self, colour: Rgb<u8>, inside: impl Fn(i64, i64) -> bool) -> Self {
        for (x, y, pixel) in self.img.enumerate_pixels_mut() {
            if inside(x as i64, y as i64) {
                *pixel = colour;
            }
        }
        self
    }

    pub fn disc(self, cx: i64, cy: i64, r: i64) -> Self {
        self.paint(PART, |x, y| (x - cx).pow(2) + (y - cy).pow(2) <= r * r)
    }

    /// Flat washer: dark disc with a tray-coloured hole.
    pub fn washer(self, cx: i64, cy: i64, outer: i64, inner: i64) -> Self {
        self.disc(cx, cy, outer)
            .paint(TRAY, |x, y| (x - cx).pow(2) + (y - cy).pow(2) <= inner * inner)
    }

    /// Flat-topped hexagon with circumradius `r`, as a nut seen from above.
    pub fn hexagon(self, cx: i64, cy: i64, r: f32) -> Self {
        let s3 = 3f32.sqrt();
        self.paint(PART, |x, y| {
            let dx = (x - cx).abs() as f32;
            let dy = (y - cy).abs() as f32;
            dy <= r * s3 / 2.0 && s3 * dx + dy <= s3 * r
        })
    }

    pub fn rect(self, x0: i64, y0: i64, width: i64, height: i64) -> Self {
        self.paint(PART, |x, y| (x0..x0 + width).contains(&x) && (y0..y0 + height).contains(&y))
    }

    /// 20x5 head over a 14 px shank tapering to a point over 60 rows.
    pub fn screw(self, cx: i64, top: i64) -> Self {
        let head = self.rect(cx - 10, top, 20, 5);
        let shank_top = top + 5;
        head.paint(PART, |x, y| {
            let i = y - shank_top;
            if !(0..60).contains(&i) {
                return false;
            }
            let half = 7.0 * (1.0 - i as f32 / 60.0);
            (x as f32 + 0.5 - cx as f32).abs() <= half
        })
    }

    pub fn build(self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.img)
    }
}

impl Default for Tray {
    fn default() -> Self {
        Self::new()
    }
}

pub fn blank_tray() -> DynamicImage {
    Tray::new().build()
}

pub fn five_washers() -> DynamicImage {
    WASHER_CENTRES
        .iter()
        .fold(Tray::new(), |tray, &(cx, cy)| tray.washer(cx, cy, 18, 7))
        .build()
}

/// Two solid discs of radius 20 whose centres are 32 px apart.
pub fn touching_discs() -> DynamicImage {
    Tray::new().disc(104, 120, 20).disc(136, 120, 20).build()
}

/// One disc cut by the left edge and one whole disc.
pub fn disc_on_border() -> DynamicImage {
    Tray::new().disc(8, 120, 20).disc(150, 120, 18).build()
}

/// One of each part type, one per quadrant.
pub fn mixed_parts() -> DynamicImage {
    Tray::new()
        .washer(60, 60, 18, 7)
        .hexagon(180, 60, 18.0)
        .rect(54, 140, 12, 60)
        .screw(180, 140)
        .build()
}

pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}
