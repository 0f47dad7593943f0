//! Probe image quality gate: resolution, sharpness and exposure checks.
//!
//! Runs before any detection or network work so unusable photos are
//! rejected cheaply.

use image::RgbImage;
use std::fmt;

const MIN_DIMENSION: u32 = 100;
const MIN_BLUR_VARIANCE: f64 = 100.0;
const MIN_BRIGHTNESS: f64 = 30.0;
const MAX_BRIGHTNESS: f64 = 225.0;

/// Limits applied by [`QualityGate`].
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// Minimum width and height in pixels.
    pub min_dimension: u32,
    /// Minimum variance of the Laplacian of the grayscale image.
    pub min_blur_variance: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_dimension: MIN_DIMENSION,
            min_blur_variance: MIN_BLUR_VARIANCE,
            min_brightness: MIN_BRIGHTNESS,
            max_brightness: MAX_BRIGHTNESS,
        }
    }
}

/// Why an image was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityIssue {
    TooSmall { width: u32, height: u32 },
    TooBlurry { score: f64 },
    PoorLighting { brightness: f64 },
}

impl QualityIssue {
    /// Short machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall { .. } => "too small",
            QualityIssue::TooBlurry { .. } => "too blurry",
            QualityIssue::PoorLighting { .. } => "poor lighting",
        }
    }

    /// Identifier used in the JSON result (`too_small`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall { .. } => "too_small",
            QualityIssue::TooBlurry { .. } => "too_blurry",
            QualityIssue::PoorLighting { .. } => "poor_lighting",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall { .. } => "Please use a larger image (at least 100x100 pixels)",
            QualityIssue::TooBlurry { .. } => "Please use a sharper, in-focus image",
            QualityIssue::PoorLighting { .. } => "Please use an image taken in better lighting",
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::TooSmall { width, height } => {
                write!(f, "Image too small ({width}x{height}, min {MIN_DIMENSION}x{MIN_DIMENSION})")
            }
            QualityIssue::TooBlurry { score } => write!(f, "Image too blurry (score: {score:.1})"),
            QualityIssue::PoorLighting { brightness } => {
                write!(f, "Poor lighting (brightness: {brightness:.1})")
            }
        }
    }
}

/// Result of a quality check, with the measurements that were taken.
#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub issue: Option<QualityIssue>,
    /// Laplacian variance; `None` when the size check failed first.
    pub blur_score: Option<f64>,
    pub brightness: Option<f64>,
}

impl QualityVerdict {
    pub fn passed(&self) -> bool {
        self.issue.is_none()
    }

    pub fn reason(&self) -> &'static str {
        self.issue.map(|i| i.reason()).unwrap_or("OK")
    }
}

/// Rejects probe images that are too small, blurry or badly exposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    pub thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn check(&self, image: &RgbImage) -> QualityVerdict {
        let t = &self.thresholds;
        let (width, height) = image.dimensions();

        if width < t.min_dimension || height < t.min_dimension {
            return QualityVerdict {
                issue: Some(QualityIssue::TooSmall { width, height }),
                blur_score: None,
                brightness: None,
            };
        }

        let gray = to_grayscale(image);
        let blur = laplacian_variance(&gray, width as usize, height as usize);
        let brightness = mean_brightness(&gray);

        let issue = if blur < t.min_blur_variance {
            Some(QualityIssue::TooBlurry { score: blur })
        } else if brightness < t.min_brightness || brightness > t.max_brightness {
            Some(QualityIssue::PoorLighting { brightness })
        } else {
            None
        };

        QualityVerdict {
            issue,
            blur_score: Some(blur),
            brightness: Some(brightness),
        }
    }
}

/// ITU-R BT.601 luma, rounded to u8.
pub fn to_grayscale(image: &RgbImage) -> Vec<u8> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Average pixel brightness (0.0–255.0).
pub fn mean_brightness(gray: &[u8]) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    gray.iter().map(|&p| p as f64).sum::<f64>() / gray.len() as f64
}

/// Variance of the 4-neighbour Laplacian response, with reflect-101 borders.
///
/// Sharp images have strong second derivatives at edges, so a low variance
/// means little edge content.
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width == 0 || height == 0 || gray.len() < width * height {
        return 0.0;
    }

    let px = |x: isize, y: isize| -> f64 {
        let xi = reflect101(x, width);
        let yi = reflect101(y, height);
        gray[yi * width + xi] as f64
    };

    let n = (width * height) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for y in 0..height as isize {
        for x in 0..width as isize {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mirror an out-of-range index without repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i.clamp(0, last) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(w: u32, h: u32, cell: u32, lo: u8, hi: u8) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = if ((x / cell) + (y / cell)) % 2 == 0 { lo } else { hi };
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_too_small() {
        let img = checkerboard(99, 200, 2, 0, 255);
        let verdict = QualityGate::default().check(&img);
        assert!(!verdict.passed());
        assert_eq!(verdict.reason(), "too small");
        assert_eq!(
            verdict.issue,
            Some(QualityIssue::TooSmall { width: 99, height: 200 })
        );
    }

    #[test]
    fn test_flat_image_is_blurry() {
        let img = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        let verdict = QualityGate::default().check(&img);
        assert_eq!(verdict.reason(), "too blurry");
        assert_eq!(verdict.blur_score, Some(0.0));
    }

    #[test]
    fn test_sharp_midtone_passes() {
        let img = checkerboard(200, 200, 2, 60, 200);
        let verdict = QualityGate::default().check(&img);
        assert!(verdict.passed(), "{:?}", verdict);
        assert_eq!(verdict.reason(), "OK");
    }

    #[test]
    fn test_dark_image_poor_lighting() {
        // Sharp but mean brightness ~10
        let img = checkerboard(200, 200, 1, 0, 20);
        let verdict = QualityGate::default().check(&img);
        assert_eq!(verdict.reason(), "poor lighting");
    }

    #[test]
    fn test_bright_image_poor_lighting() {
        let img = checkerboard(200, 200, 1, 235, 255);
        let verdict = QualityGate::default().check(&img);
        assert_eq!(verdict.reason(), "poor lighting");
    }

    #[test]
    fn test_laplacian_constant_is_zero() {
        let gray = vec![77u8; 10 * 10];
        assert_eq!(laplacian_variance(&gray, 10, 10), 0.0);
    }

    #[test]
    fn test_laplacian_single_pixel_checkerboard() {
        // Interior of a 0/255 checkerboard: every response is ±1020.
        // Reflect-101 keeps the pattern intact at the borders too.
        let w = 8;
        let gray: Vec<u8> = (0..w * w)
            .map(|i| if ((i % w) + (i / w)) % 2 == 0 { 0 } else { 255 })
            .collect();
        let var = laplacian_variance(&gray, w, w);
        assert!((var - 1020.0 * 1020.0).abs() < 1e-6, "got {var}");
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-1, 1), 0);
    }

    #[test]
    fn test_grayscale_weights() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(to_grayscale(&img), vec![76]);
    }

    #[test]
    fn test_mean_brightness() {
        assert_eq!(mean_brightness(&[0, 100, 200]), 100.0);
        assert_eq!(mean_brightness(&[]), 0.0);
    }
}
