//! Colour-mask analysis of water imagery.
//!
//! Pixels are converted to 8-bit HSV (hue halved into 0..=180, saturation
//! and value in 0..=255). Green pixels indicate chlorophyll (algae); brown
//! and yellow pixels indicate suspended sediment.

use image::RgbImage;
use serde::Serialize;

/// Inclusive HSV bounds.
#[derive(Debug, Clone, Copy)]
struct HsvRange {
    lower: [u8; 3],
    upper: [u8; 3],
}

impl HsvRange {
    fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

const GREEN: HsvRange = HsvRange {
    lower: [35, 40, 40],
    upper: [85, 255, 255],
};

const BROWN: HsvRange = HsvRange {
    lower: [10, 40, 40],
    upper: [30, 255, 255],
};

const TURBIDITY_WEIGHT: f64 = 1.5;
const CHLOROPHYLL_WEIGHT: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterAnalysis {
    pub chlorophyll_index: f64,
    pub turbidity_index: f64,
    pub risk_score: f64,
}

/// RGB to 8-bit HSV with hue in `0..=180`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [(h / 2.0).round() as u8, s.round() as u8, v as u8]
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Chlorophyll and turbidity coverage (percent of pixels) and the combined
/// risk score, clamped to `[0, 100]`.
pub fn analyze(img: &RgbImage) -> WaterAnalysis {
    let total = u64::from(img.width()) * u64::from(img.height());
    if total == 0 {
        return WaterAnalysis::default();
    }

    let (mut green, mut brown) = (0u64, 0u64);
    for px in img.pixels() {
        let hsv = rgb_to_hsv(px[0], px[1], px[2]);
        if GREEN.contains(hsv) {
            green += 1;
        }
        if BROWN.contains(hsv) {
            brown += 1;
        }
    }

    let chlorophyll = green as f64 / total as f64 * 100.0;
    let turbidity = brown as f64 / total as f64 * 100.0;
    let risk = (turbidity * TURBIDITY_WEIGHT + chlorophyll * CHLOROPHYLL_WEIGHT).clamp(0.0, 100.0);

    WaterAnalysis {
        chlorophyll_index: round2(chlorophyll),
        turbidity_index: round2(turbidity),
        risk_score: round2(risk),
    }
}

/// Decodes an encoded image and analyses it.
pub fn analyze_bytes(bytes: &[u8]) -> Result<WaterAnalysis, image::ImageError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    Ok(analyze(&img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const WATER: Rgb<u8> = Rgb([0, 100, 200]);
    const ALGAE: Rgb<u8> = Rgb([34, 139, 34]);
    const SILT: Rgb<u8> = Rgb([139, 69, 19]);

    #[test]
    fn hsv_matches_8bit_convention() {
        assert_eq!(rgb_to_hsv(34, 139, 34), [60, 193, 139]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        let silt = rgb_to_hsv(139, 69, 19);
        assert!((10..=30).contains(&silt[0]));
    }

    #[test]
    fn clear_water_scores_zero() {
        let img = RgbImage::from_pixel(8, 8, WATER);
        assert_eq!(analyze(&img), WaterAnalysis::default());
    }

    #[test]
    fn half_algae_image() {
        let img = RgbImage::from_fn(10, 10, |x, _| if x < 5 { ALGAE } else { WATER });
        let a = analyze(&img);
        assert_eq!(a.chlorophyll_index, 50.0);
        assert_eq!(a.turbidity_index, 0.0);
        assert_eq!(a.risk_score, 60.0);
    }

    #[test]
    fn risk_is_clamped() {
        let img = RgbImage::from_fn(10, 10, |x, _| if x < 8 { SILT } else { ALGAE });
        let a = analyze(&img);
        assert_eq!(a.turbidity_index, 80.0);
        assert_eq!(a.chlorophyll_index, 20.0);
        assert_eq!(a.risk_score, 100.0);
    }

    #[test]
    fn rejects_undecodable_bytes() {
        assert!(analyze_bytes(b"not an image").is_err());
    }
}
