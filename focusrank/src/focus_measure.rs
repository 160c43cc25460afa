//! Focus measures: scalar sharpness estimates over a single-channel sample.
//!
//! Every measure takes a [`GrayF32`] sample on the 0-255 intensity scale and
//! returns a non-negative `f64`. Measures are pure and deterministic. A sample
//! smaller than 2x2 scores 0, and a perfectly flat sample scores exactly 0
//! under every measure.

use image::{ImageBuffer, Luma, RgbImage};
use imageproc::filter::filter3x3;
use ndarray::Array2;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

const K_SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const K_SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
const K_LAPLACIAN: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

pub type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Available focus-measure algorithms.
///
/// The lowercase key is part of the output naming surface and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Laplacian,
    Tenengrad,
    Brenner,
    Fft,
    Gradient,
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "laplacian" => Ok(Method::Laplacian),
            "tenengrad" => Ok(Method::Tenengrad),
            "brenner" => Ok(Method::Brenner),
            "fft" => Ok(Method::Fft),
            "gradient" => Ok(Method::Gradient),
            _ => Err(format!("Unknown focus method: {s}")),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl Method {
    /// Stable key used for selection and output naming
    pub fn key(&self) -> &'static str {
        match self {
            Method::Laplacian => "laplacian",
            Method::Tenengrad => "tenengrad",
            Method::Brenner => "brenner",
            Method::Fft => "fft",
            Method::Gradient => "gradient",
        }
    }

    /// One-line description for `focusrank methods`
    pub fn description(&self) -> &'static str {
        match self {
            Method::Laplacian => "variance of the Laplacian response",
            Method::Tenengrad => "mean squared Sobel gradient magnitude",
            Method::Brenner => "sum of squared differences between rows two pixels apart",
            Method::Fft => "variance of the centred log-magnitude spectrum",
            Method::Gradient => "mean Sobel gradient magnitude",
        }
    }

    /// All methods in their canonical order
    pub fn all() -> Vec<Method> {
        vec![
            Method::Laplacian,
            Method::Tenengrad,
            Method::Brenner,
            Method::Fft,
            Method::Gradient,
        ]
    }

    /// Evaluate this method on a sample
    pub fn measure(&self, sample: &GrayF32) -> f64 {
        match self {
            Method::Laplacian => laplacian_variance(sample),
            Method::Tenengrad => tenengrad(sample),
            Method::Brenner => brenner(sample),
            Method::Fft => fft_log_spectrum_variance(sample),
            Method::Gradient => gradient_magnitude_mean(sample),
        }
    }
}

/// Convert RGB pixels to a single-channel intensity sample (ITU-R BT.601 weights).
pub fn gray_from_rgb(rgb: &RgbImage) -> GrayF32 {
    let (width, height) = rgb.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let p = rgb.get_pixel(x, y);
        Luma([0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32])
    })
}

fn is_degenerate(sample: &GrayF32) -> bool {
    let (w, h) = sample.dimensions();
    w < 2 || h < 2
}

fn is_flat(sample: &GrayF32) -> bool {
    let mut values = sample.as_raw().iter();
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn sobel(sample: &GrayF32) -> (Vec<f32>, Vec<f32>) {
    let gx = filter3x3(sample, &K_SOBEL_X);
    let gy = filter3x3(sample, &K_SOBEL_Y);
    let gx: Vec<f32> = gx.into_raw();
    let gy: Vec<f32> = gy.into_raw();
    (gx, gy)
}

/// Variance of the 3x3 Laplacian response
pub fn laplacian_variance(sample: &GrayF32) -> f64 {
    if is_degenerate(sample) {
        return 0.0;
    }
    let response = filter3x3(sample, &K_LAPLACIAN);
    let response: Vec<f32> = response.into_raw();
    let response: Vec<f64> = response.iter().map(|&v| v as f64).collect();
    variance(&response)
}

/// Tenengrad: mean of gx² + gy²
pub fn tenengrad(sample: &GrayF32) -> f64 {
    if is_degenerate(sample) {
        return 0.0;
    }
    let (gx, gy) = sobel(sample);
    let g2: Vec<f32> = gx.iter().zip(&gy).map(|(x, y)| x * x + y * y).collect();
    mean(&g2)
}

/// Mean gradient magnitude sqrt(gx² + gy²)
pub fn gradient_magnitude_mean(sample: &GrayF32) -> f64 {
    if is_degenerate(sample) {
        return 0.0;
    }
    let (gx, gy) = sobel(sample);
    let mag: Vec<f32> = gx
        .iter()
        .zip(&gy)
        .map(|(x, y)| (x * x + y * y).sqrt())
        .collect();
    mean(&mag)
}

/// Brenner: Σ (I[r+2, c] - I[r, c])²
pub fn brenner(sample: &GrayF32) -> f64 {
    let (w, h) = sample.dimensions();
    if is_degenerate(sample) || h < 3 {
        return 0.0;
    }
    let mut sum = 0f64;
    for r in 0..h - 2 {
        for c in 0..w {
            let d = sample.get_pixel(c, r + 2)[0] as f64 - sample.get_pixel(c, r)[0] as f64;
            sum += d * d;
        }
    }
    sum
}

/// Centred log-magnitude spectrum `20·ln(|F| + 1)`, zero frequency at `(h/2, w/2)`.
///
/// Shape is `(height, width)`.
pub fn centered_log_spectrum(sample: &GrayF32) -> Array2<f64> {
    let (w, h) = sample.dimensions();
    let (w, h) = (w as usize, h as usize);
    if w == 0 || h == 0 {
        return Array2::zeros((h, w));
    }

    let mut planner = FftPlanner::<f64>::new();

    // Row transforms over a row-major buffer
    let mut rows: Vec<Complex64> = sample
        .as_raw()
        .iter()
        .map(|&v| Complex64::new(v as f64, 0.0))
        .collect();
    planner.plan_fft_forward(w).process(&mut rows);

    // Column transforms over the transposed buffer
    let mut cols = vec![Complex64::new(0.0, 0.0); w * h];
    for r in 0..h {
        for c in 0..w {
            cols[c * h + r] = rows[r * w + c];
        }
    }
    planner.plan_fft_forward(h).process(&mut cols);

    Array2::from_shape_fn((h, w), |(r, c)| {
        let src_r = (r + h - h / 2) % h;
        let src_c = (c + w - w / 2) % w;
        20.0 * (cols[src_c * h + src_r].norm() + 1.0).ln()
    })
}

/// Variance of the centred log-magnitude spectrum
pub fn fft_log_spectrum_variance(sample: &GrayF32) -> f64 {
    if is_degenerate(sample) || is_flat(sample) {
        return 0.0;
    }
    let spectrum: Vec<f64> = centered_log_spectrum(sample).iter().copied().collect();
    variance(&spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn flat(w: u32, h: u32, v: f32) -> GrayF32 {
        ImageBuffer::from_pixel(w, h, Luma([v]))
    }

    /// Low-contrast horizontal sinusoid, one period across the width
    fn soft_wave(w: u32, h: u32) -> GrayF32 {
        ImageBuffer::from_fn(w, h, |x, _| {
            let phase = 2.0 * std::f32::consts::PI * x as f32 / w as f32;
            Luma([128.0 + 10.0 * phase.sin()])
        })
    }

    fn with_noise(sample: &GrayF32, amplitude: f32, seed: u64) -> GrayF32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = sample.clone();
        for p in out.pixels_mut() {
            p[0] += rng.random_range(-amplitude..amplitude);
        }
        out
    }

    #[test]
    fn test_method_keys_round_trip() {
        for method in Method::all() {
            assert_eq!(method.key().parse::<Method>().unwrap(), method);
        }
        assert_eq!("FFT".parse::<Method>().unwrap(), Method::Fft);
        assert!("sobel".parse::<Method>().is_err());
    }

    #[test]
    fn test_flat_sample_scores_zero() {
        let sample = flat(32, 24, 117.0);
        for method in Method::all() {
            assert_eq!(method.measure(&sample), 0.0, "{method} should be 0 on a flat sample");
        }
    }

    #[test]
    fn test_tiny_samples_score_zero() {
        let one = flat(1, 1, 200.0);
        let row = ImageBuffer::from_fn(8, 1, |x, _| Luma([x as f32 * 30.0]));
        let column = ImageBuffer::from_fn(1, 5, |_, y| Luma([(y % 2) as f32 * 210.0]));
        let two_rows = ImageBuffer::from_fn(6, 2, |x, y| Luma([((x + y) % 2) as f32 * 90.0]));
        for method in Method::all() {
            assert_eq!(method.measure(&one), 0.0, "{method} on 1x1");
            assert_eq!(method.measure(&row), 0.0, "{method} on 8x1");
            assert_eq!(method.measure(&column), 0.0, "{method} on 1x5");
        }
        assert_eq!(brenner(&two_rows), 0.0);
    }

    #[test]
    fn test_measures_are_deterministic() {
        let sample = with_noise(&soft_wave(40, 30), 15.0, 7);
        let copy = sample.clone();
        for method in Method::all() {
            assert_eq!(method.measure(&sample), method.measure(&copy));
        }
    }

    #[test]
    fn test_noise_increases_scores() {
        let base = soft_wave(64, 64);
        let noisy = with_noise(&base, 20.0, 42);
        for method in [
            Method::Laplacian,
            Method::Tenengrad,
            Method::Gradient,
            Method::Fft,
            Method::Brenner,
        ] {
            let before = method.measure(&base);
            let after = method.measure(&noisy);
            assert!(
                after > before,
                "{method}: expected noise to raise score ({before} -> {after})"
            );
        }
    }

    #[test]
    fn test_noise_on_flat_sample_is_strictly_positive() {
        let noisy = with_noise(&flat(48, 48, 90.0), 12.0, 3);
        for method in Method::all() {
            assert!(method.measure(&noisy) > 0.0, "{method} should respond to noise");
        }
    }

    #[test]
    fn test_brenner_known_value() {
        // Top two rows 0, bottom two rows 10
        let sample = ImageBuffer::from_fn(3, 4, |_, y| Luma([if y < 2 { 0.0 } else { 10.0 }]));
        // r = 0 and r = 1 each contribute 3 columns * 100
        assert_eq!(brenner(&sample), 600.0);
    }

    #[test]
    fn test_brenner_ignores_column_only_detail() {
        let stripes = ImageBuffer::from_fn(16, 16, |x, _| Luma([if x % 2 == 0 { 0.0 } else { 255.0 }]));
        assert_eq!(brenner(&stripes), 0.0);
        assert!(laplacian_variance(&stripes) > 0.0);
    }

    #[test]
    fn test_spectrum_is_centred() {
        let sample = flat(9, 6, 50.0);
        let spectrum = centered_log_spectrum(&sample);
        assert_eq!(spectrum.dim(), (6, 9));
        let dc = spectrum[[3, 4]];
        assert!((dc - 20.0 * (50.0f64 * 54.0 + 1.0).ln()).abs() < 1e-6);
        let others: f64 = spectrum.iter().sum::<f64>() - dc;
        assert!(others.abs() < 1e-6);
    }

    #[test]
    fn test_sharper_edge_scores_higher() {
        let hard = ImageBuffer::from_fn(32, 32, |x, _| Luma([if x < 16 { 40.0 } else { 200.0 }]));
        let soft = ImageBuffer::from_fn(32, 32, |x, _| {
            Luma([(40.0 + (x as f32 / 31.0) * 160.0).clamp(40.0, 200.0)])
        });
        assert!(laplacian_variance(&hard) > laplacian_variance(&soft));
        assert!(tenengrad(&hard) > tenengrad(&soft));
    }

    #[test]
    fn test_gray_from_rgb_weights() {
        let rgb = RgbImage::from_pixel(2, 2, image::Rgb([100, 200, 50]));
        let gray = gray_from_rgb(&rgb);
        let expected = 0.299 * 100.0 + 0.587 * 200.0 + 0.114 * 50.0;
        assert!((gray.get_pixel(1, 1)[0] - expected).abs() < 1e-4);
    }
}
