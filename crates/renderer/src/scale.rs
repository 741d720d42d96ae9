//! Value scaling and RGBA rendering of band rasters.
//!
//! Bands are `f32` rasters in row-major order with NaN marking missing
//! pixels. Missing pixels always render fully transparent.

use rayon::prelude::*;

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn grey(v: u8) -> Self {
        Self::new(v, v, v, 255)
    }

    pub fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }
}

/// Linear mapping of `[min, max]` onto `0..=255`, clamping outside values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub min: f32,
    pub max: f32,
}

impl LinearScale {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Scale spanning the finite values of `data`; `None` if there are none.
    pub fn from_data(data: &[f32]) -> Option<Self> {
        let (min, max) = data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min <= max {
            Some(Self::new(min, max))
        } else {
            None
        }
    }

    /// Byte value of `value`, or `None` for missing values.
    pub fn to_byte(&self, value: f32) -> Option<u8> {
        if value.is_nan() {
            return None;
        }
        let range = self.max - self.min;
        let range = if range.abs() < f32::EPSILON { 1.0 } else { range };
        let normalized = ((value - self.min) / range).clamp(0.0, 1.0);
        Some((normalized * 255.0).round() as u8)
    }
}

/// Render one band as a grey image.
pub fn render_grey(data: &[f32], width: usize, height: usize, scale: &LinearScale) -> Vec<u8> {
    let mut pixels = vec![0u8; width * height * 4];
    if width == 0 {
        return pixels;
    }

    pixels
        .par_chunks_mut(width * 4)
        .zip(data.par_chunks(width))
        .take(height)
        .for_each(|(out, row)| {
            for (px, &value) in out.chunks_exact_mut(4).zip(row) {
                let color = scale
                    .to_byte(value)
                    .map(Color::grey)
                    .unwrap_or_else(Color::transparent);
                px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
            }
        });

    pixels
}

/// Render three bands as the red, green and blue channels of one image.
///
/// A pixel is transparent when any of its channels is missing.
pub fn render_rgb(
    bands: [&[f32]; 3],
    width: usize,
    height: usize,
    scales: [LinearScale; 3],
) -> Vec<u8> {
    let mut pixels = vec![0u8; width * height * 4];
    if width == 0 {
        return pixels;
    }

    pixels
        .par_chunks_mut(width * 4)
        .enumerate()
        .take(height)
        .for_each(|(y, out)| {
            for (x, px) in out.chunks_exact_mut(4).enumerate() {
                let idx = y * width + x;
                let channel = |c: usize| {
                    bands[c]
                        .get(idx)
                        .and_then(|&v| scales[c].to_byte(v))
                };
                let color = match (channel(0), channel(1), channel(2)) {
                    (Some(r), Some(g), Some(b)) => Color::new(r, g, b, 255),
                    _ => Color::transparent(),
                };
                px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
            }
        });

    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_byte() {
        let scale = LinearScale::new(0.0, 10.0);
        assert_eq!(scale.to_byte(0.0), Some(0));
        assert_eq!(scale.to_byte(10.0), Some(255));
        assert_eq!(scale.to_byte(5.0), Some(128));
        assert_eq!(scale.to_byte(-3.0), Some(0));
        assert_eq!(scale.to_byte(42.0), Some(255));
        assert_eq!(scale.to_byte(f32::NAN), None);
    }

    #[test]
    fn test_degenerate_range() {
        let scale = LinearScale::new(2.0, 2.0);
        assert_eq!(scale.to_byte(2.0), Some(0));
    }

    #[test]
    fn test_from_data() {
        let scale = LinearScale::from_data(&[f32::NAN, 3.0, -1.0, f32::INFINITY]).unwrap();
        assert_eq!(scale, LinearScale::new(-1.0, 3.0));
        assert!(LinearScale::from_data(&[f32::NAN]).is_none());
    }

    #[test]
    fn test_render_grey_transparent_missing() {
        let data = [0.0, f32::NAN, 1.0, 0.5];
        let px = render_grey(&data, 2, 2, &LinearScale::new(0.0, 1.0));
        assert_eq!(&px[0..4], &[0, 0, 0, 255]);
        assert_eq!(&px[4..8], &[0, 0, 0, 0]);
        assert_eq!(&px[8..12], &[255, 255, 255, 255]);
        assert_eq!(px[12], 128);
    }

    #[test]
    fn test_render_rgb() {
        let r = [1.0, 0.0];
        let g = [0.0, 0.0];
        let b = [0.0, f32::NAN];
        let scale = LinearScale::new(0.0, 1.0);
        let px = render_rgb([&r, &g, &b], 2, 1, [scale; 3]);
        assert_eq!(&px[0..4], &[255, 0, 0, 255]);
        assert_eq!(&px[4..8], &[0, 0, 0, 0]);
    }
}
