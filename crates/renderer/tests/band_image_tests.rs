//! Rendering band rasters to PNG.

use renderer::png::{create_png, create_png_auto, PngError};
use renderer::{render_grey, render_rgb, LinearScale};

fn color_type(png: &[u8]) -> u8 {
    png[25]
}

fn dimensions(png: &[u8]) -> (u32, u32) {
    let w = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let h = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    (w, h)
}

fn has_chunk(png: &[u8], name: &[u8; 4]) -> bool {
    png.windows(4).any(|w| w == name)
}

/// Band with a linear ramp and a missing pixel every seventh position.
fn ramp_band(width: usize, height: usize) -> Vec<f32> {
    (0..width * height)
        .map(|i| if i % 7 == 3 { f32::NAN } else { i as f32 * 0.1 })
        .collect()
}

#[test]
fn test_grey_band_is_indexed_with_transparency() {
    let band = ramp_band(20, 10);
    let scale = LinearScale::from_data(&band).unwrap();
    let pixels = render_grey(&band, 20, 10, &scale);

    let png = create_png_auto(&pixels, 20, 10).unwrap();
    assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    assert_eq!(dimensions(&png), (20, 10));
    assert_eq!(color_type(&png), 3);
    assert!(has_chunk(&png, b"PLTE"));
    assert!(has_chunk(&png, b"tRNS"));
}

#[test]
fn test_grey_band_endpoints() {
    let band = vec![2.0, 4.0, 6.0, f32::NAN];
    let pixels = render_grey(&band, 2, 2, &LinearScale::new(2.0, 6.0));

    assert_eq!(&pixels[0..4], &[0, 0, 0, 255]);
    assert_eq!(&pixels[4..8], &[128, 128, 128, 255]);
    assert_eq!(&pixels[8..12], &[255, 255, 255, 255]);
    assert_eq!(pixels[15], 0);
}

#[test]
fn test_values_outside_scale_are_clamped() {
    let scale = LinearScale::new(0.0, 1.0);
    assert_eq!(scale.to_byte(-5.0), Some(0));
    assert_eq!(scale.to_byte(7.5), Some(255));
    assert_eq!(scale.to_byte(f32::NAN), None);
}

#[test]
fn test_constant_band_scale() {
    let scale = LinearScale::from_data(&[3.0, 3.0, f32::NAN]).unwrap();
    assert_eq!(scale.to_byte(3.0), Some(0));
    assert!(LinearScale::from_data(&[f32::NAN, f32::NAN]).is_none());
}

#[test]
fn test_rgb_missing_channel_is_transparent() {
    let r = vec![0.0, 1.0];
    let g = vec![0.0, f32::NAN];
    let b = vec![1.0, 1.0];
    let scales = [LinearScale::new(0.0, 1.0); 3];
    let pixels = render_rgb([&r, &g, &b], 2, 1, scales);

    assert_eq!(&pixels[0..4], &[0, 0, 255, 255]);
    assert_eq!(&pixels[4..8], &[0, 0, 0, 0]);
}

#[test]
fn test_many_colors_fall_back_to_rgba() {
    let width = 64;
    let height = 64;
    let r: Vec<f32> = (0..width * height).map(|i| (i % 64) as f32).collect();
    let g: Vec<f32> = (0..width * height).map(|i| (i / 64) as f32).collect();
    let b = vec![0.0; width * height];
    let scale = LinearScale::new(0.0, 63.0);
    let pixels = render_rgb([&r, &g, &b], width, height, [scale; 3]);

    let png = create_png_auto(&pixels, width, height).unwrap();
    assert_eq!(color_type(&png), 6);
    assert!(!has_chunk(&png, b"PLTE"));
}

#[test]
fn test_rgba_encoding() {
    let pixels = vec![10u8; 3 * 2 * 4];
    let png = create_png(&pixels, 3, 2).unwrap();
    assert_eq!(dimensions(&png), (3, 2));
    assert_eq!(color_type(&png), 6);
    assert!(has_chunk(&png, b"IEND"));
}

#[test]
fn test_buffer_size_mismatch() {
    let pixels = vec![0u8; 10];
    match create_png_auto(&pixels, 2, 2) {
        Err(PngError::BufferSize {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 16);
            assert_eq!(actual, 10);
        }
        other => panic!("expected BufferSize, got {:?}", other.map(|p| p.len())),
    }
    assert!(matches!(
        create_png(&[], 0, 4),
        Err(PngError::Dimensions { .. })
    ));
}
