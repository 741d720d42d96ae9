//! PNG image output of one (grey) or three (RGB) bands.

use std::path::Path;

use renderer::{create_png_auto, render_grey, render_rgb, LinearScale};
use tracing::debug;

use crate::error::{BinningError, Result};
use crate::formatter::BandConfiguration;
use crate::raster::RenderedRaster;

/// Band values with fill values replaced by NaN, plus the scale to render them with.
fn prepare_band(
    raster: &RenderedRaster,
    band: &BandConfiguration,
    path: &Path,
) -> Result<(Vec<f32>, LinearScale)> {
    let data = raster.band(&band.name).ok_or_else(|| {
        BinningError::output_fault(path, format!("band '{}' was not rendered", band.name))
    })?;
    let data: Vec<f32> = data
        .iter()
        .map(|&v| if raster.is_missing(v) { f32::NAN } else { v })
        .collect();

    let auto = LinearScale::from_data(&data).unwrap_or_else(|| LinearScale::new(0.0, 1.0));
    let scale = LinearScale::new(band.min.unwrap_or(auto.min), band.max.unwrap_or(auto.max));
    debug!(band = %band.name, min = scale.min, max = scale.max, "Band scale");
    Ok((data, scale))
}

pub(super) fn write_png(
    path: &Path,
    raster: &RenderedRaster,
    bands: &[BandConfiguration],
) -> Result<()> {
    let (width, height) = (raster.width(), raster.height());

    let pixels = match bands {
        [band] => {
            let (data, scale) = prepare_band(raster, band, path)?;
            render_grey(&data, width, height, &scale)
        }
        [r, g, b] => {
            let (r, rs) = prepare_band(raster, r, path)?;
            let (g, gs) = prepare_band(raster, g, path)?;
            let (b, bs) = prepare_band(raster, b, path)?;
            render_rgb([&r, &g, &b], width, height, [rs, gs, bs])
        }
        other => {
            return Err(BinningError::output_fault(
                path,
                format!("images need one or three bands, got {}", other.len()),
            ))
        }
    };

    let png = create_png_auto(&pixels, width, height)
        .map_err(|e| BinningError::output_fault(path, e.to_string()))?;
    std::fs::write(path, &png).map_err(|e| BinningError::output_fault(path, e.to_string()))?;
    debug!(path = %path.display(), bytes = png.len(), "Wrote PNG");
    Ok(())
}
