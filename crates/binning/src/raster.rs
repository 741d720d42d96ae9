//! Raster geometry and rendered band rasters.
//!
//! The output raster of a planetary grid with `n` rows is an equirectangular
//! image with square pixels of `180 / n` degrees. SEA grids render onto a
//! `2n x n` raster; rectangular grids onto their own `num_cols x n` layout so
//! every pixel maps to exactly one cell.

use std::sync::OnceLock;

use planetary_grid::{BoundingBox, PlanetaryGrid, Region};

use crate::error::{BinningError, Result};

/// Maximum number of overview levels kept by a [`RasterPyramid`].
pub const MAX_OVERVIEW_LEVELS: usize = 8;

/// A window of the full planetary raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterRegion {
    /// Column of the window's left edge in the full raster.
    pub x: usize,
    /// Row of the window's top edge in the full raster.
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub full_width: usize,
    pub full_height: usize,
}

impl RasterRegion {
    /// The whole raster of `grid`.
    pub fn full(grid: &dyn PlanetaryGrid) -> Self {
        let (full_width, full_height) = full_raster_size(grid);
        Self {
            x: 0,
            y: 0,
            width: full_width,
            height: full_height,
            full_width,
            full_height,
        }
    }

    /// Pixel width in degrees of longitude.
    pub fn pixel_size_x(&self) -> f64 {
        360.0 / self.full_width as f64
    }

    /// Pixel height in degrees of latitude.
    pub fn pixel_size_y(&self) -> f64 {
        180.0 / self.full_height as f64
    }

    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Latitude and longitude of the center of window pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let lat = 90.0 - ((self.y + row) as f64 + 0.5) * self.pixel_size_y();
        let lon = -180.0 + ((self.x + col) as f64 + 0.5) * self.pixel_size_x();
        (lat, lon)
    }

    /// Geographic extent of the window.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            -180.0 + self.x as f64 * self.pixel_size_x(),
            90.0 - (self.y + self.height) as f64 * self.pixel_size_y(),
            -180.0 + (self.x + self.width) as f64 * self.pixel_size_x(),
            90.0 - self.y as f64 * self.pixel_size_y(),
        )
    }

    /// GDAL-style affine transform `[origin_lon, dx, 0, origin_lat, 0, -dy]`.
    pub fn geotransform(&self) -> [f64; 6] {
        let bbox = self.bbox();
        [
            bbox.min_lon,
            self.pixel_size_x(),
            0.0,
            bbox.max_lat,
            0.0,
            -self.pixel_size_y(),
        ]
    }
}

fn full_raster_size(grid: &dyn PlanetaryGrid) -> (usize, usize) {
    let num_rows = grid.num_rows();
    if grid.is_rectangular() {
        (grid.num_cols(0), num_rows)
    } else {
        (2 * num_rows, num_rows)
    }
}

/// Window of the planetary raster covering `region`, or the full raster.
///
/// Fails when the region does not overlap the raster.
pub fn compute_raster_sub_region(
    grid: &dyn PlanetaryGrid,
    region: Option<&Region>,
) -> Result<RasterRegion> {
    let full = RasterRegion::full(grid);
    let region = match region {
        Some(region) => region,
        None => return Ok(full),
    };

    let bbox = region
        .bounding_box()
        .intersection(&BoundingBox::global())
        .ok_or_else(|| {
            BinningError::configuration(format!(
                "region {} does not overlap the globe",
                region
            ))
        })?;

    // Whole pixels covering the box; an edge on a pixel boundary does not
    // pull in the neighbouring pixel.
    let (px, py) = (full.pixel_size_x(), full.pixel_size_y());
    let x0 = ((180.0 + bbox.min_lon) / px).floor() as i64;
    let y0 = ((90.0 - bbox.max_lat) / py).floor() as i64;
    let x1 = (((180.0 + bbox.max_lon) / px).ceil() as i64).max(x0 + 1);
    let y1 = (((90.0 - bbox.min_lat) / py).ceil() as i64).max(y0 + 1);

    let x0 = x0.clamp(0, full.full_width as i64) as usize;
    let y0 = y0.clamp(0, full.full_height as i64) as usize;
    let x1 = x1.clamp(0, full.full_width as i64) as usize;
    let y1 = y1.clamp(0, full.full_height as i64) as usize;
    if x1 <= x0 || y1 <= y0 {
        return Err(BinningError::configuration(format!(
            "region {} yields an empty raster",
            region
        )));
    }

    Ok(RasterRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
        ..full
    })
}

/// Counters collected while rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub pixels_with_data: u64,
    pub pixels_missing: u64,
    /// Pixels whose variance was clamped to zero.
    pub clamped_pixels: u64,
}

impl RenderStats {
    pub fn merge(&mut self, other: &RenderStats) {
        self.pixels_with_data += other.pixels_with_data;
        self.pixels_missing += other.pixels_missing;
        self.clamped_pixels += other.clamped_pixels;
    }
}

/// Rendered feature bands of one raster window.
#[derive(Debug, Clone)]
pub struct RenderedRaster {
    pub region: RasterRegion,
    pub band_names: Vec<String>,
    /// One row-major band per name.
    pub bands: Vec<Vec<f32>>,
    /// Observation count per pixel, -1 where the cell has no data.
    pub num_obs: Vec<i32>,
    /// Pass count per pixel, -1 where the cell has no data.
    pub num_passes: Vec<i32>,
    pub fill_value: f32,
    pub stats: RenderStats,
}

impl RenderedRaster {
    pub fn width(&self) -> usize {
        self.region.width
    }

    pub fn height(&self) -> usize {
        self.region.height
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.band_names.iter().position(|n| n == name)
    }

    pub fn band(&self, name: &str) -> Option<&[f32]> {
        self.band_index(name).map(|i| self.bands[i].as_slice())
    }

    /// Value of band `name` at window pixel `(col, row)`.
    pub fn value_at(&self, name: &str, col: usize, row: usize) -> Option<f32> {
        if col >= self.width() || row >= self.height() {
            return None;
        }
        self.band(name).map(|band| band[row * self.width() + col])
    }

    /// True when `value` marks a pixel without data.
    pub fn is_missing(&self, value: f32) -> bool {
        is_missing(value, self.fill_value)
    }
}

fn is_missing(value: f32, fill: f32) -> bool {
    value.is_nan() || value == fill
}

// ============================================================================
// Overviews
// ============================================================================

/// One downsampled level of a band.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    /// Level index, 1 = half resolution.
    pub level: usize,
}

/// Lazily built overview levels of one band.
///
/// Level `n` is computed from level `n - 1` on first access and cached.
#[derive(Debug)]
pub struct RasterPyramid {
    base: Vec<f32>,
    width: usize,
    height: usize,
    fill_value: f32,
    levels: [OnceLock<Option<PyramidLevel>>; MAX_OVERVIEW_LEVELS],
}

impl RasterPyramid {
    pub fn new(base: Vec<f32>, width: usize, height: usize, fill_value: f32) -> Self {
        Self {
            base,
            width,
            height,
            fill_value,
            levels: Default::default(),
        }
    }

    /// Overview level `n` (1-based), or `None` if the raster is too small.
    pub fn level(&self, n: usize) -> Option<&PyramidLevel> {
        if n == 0 || n > MAX_OVERVIEW_LEVELS {
            return None;
        }
        self.levels[n - 1]
            .get_or_init(|| {
                let (data, width, height) = if n == 1 {
                    (self.base.as_slice(), self.width, self.height)
                } else {
                    let prev = self.level(n - 1)?;
                    (prev.data.as_slice(), prev.width, prev.height)
                };
                let (data, width, height) = downsample_2x(data, width, height, self.fill_value);
                if width == 0 || height == 0 {
                    return None;
                }
                Some(PyramidLevel {
                    data,
                    width,
                    height,
                    level: n,
                })
            })
            .as_ref()
    }

    /// Number of levels that can be built, capped at `max`.
    pub fn available_levels(&self, max: usize) -> usize {
        (1..=max.min(MAX_OVERVIEW_LEVELS))
            .take_while(|&n| self.level(n).is_some())
            .count()
    }

    /// Drop all cached levels.
    pub fn reset(&mut self) {
        self.levels = Default::default();
    }
}

/// Halve a raster by averaging each 2x2 block, ignoring missing values.
///
/// Odd trailing rows and columns are dropped. A block without any valid
/// value yields `fill`.
pub fn downsample_2x(data: &[f32], width: usize, height: usize, fill: f32) -> (Vec<f32>, usize, usize) {
    let new_width = width / 2;
    let new_height = height / 2;

    if new_width == 0 || new_height == 0 {
        return (vec![], 0, 0);
    }

    let mut output = vec![fill; new_width * new_height];

    for out_y in 0..new_height {
        for out_x in 0..new_width {
            let in_x = out_x * 2;
            let in_y = out_y * 2;
            let block = [
                data[in_y * width + in_x],
                data[in_y * width + in_x + 1],
                data[(in_y + 1) * width + in_x],
                data[(in_y + 1) * width + in_x + 1],
            ];

            let mut sum = 0.0f32;
            let mut count = 0;
            for v in block {
                if !is_missing(v, fill) {
                    sum += v;
                    count += 1;
                }
            }
            if count > 0 {
                output[out_y * new_width + out_x] = sum / count as f32;
            }
        }
    }

    (output, new_width, new_height)
}
