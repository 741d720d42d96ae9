//! Reprojection of temporal bins onto an output raster.
//!
//! ```text
//! INIT -> COMPUTE_OUTPUT_REGION -> RENDER -> WRITE -> DONE
//!   \___________________\___________\_________\____-> FAILED
//! ```
//!
//! Rendering only reads the finished [`TemporalBinList`]. The raster is
//! split into horizontal tiles of `tile_height` rows that render in
//! parallel; cancellation is checked before each tile.

use std::fmt;
use std::sync::Arc;

use planetary_grid::{PlanetaryGrid, Region};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregators::OutputStatus;
use crate::cancel::CancellationToken;
use crate::error::{BinningError, Result, Stage};
use crate::formatter::{Formatter, WrittenProduct};
use crate::metadata::ProductMetadata;
use crate::raster::{compute_raster_sub_region, RasterRegion, RenderStats, RenderedRaster};
use crate::temporal::TemporalBinList;

/// Lifecycle of a [`Reprojector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprojectorState {
    Init,
    ComputeOutputRegion,
    Render,
    Write,
    Done,
    Failed,
}

impl ReprojectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::ComputeOutputRegion => "COMPUTE_OUTPUT_REGION",
            Self::Render => "RENDER",
            Self::Write => "WRITE",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    fn can_advance_to(self, next: ReprojectorState) -> bool {
        use ReprojectorState::*;
        matches!(
            (self, next),
            (Init, ComputeOutputRegion)
                | (ComputeOutputRegion, Render)
                | (Render, Write)
                | (Write, Done)
                | (_, Failed)
        )
    }
}

impl fmt::Display for ReprojectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rendered horizontal strip of the output raster.
struct Tile {
    bands: Vec<Vec<f32>>,
    num_obs: Vec<i32>,
    num_passes: Vec<i32>,
    stats: RenderStats,
}

/// Maps temporal bins back onto a raster and hands it to a [`Formatter`].
pub struct Reprojector {
    grid: Arc<dyn PlanetaryGrid>,
    region: Option<Region>,
    tile_height: usize,
    strict_numeric: bool,
    cancel: CancellationToken,
    state: ReprojectorState,
    output_region: Option<RasterRegion>,
    raster: Option<RenderedRaster>,
}

impl Reprojector {
    pub fn new(
        grid: Arc<dyn PlanetaryGrid>,
        region: Option<Region>,
        tile_height: usize,
        strict_numeric: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            grid,
            region,
            tile_height: tile_height.max(1),
            strict_numeric,
            cancel,
            state: ReprojectorState::Init,
            output_region: None,
            raster: None,
        }
    }

    pub fn state(&self) -> ReprojectorState {
        self.state
    }

    /// The rendered raster, once RENDER has completed.
    pub fn raster(&self) -> Option<&RenderedRaster> {
        self.raster.as_ref()
    }

    pub fn into_raster(self) -> Option<RenderedRaster> {
        self.raster
    }

    fn advance(&mut self, next: ReprojectorState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(BinningError::invalid_state(format!(
                "reprojector cannot go from {} to {}",
                self.state, next
            )));
        }
        debug!(from = %self.state, to = %next, "Reprojector transition");
        self.state = next;
        Ok(())
    }

    /// Mark the reprojector as failed when `result` is an error.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = ReprojectorState::Failed;
        }
        result
    }

    /// Determine the raster window covering the region of interest.
    pub fn compute_output_region(&mut self) -> Result<RasterRegion> {
        self.advance(ReprojectorState::ComputeOutputRegion)?;
        let result = compute_raster_sub_region(self.grid.as_ref(), self.region.as_ref());
        let region = self.track(result)?;
        debug!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "Output region"
        );
        self.output_region = Some(region);
        Ok(region)
    }

    /// Render every result feature of `bins` onto the output region.
    pub fn render(&mut self, bins: &TemporalBinList) -> Result<&RenderedRaster> {
        self.advance(ReprojectorState::Render)?;
        let result = match self.output_region {
            Some(region) => self.render_region(region, bins),
            None => Err(BinningError::invalid_state("output region was not computed")),
        };
        let raster = self.track(result)?;
        Ok(self.raster.insert(raster))
    }

    /// Write the rendered raster with `metadata`.
    pub fn write(
        &mut self,
        formatter: &Formatter,
        metadata: &ProductMetadata,
    ) -> Result<WrittenProduct> {
        self.advance(ReprojectorState::Write)?;
        let result = match &self.raster {
            Some(raster) => formatter.write(raster, metadata),
            None => Err(BinningError::invalid_state("nothing was rendered")),
        };
        let written = self.track(result)?;
        self.advance(ReprojectorState::Done)?;
        Ok(written)
    }

    /// Run all stages, annotating failures with the stage they occurred in.
    pub fn run(
        &mut self,
        bins: &TemporalBinList,
        formatter: &Formatter,
        metadata: &ProductMetadata,
    ) -> Result<WrittenProduct> {
        self.compute_output_region()
            .map_err(|e| e.at_stage(Stage::Rendering, "output region"))?;
        self.render(bins)
            .map_err(|e| e.at_stage(Stage::Rendering, "raster"))?;
        let output = formatter.config().output_file.display().to_string();
        self.write(formatter, metadata)
            .map_err(|e| e.at_stage(Stage::Writing, output))
    }

    fn render_region(&self, region: RasterRegion, bins: &TemporalBinList) -> Result<RenderedRaster> {
        let manager = bins.manager();
        let band_names = manager.result_feature_names().to_vec();
        let fill_value = manager.fill_value() as f32;

        let num_tiles = region.height.div_ceil(self.tile_height);
        let tiles = (0..num_tiles)
            .into_par_iter()
            .map(|t| {
                self.cancel.check()?;
                let y0 = t * self.tile_height;
                let y1 = (y0 + self.tile_height).min(region.height);
                self.render_tile(&region, bins, y0..y1, band_names.len(), fill_value)
            })
            .collect::<Result<Vec<Tile>>>()?;
        self.cancel.check()?;

        let num_pixels = region.num_pixels();
        let mut raster = RenderedRaster {
            region,
            bands: vec![Vec::with_capacity(num_pixels); band_names.len()],
            band_names,
            num_obs: Vec::with_capacity(num_pixels),
            num_passes: Vec::with_capacity(num_pixels),
            fill_value,
            stats: RenderStats::default(),
        };
        for tile in tiles {
            for (band, data) in raster.bands.iter_mut().zip(tile.bands) {
                band.extend(data);
            }
            raster.num_obs.extend(tile.num_obs);
            raster.num_passes.extend(tile.num_passes);
            raster.stats.merge(&tile.stats);
        }

        info!(
            width = region.width,
            height = region.height,
            tiles = num_tiles,
            with_data = raster.stats.pixels_with_data,
            missing = raster.stats.pixels_missing,
            clamped = raster.stats.clamped_pixels,
            "Rendered raster"
        );
        Ok(raster)
    }

    fn render_tile(
        &self,
        region: &RasterRegion,
        bins: &TemporalBinList,
        rows: std::ops::Range<usize>,
        num_bands: usize,
        fill_value: f32,
    ) -> Result<Tile> {
        let manager = bins.manager();
        let len = rows.len() * region.width;
        let mut tile = Tile {
            bands: vec![vec![fill_value; len]; num_bands],
            num_obs: vec![-1; len],
            num_passes: vec![-1; len],
            stats: RenderStats::default(),
        };

        let mut i = 0;
        for row in rows {
            for col in 0..region.width {
                let bin = self.pixel_cell(region, col, row).and_then(|cell| bins.find(cell));
                if let Some(bin) = bin {
                    let (values, status) = manager.compute_result(bin);
                    if status == OutputStatus::Clamped {
                        if self.strict_numeric {
                            return Err(BinningError::NumericAnomaly {
                                cell: bin.index,
                                message: "negative variance".to_string(),
                            });
                        }
                        tile.stats.clamped_pixels += 1;
                    }
                    for (band, v) in tile.bands.iter_mut().zip(values) {
                        band[i] = v as f32;
                    }
                    tile.num_obs[i] = bin.num_obs.min(i32::MAX as u64) as i32;
                    tile.num_passes[i] = bin.num_passes.min(i32::MAX as u32) as i32;
                    tile.stats.pixels_with_data += 1;
                } else {
                    tile.stats.pixels_missing += 1;
                }
                i += 1;
            }
        }
        Ok(tile)
    }

    /// Cell shown by window pixel `(col, row)`.
    fn pixel_cell(&self, region: &RasterRegion, col: usize, row: usize) -> Option<u64> {
        if self.grid.is_rectangular() {
            let y = region.y + row;
            let x = region.x + col;
            Some(self.grid.first_cell_index(y) + x as u64)
        } else {
            let (lat, lon) = region.pixel_center(col, row);
            self.grid.cell_index(lat, lon).ok()
        }
    }
}
