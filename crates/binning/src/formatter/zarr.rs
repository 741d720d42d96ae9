//! Zarr V3 product writer.
//!
//! Layout of a product store:
//!
//! ```text
//! out.zarr/
//!   zarr.json            root group: metadata properties, crs, geotransform, bbox
//!   <band>/              float32 [height, width], fill value = product fill
//!   <band>_L<n>/         overview level n (2^n downsampled)
//!   num_obs/             int32, -1 where the cell has no data
//!   num_passes/          int32, -1 where the cell has no data
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::error::{BinningError, Result};
use crate::formatter::FormatterConfig;
use crate::metadata::ProductMetadata;
use crate::raster::{RasterPyramid, RenderedRaster};

struct ArrayTarget<'a> {
    store: &'a Arc<FilesystemStore>,
    root: &'a Path,
    chunk_size: usize,
}

impl ArrayTarget<'_> {
    fn fault(&self, e: impl ToString) -> BinningError {
        BinningError::output_fault(self.root, e.to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn write<T: Element>(
        &self,
        name: &str,
        data: &[T],
        width: usize,
        height: usize,
        data_type: DataType,
        fill_value: FillValue,
        attrs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let chunk_h = self.chunk_size.min(height).max(1) as u64;
        let chunk_w = self.chunk_size.min(width).max(1) as u64;
        let chunk_grid: zarrs::array::ChunkGrid = vec![chunk_h, chunk_w]
            .try_into()
            .map_err(|e| self.fault(format!("{:?}", e)))?;

        let array = ArrayBuilder::new(
            vec![height as u64, width as u64],
            data_type,
            chunk_grid,
            fill_value,
        )
        .attributes(attrs)
        .build(self.store.clone(), &format!("/{}", name))
        .map_err(|e| self.fault(e))?;

        array.store_metadata().map_err(|e| self.fault(e))?;

        let subset =
            ArraySubset::new_with_start_shape(vec![0, 0], vec![height as u64, width as u64])
                .map_err(|e| self.fault(e))?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(|e| self.fault(e))?;

        debug!(array = name, width, height, "Wrote Zarr array");
        Ok(())
    }
}

fn band_attrs(
    name: &str,
    extra: &[(&str, serde_json::Value)],
) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("long_name".to_string(), serde_json::json!(name));
    attrs.insert(
        "_ARRAY_DIMENSIONS".to_string(),
        serde_json::json!(["lat", "lon"]),
    );
    for (k, v) in extra {
        attrs.insert(k.to_string(), v.clone());
    }
    attrs
}

fn fill_json(fill: f32) -> serde_json::Value {
    if fill.is_nan() {
        serde_json::Value::String("NaN".to_string())
    } else {
        serde_json::json!(fill)
    }
}

/// Write `raster` as a Zarr V3 store at `path`.
pub(super) fn write_product(
    path: &Path,
    raster: &RenderedRaster,
    metadata: &ProductMetadata,
    config: &FormatterConfig,
) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| BinningError::output_fault(path, e.to_string()))?;
    let store = Arc::new(
        FilesystemStore::new(path).map_err(|e| BinningError::output_fault(path, e.to_string()))?,
    );
    let target = ArrayTarget {
        store: &store,
        root: path,
        chunk_size: config.chunk_size,
    };

    let bands: Vec<usize> = if config.band_configurations.is_empty() {
        (0..raster.band_names.len()).collect()
    } else {
        config
            .band_configurations
            .iter()
            .filter_map(|b| raster.band_index(&b.name))
            .collect()
    };
    let band_names: Vec<&str> = bands.iter().map(|&i| raster.band_names[i].as_str()).collect();

    let bbox = raster.region.bbox();
    let mut attrs = metadata.to_json();
    attrs.insert("crs".to_string(), serde_json::json!("EPSG:4326"));
    attrs.insert(
        "geotransform".to_string(),
        serde_json::json!(raster.region.geotransform()),
    );
    attrs.insert(
        "bbox".to_string(),
        serde_json::json!([bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat]),
    );
    attrs.insert("width".to_string(), serde_json::json!(raster.width()));
    attrs.insert("height".to_string(), serde_json::json!(raster.height()));
    attrs.insert("bands".to_string(), serde_json::json!(band_names));
    attrs.insert("fill_value".to_string(), fill_json(raster.fill_value));
    attrs.insert(
        "overview_levels".to_string(),
        serde_json::json!(config.overview_levels),
    );

    let group = GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .map_err(|e| target.fault(e))?;
    group.store_metadata().map_err(|e| target.fault(e))?;

    let (width, height) = (raster.width(), raster.height());
    for &i in &bands {
        let name = raster.band_names[i].as_str();
        target.write(
            name,
            &raster.bands[i],
            width,
            height,
            DataType::Float32,
            FillValue::from(raster.fill_value),
            band_attrs(name, &[]),
        )?;

        if config.overview_levels > 0 {
            let pyramid =
                RasterPyramid::new(raster.bands[i].clone(), width, height, raster.fill_value);
            for n in 1..=config.overview_levels {
                let level = match pyramid.level(n) {
                    Some(level) => level,
                    None => break,
                };
                target.write(
                    &format!("{}_L{}", name, n),
                    &level.data,
                    level.width,
                    level.height,
                    DataType::Float32,
                    FillValue::from(raster.fill_value),
                    band_attrs(name, &[("overview_level", serde_json::json!(n))]),
                )?;
            }
        }
    }

    for (name, data) in [("num_obs", &raster.num_obs), ("num_passes", &raster.num_passes)] {
        target.write(
            name,
            data,
            width,
            height,
            DataType::Int32,
            FillValue::from(-1i32),
            band_attrs(name, &[]),
        )?;
    }

    Ok(())
}
