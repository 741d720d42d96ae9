//! Cell table output: one CSV row per non-empty temporal bin.

use std::path::Path;

use planetary_grid::PlanetaryGrid;
use tracing::info;

use crate::error::{BinningError, Result};
use crate::temporal::TemporalBinList;

const FIXED_COLUMNS: [&str; 6] = [
    "cell_index",
    "row",
    "center_lat",
    "center_lon",
    "num_obs",
    "num_passes",
];

/// Write `bins` as CSV to `path`, in ascending cell order.
pub fn write_bin_table(path: &Path, grid: &dyn PlanetaryGrid, bins: &TemporalBinList) -> Result<()> {
    let fault = |e: &dyn std::fmt::Display| BinningError::output_fault(path, e.to_string());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| fault(&e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| fault(&e))?;

    let manager = bins.manager();
    let header = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(manager.result_feature_names().iter().map(String::as_str));
    writer.write_record(header).map_err(|e| fault(&e))?;

    let mut record = Vec::with_capacity(FIXED_COLUMNS.len() + manager.result_feature_names().len());
    for bin in bins.iter() {
        let (lat, lon) = grid.center_lat_lon(bin.index)?;
        let (values, _) = manager.compute_result(bin);

        record.clear();
        record.push(bin.index.to_string());
        record.push(grid.row_index(bin.index).to_string());
        record.push(format!("{:.6}", lat));
        record.push(format!("{:.6}", lon));
        record.push(bin.num_obs.to_string());
        record.push(bin.num_passes.to_string());
        record.extend(values.iter().map(f64::to_string));
        writer.write_record(&record).map_err(|e| fault(&e))?;
    }
    writer.flush().map_err(|e| fault(&e))?;

    info!(path = %path.display(), rows = bins.len(), "Wrote bin table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::{AggregatorConfig, AggregatorRegistry};
    use crate::bin_manager::BinManager;
    use crate::observation::{Observation, VariableContext};
    use planetary_grid::SeaGrid;
    use std::sync::Arc;

    #[test]
    fn test_bin_table_rows() {
        let grid = SeaGrid::new(18).unwrap();
        let manager = Arc::new(
            BinManager::from_config(
                &AggregatorRegistry::default(),
                VariableContext::new(["chl"]),
                &[AggregatorConfig::new("AVG", "chl")],
                None,
                f64::NAN,
            )
            .unwrap(),
        );
        let mut bin = manager.create_temporal_bin(grid.cell_index(0.5, 0.5).unwrap());
        bin.num_obs = 2;
        bin.num_passes = 1;
        bin.features = vec![6.0, 20.0, 2.0, 2.0];
        let cell = bin.index;
        let bins = TemporalBinList::new(manager, vec![bin]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t-bins.csv");
        write_bin_table(&path, &grid, &bins).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("cell_index,row,center_lat,center_lon,num_obs,num_passes,chl_mean"));
        assert!(lines[1].starts_with(&format!("{},", cell)));
        assert!(lines[1].contains(",2,1,3,"));
    }

    #[test]
    fn test_bin_table_quotes_feature_names() {
        let grid = SeaGrid::new(18).unwrap();
        let manager = Arc::new(
            BinManager::from_config(
                &AggregatorRegistry::default(),
                VariableContext::new(["chl"]),
                &[AggregatorConfig::new("SUM", "chl").with_target("chl,a")],
                None,
                f64::NAN,
            )
            .unwrap(),
        );
        let cell = grid.cell_index(5.0, 15.0).unwrap();
        let mut spatial = manager.create_spatial_bin(cell);
        manager.aggregate_spatial_bin(&Observation::new(5.0, 15.0, vec![1.5]), &mut spatial);
        manager.complete_spatial_bin(&mut spatial);
        let mut temporal = manager.create_temporal_bin(cell);
        manager.aggregate_temporal_bin(&spatial, &mut temporal);
        manager.complete_temporal_bin(&mut temporal);
        let bins = TemporalBinList::new(manager, vec![temporal]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q-bins.csv");
        write_bin_table(&path, &grid, &bins).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(header.len(), 7);
        assert_eq!(&header[6], "chl,a_sum");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), header.len());
        assert_eq!(&rows[0][0], cell.to_string());
        assert_eq!(rows[0][6].parse::<f64>().unwrap(), 1.5);
    }
}
