//! Integration tests for cell addressing across grid layouts.

use std::collections::BTreeMap;

use planetary_grid::{
    create_grid, BoundingBox, GridKind, GridSpec, PlanetaryGrid, PlateCarreeGrid, Region, SeaGrid,
};

fn grids() -> Vec<Box<dyn PlanetaryGrid>> {
    vec![
        Box::new(SeaGrid::new(36).unwrap()),
        Box::new(SeaGrid::new(2160).unwrap()),
        Box::new(PlateCarreeGrid::new(36).unwrap()),
        Box::new(SeaGrid::with_column_counts(vec![2, 4, 4, 2]).unwrap()),
    ]
}

#[test]
fn test_every_cell_center_maps_back_to_itself() {
    for grid in grids() {
        if grid.num_cells() > 100_000 {
            continue;
        }
        for cell in 0..grid.num_cells() {
            let (lat, lon) = grid.center_lat_lon(cell).unwrap();
            assert_eq!(
                grid.cell_index(lat, lon).unwrap(),
                cell,
                "{:?}: center ({}, {}) of cell {} maps elsewhere",
                grid.kind(),
                lat,
                lon,
                cell
            );
        }
    }
}

#[test]
fn test_coordinate_roundtrip_over_domain() {
    for grid in grids() {
        let mut lat = -90.0;
        while lat <= 90.0 {
            let mut lon = -180.0;
            while lon <= 180.0 {
                let cell = grid.cell_index(lat, lon).unwrap();
                assert!(cell < grid.num_cells());
                let (clat, clon) = grid.center_lat_lon(cell).unwrap();
                assert_eq!(grid.cell_index(clat, clon).unwrap(), cell);

                let fp = grid.cell_footprint(cell).unwrap();
                let tol = 1e-9;
                assert!(
                    lon >= fp.min_lon - tol
                        && lon <= fp.max_lon + tol
                        && lat >= fp.min_lat - tol
                        && lat <= fp.max_lat + tol,
                    "({}, {}) not in {:?}",
                    lat,
                    lon,
                    fp
                );
                lon += 1.3;
            }
            lat += 0.7;
        }
    }
}

#[test]
fn test_four_row_grid_histogram() {
    // Rows of 45 degrees with 2, 4, 4 and 2 cells.
    let grid = SeaGrid::with_column_counts(vec![2, 4, 4, 2]).unwrap();
    assert_eq!(grid.num_cells(), 12);

    let mut histogram: BTreeMap<u64, usize> = BTreeMap::new();
    for i in 0..10 {
        for j in 0..10 {
            let lat = -81.0 + 18.0 * i as f64;
            let lon = -162.0 + 36.0 * j as f64;
            *histogram.entry(grid.cell_index(lat, lon).unwrap()).or_default() += 1;
        }
    }

    let expected: BTreeMap<u64, usize> = [
        (0, 10),
        (1, 10),
        (2, 6),
        (3, 9),
        (4, 6),
        (5, 9),
        (6, 4),
        (7, 6),
        (8, 4),
        (9, 6),
        (10, 15),
        (11, 15),
    ]
    .into_iter()
    .collect();
    assert_eq!(histogram, expected);
    assert_eq!(histogram.values().sum::<usize>(), 100);
}

#[test]
fn test_single_cell_region_is_covered() {
    let grid = create_grid(&GridSpec::new(GridKind::Sea, 18)).unwrap();
    for (lat, lon) in [(30.0, 40.0), (-85.0, 170.0), (0.5, -179.5), (89.0, 0.0)] {
        let cell = grid.cell_index(lat, lon).unwrap();
        let fp = grid.cell_footprint(cell).unwrap();

        // Exactly the footprint: the cell plus possibly touching neighbours.
        let exact = Region::from_bbox(&fp).unwrap();
        let cells = grid.cell_indexes(&exact);
        assert!(!cells.is_empty());
        assert!(cells.contains(&cell));

        // Strictly inside the footprint: only the cell itself.
        let eps = 1e-6;
        let inner = Region::from_bbox(&BoundingBox::new(
            fp.min_lon + eps,
            fp.min_lat + eps,
            fp.max_lon - eps,
            fp.max_lat - eps,
        ))
        .unwrap();
        let cells = grid.cell_indexes(&inner);
        assert_eq!(cells.into_iter().collect::<Vec<_>>(), vec![cell]);
    }
}

#[test]
fn test_polygon_region_cells_intersect_polygon() {
    let grid = PlateCarreeGrid::new(18).unwrap();
    let region = Region::from_wkt("POLYGON((0 0, 40 0, 0 40, 0 0))").unwrap();
    let cells = grid.cell_indexes(&region);

    assert!(!cells.is_empty());
    for &cell in &cells {
        let fp = grid.cell_footprint(cell).unwrap();
        assert!(region.intersects_box(&fp));
    }
    // The cell at (35N, 35E) is inside the bbox but not the triangle.
    let outside = grid.cell_index(35.0, 35.0).unwrap();
    assert!(!cells.contains(&outside));
}

#[test]
fn test_region_outside_globe_yields_no_cells() {
    let grid = SeaGrid::new(18).unwrap();
    let region = Region::from_bbox(&BoundingBox::new(200.0, 0.0, 210.0, 10.0)).unwrap();
    assert!(grid.cell_indexes(&region).is_empty());
}
