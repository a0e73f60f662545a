//! Tests for the interpolation engine.

use aqi_common::{BoundingBox, Grid, GridBuilder, LongitudeStep, Observation};
use interpolation::{DistanceMetric, InterpolationEngine, Partitioning};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use test_utils::{
    assert_approx_eq, assert_fields_approx_eq, fixtures::bbox, lattice_observations,
    random_observations,
};

fn athens_bbox() -> BoundingBox {
    let (w, s, e, n) = bbox::ATHENS_CENTER;
    BoundingBox::new(w, s, e, n)
}

fn athens_grid() -> Grid {
    GridBuilder::new(athens_bbox(), 0.01).build().unwrap()
}

fn planar() -> InterpolationEngine {
    InterpolationEngine::new(10.0, DistanceMetric::Planar)
}

// ============================================================================
// Single observation
// ============================================================================

#[test]
fn test_single_observation_in_athens() {
    let grid = athens_grid();
    let obs = vec![Observation::new(37.85, 23.75, 90.0, 0.05)];
    let field = planar().interpolate(&grid, &obs);

    assert_eq!(field.width(), 10);
    assert_eq!(field.height(), 10);

    // cell at the observation takes its value
    let (row, col) = grid.nearest_cell(37.85, 23.75).unwrap();
    assert_approx_eq!(field.get(row, col).unwrap(), 90.0, 1e-6);

    // corner cell is ~0.071 degrees away, beyond the radius
    assert_eq!(field.get(0, 0), Some(10.0));

    // 0.03 degrees due east: weight 0.4
    assert_approx_eq!(field.get(5, 8).unwrap(), 10.0 + 0.4 * 80.0, 1e-6);
}

#[test]
fn test_distance_equal_to_radius_contributes_nothing() {
    let grid = GridBuilder::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.25)
        .build()
        .unwrap();
    // cell (0, 2) is exactly 0.5 east of the observation
    let obs = vec![Observation::new(0.0, 0.0, 100.0, 0.5)];
    let field = planar().interpolate(&grid, &obs);
    assert_eq!(field.get(0, 2), Some(10.0));
    assert_approx_eq!(field.get(0, 1).unwrap(), 10.0 + 0.5 * 90.0, 1e-12);
}

#[test]
fn test_value_below_base_pulls_field_down() {
    let grid = athens_grid();
    let obs = vec![Observation::new(37.85, 23.75, 0.0, 0.05)];
    let field = planar().interpolate(&grid, &obs);
    let stats = field.stats().unwrap();
    assert!(stats.min < 10.0);
    assert_eq!(stats.max, 10.0);
}

#[test]
fn test_overlapping_observations_add_up() {
    let grid = GridBuilder::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.5)
        .build()
        .unwrap();
    let obs = vec![
        Observation::new(0.0, 0.0, 30.0, 2.0),
        Observation::new(0.0, 0.0, 50.0, 2.0),
    ];
    let field = planar().interpolate(&grid, &obs);
    // both at full strength on the cell under them
    assert_approx_eq!(field.get(0, 0).unwrap(), 10.0 + 20.0 + 40.0, 1e-12);
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_no_observations_gives_uniform_base() {
    let grid = athens_grid();
    let field = planar().interpolate(&grid, &[]);
    assert_eq!(field.len(), 100);
    assert!(field.values().iter().all(|&v| v == 10.0));
}

#[test]
fn test_empty_grid_gives_empty_field() {
    let (w, s, e, n) = bbox::POINT;
    let grid = GridBuilder::new(BoundingBox::new(w, s, e, n), 0.01)
        .build()
        .unwrap();
    let obs = vec![Observation::new(37.85, 23.75, 90.0, 0.05)];
    let field = planar().interpolate(&grid, &obs);
    assert!(field.is_empty());
}

#[test]
fn test_observation_outside_grid_still_reaches_in() {
    let grid = athens_grid();
    // 0.02 degrees north of the northernmost row at 37.89
    let obs = vec![Observation::new(37.91, 23.75, 90.0, 0.05)];
    let field = planar().interpolate(&grid, &obs);
    assert_approx_eq!(field.get(9, 5).unwrap(), 10.0 + 0.6 * 80.0, 1e-6);
}

// ============================================================================
// Order and partition independence
// ============================================================================

#[test]
fn test_shuffled_input_gives_same_field() {
    let grid = athens_grid();
    let mut obs = random_observations(200, &athens_bbox(), 0.03, 11);
    let before = planar().interpolate(&grid, &obs);

    obs.shuffle(&mut StdRng::seed_from_u64(5));
    let after = planar().interpolate(&grid, &obs);

    assert_fields_approx_eq!(before.values(), after.values(), 1e-9);
}

#[test]
fn test_rows_and_batches_agree() {
    let grid = GridBuilder::new(athens_bbox(), 0.001).build().unwrap();
    let obs = random_observations(300, &athens_bbox(), 0.01, 3);

    let rows = planar().interpolate(&grid, &obs);
    for batch_size in [1, 7, 64, 1000] {
        let batches = planar()
            .with_partitioning(Partitioning::ObservationBatches { batch_size })
            .interpolate(&grid, &obs);
        assert_fields_approx_eq!(rows.values(), batches.values(), 1e-9);
    }
}

#[test]
fn test_windowed_sum_matches_brute_force() {
    let grid = athens_grid();
    let obs = random_observations(50, &athens_bbox(), 0.04, 21);
    let field = planar().interpolate(&grid, &obs);

    for cell in grid.cells() {
        let expected = 10.0
            + obs
                .iter()
                .map(|o| {
                    let d = (cell.latitude - o.latitude).hypot(cell.longitude - o.longitude);
                    interpolation::radial_decay(d, o.radius) * (o.value - 10.0)
                })
                .sum::<f64>();
        assert_approx_eq!(field.get(cell.row, cell.col).unwrap(), expected, 1e-9);
    }
}

// ============================================================================
// Haversine
// ============================================================================

#[test]
fn test_haversine_radius_in_meters() {
    let grid = GridBuilder::new(athens_bbox(), 0.01)
        .longitude_step(LongitudeStep::Compensated)
        .build()
        .unwrap();
    let engine = InterpolationEngine::new(10.0, DistanceMetric::Haversine);

    // one 2 km observation on a cell center
    let cell = grid.cell(5, 3).unwrap();
    let obs = vec![Observation::new(cell.latitude, cell.longitude, 110.0, 2_000.0)];
    let field = engine.interpolate(&grid, &obs);

    assert_approx_eq!(field.get(5, 3).unwrap(), 110.0, 1e-9);
    // one row north is ~1.11 km away
    let d = DistanceMetric::Haversine.distance(
        grid.latitudes()[6],
        cell.longitude,
        cell.latitude,
        cell.longitude,
    );
    assert!(d > 1_000.0 && d < 1_200.0);
    assert_approx_eq!(field.get(6, 3).unwrap(), 10.0 + (1.0 - d / 2_000.0) * 100.0, 1e-9);
    // three rows north is ~3.3 km away
    assert_eq!(field.get(8, 3), Some(10.0));
}

#[test]
fn test_haversine_batches_match_rows() {
    let grid = GridBuilder::new(athens_bbox(), 0.002)
        .longitude_step(LongitudeStep::Compensated)
        .build()
        .unwrap();
    let obs: Vec<Observation> = lattice_observations(&athens_bbox(), 4, 4, 120.0, 1_500.0);
    let engine = InterpolationEngine::new(10.0, DistanceMetric::Haversine);

    let rows = engine.interpolate(&grid, &obs);
    let batches = engine
        .clone()
        .with_partitioning(Partitioning::ObservationBatches { batch_size: 3 })
        .interpolate(&grid, &obs);
    assert_fields_approx_eq!(rows.values(), batches.values(), 1e-9);
}

#[test]
fn test_partitioning_deserializes() {
    let p: Partitioning =
        serde_json::from_str(r#"{"strategy":"observation_batches","batch_size":32}"#).unwrap();
    assert_eq!(p, Partitioning::ObservationBatches { batch_size: 32 });
    let m: DistanceMetric = serde_json::from_str(r#""haversine""#).unwrap();
    assert_eq!(m, DistanceMetric::Haversine);
}
