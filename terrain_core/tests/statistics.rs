use terrain_core::{TerrainModel, TerrainPoint};

fn pyramid() -> TerrainModel {
    let mut model = TerrainModel::new("pyramid");
    model
        .add_points([
            TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap(),
            TerrainPoint::new(2, 2.0, 0.0, 0.0).unwrap(),
            TerrainPoint::new(3, 2.0, 2.0, 0.0).unwrap(),
            TerrainPoint::new(4, 0.0, 2.0, 0.0).unwrap(),
            TerrainPoint::new(5, 1.0, 1.0, 1.0).unwrap(),
        ])
        .unwrap();
    model
}

#[test]
fn pyramid_measurements() {
    let stats = pyramid().statistics(None).unwrap();
    assert_eq!(stats.point_count, 5);
    assert_eq!(stats.triangle_count, 4);
    assert!((stats.projected_area - 4.0).abs() < 1e-12);
    // four faces of base 2 and slant height sqrt(2)
    assert!((stats.surface_area - 4.0 * 2f64.sqrt()).abs() < 1e-9);
    assert!((stats.mean_slope_deg - 45.0).abs() < 1e-9);
    assert!((stats.max_slope_deg - 45.0).abs() < 1e-9);
    // prisms: each face contributes area 1 x mean height 1/3
    assert!((stats.volume - 4.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.base_elevation, 0.0);
    assert!((stats.slopes[&5] - 45.0).abs() < 1e-9);
    assert!((stats.point_density - 1.25).abs() < 1e-12);
    assert_eq!(stats.bounds.max_z, 1.0);
}

#[test]
fn base_elevation_shifts_volume() {
    let stats = pyramid().statistics(Some(-1.0)).unwrap();
    assert!((stats.volume - (4.0 / 3.0 + 4.0)).abs() < 1e-9);
}

#[test]
fn statistics_serialize_to_json() {
    let stats = pyramid().statistics(None).unwrap();
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["triangle_count"], 4);
    assert!(json["slopes"]["5"].is_number());
}

#[test]
fn statistics_follow_mutations() {
    let mut model = pyramid();
    let before = model.statistics(None).unwrap();
    model.remove_point(5).unwrap();
    let after = model.statistics(None).unwrap();
    assert_eq!(before.triangle_count, 4);
    assert_eq!(after.triangle_count, 2);
    assert_eq!(after.max_slope_deg, 0.0);
}
