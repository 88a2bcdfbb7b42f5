use rand::{Rng, SeedableRng};
use terrain_core::{Point3, TerrainModel, TerrainPoint};

fn random_model(seed: u64, n: u64) -> TerrainModel {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut model = TerrainModel::new("cloud");
    model
        .add_points((0..n).map(|id| {
            TerrainPoint::new(
                id,
                rng.random_range(0.0..500.0),
                rng.random_range(0.0..500.0),
                rng.random_range(0.0..50.0),
            )
            .unwrap()
        }))
        .unwrap();
    model
}

fn brute_nearest(model: &TerrainModel, q: Point3) -> u64 {
    let target = TerrainPoint::new(u64::MAX, q.x, q.y, q.z).unwrap();
    model
        .store()
        .iter()
        .min_by(|a, b| a.distance_to(&target).total_cmp(&b.distance_to(&target)))
        .map(|p| p.id())
        .unwrap()
}

#[test]
fn nearest_agrees_with_linear_scan() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    for n in [1, 10, 100, 1000] {
        let model = random_model(n, n);
        for _ in 0..100 {
            let q = Point3::new(
                rng.random_range(-50.0..550.0),
                rng.random_range(-50.0..550.0),
                rng.random_range(-10.0..60.0),
            );
            let found = model.nearest(q, 1).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].point.id(), brute_nearest(&model, q));
        }
    }
}

#[test]
fn radius_search_agrees_with_linear_scan() {
    let model = random_model(4, 600);
    let center = Point3::new(250.0, 250.0, 25.0);
    let target = TerrainPoint::new(u64::MAX, center.x, center.y, center.z).unwrap();
    let found = model.within_radius(center, 60.0).unwrap();
    let mut expected: Vec<u64> = model
        .store()
        .iter()
        .filter(|p| p.distance_to(&target) <= 60.0)
        .map(|p| p.id())
        .collect();
    let mut got: Vec<u64> = found.iter().map(|m| m.point.id()).collect();
    assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
    expected.sort_unstable();
    got.sort_unstable();
    assert_eq!(got, expected);
}

#[test]
fn queries_see_removals_and_additions() {
    let mut model = random_model(12, 300);
    let q = Point3::new(100.0, 100.0, 10.0);
    let first = model.nearest(q, 1).unwrap()[0].point.id();
    model.remove_point(first).unwrap();
    let second = model.nearest(q, 1).unwrap()[0].point.id();
    assert_ne!(first, second);
    assert_eq!(second, brute_nearest(&model, q));
    model
        .add_point(TerrainPoint::new(5000, 100.0, 100.0, 10.0).unwrap())
        .unwrap();
    let third = model.nearest(q, 1).unwrap();
    assert_eq!(third[0].point.id(), 5000);
    assert_eq!(third[0].distance, 0.0);
}

#[test]
fn point_to_point_measurements() {
    let mut model: TerrainModel = TerrainModel::new("pair");
    model
        .add_points([
            TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap(),
            TerrainPoint::new(2, 3.0, 4.0, 12.0).unwrap(),
            TerrainPoint::new(3, 0.0, 0.0, 5.0).unwrap(),
        ])
        .unwrap();
    let store = model.store();
    assert!((store.distance_between(1, 2).unwrap() - 13.0).abs() < 1e-12);
    assert!((store.slope_between(1, 2).unwrap() - 240.0).abs() < 1e-9);
    assert!(store.slope_between(1, 3).unwrap().is_infinite());
    let bearing = store.bearing_between(1, 2).unwrap();
    assert!((bearing - 36.869_897_645_844_02).abs() < 1e-9);
    assert!(store.distance_between(1, 42).is_err());
}
