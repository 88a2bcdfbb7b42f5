use std::sync::Arc;
use std::thread;

use rand::{Rng, SeedableRng};
use terrain_core::{
    BreaklineStrategy, InterpolationMethod, TerrainConfig, TerrainError, TerrainModel,
    TerrainPoint, TriangulationState,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Random points away from the polyline y = 50, plus the polyline itself
/// (ids 1000..).
fn site(strategy: BreaklineStrategy, seed: u64) -> TerrainModel {
    let config = TerrainConfig {
        breakline_strategy: strategy,
        ..TerrainConfig::default()
    };
    let mut model = TerrainModel::with_config("site", config);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut id = 0;
    while id < 300 {
        let x = rng.random_range(0.0..100.0);
        let y: f64 = rng.random_range(0.0..100.0);
        if (y - 50.0).abs() < 8.0 {
            continue;
        }
        let z = (y - 50.0).abs() * 0.1;
        model
            .add_point(TerrainPoint::new(id, x, y, z).unwrap())
            .unwrap();
        id += 1;
    }
    let crest = [(0.0, 50.0), (30.0, 54.0), (55.0, 47.0), (80.0, 52.0), (100.0, 50.0)];
    for (i, (x, y)) in crest.iter().enumerate() {
        model
            .add_point(TerrainPoint::new(1000 + i as u64, *x, *y, 20.0).unwrap())
            .unwrap();
    }
    model
        .add_break_line_path(&[1000, 1001, 1002, 1003, 1004])
        .unwrap();
    model
}

#[test]
fn both_strategies_respect_the_crest() {
    init();
    for strategy in [BreaklineStrategy::Constrained, BreaklineStrategy::Refine] {
        for seed in [1, 2, 3] {
            let model = site(strategy, seed);
            let tin = model.triangulation().unwrap();
            assert!(tin.respects_constraints(), "{strategy:?} seed {seed}");
            assert_eq!(model.triangulation_state(), TriangulationState::Built);
            for v in &tin.vertices()[tin.source_count()..] {
                assert!((v.z - 20.0).abs() < 1e-9);
            }
            let on_crest = model
                .interpolate(15.0, 52.0, InterpolationMethod::Barycentric)
                .unwrap();
            assert!((on_crest - 20.0).abs() < 1e-9);
        }
    }
}

#[test]
fn crossing_break_lines_are_unsatisfiable() {
    init();
    let config = TerrainConfig {
        breakline_strategy: BreaklineStrategy::Refine,
        max_refinement_passes: 8,
        ..TerrainConfig::default()
    };
    let mut model: TerrainModel = TerrainModel::with_config("cross", config);
    model
        .add_points([
            TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap(),
            TerrainPoint::new(2, 3.0, 1.0, 0.0).unwrap(),
            TerrainPoint::new(3, 1.0, -1.0, 0.0).unwrap(),
            TerrainPoint::new(4, 1.3, 2.0, 0.0).unwrap(),
            TerrainPoint::new(5, -1.0, 3.0, 0.0).unwrap(),
            TerrainPoint::new(6, 4.0, -2.0, 0.0).unwrap(),
        ])
        .unwrap();
    model.add_break_line(1, 2).unwrap();
    model.add_break_line(3, 4).unwrap();
    assert!(matches!(
        model.triangulation(),
        Err(TerrainError::ConstraintUnsatisfiable(_))
    ));
    assert_eq!(model.triangulation_state(), TriangulationState::Unbuilt);
    // IDW does not need the mesh
    assert!(model.interpolate(1.0, 0.5, InterpolationMethod::Idw).is_ok());
    assert!(model.remove_break_line(3, 4));
    assert!(model.triangulation().is_ok());
}

/// `n` x `m` integer grid on the plane z = x + y, id = j * n + i.
fn grid(strategy: BreaklineStrategy, n: u64, m: u64) -> TerrainModel {
    let config = TerrainConfig {
        breakline_strategy: strategy,
        ..TerrainConfig::default()
    };
    let mut model = TerrainModel::with_config("grid", config);
    let points = (0..n * m).map(|id| {
        let (x, y) = ((id % n) as f64, (id / n) as f64);
        TerrainPoint::new(id, x, y, x + y).unwrap()
    });
    model.add_points(points).unwrap();
    model
}

#[test]
fn break_line_through_survey_grid_vertices() {
    init();
    for strategy in [BreaklineStrategy::Constrained, BreaklineStrategy::Refine] {
        let mut model = grid(strategy, 5, 5);
        // (0,0)-(4,2) passes through (2,1)
        model.add_break_line(0, 14).unwrap();
        let tin = model.triangulation().unwrap();
        assert!(tin.respects_constraints(), "{strategy:?}");
        let z = model
            .interpolate(1.0, 0.5, InterpolationMethod::Barycentric)
            .unwrap();
        assert!((z - 1.5).abs() < 1e-9);
        let z = model
            .interpolate(2.0, 1.0, InterpolationMethod::Barycentric)
            .unwrap();
        assert!((z - 3.0).abs() < 1e-9);
    }
}

#[test]
fn stacked_points_on_a_break_line() {
    init();
    for strategy in [BreaklineStrategy::Constrained, BreaklineStrategy::Refine] {
        let config = TerrainConfig {
            breakline_strategy: strategy,
            ..TerrainConfig::default()
        };
        let mut model: TerrainModel = TerrainModel::with_config("stacked", config);
        model
            .add_points([
                TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap(),
                TerrainPoint::new(2, 4.0, 0.0, 0.0).unwrap(),
                TerrainPoint::new(3, 4.0, 4.0, 4.0).unwrap(),
                TerrainPoint::new(4, 0.0, 4.0, 0.0).unwrap(),
                TerrainPoint::new(5, 2.0, 2.0, 2.0).unwrap(),
                TerrainPoint::new(6, 2.0, 2.0, 2.5).unwrap(),
            ])
            .unwrap();
        model.add_break_line(1, 3).unwrap();
        let tin = model.triangulation().unwrap();
        assert!(tin.respects_constraints(), "{strategy:?}");
        let z = model
            .interpolate(2.0, 2.0, InterpolationMethod::Barycentric)
            .unwrap();
        assert!((z - 2.0).abs() < 1e-9);
        assert!(model
            .interpolate(3.0, 1.0, InterpolationMethod::Barycentric)
            .unwrap()
            .is_finite());
        assert!(model.statistics(None).is_ok());
    }
}

#[test]
fn fan_of_break_lines_stays_bounded() {
    init();
    let lines = [(1, 19), (6, 19), (11, 18)];
    let mut model = grid(BreaklineStrategy::Constrained, 5, 4);
    for (a, b) in lines {
        model.add_break_line(a, b).unwrap();
    }
    assert!(model.triangulation().unwrap().respects_constraints());

    let mut model = grid(BreaklineStrategy::Refine, 5, 4);
    for (a, b) in lines {
        model.add_break_line(a, b).unwrap();
    }
    match model.triangulation() {
        Ok(tin) => {
            assert!(tin.respects_constraints());
            assert!(tin.constraint_vertex_count() <= 8 * (20 + 5));
        }
        Err(e) => assert!(matches!(e, TerrainError::ConstraintUnsatisfiable(_))),
    }
}

#[test]
fn removing_crest_points_is_rejected() {
    let mut model = site(BreaklineStrategy::Constrained, 4);
    assert!(matches!(
        model.remove_point(1002),
        Err(TerrainError::ConstraintUnsatisfiable(_))
    ));
    model.remove_point(0).unwrap();
    assert_eq!(model.break_lines().len(), 4);
}

#[test]
fn concurrent_queries_share_one_mesh() {
    let model = Arc::new(site(BreaklineStrategy::Constrained, 5));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                let x = 10.0 + i as f64 * 20.0;
                model
                    .interpolate(x, 20.0, InterpolationMethod::Barycentric)
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        let z = h.join().unwrap();
        assert!(z.is_finite());
    }
    let a = model.triangulation().unwrap();
    let b = model.triangulation().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
