use geo::{Point, Rect, coord};
use spatio_cluster::validation::{validate_batch_for, validate_items};
use spatio_cluster::{
    CancellationToken, CellCoord, ClusterError, ClusterItem, ClusteringEngine, Config,
    EngineState, NoProgress, ProgressEvent,
};

fn engine() -> ClusteringEngine<u32> {
    ClusteringEngine::new(Config::with_fixed_cell_size(0, 3, 100.0, 3)).unwrap()
}

fn item(key: &str, x: f64, y: f64) -> ClusterItem<u32> {
    ClusterItem::new(key, Point::new(x, y), 0)
}

/// Items exactly on a cell edge belong to the cell above/right of it
#[test]
fn test_cell_boundaries_floor() {
    let mut engine = engine();
    engine.add_items([
        item("edge", 100.0, 200.0),
        item("just_below", 99.999, 199.999),
        item("origin", 0.0, 0.0),
    ]);

    let grid = engine.grid(3).unwrap();
    assert_eq!(grid.cell_for_point(Point::new(100.0, 200.0)), CellCoord::new(2, 1));
    assert_eq!(
        grid.cluster(&CellCoord::new(2, 1)).unwrap().leaf_items()[0].key,
        "edge"
    );
    assert_eq!(
        grid.cluster(&CellCoord::new(1, 0)).unwrap().leaf_items()[0].key,
        "just_below"
    );
    assert!(grid.cluster(&CellCoord::new(0, 0)).is_some());
}

#[test]
fn test_negative_coordinates() {
    let mut engine = engine();
    engine.add_items([item("a", -0.5, -0.5), item("b", -150.0, -20.0)]);

    let grid = engine.grid(3).unwrap();
    assert!(grid.cluster(&CellCoord::new(-1, -1)).is_some());
    assert!(grid.cluster(&CellCoord::new(-1, -2)).is_some());

    // both end up in cell (-1, -1) of the 800-unit grid
    let top: Vec<_> = engine.clusters_at_zoom_level(0).collect();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].cell_coordinate(), CellCoord::new(-1, -1));
}

#[test]
fn test_identical_coordinates() {
    let mut engine = engine();
    engine.add_items((0..25).map(|i| item(&format!("stack{}", i), 42.0, 42.0)));

    for zoom in engine.zoom_levels() {
        let clusters: Vec<_> = engine.clusters_at_zoom_level(zoom).collect();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].display_count(), 25);
        assert_eq!(clusters[0].representative_coordinate(), Point::new(42.0, 42.0));
        assert_eq!(clusters[0].coverage().unwrap().area(), 0.0);
    }
}

#[test]
fn test_extreme_coordinates() {
    let mut engine = engine();
    engine.add_items([
        item("far_east", 2.0e7, 0.0),
        item("far_west", -2.0e7, 0.0),
        item("far_north", 0.0, 3.0e7),
    ]);
    assert_eq!(engine.cluster_count(0), 3);
    let envelope = engine.envelope_at_zoom_level(0).unwrap();
    assert_eq!(envelope.min(), coord! { x: -2.0e7, y: 0.0 });
    assert_eq!(envelope.max(), coord! { x: 2.0e7, y: 3.0e7 });
}

#[test]
fn test_empty_batch() {
    let mut engine = engine();
    let mut events = Vec::new();
    let summary = engine.add_items_with(
        Vec::new(),
        &mut |event: ProgressEvent| events.push(event),
        &CancellationToken::new(),
    );

    assert_eq!(summary.items_added, 0);
    assert_eq!(summary.total_clusters, 0);
    assert!(engine.is_empty());
    assert!(matches!(events.last(), Some(ProgressEvent::BatchFinished { .. })));
}

#[test]
fn test_cancel_before_first_item() {
    let mut engine = engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = engine.add_items_with([item("a", 1.0, 1.0)], &mut NoProgress, &cancel);
    assert!(summary.cancelled);
    assert_eq!(summary.items_added, 0);
    assert!(engine.is_empty());
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_clusters_in_extent() {
    let mut engine = engine();
    engine.add_items([
        item("a", 50.0, 50.0),
        item("b", 250.0, 50.0),
        item("c", 950.0, 950.0),
    ]);

    let view = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 300.0, y: 100.0 });
    let found: Vec<usize> = engine
        .clusters_in_extent(3, &view)
        .iter()
        .map(|c| c.display_count())
        .collect();
    assert_eq!(found, vec![1, 1]);

    assert!(engine.clusters_in_extent(9, &view).is_empty());

    let inverted = Rect::new(coord! { x: 300.0, y: 100.0 }, coord! { x: 0.0, y: 0.0 });
    assert_eq!(engine.clusters_in_extent(3, &inverted).len(), 2);
}

#[test]
fn test_unknown_zoom_levels_are_empty() {
    let mut engine = engine();
    engine.add_items([item("a", 1.0, 1.0)]);

    assert!(engine.grid(4).is_none());
    assert_eq!(engine.cluster_count(200), 0);
    assert_eq!(engine.clusters_at_zoom_level(4).count(), 0);
    assert!(engine.summaries_at_zoom_level(4).is_empty());
    assert!(engine.cluster_for_key("a", 4).is_none());
}

#[test]
fn test_remove_unknown_keys() {
    let mut engine = engine();
    engine.add_items([item("a", 1.0, 1.0)]);
    let summary = engine.remove_items(["nope", "never"]);
    assert_eq!(summary.items_removed, 0);
    assert_eq!(engine.item_count(), 1);
}

#[test]
fn test_key_can_be_reused_after_removal() {
    let mut engine = engine();
    engine.add_items([item("a", 1.0, 1.0)]);
    engine.remove_items(["a"]);
    engine.add_items([item("a", 500.0, 500.0)]);

    let cluster = engine.cluster_for_key("a", 3).unwrap();
    assert_eq!(cluster.cell_coordinate(), CellCoord::new(5, 5));
}

#[test]
#[should_panic(expected = "duplicate item key")]
fn test_duplicate_keys_panic() {
    let mut engine = engine();
    engine.add_items([item("twin", 1.0, 1.0), item("twin", 400.0, 400.0)]);
}

#[test]
#[should_panic(expected = "non-finite")]
fn test_infinite_coordinate_panics() {
    let mut engine = engine();
    engine.add_items([item("inf", 0.0, f64::INFINITY)]);
}

#[test]
fn test_validation_catches_what_the_engine_rejects() {
    let mut engine = engine();
    engine.add_items([item("a", 1.0, 1.0)]);

    let batch = vec![item("b", 2.0, 2.0), item("b", 3.0, 3.0)];
    assert!(matches!(
        validate_items(&batch),
        Err(ClusterError::DuplicateKey(key)) if key == "b"
    ));

    let batch = vec![item("a", 2.0, 2.0)];
    assert!(validate_items(&batch).is_ok());
    assert!(matches!(
        validate_batch_for(&engine, &batch),
        Err(ClusterError::DuplicateKey(_))
    ));

    let batch = vec![item("nan", f64::NAN, 0.0)];
    assert!(matches!(
        validate_items(&batch),
        Err(ClusterError::InvalidCoordinate { .. })
    ));
}

#[test]
fn test_single_level_pyramid() {
    let mut engine: ClusteringEngine<u32> =
        ClusteringEngine::new(Config::with_fixed_cell_size(7, 7, 10.0, 7)).unwrap();
    engine.add_items([item("a", 1.0, 1.0), item("b", 11.0, 1.0)]);

    assert_eq!(engine.zoom_levels(), 7..=7);
    let clusters: Vec<_> = engine.clusters_at_zoom_level(7).collect();
    assert_eq!(clusters.len(), 2);
    assert!(clusters.iter().all(|c| c.parent().is_none()));
}
