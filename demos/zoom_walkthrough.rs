//! Walks one cluster from the coarsest zoom level down to its leaves.
//!
//! Run with: RUST_LOG=trace cargo run --example zoom_walkthrough

use spatio_cluster::{ClusterItem, ClusterRef, EngineBuilder, Point};

fn describe(cluster: ClusterRef<'_, u32>, depth: usize) {
    let coverage = match cluster.coverage() {
        Some(coverage) if coverage.is_degenerate() => "degenerate".to_string(),
        Some(coverage) => format!("area {:.0}", coverage.area()),
        None => "none".to_string(),
    };
    println!(
        "{:indent$}{} count={} centroid=({:.1}, {:.1}) coverage={}",
        "",
        cluster.id(),
        cluster.display_count(),
        cluster.representative_coordinate().x(),
        cluster.representative_coordinate().y(),
        coverage,
        indent = depth * 2
    );

    for leaf in cluster.leaf_items() {
        println!("{:indent$}- {}", "", leaf.key, indent = depth * 2 + 2);
    }
    for child in cluster.children() {
        describe(child, depth + 1);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut engine = EngineBuilder::new()
        .zoom_range(0, 3)
        .fixed_cell_size(50.0, 3)
        .build::<u32>()?;

    // two dense groups and a straggler
    let mut items = Vec::new();
    for i in 0..6 {
        let offset = i as f64 * 7.0;
        let west = Point::new(10.0 + offset, 20.0 + offset);
        let east = Point::new(260.0 + offset, 40.0);
        items.push(ClusterItem::new(format!("west:{}", i), west, i));
        items.push(ClusterItem::new(format!("east:{}", i), east, i));
    }
    items.push(ClusterItem::new("straggler", Point::new(380.0, 330.0), 99));
    engine.add_items(items);

    for zoom in engine.zoom_levels() {
        println!("zoom {}: {} clusters", zoom, engine.cluster_count(zoom));
    }
    println!();

    for top in engine.clusters_at_zoom_level(engine.coarsest_zoom()) {
        describe(top, 0);
    }

    Ok(())
}
