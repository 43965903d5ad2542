//! Clusters a large batch on a background thread while the main thread follows its
//! progress.
//!
//! Run with: cargo run --example background_batch --release

#![cfg(feature = "sync")]

use spatio_cluster::{ClusterItem, Config, EngineState, Point, ProgressEvent, SyncClusteringEngine};
use std::sync::mpsc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("=== SyncClusteringEngine background batch ===\n");

    let engine: SyncClusteringEngine<u64> =
        SyncClusteringEngine::new(Config::with_fixed_cell_size(0, 12, 8.0, 12))?;

    // a grid of points with a little jitter, spread over 40 000 units
    let items: Vec<ClusterItem<u64>> = (0..200_000u64)
        .map(|i| {
            let jitter = ((i * 7919) % 97) as f64 / 10.0;
            let x = (i % 400) as f64 * 100.0 + jitter;
            let y = (i / 400) as f64 * 80.0 - jitter;
            ClusterItem::new(format!("sensor:{}", i), Point::new(x, y), i)
        })
        .collect();

    let (sender, receiver) = mpsc::channel();
    let handle = engine.spawn_add_items(items, sender);
    println!("1. Batch started, engine state: {:?}\n", engine.state());

    for event in receiver {
        match event {
            ProgressEvent::ZoomLevelFinished {
                level,
                cluster_count,
                elapsed,
                ..
            } => println!(
                "   zoom {:>2} settled: {:>6} clusters in {:?}",
                level, cluster_count, elapsed
            ),
            ProgressEvent::BatchFinished {
                total_duration,
                total_clusters,
                total_features,
            } => println!(
                "\n   batch done in {:?}: {} features, {} clusters overall",
                total_duration, total_features, total_clusters
            ),
            _ => {}
        }
    }

    let summary = handle.join().map_err(|_| "clustering thread panicked")?;
    assert_eq!(engine.state(), EngineState::Idle);
    println!("   added {} items\n", summary.items_added);

    println!("2. Reading the settled pyramid");
    for zoom in [0, 4, 8, 12] {
        let summaries = engine.summaries_at_zoom_level(zoom);
        let largest = summaries.iter().map(|s| s.display_count).max().unwrap_or(0);
        println!("   zoom {:>2}: {:>6} clusters, largest holds {}", zoom, summaries.len(), largest);
    }

    Ok(())
}
