use bytes::Bytes;
use spatio_cluster::{ClusterItem, ClusteringEngine, Config, Point};

/// Project longitude/latitude degrees to web mercator meters.
fn web_mercator(lon: f64, lat: f64) -> Point<f64> {
    const HALF_EQUATOR: f64 = 20_037_508.342_789_244;
    let x = lon * HALF_EQUATOR / 180.0;
    let y = ((90.0 + lat).to_radians() / 2.0).tan().ln() * HALF_EQUATOR / std::f64::consts::PI;
    Point::new(x, y)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug to see detailed logs)
    env_logger::init();

    println!("=== spatio-cluster - Getting Started ===\n");

    // One-inch cells on the web mercator levels of detail, zoom 0 to 19
    let mut engine: ClusteringEngine = ClusteringEngine::new(Config::default())?;
    println!("✓ Created engine for zoom levels {:?}\n", engine.zoom_levels());

    println!("1. Adding stations");
    println!("------------------");
    let stations = [
        ("station:penn", -73.9935, 40.7506, "Penn Station"),
        ("station:grand-central", -73.9772, 40.7527, "Grand Central"),
        ("station:fulton", -74.0077, 40.7102, "Fulton Street"),
        ("station:jamaica", -73.8081, 40.6995, "Jamaica"),
        ("station:newark", -74.1645, 40.7342, "Newark Penn"),
        ("station:union", -0.1240, 51.5308, "King's Cross"),
        ("station:waterloo", -0.1134, 51.5031, "Waterloo"),
    ];
    let items = stations.iter().map(|(key, lon, lat, name)| {
        ClusterItem::new(*key, web_mercator(*lon, *lat), Bytes::from(*name))
    });
    let summary = engine.add_items(items);
    println!(
        "   Clustered {} stations into {} clusters across all levels in {:?}\n",
        summary.items_added, summary.total_clusters, summary.duration
    );

    println!("2. Clusters per zoom level");
    println!("--------------------------");
    for zoom in [2, 6, 10, 14, 19] {
        println!("   zoom {:>2}: {} clusters", zoom, engine.cluster_count(zoom));
    }
    println!();

    println!("3. What a map at zoom 6 draws");
    println!("-----------------------------");
    for cluster in engine.clusters_at_zoom_level(6) {
        let names: Vec<String> = cluster
            .features()
            .map(|item| String::from_utf8_lossy(item.payload()).into_owned())
            .collect();
        println!(
            "   {} x{} at ({:.0}, {:.0}): {}",
            cluster.id(),
            cluster.display_count(),
            cluster.representative_coordinate().x(),
            cluster.representative_coordinate().y(),
            names.join(", ")
        );
    }
    println!();

    println!("4. Picking a level for the current map scale");
    println!("--------------------------------------------");
    for scale in [50_000_000.0, 1_000_000.0, 20_000.0] {
        if let Some(zoom) = engine.zoom_level_for_scale(scale) {
            println!("   1:{} -> zoom {} ({} clusters)", scale, zoom, engine.cluster_count(zoom));
        }
    }
    println!();

    println!("5. Removing a station");
    println!("---------------------");
    engine.remove_items(["station:newark"]);
    println!("   {} stations left", engine.item_count());

    Ok(())
}
