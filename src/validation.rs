//! Validation of item batches before they reach the engine.
//!
//! The engine panics on duplicate keys and non-finite coordinates. Callers feeding it
//! untrusted data check their batches here first and get a typed error instead.

use crate::engine::ClusteringEngine;
use crate::error::{ClusterError, Result};
use rustc_hash::FxHashSet;
use spatio_cluster_types::{CellCoord, ClusterItem};

/// Checks that an item has a finite coordinate.
///
/// # Examples
///
/// ```
/// use spatio_cluster::ClusterItem;
/// use spatio_cluster::validation::validate_item;
/// use geo::Point;
///
/// let ok = ClusterItem::new("a", Point::new(12.0, -4.5), ());
/// assert!(validate_item(&ok).is_ok());
///
/// let bad = ClusterItem::new("b", Point::new(f64::NAN, 0.0), ());
/// assert!(validate_item(&bad).is_err());
/// ```
pub fn validate_item<P>(item: &ClusterItem<P>) -> Result<()> {
    if !item.has_finite_coordinate() {
        return Err(ClusterError::InvalidCoordinate {
            key: item.key.clone(),
            x: item.x(),
            y: item.y(),
        });
    }
    Ok(())
}

/// Checks every coordinate and that no key appears twice in the batch.
///
/// Reports the first problem in batch order.
pub fn validate_items<P>(items: &[ClusterItem<P>]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for item in items {
        validate_item(item)?;
        if !seen.insert(item.key()) {
            return Err(ClusterError::DuplicateKey(item.key.clone()));
        }
    }
    Ok(())
}

/// Like [`validate_items`], also rejecting keys the engine already holds and
/// coordinates too far out for the engine's finest cells.
pub fn validate_batch_for<P>(
    engine: &ClusteringEngine<P>,
    items: &[ClusterItem<P>],
) -> Result<()> {
    validate_items(items)?;
    let cell_size = engine.config().cell_size(engine.finest_zoom());
    if let Some(item) = items
        .iter()
        .find(|item| !CellCoord::is_addressable(item.coordinate, cell_size))
    {
        return Err(ClusterError::InvalidCoordinate {
            key: item.key.clone(),
            x: item.x(),
            y: item.y(),
        });
    }
    match items.iter().find(|item| engine.contains_key(item.key())) {
        Some(item) => Err(ClusterError::DuplicateKey(item.key.clone())),
        None => Ok(()),
    }
}
