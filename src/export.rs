//! GeoJSON export of a zoom level for the rendering layer.
//!
//! Each cluster becomes a `Point` feature at its representative coordinate with
//! `display_count`, `shows_items`, `zoom`, `row` and `col` properties. The coverage
//! geometry can be attached as an extra `coverage` property, and clusters below the
//! configured `min_cluster_count` can be expanded into one feature per item.

use crate::engine::{ClusterRef, ClusteringEngine};
use crate::error::{ClusterError, Result};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use spatio_cluster_types::{ClusterItem, Coverage, ZoomLevel};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Attach each cluster's coverage geometry
    pub include_coverage: bool,
    /// Set the collection's `bbox` to the level's envelope
    pub include_bbox: bool,
    /// Also emit the items of clusters that show their items, keyed by item key
    pub expand_small_clusters: bool,
}

impl ExportOptions {
    pub fn with_coverage(mut self) -> Self {
        self.include_coverage = true;
        self
    }

    pub fn with_bbox(mut self) -> Self {
        self.include_bbox = true;
        self
    }

    pub fn with_expanded_small_clusters(mut self) -> Self {
        self.expand_small_clusters = true;
        self
    }
}

/// GeoJSON geometry of a coverage: `Point`, `LineString` or `Polygon`.
pub fn coverage_geometry(coverage: &Coverage) -> Geometry {
    let value = match coverage {
        Coverage::Point(point) => Value::Point(vec![point.x(), point.y()]),
        Coverage::Segment(line) => Value::LineString(vec![
            vec![line.start.x, line.start.y],
            vec![line.end.x, line.end.y],
        ]),
        Coverage::Hull(polygon) => {
            let exterior: Vec<Vec<f64>> = polygon
                .exterior()
                .coords()
                .map(|coord| vec![coord.x, coord.y])
                .collect();
            Value::Polygon(vec![exterior])
        }
    };
    Geometry::new(value)
}

pub fn cluster_feature<P>(cluster: &ClusterRef<'_, P>, options: &ExportOptions) -> Feature {
    let id = cluster.id();
    let coordinate = cluster.representative_coordinate();

    let mut properties = JsonObject::new();
    properties.insert("display_count".into(), cluster.display_count().into());
    properties.insert("shows_items".into(), cluster.shows_items().into());
    properties.insert("zoom".into(), id.zoom.into());
    properties.insert("row".into(), id.cell.row.into());
    properties.insert("col".into(), id.cell.col.into());
    if options.include_coverage
        && let Some(coverage) = cluster.coverage()
        && let Ok(geometry) = serde_json::to_value(coverage_geometry(coverage))
    {
        properties.insert("coverage".into(), geometry);
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![coordinate.x(), coordinate.y()]))),
        id: Some(Id::String(id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Point feature of one item of `cluster`, tagged with the cluster it belongs to.
pub fn item_feature<P>(item: &ClusterItem<P>, cluster: &ClusterRef<'_, P>) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("cluster".into(), cluster.id().to_string().into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![item.x(), item.y()]))),
        id: Some(Id::String(item.key.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

impl<P> ClusteringEngine<P> {
    /// Every cluster of `zoom` as one feature collection. Unknown levels export empty.
    pub fn to_feature_collection(
        &self,
        zoom: ZoomLevel,
        options: &ExportOptions,
    ) -> FeatureCollection {
        let mut features = Vec::new();
        for cluster in self.clusters_at_zoom_level(zoom) {
            features.push(cluster_feature(&cluster, options));
            if options.expand_small_clusters && cluster.shows_items() {
                features.extend(cluster.features().map(|item| item_feature(item, &cluster)));
            }
        }

        let bbox = options
            .include_bbox
            .then(|| self.envelope_at_zoom_level(zoom))
            .flatten()
            .map(|rect| vec![rect.min().x, rect.min().y, rect.max().x, rect.max().y]);

        log::debug!("Exported {} clusters of zoom level {}", features.len(), zoom);

        FeatureCollection {
            bbox,
            features,
            foreign_members: None,
        }
    }

    /// Serialized feature collection of `zoom`.
    ///
    /// Unlike [`to_feature_collection`](Self::to_feature_collection), asking for a zoom
    /// level outside the pyramid is an error.
    pub fn to_geojson(&self, zoom: ZoomLevel, options: &ExportOptions) -> Result<String> {
        if self.grid(zoom).is_none() {
            return Err(ClusterError::UnknownZoomLevel(zoom));
        }
        Ok(serde_json::to_string(&self.to_feature_collection(zoom, options))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use geo::Point;

    fn engine() -> ClusteringEngine<()> {
        let config = Config::with_fixed_cell_size(0, 1, 10.0, 1);
        let mut engine = ClusteringEngine::new(config).unwrap();
        engine.add_items([
            ClusterItem::new("a", Point::new(1.0, 1.0), ()),
            ClusterItem::new("b", Point::new(15.0, 1.0), ()),
            ClusterItem::new("c", Point::new(8.0, 18.0), ()),
        ]);
        engine
    }

    #[test]
    fn test_feature_properties() {
        let engine = engine();
        let collection = engine.to_feature_collection(0, &ExportOptions::default());
        assert_eq!(collection.features.len(), 1);
        assert!(collection.bbox.is_none());

        let feature = &collection.features[0];
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["display_count"], 3);
        assert_eq!(properties["shows_items"], false);
        assert_eq!(properties["zoom"], 0);
        assert_eq!(properties["row"], 0);
        assert_eq!(properties["col"], 0);
        assert!(!properties.contains_key("coverage"));
        assert_eq!(feature.id, Some(Id::String("z0:0:0".into())));
    }

    #[test]
    fn test_coverage_and_bbox() {
        let engine = engine();
        let options = ExportOptions::default().with_coverage().with_bbox();
        let collection = engine.to_feature_collection(0, &options);

        assert_eq!(collection.bbox, Some(vec![1.0, 1.0, 15.0, 18.0]));
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["coverage"]["type"], "Polygon");

        let single = engine.to_feature_collection(1, &options);
        assert_eq!(single.features.len(), 3);
        let kinds: Vec<&str> = single
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["coverage"]["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["Point", "Point", "Point"]);
    }

    #[test]
    fn test_unknown_zoom_level() {
        let engine = engine();
        let collection = engine.to_feature_collection(7, &ExportOptions::default().with_bbox());
        assert!(collection.features.is_empty());
        assert!(collection.bbox.is_none());

        assert!(matches!(
            engine.to_geojson(7, &ExportOptions::default()),
            Err(ClusterError::UnknownZoomLevel(7))
        ));
    }

    #[test]
    fn test_geojson_string() {
        let json = engine().to_geojson(1, &ExportOptions::default()).unwrap();
        assert!(json.contains("FeatureCollection"));
        assert!(json.contains(r#""display_count":1"#));
    }

    #[test]
    fn test_segment_geometry() {
        let coverage =
            Coverage::from_points([Point::new(0.0, 0.0), Point::new(4.0, 2.0)]).unwrap();
        let geometry = coverage_geometry(&coverage);
        assert_eq!(
            geometry.value,
            Value::LineString(vec![vec![0.0, 0.0], vec![4.0, 2.0]])
        );
    }

    #[test]
    fn test_small_clusters_expand_into_items() {
        let config = Config::with_fixed_cell_size(0, 1, 10.0, 1).with_min_cluster_count(2);
        let mut engine = ClusteringEngine::new(config).unwrap();
        engine.add_items([
            ClusterItem::new("a", Point::new(1.0, 1.0), ()),
            ClusterItem::new("b", Point::new(2.0, 2.0), ()),
            ClusterItem::new("c", Point::new(15.0, 1.0), ()),
        ]);

        let plain = engine.to_feature_collection(1, &ExportOptions::default());
        assert_eq!(plain.features.len(), 2);
        let shows: Vec<bool> = plain
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["shows_items"].as_bool().unwrap())
            .collect();
        assert_eq!(shows, vec![false, true]);

        let options = ExportOptions::default().with_expanded_small_clusters();
        let expanded = engine.to_feature_collection(1, &options);
        assert_eq!(expanded.features.len(), 3);
        let item = &expanded.features[2];
        assert_eq!(item.id, Some(Id::String("c".into())));
        assert_eq!(item.properties.as_ref().unwrap()["cluster"], "z1:0:1");

        let top = engine.to_feature_collection(0, &options);
        assert_eq!(top.features.len(), 1);
    }
}
