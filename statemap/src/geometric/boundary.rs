use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, Value};
use std::path::PathBuf;

use crate::commons::housekeeping::create_state_folder;
use crate::commons::ogr::geojson_to_shapefile;
use crate::commons::paths::StatePaths;
use crate::geo_core::StateBoundary;

/// Single-feature collection holding the boundary and its `name`
pub fn boundary_to_geojson(boundary: &StateBoundary) -> GeoJson {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), serde_json::json!(boundary.name));

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: Some(vec![
            boundary.bbox.min_x,
            boundary.bbox.min_y,
            boundary.bbox.max_x,
            boundary.bbox.max_y,
        ]),
        features: vec![Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(Value::from(&boundary.geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }],
        foreign_members: None,
    })
}

/// Write `./<slug>/<slug>_boundary.shp` and return its path
pub fn save_shapefile(boundary: &StateBoundary, paths: &StatePaths) -> Result<PathBuf> {
    create_state_folder(paths)?;

    let output = paths.boundary_shp();
    let layer_name = format!("{}_boundary", paths.slug);
    geojson_to_shapefile(&boundary_to_geojson(boundary), &output, &layer_name)
        .context(format!("Failed to save boundary of {}", boundary.name))?;

    log::info!("Boundary shapefile saved to {:?}", output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_boundary_geojson() {
        let geometry = MultiPolygon::new(vec![polygon![
            (x: -80.5, y: 39.7),
            (x: -75.0, y: 39.7),
            (x: -75.0, y: 42.3),
            (x: -80.5, y: 42.3),
        ]]);
        let boundary = StateBoundary::new("Pennsylvania", geometry).unwrap();
        let text = boundary_to_geojson(&boundary).to_string();
        assert!(text.contains("\"MultiPolygon\""));
        assert!(text.contains("\"name\":\"Pennsylvania\""));

        let parsed: GeoJson = text.parse().unwrap();
        let GeoJson::FeatureCollection(collection) = parsed else {
            panic!("expected a feature collection");
        };
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.bbox, Some(vec![-80.5, 39.7, -75.0, 42.3]));
    }
}
