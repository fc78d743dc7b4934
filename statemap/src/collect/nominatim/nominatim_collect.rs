use anyhow::{Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use reqwest::blocking::Client;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::collect::global_variables::{NOMINATIM_BASE_URL, USER_AGENT};
use crate::collect::BoundaryProvider;
use crate::commons::basic_functions::state_slug;
use crate::error::MapError;
use crate::geo_core::StateBoundary;

/// Geocodes state names to boundary polygons with Nominatim.
///
/// Raw responses are kept under `<cache_root>/nominatim/` and reused on
/// later runs (the public service asks clients to cache).
pub struct NominatimCollect {
    client: Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl NominatimCollect {
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Result<Self> {
        NominatimCollect::with_options(cache_root, NOMINATIM_BASE_URL, USER_AGENT, 300)
    }

    pub fn with_options<P: AsRef<Path>>(
        cache_root: P,
        base_url: &str,
        user_agent: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(NominatimCollect {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: cache_root.as_ref().join("nominatim"),
        })
    }

    /// Search URL for `state_name`
    pub fn search_url(&self, state_name: &str) -> Result<Url> {
        let query = format!("{}, United States", state_name);
        Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("q", query.as_str()),
                ("format", "geojson"),
                ("polygon_geojson", "1"),
                ("limit", "5"),
            ],
        )
        .context(format!("Invalid Nominatim base URL: {}", self.base_url))
    }

    pub fn cache_path(&self, state_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.geojson", state_slug(state_name)))
    }

    fn fetch_response(&self, state_name: &str) -> Result<String> {
        let cache_path = self.cache_path(state_name);
        if cache_path.exists() {
            log::debug!("Using cached geocoder response {:?}", cache_path);
            return std::fs::read_to_string(&cache_path)
                .context(format!("Failed to read cached response: {:?}", cache_path));
        }

        let url = self.search_url(state_name)?;
        log::info!("Geocoding {} with {}", state_name, url);

        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| MapError::collaborator("Nominatim", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(MapError::collaborator(
                "Nominatim",
                format!("HTTP {}: {}", status, body.trim()),
            )
            .into());
        }

        let text = response
            .text()
            .map_err(|e| MapError::collaborator("Nominatim", format!("reading response failed: {}", e)))?;

        create_dir_all(&self.cache_dir)
            .context(format!("Failed to create cache directory: {:?}", self.cache_dir))?;
        std::fs::write(&cache_path, &text)
            .context(format!("Failed to write file: {:?}", cache_path))?;

        Ok(text)
    }
}

impl BoundaryProvider for NominatimCollect {
    fn boundary(&self, state_name: &str) -> Result<StateBoundary> {
        let text = self.fetch_response(state_name)?;
        parse_boundary(state_name, &text)
    }
}

/// Boundary from a Nominatim GeoJSON response: the first feature whose
/// geometry is a polygon or multipolygon.
pub fn parse_boundary(state_name: &str, response: &str) -> Result<StateBoundary> {
    let geojson: GeoJson = response
        .parse()
        .map_err(|e| MapError::collaborator("Nominatim", format!("invalid GeoJSON: {}", e)))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => Vec::new(),
    };

    for feature in features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: Geometry<f64> = match geometry.value.try_into() {
            Ok(geometry) => geometry,
            Err(_) => continue,
        };
        let multi = match geometry {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            Geometry::MultiPolygon(multi) => multi,
            _ => continue,
        };
        return StateBoundary::new(state_name, multi);
    }

    Err(MapError::collaborator(
        "Nominatim",
        format!("no polygon boundary found for '{}'", state_name),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"display_name": "Vermont, United States", "class": "place"},
                "geometry": {"type": "Point", "coordinates": [-72.7, 44.0]}
            },
            {
                "type": "Feature",
                "properties": {"display_name": "Vermont, United States", "class": "boundary"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-73.4, 42.7], [-71.5, 42.7], [-71.5, 45.0], [-73.4, 45.0], [-73.4, 42.7]]]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_first_polygon() {
        let boundary = parse_boundary("Vermont", RESPONSE).unwrap();
        assert_eq!(boundary.name, "Vermont");
        assert_eq!(boundary.geometry.0.len(), 1);
        assert_eq!(boundary.bbox.min_x, -73.4);
        assert_eq!(boundary.bbox.max_y, 45.0);
    }

    #[test]
    fn test_parse_without_polygon() {
        let response = r#"{"type": "FeatureCollection", "features": []}"#;
        let err = parse_boundary("Vermont", response).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::Collaborator { .. })
        ));
    }

    #[test]
    fn test_search_url() {
        let dir = tempfile::tempdir().unwrap();
        let nominatim = NominatimCollect::new(dir.path()).unwrap();
        let url = nominatim.search_url("New York").unwrap();
        assert_eq!(url.path(), "/search");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("q".to_string(), "New York, United States".to_string())));
        assert!(query.contains(&("format".to_string(), "geojson".to_string())));
    }

    #[test]
    fn test_cached_response_is_used() {
        let dir = tempfile::tempdir().unwrap();
        // Unreachable host: only the cache can answer
        let nominatim =
            NominatimCollect::with_options(dir.path(), "http://127.0.0.1:9", "test", 1).unwrap();
        let cache_path = nominatim.cache_path("Vermont");
        create_dir_all(cache_path.parent().unwrap()).unwrap();
        std::fs::write(&cache_path, RESPONSE).unwrap();

        let boundary = nominatim.boundary("Vermont").unwrap();
        assert_eq!(boundary.bbox.min_y, 42.7);
    }
}
