use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    default_cache_root, DEFAULT_PRODUCT, NOMINATIM_BASE_URL, SRTM_BASE_URL, USER_AGENT,
};
use crate::geometric::contour::ContourOptions;
use crate::geometric::svg::SvgOptions;

/// Settings for one pipeline run.
///
/// Every field has a default, so a JSON file only needs the keys it
/// changes:
///
/// ```json
/// { "tile_size_degree": 0.5, "svg": { "stroke": "black" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding raw and clipped tiles (and the download cache)
    pub cache_root: PathBuf,
    /// Directory receiving the state folder, mosaic and SVG files
    pub output_dir: PathBuf,
    pub tile_size_degree: f64,
    /// `SRTM1` or `SRTM3`
    pub product: String,
    pub srtm_base_url: String,
    pub nominatim_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Leave `*_clipped.tif` tiles in the cache after the run
    pub keep_clipped_tiles: bool,
    /// Write the boundary and contour shapefiles (requires `ogr2ogr`)
    pub write_shapefiles: bool,
    pub contour: ContourOptions,
    pub svg: SvgOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            cache_root: default_cache_root(DEFAULT_PRODUCT),
            output_dir: PathBuf::from("."),
            tile_size_degree: 1.0,
            product: DEFAULT_PRODUCT.to_string(),
            srtm_base_url: SRTM_BASE_URL.to_string(),
            nominatim_base_url: NOMINATIM_BASE_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            http_timeout_secs: 300,
            keep_clipped_tiles: false,
            write_shapefiles: true,
            contour: ContourOptions::default(),
            svg: SvgOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {:?}", path))?;
        serde_json::from_str(&text).context(format!("Invalid configuration file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.tile_size_degree, 1.0);
        assert_eq!(config.product, "SRTM1");
        assert!(config.cache_root.ends_with("SRTM1"));
        assert_eq!(config.svg.base_dimension, 1000);
        assert_eq!(config.contour.attribute_name, "elev");
        assert!(config.write_shapefiles);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "tile_size_degree": 0.5, "cache_root": "/tmp/tiles", "svg": { "stroke": "black" } }"#,
        )
        .unwrap();
        assert_eq!(config.tile_size_degree, 0.5);
        assert_eq!(config.cache_root, PathBuf::from("/tmp/tiles"));
        assert_eq!(config.svg.stroke, "black");
        assert_eq!(config.svg.font_family, "Roboto Mono");
        assert_eq!(config.contour.fixed_levels.len(), 7);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "keep_clipped_tiles": true }"#).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert!(config.keep_clipped_tiles);

        std::fs::write(&path, "not json").unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());
    }
}
