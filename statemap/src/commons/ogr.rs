//! Shapefile I/O through the `ogr2ogr` command-line tool.
//!
//! Vector data is handled in memory as GeoJSON and converted to and from
//! ESRI Shapefile sets by GDAL.

use anyhow::{Context, Result};
use geojson::GeoJson;
use std::path::Path;
use std::process::Command;

use crate::commons::housekeeping::remove_shapefile;
use crate::error::MapError;

const OGR2OGR: &str = "ogr2ogr";

/// Write a GeoJSON document as an ESRI Shapefile set.
///
/// Any existing shapefile at `output_shp` is removed first. The layer is
/// named `layer_name`.
pub fn geojson_to_shapefile(geojson: &GeoJson, output_shp: &Path, layer_name: &str) -> Result<()> {
    remove_shapefile(output_shp)?;

    if let Some(parent) = output_shp.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create output directory: {:?}", parent))?;
    }

    let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
    let temp_geojson = temp_dir.path().join(format!("{}.geojson", layer_name));
    std::fs::write(&temp_geojson, geojson.to_string())
        .context("Failed to write temporary GeoJSON file")?;

    let mut command = Command::new(OGR2OGR);
    command
        .arg("-f")
        .arg("ESRI Shapefile")
        .arg("-nln")
        .arg(layer_name)
        .arg(output_shp)
        .arg(&temp_geojson);
    run(command, "convert GeoJSON to shapefile")?;

    log::debug!("Shapefile saved to: {:?}", output_shp);
    Ok(())
}

/// Read an ESRI Shapefile set (or any OGR-readable file) as GeoJSON
pub fn shapefile_to_geojson(input: &Path) -> Result<GeoJson> {
    if !input.exists() {
        return Err(MapError::collaborator(
            OGR2OGR,
            format!("input not found: {}", input.display()),
        )
        .into());
    }

    let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
    let temp_geojson = temp_dir.path().join("features.geojson");

    let mut command = Command::new(OGR2OGR);
    command
        .arg("-f")
        .arg("GeoJSON")
        .arg(&temp_geojson)
        .arg(input);
    run(command, "convert shapefile to GeoJSON")?;

    let geojson_bytes =
        std::fs::read(&temp_geojson).context("Failed to read temporary GeoJSON file")?;
    let geojson_str = String::from_utf8_lossy(&geojson_bytes);
    let geojson: GeoJson = geojson_str
        .parse()
        .context(format!("Failed to parse GeoJSON from {:?}", input))?;

    Ok(geojson)
}

fn run(mut command: Command, action: &str) -> Result<()> {
    let output = command.output().map_err(|e| {
        MapError::collaborator(
            OGR2OGR,
            format!("could not execute ({}); make sure GDAL is installed and ogr2ogr is in PATH", e),
        )
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MapError::collaborator(
            OGR2OGR,
            format!("failed to {}: {}", action, stderr.trim()),
        )
        .into());
    }
    Ok(())
}
