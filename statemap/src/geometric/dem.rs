use anyhow::{Context, Result};
use geo::MultiPolygon;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::ElevationSource;
use crate::commons::paths::{clipped_path, raw_tile_path};
use crate::error::MapError;
use crate::geo_core::BoundingBox;
use crate::geometric::raster::Raster;

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// One elevation tile after masking with the state boundary
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedTile {
    /// Sub-box index in row-major order
    pub index: usize,
    pub bbox: BoundingBox,
    pub raw_path: PathBuf,
    pub clipped_path: PathBuf,
}

/// Download one tile per sub-box and mask it with the boundary.
///
/// Tile `i` is written to `<cache_root>/<base_output_path>_<i>.tif` and its
/// masked version next to it with a `_clipped` suffix. Sub-boxes the
/// boundary does not reach are skipped; any other failure aborts the loop.
/// The source is cleaned after every tile.
pub fn download_elevation_data<S: ElevationSource + ?Sized>(
    source: &S,
    sub_boxes: &[BoundingBox],
    base_output_path: &str,
    boundary: &MultiPolygon<f64>,
    cache_root: &Path,
) -> Result<Vec<ClippedTile>> {
    create_dir_all(cache_root)
        .context(format!("Failed to create tile cache: {:?}", cache_root))?;

    #[cfg(feature = "indicatif")]
    let pb = {
        let pb = ProgressBar::new(sub_boxes.len() as u64);
        pb.set_style(progress_style());
        pb.set_message("Tiles");
        pb
    };

    let mut tiles = Vec::with_capacity(sub_boxes.len());
    for (index, bbox) in sub_boxes.iter().enumerate() {
        #[cfg(feature = "indicatif")]
        pb.set_message(format!("Tile {}/{}", index + 1, sub_boxes.len()));

        let raw_path = raw_tile_path(cache_root, base_output_path, index);
        log::debug!("Fetching tile {} for {:?}", index, bbox);
        source
            .fetch(bbox, &raw_path)
            .context(format!("Failed to download tile {} ({:?})", index, bbox))?;

        let clipped = clip_tile(&raw_path, boundary, index);
        source.clean()?;

        match clipped {
            Ok(clipped_tile_path) => {
                tiles.push(ClippedTile {
                    index,
                    bbox: *bbox,
                    raw_path,
                    clipped_path: clipped_tile_path,
                });
            }
            Err(e) if matches!(e.downcast_ref::<MapError>(), Some(MapError::NoOverlap { .. })) => {
                log::warn!("Skipping tile {}: {}", index, e);
            }
            Err(e) => return Err(e),
        }

        #[cfg(feature = "indicatif")]
        pb.inc(1);
    }

    #[cfg(feature = "indicatif")]
    pb.finish_with_message(format!("{} tiles clipped", tiles.len()));

    Ok(tiles)
}

/// Mask the raw tile at `raw_path` and write its `_clipped` sibling
fn clip_tile(raw_path: &Path, boundary: &MultiPolygon<f64>, index: usize) -> Result<PathBuf> {
    let raster = Raster::from_file(raw_path)?;
    let masked = raster.mask(boundary, index)?;

    let out_path = clipped_path(raw_path);
    masked.write_geotiff(&out_path)?;

    let range = masked
        .value_range()
        .map(|(lo, hi)| format!("{} to {}", lo, hi))
        .unwrap_or_else(|| "no valid data".to_string());
    log::info!(
        "Clipped tile {}: {}x{} pixels, elevation {} -> {:?}",
        index,
        masked.width,
        masked.height,
        range,
        out_path
    );
    Ok(out_path)
}
