use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::MapError;
use crate::geometric::raster::{Raster, RasterInfo};

/// Mosaic filled one source at a time.
///
/// Resolution comes from the first source, the extent is the union of all
/// bounds. Sources are pasted in order and a pixel keeps the first valid
/// value it receives. Projection, no-data and sample type are copied from
/// the last source.
struct MosaicCanvas {
    raster: Raster,
    /// Pixels already written, tracked only when the fill value is not the
    /// mosaic's no-data value
    filled: Option<Vec<bool>>,
}

impl MosaicCanvas {
    fn new(sources: &[RasterInfo]) -> Result<Self> {
        let (first, last) = match (sources.first(), sources.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(MapError::NoInput("no rasters to merge".to_string()).into()),
        };

        let (dx, dy) = first.pixel_size();
        let extent = sources
            .iter()
            .skip(1)
            .fold(first.bounds(), |acc, r| acc.union(&r.bounds()));
        let width = ((extent.width() / dx).round() as usize).max(1);
        let height = ((extent.height() / -dy).round() as usize).max(1);
        let transform = [extent.min_x, dx, 0.0, extent.max_y, 0.0, dy];

        let fill = first.no_data.unwrap_or(0.0);
        let raster = Raster::filled(width, height, fill, transform, last.projection.clone(), last.no_data)?
            .with_sample_type(last.sample_type);
        let filled = if raster.is_no_data(fill) {
            None
        } else {
            Some(vec![false; width * height])
        };
        Ok(MosaicCanvas { raster, filled })
    }

    fn is_set(&self, idx: usize) -> bool {
        match &self.filled {
            Some(filled) => filled[idx],
            None => !self.raster.is_no_data(self.raster.data[idx] as f64),
        }
    }

    fn paste(&mut self, source: &Raster) {
        let (width, height) = (self.raster.width, self.raster.height);
        let (dx, dy) = self.raster.pixel_size();
        let (x0, y0) = (self.raster.transform[0], self.raster.transform[3]);

        let b = source.bounds();
        let col_start = window_index(((b.min_x - x0) / dx).floor(), width);
        let col_end = window_index(((b.max_x - x0) / dx).ceil(), width);
        let row_start = window_index(((b.max_y - y0) / dy).floor(), height);
        let row_end = window_index(((b.min_y - y0) / dy).ceil(), height);

        let (sdx, sdy) = source.pixel_size();
        for row in row_start..row_end {
            for col in col_start..col_end {
                let idx = row * width + col;
                if self.is_set(idx) {
                    continue;
                }
                let (x, y) = self.raster.pixel_center(col as f64, row as f64);
                let src_col = ((x - source.transform[0]) / sdx).floor();
                let src_row = ((y - source.transform[3]) / sdy).floor();
                if src_col < 0.0
                    || src_row < 0.0
                    || src_col >= source.width as f64
                    || src_row >= source.height as f64
                {
                    continue;
                }
                let value = source.get(src_col as usize, src_row as usize);
                if source.is_no_data(value) {
                    continue;
                }
                self.raster.data[idx] = value as f32;
                if let Some(filled) = self.filled.as_mut() {
                    filled[idx] = true;
                }
            }
        }
    }
}

fn window_index(value: f64, max: usize) -> usize {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value as usize).min(max)
    }
}

/// Merge in-memory rasters into one mosaic
pub fn merge_rasters(rasters: &[Raster]) -> Result<Raster> {
    let infos: Vec<RasterInfo> = rasters.iter().map(Raster::info).collect();
    let mut canvas = MosaicCanvas::new(&infos)?;
    for raster in rasters {
        canvas.paste(raster);
    }
    Ok(canvas.raster)
}

/// Merge tiles into a mosaic GeoTIFF.
///
/// The extent is computed from the tile headers; samples are then read one
/// tile at a time, so only the mosaic and a single tile are held in memory.
pub fn merge_tiffs(tile_paths: &[PathBuf], merged_output_path: &Path) -> Result<Raster> {
    if tile_paths.is_empty() {
        return Err(MapError::NoInput(format!(
            "no clipped tiles to merge into {}",
            merged_output_path.display()
        ))
        .into());
    }

    let infos = tile_paths
        .iter()
        .map(RasterInfo::from_file)
        .collect::<Result<Vec<_>>>()?;
    let mut canvas = MosaicCanvas::new(&infos)
        .context(format!("Failed to merge {} tiles", tile_paths.len()))?;
    for path in tile_paths {
        let tile = Raster::from_file(path)?;
        canvas.paste(&tile);
    }

    let mosaic = canvas.raster;
    mosaic.write_geotiff(merged_output_path)?;

    log::info!(
        "Merged {} tiles into {}x{} mosaic {:?}",
        tile_paths.len(),
        mosaic.width,
        mosaic.height,
        merged_output_path
    );
    Ok(mosaic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(min_x: f64, max_y: f64, width: usize, height: usize, value: f64) -> Raster {
        Raster::filled(
            width,
            height,
            value,
            [min_x, 0.5, 0.0, max_y, 0.0, -0.5],
            String::new(),
            Some(-1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_input() {
        let err = merge_rasters(&[]).unwrap_err();
        assert!(matches!(err.downcast_ref::<MapError>(), Some(MapError::NoInput(_))));

        let dir = tempfile::tempdir().unwrap();
        let err = merge_tiffs(&[], &dir.path().join("merged.tif")).unwrap_err();
        assert!(matches!(err.downcast_ref::<MapError>(), Some(MapError::NoInput(_))));
    }

    #[test]
    fn test_single_input_is_identity() {
        let mut r = tile(10.0, 5.0, 3, 2, 7.0);
        r.set(1, 1, -1.0);
        r.set(2, 0, 3.5);
        let merged = merge_rasters(&[r.clone()]).unwrap();
        assert_eq!(merged.width, r.width);
        assert_eq!(merged.height, r.height);
        assert_eq!(merged.transform, r.transform);
        assert_eq!(merged.data, r.data);
    }

    #[test]
    fn test_side_by_side_union() {
        let west = tile(0.0, 1.0, 2, 2, 1.0);
        let east = tile(1.0, 1.0, 2, 2, 2.0);
        let merged = merge_rasters(&[west, east]).unwrap();
        assert_eq!(merged.width, 4);
        assert_eq!(merged.height, 2);
        assert_eq!(merged.data, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_first_valid_value_wins() {
        let mut first = tile(0.0, 1.0, 2, 2, 1.0);
        first.set(0, 0, -1.0);
        let second = tile(0.0, 1.0, 2, 2, 2.0);
        let merged = merge_rasters(&[first, second]).unwrap();
        assert_eq!(merged.data, vec![2.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_gap_keeps_no_data() {
        let a = tile(0.0, 1.0, 1, 2, 4.0);
        let b = tile(1.0, 1.0, 1, 2, 5.0);
        let merged = merge_rasters(&[a, b]).unwrap();
        assert_eq!(merged.width, 3);
        assert_eq!(merged.get(1, 0), -1.0);
        assert_eq!(merged.value_range(), Some((4.0, 5.0)));
    }

    #[test]
    fn test_first_wins_without_no_data() {
        // Zero is a valid elevation when no no-data value is set
        let mut first = tile(0.0, 1.0, 2, 2, 0.0);
        first.no_data = None;
        let mut second = tile(0.0, 1.0, 2, 2, 9.0);
        second.no_data = None;
        let merged = merge_rasters(&[first, second]).unwrap();
        assert_eq!(merged.data, vec![0.0; 4]);
    }

    #[test]
    fn test_merge_tiffs_writes_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("a_0_clipped.tif"), dir.path().join("a_1_clipped.tif")];
        tile(0.0, 1.0, 2, 2, 1.0).write_geotiff(&paths[0]).unwrap();
        tile(1.0, 1.0, 2, 2, 2.0).write_geotiff(&paths[1]).unwrap();

        let out = dir.path().join("merged_a_elevation.tif");
        let mosaic = merge_tiffs(&paths, &out).unwrap();
        assert_eq!(mosaic.width, 4);

        let reread = Raster::from_file(&out).unwrap();
        assert_eq!(reread.data, mosaic.data);
        assert_eq!(reread.no_data, Some(-1.0));
    }

    #[test]
    fn test_merge_tiffs_matches_in_memory_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut west = tile(0.0, 1.0, 3, 2, 1.0);
        west.set(2, 1, -1.0);
        let east = tile(1.0, 1.5, 2, 3, 2.0);
        let paths = vec![dir.path().join("b_0_clipped.tif"), dir.path().join("b_1_clipped.tif")];
        west.write_geotiff(&paths[0]).unwrap();
        east.write_geotiff(&paths[1]).unwrap();

        let streamed = merge_tiffs(&paths, &dir.path().join("merged_b_elevation.tif")).unwrap();
        let in_memory = merge_rasters(&[west, east]).unwrap();
        assert_eq!((streamed.width, streamed.height), (4, 3));
        assert_eq!(streamed.data, in_memory.data);
        // Overlap keeps the western value, its no-data hole is filled from the east
        assert_eq!(streamed.get(2, 1), 1.0);
        assert_eq!(streamed.get(2, 2), 2.0);
    }
}
