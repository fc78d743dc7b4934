use std::path::{Path, PathBuf};

use crate::commons::basic_functions::state_slug;

/// Every file a run for one state reads or writes.
///
/// Tiles live under the cache root, everything else under the output
/// directory:
///
/// ```text
/// <cache_root>/texas_section_elevation_3.tif
/// <cache_root>/texas_section_elevation_3_clipped.tif
/// <output_dir>/texas/texas_boundary.shp
/// <output_dir>/texas/texas_contours.shp
/// <output_dir>/texas_boundary.svg
/// <output_dir>/merged_texas_elevation.tif
/// <output_dir>/texas_contours.svg
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StatePaths {
    pub state_name: String,
    pub slug: String,
    pub cache_root: PathBuf,
    pub output_dir: PathBuf,
}

impl StatePaths {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(state_name: &str, cache_root: P, output_dir: Q) -> Self {
        StatePaths {
            state_name: state_name.to_string(),
            slug: state_slug(state_name),
            cache_root: cache_root.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Prefix shared by all tiles of this state
    pub fn base_output_path(&self) -> String {
        tile_prefix(&self.slug)
    }

    pub fn raw_tile(&self, index: usize) -> PathBuf {
        raw_tile_path(&self.cache_root, &self.base_output_path(), index)
    }

    pub fn clipped_tile(&self, index: usize) -> PathBuf {
        clipped_path(&self.raw_tile(index))
    }

    /// Per-state working folder holding the shapefile sets
    pub fn state_dir(&self) -> PathBuf {
        self.output_dir.join(&self.slug)
    }

    pub fn boundary_shp(&self) -> PathBuf {
        self.state_dir().join(format!("{}_boundary.shp", self.slug))
    }

    pub fn contours_shp(&self) -> PathBuf {
        self.state_dir().join(format!("{}_contours.shp", self.slug))
    }

    pub fn boundary_svg(&self) -> PathBuf {
        self.output_dir.join(format!("{}_boundary.svg", self.slug))
    }

    pub fn merged_tif(&self) -> PathBuf {
        self.output_dir.join(format!("merged_{}_elevation.tif", self.slug))
    }

    pub fn contours_svg(&self) -> PathBuf {
        self.output_dir.join(format!("{}_contours.svg", self.slug))
    }
}

/// `<slug>_section_elevation`
pub fn tile_prefix(slug: &str) -> String {
    format!("{}_section_elevation", slug)
}

/// `<cache_root>/<base_output_path>_<index>.tif`
pub fn raw_tile_path(cache_root: &Path, base_output_path: &str, index: usize) -> PathBuf {
    cache_root.join(format!("{}_{}.tif", base_output_path, index))
}

/// Sibling of a tile path with a `_clipped` suffix before the extension
pub fn clipped_path(tile: &Path) -> PathBuf {
    let stem = tile
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    tile.with_file_name(format!("{}_clipped.tif", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_paths_layout() {
        let paths = StatePaths::new("New Mexico", "/cache/SRTM1", "out");
        assert_eq!(paths.base_output_path(), "new_mexico_section_elevation");
        assert_eq!(
            paths.raw_tile(3),
            PathBuf::from("/cache/SRTM1/new_mexico_section_elevation_3.tif")
        );
        assert_eq!(
            paths.clipped_tile(3),
            PathBuf::from("/cache/SRTM1/new_mexico_section_elevation_3_clipped.tif")
        );
        assert_eq!(
            paths.contours_shp(),
            PathBuf::from("out/new_mexico/new_mexico_contours.shp")
        );
        assert_eq!(
            paths.merged_tif(),
            PathBuf::from("out/merged_new_mexico_elevation.tif")
        );
        assert_eq!(paths.boundary_svg(), PathBuf::from("out/new_mexico_boundary.svg"));
        assert_eq!(paths.contours_svg(), PathBuf::from("out/new_mexico_contours.svg"));
    }
}
