use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commons::basic_functions::state_slug;
use crate::commons::paths::{tile_prefix, StatePaths};

/// Tiles in `cache_root` named `<base_output_path>_*.tif`, raw and clipped,
/// ordered by tile index.
pub fn find_tiff_files(cache_root: &Path, base_output_path: &str) -> Result<Vec<PathBuf>> {
    find_tiles(cache_root, base_output_path, |_| true)
}

/// Clipped tiles in `cache_root` named `<base_output_path>_*_clipped.tif`,
/// ordered by tile index.
pub fn find_clipped_tiff_files(cache_root: &Path, base_output_path: &str) -> Result<Vec<PathBuf>> {
    find_tiles(cache_root, base_output_path, |rest| rest.ends_with("_clipped.tif"))
}

fn find_tiles<F>(cache_root: &Path, base_output_path: &str, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    if !cache_root.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}_", base_output_path);
    let mut found = Vec::new();
    for entry in fs::read_dir(cache_root)
        .context(format!("Failed to list tile cache: {:?}", cache_root))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(rest) = name.strip_prefix(&prefix) {
            if rest.ends_with(".tif") && keep(rest) {
                found.push((tile_index(rest), path.clone()));
            }
        }
    }

    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Leading index of `3_clipped.tif` / `3.tif`; unparsable names sort last.
fn tile_index(rest: &str) -> (usize, String) {
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (digits.parse().unwrap_or(usize::MAX), rest.to_string())
}

/// Delete the intermediate tiles of `state_name` from the cache root.
///
/// Removes `<slug>_section_elevation_*.tif`; clipped tiles are kept when
/// `keep_clipped` is set. Files that disappear in the meantime are skipped.
/// Outputs in the working directory are never touched. Returns the removed
/// paths.
pub fn clean_up_intermediate_files(
    cache_root: &Path,
    state_name: &str,
    keep_clipped: bool,
) -> Result<Vec<PathBuf>> {
    let base_output_path = tile_prefix(&state_slug(state_name));
    let mut removed = Vec::new();

    for file_path in find_tiff_files(cache_root, &base_output_path)? {
        let is_clipped = file_path
            .to_string_lossy()
            .ends_with("_clipped.tif");
        if keep_clipped && is_clipped {
            continue;
        }
        match fs::remove_file(&file_path) {
            Ok(()) => {
                log::debug!("Removed intermediate file {:?}", file_path);
                removed.push(file_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("Failed to remove intermediate file: {:?}", file_path))
            }
        }
    }

    log::info!(
        "Removed {} intermediate tile(s) for {} from {:?}",
        removed.len(),
        state_name,
        cache_root
    );
    Ok(removed)
}

/// Create the per-state working folder and the cache root
pub fn create_state_folder(paths: &StatePaths) -> Result<()> {
    let state_dir = paths.state_dir();
    fs::create_dir_all(&state_dir)
        .context(format!("Failed to create state folder: {:?}", state_dir))?;
    fs::create_dir_all(&paths.cache_root)
        .context(format!("Failed to create tile cache: {:?}", paths.cache_root))?;
    Ok(())
}

/// Remove every component of a shapefile set (`.shp`, `.shx`, `.dbf`, ...)
pub fn remove_shapefile(path: &Path) -> Result<()> {
    let base_path = path.with_extension("");
    for ext in ["shp", "shx", "dbf", "prj", "cpg", "qix"] {
        let file_path = base_path.with_extension(ext);
        if file_path.exists() {
            fs::remove_file(&file_path)
                .context(format!("Failed to remove existing file: {:?}", file_path))?;
        }
    }
    Ok(())
}
