use anyhow::Result;
use statemap::collect::global_variables::{default_cache_root, DEFAULT_PRODUCT};
use statemap::collect::srtm::{SrtmCollect, SrtmProduct};
use statemap::collect::ElevationSource;
use statemap::geo_core::BoundingBox;
use statemap::geometric::raster::Raster;

/// Example: one SRTM1 tile around Austin, Texas
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("=== Example: SRTM tile download ===\n");

    let cache_root = default_cache_root(DEFAULT_PRODUCT);
    let srtm = SrtmCollect::new(&cache_root, SrtmProduct::Srtm1)?;

    let bbox = BoundingBox::try_new(-97.9, 30.1, -97.6, 30.4)?;
    let output = cache_root.join("austin_example.tif");
    srtm.fetch(&bbox, &output)?;
    srtm.clean()?;

    let raster = Raster::from_file(&output)?;
    println!("Tile saved to {:?}", output);
    println!("  - Size: {}x{} pixels", raster.width, raster.height);
    if let Some((lo, hi)) = raster.value_range() {
        println!("  - Elevation: {} m to {} m", lo, hi);
    }

    Ok(())
}
