use anyhow::{Context, Result};
use std::path::PathBuf;

use statemap::geometric::contour::{extract_contours, ContourOptions};
use statemap::geometric::raster::Raster;
use statemap::geometric::svg::{render_contours, SvgOptions};

/// Example: contour SVG from an existing elevation GeoTIFF
///
/// cargo run --example contours_from_tiff -- merged_texas_elevation.tif texas
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().context("usage: contours_from_tiff <input.tif> [label]")?);
    let label = args.next().unwrap_or_else(|| "elevation".to_string());

    let raster = Raster::from_file(&input)?;
    let options = ContourOptions {
        fixed_levels: Vec::new(),
        interval: 100.0,
        ..ContourOptions::default()
    };
    let contours = extract_contours(&raster, &options)?;
    println!("{} contour lines at levels {:?}", contours.len(), contours.levels());

    let drawing = render_contours(&contours, &label, &SvgOptions::default())?;
    let output = input.with_extension("svg");
    drawing.save(&output)?;
    println!("SVG saved to {:?} ({}x{})", output, drawing.width, drawing.height);

    Ok(())
}
