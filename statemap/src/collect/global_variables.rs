use std::path::PathBuf;

pub const TEMP_PATH: &str = "./temp";

/// Elevation product downloaded by default
pub const DEFAULT_PRODUCT: &str = "SRTM1";

/// AWS Open Data mirror of SRTM cells (`<lat>/<cell>.hgt.gz`)
pub const SRTM_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// OpenStreetMap geocoder
pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

pub const USER_AGENT: &str = concat!("statemap/", env!("CARGO_PKG_VERSION"));

/// No-data value used by SRTM `.hgt` cells
pub const SRTM_NO_DATA: f64 = -32768.0;

/// Contour levels generated when no other levels are configured
pub const DEFAULT_CONTOUR_LEVELS: [f64; 7] = [0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 527.0];

pub const DEFAULT_CONTOUR_INTERVAL: f64 = 10.0;

pub const DEFAULT_ELEVATION_ATTRIBUTE: &str = "elev";

/// Longer side of the SVG canvas, in pixels
pub const DEFAULT_BASE_DIMENSION: u32 = 1000;

/// Dark slate contour stroke
pub const DEFAULT_STROKE: &str = "rgb(10%,10%,16%)";

pub const DEFAULT_FONT_SIZE: &str = "20px";

pub const DEFAULT_FONT_FAMILY: &str = "Roboto Mono";

/// Distance between the label baseline and the bottom edge, in pixels
pub const DEFAULT_LABEL_OFFSET: f64 = 20.0;

pub const DEFAULT_SIMPLIFICATION_TOLERANCE: f64 = 0.001;

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}

/// Tile cache root: `$HOME/.cache/elevation/<product>`, or `./temp/<product>`
/// when no home directory is known.
pub fn default_cache_root(product: &str) -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".cache")
            .join("elevation")
            .join(product),
        _ => get_temp_path().join(product),
    }
}
