use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collect::global_variables::{SRTM_BASE_URL, SRTM_NO_DATA, USER_AGENT};
use crate::collect::ElevationSource;
use crate::error::MapError;
use crate::geo_core::{BoundingBox, GeoCore};
use crate::geometric::raster::{Raster, SampleType};

/// SRTM product: samples per degree of the output grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtmProduct {
    /// 1 arc-second (~30 m)
    Srtm1,
    /// 3 arc-second (~90 m)
    Srtm3,
}

impl SrtmProduct {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SRTM1" => Ok(SrtmProduct::Srtm1),
            "SRTM3" => Ok(SrtmProduct::Srtm3),
            other => Err(MapError::InvalidInput(format!(
                "unknown elevation product '{}' (expected SRTM1 or SRTM3)",
                other
            ))
            .into()),
        }
    }

    pub fn samples_per_degree(&self) -> i64 {
        match self {
            SrtmProduct::Srtm1 => 3600,
            SrtmProduct::Srtm3 => 1200,
        }
    }
}

/// A decoded `.hgt` cell: `side × side` big-endian i16 samples, row 0 on
/// the northern edge, samples on the cell's edges shared with neighbours.
#[derive(Debug, Clone)]
pub struct HgtCell {
    pub side: usize,
    pub data: Vec<i16>,
}

impl HgtCell {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let samples = bytes.len() / 2;
        let side = (samples as f64).sqrt().round() as usize;
        if side < 2 || side * side * 2 != bytes.len() {
            return Err(MapError::collaborator(
                "SRTM",
                format!("invalid HGT size: {} bytes", bytes.len()),
            )
            .into());
        }
        let data = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(HgtCell { side, data })
    }

    /// Sample at fractional position (`u` east, `v` south) in [0, 1]
    fn sample(&self, u: f64, v: f64) -> i16 {
        let last = (self.side - 1) as f64;
        let col = (u * last).round().clamp(0.0, last) as usize;
        let row = (v * last).round().clamp(0.0, last) as usize;
        self.data[row * self.side + col]
    }
}

/// Name of the 1°×1° cell whose south-west corner is (`lat`, `lon`), e.g. `N29W099`
pub fn cell_name(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { "N" } else { "S" };
    let lon_prefix = if lon >= 0 { "E" } else { "W" };
    format!("{}{:02}{}{:03}", lat_prefix, lat.abs(), lon_prefix, lon.abs())
}

/// SRTM cells (south-west corners as (lat, lon)) touched by `bbox`
pub fn cells_for_bbox(bbox: &BoundingBox) -> Vec<(i32, i32)> {
    let min_lat = bbox.min_y.floor() as i32;
    let max_lat = bbox.max_y.ceil() as i32;
    let min_lon = bbox.min_x.floor() as i32;
    let max_lon = bbox.max_x.ceil() as i32;

    let mut cells = Vec::new();
    for lat in min_lat..max_lat.max(min_lat + 1) {
        for lon in min_lon..max_lon.max(min_lon + 1) {
            cells.push((lat, lon));
        }
    }
    cells
}

/// SRTM tiles from the AWS Open Data mirror
///
/// Compressed downloads go to `<cache_root>/spool/`, decompressed cells to
/// `<cache_root>/cache/`. Cells stay cached between tiles; the spool is
/// emptied by [`ElevationSource::clean`].
pub struct SrtmCollect {
    client: Client,
    base_url: String,
    cache_root: PathBuf,
    product: SrtmProduct,
    pub geo_core: GeoCore,
}

impl SrtmCollect {
    pub fn new<P: AsRef<Path>>(cache_root: P, product: SrtmProduct) -> Result<Self> {
        SrtmCollect::with_options(cache_root, product, SRTM_BASE_URL, USER_AGENT, 300)
    }

    pub fn with_options<P: AsRef<Path>>(
        cache_root: P,
        product: SrtmProduct,
        base_url: &str,
        user_agent: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(SrtmCollect {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_root: cache_root.as_ref().to_path_buf(),
            product,
            geo_core: GeoCore::default(),
        })
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.cache_root.join("spool")
    }

    pub fn cell_dir(&self) -> PathBuf {
        self.cache_root.join("cache")
    }

    /// `<base>/N29/N29W099.hgt.gz`
    pub fn cell_url(&self, lat: i32, lon: i32) -> String {
        let name = cell_name(lat, lon);
        format!("{}/{}/{}.hgt.gz", self.base_url, &name[0..3], name)
    }

    /// Decoded cell, downloading it when it is not cached yet.
    /// `None` means the mirror has no such cell (open water).
    fn load_cell(&self, lat: i32, lon: i32) -> Result<Option<HgtCell>> {
        let name = cell_name(lat, lon);
        let hgt_path = self.cell_dir().join(format!("{}.hgt", name));

        if !hgt_path.exists() && !self.download_cell(lat, lon, &hgt_path)? {
            return Ok(None);
        }

        let mut buffer = Vec::new();
        File::open(&hgt_path)
            .and_then(|mut f| f.read_to_end(&mut buffer))
            .context(format!("Failed to read HGT file: {:?}", hgt_path))?;
        HgtCell::from_bytes(&buffer)
            .context(format!("Failed to decode {:?}", hgt_path))
            .map(Some)
    }

    /// Fetch and decompress one cell. Returns false on HTTP 404.
    fn download_cell(&self, lat: i32, lon: i32, hgt_path: &Path) -> Result<bool> {
        let url = self.cell_url(lat, lon);
        log::info!("Downloading SRTM cell from: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| MapError::collaborator("SRTM", format!("request to {} failed: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            log::warn!("No SRTM cell {} on the mirror, treating it as no-data", cell_name(lat, lon));
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(MapError::collaborator(
                "SRTM",
                format!("HTTP {} for {}", response.status(), url),
            )
            .into());
        }
        let content = response
            .bytes()
            .map_err(|e| MapError::collaborator("SRTM", format!("reading {} failed: {}", url, e)))?;

        create_dir_all(self.spool_dir())
            .context(format!("Failed to create spool directory: {:?}", self.spool_dir()))?;
        create_dir_all(self.cell_dir())
            .context(format!("Failed to create cell cache: {:?}", self.cell_dir()))?;

        let spool_path = self.spool_dir().join(format!("{}.hgt.gz", cell_name(lat, lon)));
        std::fs::write(&spool_path, &content)
            .context(format!("Failed to write file: {:?}", spool_path))?;

        let mut decoder = GzDecoder::new(&content[..]);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| MapError::collaborator("SRTM", format!("failed to decompress {}: {}", url, e)))?;
        std::fs::write(hgt_path, &decompressed)
            .context(format!("Failed to write file: {:?}", hgt_path))?;

        Ok(true)
    }

    /// Assemble the cells covering `bbox` into one raster cropped to it.
    ///
    /// The output grid has pixel centers on whole multiples of the product
    /// resolution; its edges are the pixel edges nearest to the box edges.
    pub fn assemble(&self, bbox: &BoundingBox) -> Result<Raster> {
        let mut cells = HashMap::new();
        for (lat, lon) in cells_for_bbox(bbox) {
            cells.insert((lat, lon), self.load_cell(lat, lon)?);
        }
        assemble_cells(bbox, self.product, &cells, self.geo_core.wkt()?)
    }
}

/// Cells holding global sample `k` with its fractional position inside each.
///
/// A sample on a whole degree sits on the shared edge of two cells: the one
/// starting there and the one ending there (`.hgt` cells repeat edge samples).
fn edge_candidates(k: i64, n: i64, position: impl Fn(f64) -> f64) -> [Option<(i32, f64)>; 2] {
    let cell = k.div_euclid(n) as i32;
    let rem = k.rem_euclid(n) as f64 / n as f64;
    let previous = if rem == 0.0 {
        Some((cell - 1, position(1.0)))
    } else {
        None
    };
    [Some((cell, position(rem))), previous]
}

/// Build the raster covering `bbox` from decoded cells keyed by south-west
/// corner. Missing cells produce no-data pixels.
pub fn assemble_cells(
    bbox: &BoundingBox,
    product: SrtmProduct,
    cells: &HashMap<(i32, i32), Option<HgtCell>>,
    projection: String,
) -> Result<Raster> {
    bbox.validate()?;
    let n = product.samples_per_degree();
    let nf = n as f64;

    // Global sample index k has its center at k / n degrees
    let col_start = (bbox.min_x * nf + 0.5).round() as i64;
    let col_end = (bbox.max_x * nf + 0.5).round() as i64;
    let lat_start = (bbox.min_y * nf + 0.5).round() as i64;
    let lat_end = (bbox.max_y * nf + 0.5).round() as i64;
    let width = (col_end - col_start).max(1) as usize;
    let height = (lat_end - lat_start).max(1) as usize;

    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let k_lat = lat_start + (height - 1 - row) as i64;
        let lat_candidates = edge_candidates(k_lat, n, |r| 1.0 - r);
        for col in 0..width {
            let k_lon = col_start + col as i64;
            let lon_candidates = edge_candidates(k_lon, n, |r| r);
            let value = lat_candidates
                .iter()
                .flatten()
                .flat_map(|&(cell_lat, v)| {
                    lon_candidates
                        .iter()
                        .flatten()
                        .map(move |&(cell_lon, u)| (cell_lat, v, cell_lon, u))
                })
                .find_map(|(cell_lat, v, cell_lon, u)| match cells.get(&(cell_lat, cell_lon)) {
                    Some(Some(cell)) => Some(cell.sample(u, v) as f32),
                    _ => None,
                })
                .unwrap_or(SRTM_NO_DATA as f32);
            data.push(value);
        }
    }

    let transform = [
        (col_start as f64 - 0.5) / nf,
        1.0 / nf,
        0.0,
        (lat_start as f64 + height as f64 - 0.5) / nf,
        0.0,
        -1.0 / nf,
    ];
    Ok(Raster::new(width, height, data, transform, projection, Some(SRTM_NO_DATA))?
        .with_sample_type(SampleType::Int16))
}

impl ElevationSource for SrtmCollect {
    fn fetch(&self, bbox: &BoundingBox, output: &Path) -> Result<()> {
        let raster = self
            .assemble(bbox)
            .context(format!("Failed to assemble SRTM data for {:?}", bbox))?;
        raster.write_geotiff(output)?;
        log::debug!(
            "Wrote {}x{} SRTM tile to {:?}",
            raster.width,
            raster.height,
            output
        );
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let spool = self.spool_dir();
        if spool.exists() {
            std::fs::remove_dir_all(&spool)
                .context(format!("Failed to clean spool directory: {:?}", spool))?;
        }
        Ok(())
    }
}
