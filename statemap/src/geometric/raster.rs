use anyhow::{Context, Result};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager};
use geo::{Coord, LineString, MultiPolygon};
use std::path::Path;

use crate::error::MapError;
use crate::geo_core::BoundingBox;

/// GDAL affine transform:
/// `x = gt[0] + col * gt[1] + row * gt[2]`, `y = gt[3] + col * gt[4] + row * gt[5]`
pub type GeoTransform = [f64; 6];

/// Storage type used when a raster is written back to GeoTIFF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Int16,
    Float32,
    Float64,
}

impl SampleType {
    fn from_gdal(data_type: GdalDataType) -> Self {
        match data_type {
            GdalDataType::UInt8 | GdalDataType::Int16 => SampleType::Int16,
            GdalDataType::UInt16 | GdalDataType::Float32 => SampleType::Float32,
            _ => SampleType::Float64,
        }
    }
}

/// Single-band georeferenced elevation grid
///
/// Only north-up transforms (no rotation terms) are supported.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    /// Row-major values, north to south, west to east
    pub data: Vec<f32>,
    pub transform: GeoTransform,
    /// Projection WKT, empty when unknown
    pub projection: String,
    pub no_data: Option<f64>,
    pub sample_type: SampleType,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        projection: String,
        no_data: Option<f64>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(MapError::InvalidInput(format!(
                "raster of {}x{} needs {} values, got {}",
                width,
                height,
                width * height,
                data.len()
            ))
            .into());
        }
        check_transform(&transform)?;
        Ok(Raster {
            width,
            height,
            data,
            transform,
            projection,
            no_data,
            sample_type: SampleType::Float32,
        })
    }

    /// Raster of `width × height` pixels all set to `value`
    pub fn filled(
        width: usize,
        height: usize,
        value: f64,
        transform: GeoTransform,
        projection: String,
        no_data: Option<f64>,
    ) -> Result<Self> {
        Raster::new(width, height, vec![value as f32; width * height], transform, projection, no_data)
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.data[row * self.width + col] as f64
    }

    pub fn set(&mut self, col: usize, row: usize, value: f64) {
        self.data[row * self.width + col] = value as f32;
    }

    /// True for the no-data value and for NaN
    pub fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data.map_or(false, |nd| value as f32 == nd as f32)
    }

    /// Pixel size in map units: (x, y), y negative for north-up
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.transform[1], self.transform[5])
    }

    /// Map coordinates of the center of pixel (`col`, `row`)
    pub fn pixel_center(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.transform[0] + (col + 0.5) * self.transform[1],
            self.transform[3] + (row + 0.5) * self.transform[5],
        )
    }

    /// Outer bounds of the raster (pixel edges)
    pub fn bounds(&self) -> BoundingBox {
        edge_bounds(&self.transform, self.width, self.height)
    }

    /// Georeferencing without the samples
    pub fn info(&self) -> RasterInfo {
        RasterInfo {
            width: self.width,
            height: self.height,
            transform: self.transform,
            projection: self.projection.clone(),
            no_data: self.no_data,
            sample_type: self.sample_type,
        }
    }

    /// Minimum and maximum valid values, `None` when every pixel is no-data
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .map(|v| *v as f64)
            .filter(|v| !self.is_no_data(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Pixel window `(col_off, row_off, cols, rows)`
    pub fn window(&self, col_off: usize, row_off: usize, cols: usize, rows: usize) -> Result<Raster> {
        if col_off + cols > self.width || row_off + rows > self.height {
            return Err(MapError::InvalidInput(format!(
                "window {}+{} x {}+{} exceeds raster of {}x{}",
                col_off, cols, row_off, rows, self.width, self.height
            ))
            .into());
        }
        let mut data = Vec::with_capacity(cols * rows);
        for row in row_off..row_off + rows {
            let start = row * self.width + col_off;
            data.extend_from_slice(&self.data[start..start + cols]);
        }
        let (dx, dy) = self.pixel_size();
        let mut transform = self.transform;
        transform[0] += col_off as f64 * dx;
        transform[3] += row_off as f64 * dy;

        Ok(Raster::new(cols, rows, data, transform, self.projection.clone(), self.no_data)?
            .with_sample_type(self.sample_type))
    }

    /// Mask with a polygon, crop enabled.
    ///
    /// The result covers the pixels spanned by the polygon's bounds
    /// (rounded outwards, limited to this raster). Pixels whose centers fall
    /// outside the polygon are set to the no-data value, or 0 when the
    /// raster has none. Fails with [`MapError::NoOverlap`] when no pixel
    /// center lies inside the polygon.
    pub fn mask(&self, shape: &MultiPolygon<f64>, index: usize) -> Result<Raster> {
        use geo::BoundingRect;

        let rect = shape.bounding_rect().ok_or(MapError::NoOverlap { index })?;
        let (dx, dy) = self.pixel_size();
        let col_start = clamp_index(((rect.min().x - self.transform[0]) / dx).floor(), self.width);
        let col_end = clamp_index(((rect.max().x - self.transform[0]) / dx).ceil(), self.width);
        let row_start = clamp_index(((rect.max().y - self.transform[3]) / dy).floor(), self.height);
        let row_end = clamp_index(((rect.min().y - self.transform[3]) / dy).ceil(), self.height);
        if col_end <= col_start || row_end <= row_start {
            return Err(MapError::NoOverlap { index }.into());
        }

        let mut cropped = self.window(col_start, row_start, col_end - col_start, row_end - row_start)?;
        let fill = cropped.no_data.unwrap_or(0.0) as f32;
        let inside = rasterize_even_odd(shape, &cropped);
        if !inside.iter().any(|v| *v) {
            return Err(MapError::NoOverlap { index }.into());
        }
        for (value, keep) in cropped.data.iter_mut().zip(inside) {
            if !keep {
                *value = fill;
            }
        }
        Ok(cropped)
    }

    /// Read band 1 of a GDAL-readable raster
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Dataset::open(path).map_err(|e| {
            MapError::collaborator("GDAL", format!("unable to open {}: {}", path.display(), e))
        })?;
        Raster::from_dataset(&dataset).context(format!("Failed to read raster {:?}", path))
    }

    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        let transform = dataset.geo_transform().context("Raster has no geotransform")?;
        let projection = dataset.projection();

        let band = dataset.rasterband(1).context("Failed to get band 1")?;
        let no_data = band.no_data_value();
        let sample_type = SampleType::from_gdal(band.band_type());
        let buffer = band
            .read_as::<f32>((0, 0), (width, height), (width, height), None)
            .context("Failed to read band 1")?;

        Ok(Raster::new(width, height, buffer.data().to_vec(), transform, projection, no_data)?
            .with_sample_type(sample_type))
    }

    /// Write the raster as a single-band GeoTIFF, replacing any existing file
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create output directory: {:?}", parent))?;
            }
        }
        if path.exists() {
            std::fs::remove_file(path)
                .context(format!("Failed to remove existing file: {:?}", path))?;
        }

        match self.sample_type {
            SampleType::Int16 => self.write_band::<i16, _>(path, |v| v.round() as i16),
            SampleType::Float32 => self.write_band::<f32, _>(path, |v| v),
            SampleType::Float64 => self.write_band::<f64, _>(path, |v| v as f64),
        }
        .map_err(|e| MapError::collaborator("GDAL", format!("unable to write {}: {:#}", path.display(), e)))?;

        Ok(())
    }

    fn write_band<T, F>(&self, path: &Path, convert: F) -> Result<()>
    where
        T: GdalType + Copy,
        F: Fn(f32) -> T,
    {
        let driver = DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;
        let mut dataset = driver
            .create_with_band_type::<T, _>(path, self.width, self.height, 1)
            .context("Failed to create GeoTIFF dataset")?;
        dataset
            .set_geo_transform(&self.transform)
            .context("Failed to set geotransform")?;
        if !self.projection.is_empty() {
            dataset
                .set_projection(&self.projection)
                .context("Failed to set projection")?;
        }

        let mut band = dataset.rasterband(1).context("Failed to get output band")?;
        if let Some(no_data) = self.no_data {
            band.set_no_data_value(Some(no_data))
                .context("Failed to set no data value")?;
        }
        let mut buffer = Buffer::new(
            (self.width, self.height),
            self.data.iter().map(|v| convert(*v)).collect::<Vec<T>>(),
        );
        band.write((0, 0), (self.width, self.height), &mut buffer)
            .context("Failed to write band 1")?;

        Ok(())
    }
}

/// Header of a GeoTIFF: size, georeferencing and band metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub projection: String,
    pub no_data: Option<f64>,
    pub sample_type: SampleType,
}

impl RasterInfo {
    /// Read the header of band 1 without reading any sample
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Dataset::open(path).map_err(|e| {
            MapError::collaborator("GDAL", format!("unable to open {}: {}", path.display(), e))
        })?;
        let (width, height) = dataset.raster_size();
        let transform = dataset
            .geo_transform()
            .context(format!("Raster {:?} has no geotransform", path))?;
        check_transform(&transform)?;
        let band = dataset
            .rasterband(1)
            .context(format!("Failed to get band 1 of {:?}", path))?;

        Ok(RasterInfo {
            width,
            height,
            transform,
            projection: dataset.projection(),
            no_data: band.no_data_value(),
            sample_type: SampleType::from_gdal(band.band_type()),
        })
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.transform[1], self.transform[5])
    }

    pub fn bounds(&self) -> BoundingBox {
        edge_bounds(&self.transform, self.width, self.height)
    }
}

/// Only north-up transforms with a positive pixel width
fn check_transform(transform: &GeoTransform) -> Result<()> {
    if transform[2] != 0.0 || transform[4] != 0.0 {
        return Err(MapError::InvalidInput(
            "rotated geotransforms are not supported".to_string(),
        )
        .into());
    }
    if transform[1] <= 0.0 || transform[5] >= 0.0 {
        return Err(MapError::InvalidInput(format!(
            "geotransform must be north-up with positive pixel width, got {:?}",
            transform
        ))
        .into());
    }
    Ok(())
}

fn edge_bounds(transform: &GeoTransform, width: usize, height: usize) -> BoundingBox {
    let (min_x, dx) = (transform[0], transform[1]);
    let (max_y, dy) = (transform[3], transform[5]);
    BoundingBox::new(min_x, max_y + height as f64 * dy, min_x + width as f64 * dx, max_y)
}

fn clamp_index(value: f64, max: usize) -> usize {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value as usize).min(max)
    }
}

/// Pixels of `raster` whose centers lie inside `shape` (even-odd rule over
/// all rings), by scanline crossing.
fn rasterize_even_odd(shape: &MultiPolygon<f64>, raster: &Raster) -> Vec<bool> {
    let rings: Vec<&LineString<f64>> = shape
        .0
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .collect();
    let (dx, _) = raster.pixel_size();
    let x0 = raster.transform[0];

    let mut inside = vec![false; raster.width * raster.height];
    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..raster.height {
        let (_, y) = raster.pixel_center(0.0, row as f64);
        crossings.clear();
        for ring in &rings {
            for line in ring.lines() {
                let (a, b): (Coord<f64>, Coord<f64>) = (line.start, line.end);
                if (a.y <= y) != (b.y <= y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let start = clamp_index(((pair[0] - x0) / dx - 0.5).ceil(), raster.width);
            let end = clamp_index(((pair[1] - x0) / dx - 0.5).ceil(), raster.width);
            for col in start..end {
                inside[row * raster.width + col] = true;
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Polygon};

    /// 4x4 raster on [0, 4] x [0, 4], values = row * 10 + col
    fn sample() -> Raster {
        let data = (0..16).map(|i| ((i / 4) * 10 + i % 4) as f32).collect();
        Raster::new(4, 4, data, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0], String::new(), Some(-9999.0))
            .unwrap()
    }

    #[test]
    fn test_bounds_and_centers() {
        let raster = sample();
        assert_eq!(raster.bounds(), BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        assert_eq!(raster.pixel_center(0.0, 0.0), (0.5, 3.5));
        assert_eq!(raster.value_range(), Some((0.0, 33.0)));
    }

    #[test]
    fn test_new_rejects_bad_shapes() {
        assert!(Raster::new(2, 2, vec![0.0; 3], [0.0, 1.0, 0.0, 2.0, 0.0, -1.0], String::new(), None).is_err());
        assert!(Raster::new(1, 1, vec![0.0], [0.0, 1.0, 0.5, 2.0, 0.0, -1.0], String::new(), None).is_err());
    }

    #[test]
    fn test_mask_crops_and_fills_outside() {
        let raster = sample();
        // Quadrilateral inside [0,2] x [0,2] leaving out the top-right corner
        let shape: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 1.2, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];
        let masked = raster.mask(&MultiPolygon::new(vec![shape]), 0).unwrap();
        assert_eq!((masked.width, masked.height), (2, 2));
        assert_eq!(masked.transform, [0.0, 1.0, 0.0, 2.0, 0.0, -1.0]);
        // Row 2 and 3 of the source; only the top-right center (1.5, 1.5) is outside
        assert_eq!(masked.data, vec![20.0, -9999.0, 30.0, 31.0]);
    }

    #[test]
    fn test_mask_respects_holes() {
        let raster = sample();
        let outer = BoundingBox::new(0.0, 0.0, 4.0, 4.0).to_polygon();
        let hole = BoundingBox::new(1.0, 1.0, 3.0, 3.0).to_polygon();
        let donut = Polygon::new(outer.exterior().clone(), vec![hole.exterior().clone()]);
        let masked = raster.mask(&MultiPolygon::new(vec![donut]), 0).unwrap();
        assert_eq!(masked.get(0, 0), 0.0);
        assert_eq!(masked.get(1, 1), -9999.0);
        assert_eq!(masked.get(2, 2), -9999.0);
        assert_eq!(masked.get(3, 3), 33.0);
    }

    #[test]
    fn test_mask_without_overlap() {
        let raster = sample();
        let far = BoundingBox::new(20.0, 20.0, 21.0, 21.0).to_polygon();
        let err = raster.mask(&MultiPolygon::new(vec![far]), 7).unwrap_err();
        assert_eq!(err.downcast_ref::<MapError>(), Some(&MapError::NoOverlap { index: 7 }));
    }

    #[test]
    fn test_geotiff_round_trip_preserves_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        let raster = sample().with_sample_type(SampleType::Int16);
        raster.write_geotiff(&path).unwrap();

        let read = Raster::from_file(&path).unwrap();
        assert_eq!(read.width, 4);
        assert_eq!(read.transform, raster.transform);
        assert_eq!(read.no_data, Some(-9999.0));
        assert_eq!(read.sample_type, SampleType::Int16);
        assert_eq!(read.data, raster.data);
    }

    #[test]
    fn test_info_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        let raster = sample().with_sample_type(SampleType::Int16);
        raster.write_geotiff(&path).unwrap();

        let info = RasterInfo::from_file(&path).unwrap();
        assert_eq!(info, raster.info());
        assert_eq!(info.bounds(), BoundingBox::new(0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn test_open_missing_file_is_collaborator_error() {
        let err = Raster::from_file("/nonexistent/tile.tif").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::Collaborator { .. })
        ));
    }
}
