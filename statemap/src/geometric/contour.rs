//! Contour line extraction by marching squares.
//!
//! Samples sit on pixel centers; each 2x2 block of samples is a cell.
//! Crossings are interpolated linearly along cell edges and segments are
//! chained through the edges they share, so lines join exactly without any
//! distance tolerance.

use anyhow::{Context, Result};
use geo::{Coord, Geometry, LineString};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::collect::global_variables::{
    DEFAULT_CONTOUR_INTERVAL, DEFAULT_CONTOUR_LEVELS, DEFAULT_ELEVATION_ATTRIBUTE,
};
use crate::commons::housekeeping::remove_shapefile;
use crate::commons::ogr::{geojson_to_shapefile, shapefile_to_geojson};
use crate::error::MapError;
use crate::geo_core::BoundingBox;
use crate::geometric::raster::Raster;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourOptions {
    /// Spacing between levels, used when `fixed_levels` is empty
    pub interval: f64,
    /// Explicit levels; take priority over `interval`
    pub fixed_levels: Vec<f64>,
    /// Name of the elevation attribute in the output shapefile
    pub attribute_name: String,
    /// Skip cells touching the raster's no-data value
    pub use_no_data: bool,
}

impl Default for ContourOptions {
    fn default() -> Self {
        ContourOptions {
            interval: DEFAULT_CONTOUR_INTERVAL,
            fixed_levels: DEFAULT_CONTOUR_LEVELS.to_vec(),
            attribute_name: DEFAULT_ELEVATION_ATTRIBUTE.to_string(),
            use_no_data: false,
        }
    }
}

/// One polyline at a single elevation
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLine {
    pub elevation: f64,
    pub line: LineString<f64>,
}

impl ContourLine {
    pub fn is_closed(&self) -> bool {
        self.line.is_closed()
    }
}

/// Contour lines ordered by level, then by discovery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourSet(pub Vec<ContourLine>);

impl ContourSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContourLine> {
        self.0.iter()
    }

    /// Distinct elevations present, ascending
    pub fn levels(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = self.0.iter().map(|c| c.elevation).collect();
        levels.dedup();
        levels
    }

    /// Bounds of every vertex, `None` for an empty set
    pub fn bounds(&self) -> Option<BoundingBox> {
        use geo::BoundingRect;

        self.0
            .iter()
            .filter_map(|c| c.line.bounding_rect())
            .map(BoundingBox::from_rect)
            .reduce(|acc, b| acc.union(&b))
    }

    /// FeatureCollection of LineStrings carrying the elevation as
    /// `attribute_name`
    pub fn to_geojson(&self, attribute_name: &str) -> GeoJson {
        let features = self
            .0
            .iter()
            .map(|contour| {
                let mut properties = JsonObject::new();
                properties.insert(attribute_name.to_string(), serde_json::json!(contour.elevation));
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(Value::from(&contour.line))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    /// Lines from a GeoJSON document; multi-part lines are split into
    /// their parts and features without `attribute_name` get elevation 0.
    pub fn from_geojson(geojson: &GeoJson, attribute_name: &str) -> ContourSet {
        let features: Vec<&Feature> = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features.iter().collect(),
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => Vec::new(),
        };

        let mut lines = Vec::new();
        for feature in features {
            let elevation = feature
                .property(attribute_name)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            let geometry: Geometry<f64> = match geometry.value.clone().try_into() {
                Ok(geometry) => geometry,
                Err(_) => continue,
            };
            match geometry {
                Geometry::LineString(line) => lines.push(ContourLine { elevation, line }),
                Geometry::MultiLineString(multi) => {
                    lines.extend(multi.0.into_iter().map(|line| ContourLine { elevation, line }))
                }
                _ => {}
            }
        }
        ContourSet(lines)
    }
}

/// Levels to extract for data spanning `[min, max]`.
///
/// Non-empty `fixed_levels` are used as given (sorted, duplicates
/// removed) and the interval is ignored. Otherwise every multiple of
/// `interval` inside the range.
pub fn contour_levels(min: f64, max: f64, options: &ContourOptions) -> Result<Vec<f64>> {
    if !options.fixed_levels.is_empty() {
        let mut levels: Vec<f64> = options
            .fixed_levels
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        return Ok(levels);
    }

    let interval = options.interval;
    if !(interval.is_finite() && interval > 0.0) {
        return Err(MapError::InvalidInput(format!(
            "contour interval must be positive, got {}",
            interval
        ))
        .into());
    }
    if !(min.is_finite() && max.is_finite()) || max < min {
        return Ok(Vec::new());
    }

    let first = (min / interval).ceil() as i64;
    let last = (max / interval).floor() as i64;
    Ok((first..=last).map(|k| k as f64 * interval).collect())
}

/// Crossing position on a cell edge.
/// `H(r, c)` joins samples (r, c) and (r, c+1), `V(r, c)` joins (r, c) and (r+1, c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    H(usize, usize),
    V(usize, usize),
}

/// Extract the contour lines of `raster`.
///
/// With `use_no_data` unset the no-data value is treated as an ordinary
/// elevation, which outlines masked areas with the lowest level. NaN
/// samples always break lines.
pub fn extract_contours(raster: &Raster, options: &ContourOptions) -> Result<ContourSet> {
    let skip = |v: f64| v.is_nan() || (options.use_no_data && raster.is_no_data(v));

    let range = raster
        .data
        .iter()
        .map(|v| *v as f64)
        .filter(|v| !skip(*v))
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
    let Some((min, max)) = range else {
        return Ok(ContourSet::default());
    };
    if raster.width < 2 || raster.height < 2 {
        return Ok(ContourSet::default());
    }

    let mut lines = Vec::new();
    for level in contour_levels(min, max, options)? {
        if level < min || level > max {
            continue;
        }
        lines.extend(trace_level(raster, level, &skip).into_iter().map(|line| ContourLine {
            elevation: level,
            line,
        }));
    }
    log::debug!("Extracted {} contour lines between {} and {}", lines.len(), min, max);
    Ok(ContourSet(lines))
}

fn trace_level<F>(raster: &Raster, level: f64, skip: &F) -> Vec<LineString<f64>>
where
    F: Fn(f64) -> bool,
{
    let mut segments: Vec<(Edge, Edge)> = Vec::new();
    let mut points: HashMap<Edge, Coord<f64>> = HashMap::new();

    let crossing = |edge: Edge| -> Coord<f64> {
        let (a, b, col, row, horizontal) = match edge {
            Edge::H(r, c) => (raster.get(c, r), raster.get(c + 1, r), c, r, true),
            Edge::V(r, c) => (raster.get(c, r), raster.get(c, r + 1), c, r, false),
        };
        let t = ((level - a) / (b - a)).clamp(0.0, 1.0);
        let (x, y) = if horizontal {
            raster.pixel_center(col as f64 + t, row as f64)
        } else {
            raster.pixel_center(col as f64, row as f64 + t)
        };
        Coord { x, y }
    };

    for r in 0..raster.height - 1 {
        for c in 0..raster.width - 1 {
            let tl = raster.get(c, r);
            let tr = raster.get(c + 1, r);
            let br = raster.get(c + 1, r + 1);
            let bl = raster.get(c, r + 1);
            if skip(tl) || skip(tr) || skip(br) || skip(bl) {
                continue;
            }

            let mut case = 0u8;
            if tl >= level {
                case |= 1;
            }
            if tr >= level {
                case |= 2;
            }
            if br >= level {
                case |= 4;
            }
            if bl >= level {
                case |= 8;
            }

            let top = Edge::H(r, c);
            let bottom = Edge::H(r + 1, c);
            let left = Edge::V(r, c);
            let right = Edge::V(r, c + 1);
            let center_above = (tl + tr + br + bl) / 4.0 >= level;

            let cell: [Option<(Edge, Edge)>; 2] = match case {
                1 | 14 => [Some((left, top)), None],
                2 | 13 => [Some((top, right)), None],
                3 | 12 => [Some((left, right)), None],
                4 | 11 => [Some((right, bottom)), None],
                6 | 9 => [Some((top, bottom)), None],
                7 | 8 => [Some((left, bottom)), None],
                // tl and br above
                5 if center_above => [Some((top, right)), Some((left, bottom))],
                5 => [Some((left, top)), Some((right, bottom))],
                // tr and bl above
                10 if center_above => [Some((left, top)), Some((right, bottom))],
                10 => [Some((top, right)), Some((left, bottom))],
                _ => [None, None],
            };
            for (a, b) in cell.into_iter().flatten() {
                points.entry(a).or_insert_with(|| crossing(a));
                points.entry(b).or_insert_with(|| crossing(b));
                segments.push((a, b));
            }
        }
    }

    chain_segments(&segments, &points)
}

/// Join segments sharing an edge into polylines, in discovery order
fn chain_segments(segments: &[(Edge, Edge)], points: &HashMap<Edge, Coord<f64>>) -> Vec<LineString<f64>> {
    let mut by_edge: HashMap<Edge, Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        by_edge.entry(*a).or_default().push(i);
        by_edge.entry(*b).or_default().push(i);
    }

    let mut used: HashSet<usize> = HashSet::new();
    let next_from = |edge: Edge, used: &HashSet<usize>| -> Option<(usize, Edge)> {
        by_edge.get(&edge)?.iter().find(|&&i| !used.contains(&i)).map(|&i| {
            let (a, b) = segments[i];
            (i, if a == edge { b } else { a })
        })
    };

    let mut lines = Vec::new();
    for start in 0..segments.len() {
        if !used.insert(start) {
            continue;
        }
        let (first, second) = segments[start];
        let mut chain = std::collections::VecDeque::from([first, second]);

        let mut tail = second;
        while let Some((i, edge)) = next_from(tail, &used) {
            used.insert(i);
            chain.push_back(edge);
            tail = edge;
        }
        let mut head = first;
        while let Some((i, edge)) = next_from(head, &used) {
            used.insert(i);
            chain.push_front(edge);
            head = edge;
        }

        let coords: Vec<Coord<f64>> = chain.iter().filter_map(|e| points.get(e).copied()).collect();
        if coords.len() >= 2 {
            lines.push(LineString::new(coords));
        }
    }
    lines
}

/// Write contour lines to a line-string shapefile
pub fn write_contours_shapefile(contours: &ContourSet, output_shp: &Path, attribute_name: &str) -> Result<()> {
    let layer_name = output_shp
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("contours");
    geojson_to_shapefile(&contours.to_geojson(attribute_name), output_shp, layer_name)
        .context(format!("Failed to write contours to {:?}", output_shp))
}

/// Read contour lines back from a shapefile, elevations from `attribute_name`
pub fn read_contours_shapefile(input_shp: &Path, attribute_name: &str) -> Result<ContourSet> {
    let geojson = shapefile_to_geojson(input_shp)
        .context(format!("Failed to read contours from {:?}", input_shp))?;
    Ok(ContourSet::from_geojson(&geojson, attribute_name))
}

/// Contour a GeoTIFF into a shapefile.
///
/// Any shapefile set already at `output_shp` is replaced. Failing to open
/// the raster is an error.
pub fn generate_contours(input_tif: &Path, output_shp: &Path, options: &ContourOptions) -> Result<ContourSet> {
    let raster = Raster::from_file(input_tif)?;
    remove_shapefile(output_shp)?;

    let contours = extract_contours(&raster, options)?;
    write_contours_shapefile(&contours, output_shp, &options.attribute_name)?;

    log::info!(
        "Contour lines generated at levels {:?}: {} lines -> {:?}",
        contours.levels(),
        contours.len(),
        output_shp
    );
    Ok(contours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn raster(width: usize, height: usize, data: Vec<f32>) -> Raster {
        Raster::new(
            width,
            height,
            data,
            [0.0, 1.0, 0.0, height as f64, 0.0, -1.0],
            String::new(),
            Some(-32768.0),
        )
        .unwrap()
    }

    fn interval(step: f64) -> ContourOptions {
        ContourOptions {
            interval: step,
            fixed_levels: Vec::new(),
            ..ContourOptions::default()
        }
    }

    #[test]
    fn test_levels_from_interval() {
        let levels = contour_levels(3.0, 41.0, &interval(10.0)).unwrap();
        assert_eq!(levels, vec![10.0, 20.0, 30.0, 40.0]);
        assert!(contour_levels(0.0, 1.0, &interval(0.0)).is_err());
    }

    #[test]
    fn test_fixed_levels_take_priority() {
        let options = ContourOptions {
            interval: 1.0,
            fixed_levels: vec![500.0, 0.0, 100.0, 100.0],
            ..ContourOptions::default()
        };
        let levels = contour_levels(0.0, 1000.0, &options).unwrap();
        assert_eq!(levels, vec![0.0, 100.0, 500.0]);
    }

    #[test]
    fn test_flat_raster_has_no_contours() {
        let r = raster(3, 3, vec![5.0; 9]);
        let set = extract_contours(&r, &interval(10.0)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_ramp_gives_straight_line() {
        // Elevation grows eastward: 0, 10, 20, 30
        let row = [0.0, 10.0, 20.0, 30.0];
        let data: Vec<f32> = (0..3).flat_map(|_| row).collect();
        let r = raster(4, 3, data);
        let options = ContourOptions {
            fixed_levels: vec![15.0],
            ..ContourOptions::default()
        };
        let set = extract_contours(&r, &options).unwrap();
        assert_eq!(set.len(), 1);
        let line = &set.0[0];
        assert_eq!(line.elevation, 15.0);
        assert_eq!(line.line.0.len(), 3);
        for coord in line.line.coords() {
            // Halfway between the centers of columns 1 and 2
            assert_abs_diff_eq!(coord.x, 2.0, epsilon = 1e-12);
        }
        assert!(!line.is_closed());
    }

    #[test]
    fn test_peak_gives_closed_ring() {
        let mut data = vec![0.0; 25];
        data[12] = 100.0;
        let r = raster(5, 5, data);
        let options = ContourOptions {
            fixed_levels: vec![50.0],
            ..ContourOptions::default()
        };
        let set = extract_contours(&r, &options).unwrap();
        assert_eq!(set.len(), 1);
        let ring = &set.0[0];
        assert!(ring.is_closed());
        assert_eq!(ring.line.0.len(), 5);
    }

    #[test]
    fn test_no_data_fill_outlines_mask() {
        // Masked border around a 300 m plateau
        let nd = -32768.0;
        let mut data = vec![nd; 16];
        for (c, r) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            data[r * 4 + c] = 300.0;
        }
        let r = raster(4, 4, data);

        let outlined = extract_contours(&r, &ContourOptions::default()).unwrap();
        assert!(outlined.iter().any(|c| c.elevation == 0.0 && c.is_closed()));

        let skipped = extract_contours(
            &r,
            &ContourOptions {
                use_no_data: true,
                ..ContourOptions::default()
            },
        )
        .unwrap();
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_saddle_resolved_by_center() {
        // tl and br high, mean above level: high corners connect
        let r = raster(2, 2, vec![10.0, 4.0, 4.0, 10.0]);
        let options = ContourOptions {
            fixed_levels: vec![6.0],
            ..ContourOptions::default()
        };
        let set = extract_contours(&r, &options).unwrap();
        assert_eq!(set.len(), 2);
        // Each segment cuts off one low corner: tr at (1.5, 1.5), bl at (0.5, 0.5)
        let near_tr = set.iter().filter(|c| c.line.coords().all(|p| p.x > 1.0 && p.y > 1.0)).count();
        let near_bl = set.iter().filter(|c| c.line.coords().all(|p| p.x < 1.0 && p.y < 1.0)).count();
        assert_eq!((near_tr, near_bl), (1, 1));
    }

    #[test]
    fn test_geojson_round_trip_keeps_attribute() {
        let mut data = vec![0.0; 25];
        data[12] = 100.0;
        let set = extract_contours(
            &raster(5, 5, data),
            &ContourOptions {
                fixed_levels: vec![50.0],
                ..ContourOptions::default()
            },
        )
        .unwrap();

        let geojson = set.to_geojson("height");
        let text = geojson.to_string();
        assert!(text.contains("\"height\":50.0"));
        let parsed: GeoJson = text.parse().unwrap();
        assert_eq!(ContourSet::from_geojson(&parsed, "height"), set);
    }

    #[test]
    fn test_shapefile_keeps_custom_attribute() {
        if std::process::Command::new("ogr2ogr").arg("--version").output().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("peak_contours.shp");
        let mut data = vec![0.0; 25];
        data[12] = 100.0;
        let set = extract_contours(
            &raster(5, 5, data),
            &ContourOptions {
                fixed_levels: vec![50.0],
                ..ContourOptions::default()
            },
        )
        .unwrap();

        write_contours_shapefile(&set, &shp, "height").unwrap();
        let read = read_contours_shapefile(&shp, "height").unwrap();
        assert_eq!(read.len(), set.len());
        assert_eq!(read.levels(), vec![50.0]);
    }

    #[test]
    fn test_generate_contours_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate_contours(
            &dir.path().join("missing.tif"),
            &dir.path().join("out.shp"),
            &ContourOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::Collaborator { .. })
        ));
    }
}
