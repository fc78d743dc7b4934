use anyhow::{Context, Result};
use geo::{Coord, Geometry as GeoGeometry, LineString};
use geos::{Geom, Geometry as GeosGeometry};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

use crate::collect::global_variables::{
    DEFAULT_BASE_DIMENSION, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_LABEL_OFFSET,
    DEFAULT_SIMPLIFICATION_TOLERANCE, DEFAULT_STROKE,
};
use crate::commons::basic_functions::title_case;
use crate::error::MapError;
use crate::geo_core::{BoundingBox, StateBoundary};
use crate::geometric::contour::{read_contours_shapefile, ContourSet};
use crate::geometric::grid::calculate_bbox_rows_cols;

const BOUNDARY_STROKE: &str = "black";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgOptions {
    /// Length of the longer canvas side, in pixels
    pub base_dimension: u32,
    pub stroke: String,
    pub font_size: String,
    pub font_family: String,
    /// Distance from the bottom edge to the label baseline
    pub label_offset: f64,
    /// Simplification distance in map units, 0 disables it
    pub simplification_tolerance: f64,
}

impl Default for SvgOptions {
    fn default() -> Self {
        SvgOptions {
            base_dimension: DEFAULT_BASE_DIMENSION,
            stroke: DEFAULT_STROKE.to_string(),
            font_size: DEFAULT_FONT_SIZE.to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            label_offset: DEFAULT_LABEL_OFFSET,
            simplification_tolerance: DEFAULT_SIMPLIFICATION_TOLERANCE,
        }
    }
}

/// A line in canvas pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<(f64, f64)>,
    /// Drawn as a closed ring
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvgLabel {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: String,
    pub font_family: String,
}

/// An SVG document made of unfilled lines and an optional centered label
#[derive(Debug, Clone, PartialEq)]
pub struct SvgDrawing {
    pub width: u32,
    pub height: u32,
    pub stroke: String,
    pub polylines: Vec<Polyline>,
    pub label: Option<SvgLabel>,
}

impl SvgDrawing {
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let width = self.width.to_string();
        let height = self.height.to_string();
        let view_box = format!("0 0 {} {}", self.width, self.height);
        let mut svg = BytesStart::new("svg");
        svg.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        svg.push_attribute(("version", "1.1"));
        svg.push_attribute(("baseProfile", "full"));
        svg.push_attribute(("width", width.as_str()));
        svg.push_attribute(("height", height.as_str()));
        svg.push_attribute(("viewBox", view_box.as_str()));
        writer.write_event(Event::Start(svg))?;

        for polyline in &self.polylines {
            let points = polyline
                .points
                .iter()
                .map(|(x, y)| format!("{},{}", num(*x), num(*y)))
                .collect::<Vec<_>>()
                .join(" ");
            let mut element = BytesStart::new(if polyline.closed { "polygon" } else { "polyline" });
            element.push_attribute(("fill", "none"));
            element.push_attribute(("points", points.as_str()));
            element.push_attribute(("stroke", self.stroke.as_str()));
            writer.write_event(Event::Empty(element))?;
        }

        if let Some(label) = &self.label {
            let x = num(label.x);
            let y = num(label.y);
            let mut text = BytesStart::new("text");
            text.push_attribute(("font-family", label.font_family.as_str()));
            text.push_attribute(("font-size", label.font_size.as_str()));
            text.push_attribute(("text-anchor", "middle"));
            text.push_attribute(("x", x.as_str()));
            text.push_attribute(("y", y.as_str()));
            writer.write_event(Event::Start(text))?;
            writer.write_event(Event::Text(BytesText::new(&label.text)))?;
            writer.write_event(Event::End(BytesEnd::new("text")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("svg")))?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).context("SVG output is not valid UTF-8")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create output directory: {:?}", parent))?;
            }
        }
        std::fs::write(path, self.to_xml()?).context(format!("Failed to write SVG: {:?}", path))?;
        log::info!("SVG saved to {:?} ({}x{})", path, self.width, self.height);
        Ok(())
    }
}

/// Pixel coordinate with at most three decimals
fn num(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Canvas size with the aspect ratio of a `rows × cols` grid; the longer
/// side is `base_dimension`, the shorter one is truncated to whole pixels.
pub fn calculate_svg_dimensions(rows: usize, cols: usize, base_dimension: u32) -> (u32, u32) {
    let rows = rows.max(1) as f64;
    let cols = cols.max(1) as f64;
    let aspect_ratio = cols / rows;
    let base = base_dimension as f64;

    if aspect_ratio >= 1.0 {
        (base_dimension, ((base / aspect_ratio) as u32).max(1))
    } else {
        (((base * aspect_ratio) as u32).max(1), base_dimension)
    }
}

/// At least two distinct vertices, all finite
pub fn is_drawable(line: &LineString<f64>) -> bool {
    if line.0.iter().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return false;
    }
    match line.0.first() {
        Some(first) => line.0.iter().any(|c| c != first),
        None => false,
    }
}

/// Topology-preserving simplification with a distance `tolerance`, as done
/// by GEOS. A tolerance of 0 returns the lines unchanged.
pub fn simplify_lines(lines: &[LineString<f64>], tolerance: f64) -> Result<Vec<LineString<f64>>> {
    if !(tolerance > 0.0) {
        return Ok(lines.to_vec());
    }
    lines.iter().map(|line| simplify_line(line, tolerance)).collect()
}

fn simplify_line(line: &LineString<f64>, tolerance: f64) -> Result<LineString<f64>> {
    let geos_line: GeosGeometry = line
        .clone()
        .try_into()
        .context("Failed to convert line to GEOS")?;
    let simplified = geos_line
        .topology_preserve_simplify(tolerance)
        .context("Failed to simplify line with GEOS")?;
    let simplified: GeoGeometry<f64> = simplified
        .try_into()
        .context("Failed to convert GEOS geometry to geo")?;

    match simplified {
        GeoGeometry::LineString(simplified) if simplified.0.len() >= 2 => Ok(simplified),
        _ => Ok(line.clone()),
    }
}

fn total_bounds(lines: &[LineString<f64>]) -> Option<BoundingBox> {
    use geo::BoundingRect;

    lines
        .iter()
        .filter_map(|l| l.bounding_rect())
        .map(BoundingBox::from_rect)
        .reduce(|acc, b| acc.union(&b))
}

/// Project map lines onto a canvas sized after their 1° grid
fn render_lines(
    lines: Vec<LineString<f64>>,
    closed: bool,
    stroke: &str,
    label: Option<&str>,
    options: &SvgOptions,
) -> Result<SvgDrawing> {
    if lines.is_empty() {
        return Err(MapError::NoInput("no lines to render".to_string()).into());
    }

    let drawable: Vec<LineString<f64>> = lines.into_iter().filter(is_drawable).collect();
    let simplified = simplify_lines(&drawable, options.simplification_tolerance)?;

    let bounds = total_bounds(&simplified).ok_or(MapError::DegenerateGeometry {
        width: 0.0,
        height: 0.0,
    })?;
    let (x_range, y_range) = (bounds.width(), bounds.height());
    if !(x_range > 0.0 && y_range > 0.0) {
        return Err(MapError::DegenerateGeometry {
            width: x_range,
            height: y_range,
        }
        .into());
    }

    let grid = calculate_bbox_rows_cols(&bounds, 1.0)?;
    let (width, height) = calculate_svg_dimensions(grid.rows + 1, grid.cols + 1, options.base_dimension);
    let (w, h) = (width as f64, height as f64);

    let project = |c: &Coord<f64>| {
        (
            w * (c.x - bounds.min_x) / x_range,
            h * (1.0 - (c.y - bounds.min_y) / y_range),
        )
    };
    let polylines = simplified
        .iter()
        .map(|line| Polyline {
            points: line.0.iter().map(project).collect(),
            closed,
        })
        .collect();

    let label = label.map(|text| SvgLabel {
        text: title_case(text),
        x: w / 2.0,
        y: h - options.label_offset,
        font_size: options.font_size.clone(),
        font_family: options.font_family.clone(),
    });

    Ok(SvgDrawing {
        width,
        height,
        stroke: stroke.to_string(),
        polylines,
        label,
    })
}

/// Contour map with a centered label under the lines
pub fn render_contours(contours: &ContourSet, label: &str, options: &SvgOptions) -> Result<SvgDrawing> {
    let lines = contours.iter().map(|c| c.line.clone()).collect();
    render_lines(lines, false, &options.stroke, Some(label), options)
}

/// Render the contour shapefile at `shapefile_path` to `svg_path`; elevations
/// are read from `attribute_name`
pub fn contours_to_svg(
    shapefile_path: &Path,
    svg_path: &Path,
    label: &str,
    attribute_name: &str,
    options: &SvgOptions,
) -> Result<SvgDrawing> {
    let contours = read_contours_shapefile(shapefile_path, attribute_name)?;
    let drawing = render_contours(&contours, label, options)
        .context(format!("Failed to render {:?}", shapefile_path))?;
    drawing.save(svg_path)?;
    Ok(drawing)
}

/// Unlabelled outline of the boundary rings
pub fn render_boundary(boundary: &StateBoundary, options: &SvgOptions) -> Result<SvgDrawing> {
    let rings = boundary
        .geometry
        .0
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .cloned()
        .collect();
    render_lines(rings, true, BOUNDARY_STROKE, None, options)
}

pub fn save_boundary_svg(boundary: &StateBoundary, path: &Path, options: &SvgOptions) -> Result<SvgDrawing> {
    let drawing = render_boundary(boundary, options)
        .context(format!("Failed to render boundary of {}", boundary.name))?;
    drawing.save(path)?;
    Ok(drawing)
}
