//! Grid partitioning of a bounding box into equal-angle sub-boxes.

use anyhow::Result;

use crate::error::MapError;
use crate::geo_core::BoundingBox;

/// Number of rows (latitude) and columns (longitude) of a tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
}

impl Grid {
    pub fn sections(&self) -> usize {
        self.rows * self.cols
    }
}

/// Rows and columns needed to cover `bbox` with square tiles of
/// `tile_size_degree`: `floor(span / tile_size) + 1` on each axis.
pub fn calculate_bbox_rows_cols(bbox: &BoundingBox, tile_size_degree: f64) -> Result<Grid> {
    if !(tile_size_degree.is_finite() && tile_size_degree > 0.0) {
        return Err(MapError::InvalidInput(format!(
            "tile size must be a positive number of degrees, got {}",
            tile_size_degree
        ))
        .into());
    }
    let lon_diff = bbox.width().max(0.0);
    let lat_diff = bbox.height().max(0.0);
    if !(lon_diff.is_finite() && lat_diff.is_finite()) {
        return Err(MapError::InvalidInput(format!("non-finite bounding box {:?}", bbox)).into());
    }

    let cols = (lon_diff / tile_size_degree).floor() as usize + 1;
    let rows = (lat_diff / tile_size_degree).floor() as usize + 1;

    Ok(Grid { rows, cols })
}

/// Split `bbox` into `grid.rows × grid.cols` sub-boxes, row-major (south to
/// north, then west to east).
///
/// Adjacent boxes share edges exactly; the last row and column end on the
/// parent's max edge.
pub fn split_bbox(bbox: &BoundingBox, grid: Grid) -> Vec<BoundingBox> {
    let rows = grid.rows.max(1);
    let cols = grid.cols.max(1);
    let lon_step = bbox.width() / cols as f64;
    let lat_step = bbox.height() / rows as f64;

    let lon_edge = |j: usize| {
        if j == cols {
            bbox.max_x
        } else {
            bbox.min_x + j as f64 * lon_step
        }
    };
    let lat_edge = |i: usize| {
        if i == rows {
            bbox.max_y
        } else {
            bbox.min_y + i as f64 * lat_step
        }
    };

    let mut sub_boxes = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            sub_boxes.push(BoundingBox::new(
                lon_edge(j),
                lat_edge(i),
                lon_edge(j + 1),
                lat_edge(i + 1),
            ));
        }
    }
    sub_boxes
}

/// Grid dimensions and sub-boxes for `bbox` in one call
pub fn partition(bbox: &BoundingBox, tile_size_degree: f64) -> Result<(Grid, Vec<BoundingBox>)> {
    bbox.validate()?;
    let grid = calculate_bbox_rows_cols(bbox, tile_size_degree)?;
    Ok((grid, split_bbox(bbox, grid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_cols_two_by_one_and_a_half() {
        // 2° wide, 1.5° tall
        let bbox = BoundingBox::new(-100.0, 30.0, -98.0, 31.5);
        let grid = calculate_bbox_rows_cols(&bbox, 1.0).unwrap();
        assert_eq!(grid, Grid { rows: 2, cols: 3 });
        assert_eq!(grid.sections(), 6);
    }

    #[test]
    fn test_small_box_is_single_tile() {
        let bbox = BoundingBox::new(10.0, 45.0, 10.4, 45.9);
        let grid = calculate_bbox_rows_cols(&bbox, 1.0).unwrap();
        assert_eq!(grid, Grid { rows: 1, cols: 1 });
    }

    #[test]
    fn test_grid_monotonic_in_span() {
        let mut previous = Grid { rows: 1, cols: 1 };
        for step in 0..40 {
            let span = step as f64 * 0.25;
            let bbox = BoundingBox::new(0.0, 0.0, span, span / 2.0);
            let grid = calculate_bbox_rows_cols(&bbox, 0.7).unwrap();
            assert!(grid.rows >= previous.rows);
            assert!(grid.cols >= previous.cols);
            previous = grid;
        }
    }

    #[test]
    fn test_rejects_bad_tile_size() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        for size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = calculate_bbox_rows_cols(&bbox, size).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MapError>(),
                Some(MapError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_split_tiles_parent_exactly() {
        let bbox = BoundingBox::new(-106.645646, 25.837377, -93.508292, 36.500704);
        let grid = calculate_bbox_rows_cols(&bbox, 1.0).unwrap();
        let boxes = split_bbox(&bbox, grid);
        assert_eq!(boxes.len(), grid.rows * grid.cols);

        // Row-major order, shared edges
        for i in 0..grid.rows {
            for j in 0..grid.cols {
                let b = boxes[i * grid.cols + j];
                assert!(b.min_x < b.max_x && b.min_y < b.max_y);
                if j + 1 < grid.cols {
                    let right = boxes[i * grid.cols + j + 1];
                    assert_eq!(b.max_x, right.min_x);
                    assert_eq!(b.min_y, right.min_y);
                }
                if i + 1 < grid.rows {
                    let above = boxes[(i + 1) * grid.cols + j];
                    assert_eq!(b.max_y, above.min_y);
                    assert_eq!(b.min_x, above.min_x);
                }
            }
        }

        let union = boxes.iter().skip(1).fold(boxes[0], |acc, b| acc.union(b));
        assert_eq!(union, bbox);

        let area: f64 = boxes.iter().map(|b| b.width() * b.height()).sum();
        assert_relative_eq!(area, bbox.width() * bbox.height(), epsilon = 1e-9);
    }

    #[test]
    fn test_split_sub_box_formula() {
        let bbox = BoundingBox::new(0.0, 0.0, 3.0, 2.0);
        let boxes = split_bbox(&bbox, Grid { rows: 2, cols: 3 });
        assert_eq!(boxes[0], BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(boxes[1], BoundingBox::new(1.0, 0.0, 2.0, 1.0));
        assert_eq!(boxes[3], BoundingBox::new(0.0, 1.0, 1.0, 2.0));
        assert_eq!(boxes[5], BoundingBox::new(2.0, 1.0, 3.0, 2.0));
    }

    #[test]
    fn test_partition_validates_bbox() {
        let bbox = BoundingBox::new(1.0, 1.0, 1.0, 2.0);
        assert!(partition(&bbox, 1.0).is_err());
    }
}
