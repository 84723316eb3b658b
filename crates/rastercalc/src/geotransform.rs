use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

/// Affine transformation between pixel space and georeferenced space.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a new `GeoTransform` from the provided coefficients.
    ///
    /// The coefficients are in the order: [top left x, pixel width, row rotation, top left y, column rotation, pixel height].
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    pub fn north_up(top_left_x: f64, top_left_y: f64, cell_size: f64) -> Self {
        Self::new([top_left_x, cell_size, 0.0, top_left_y, 0.0, -cell_size])
    }

    /// Translates a fractional pixel position to a georeferenced point.
    /// Pixel (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        (x, y)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.0[0], self.0[3])
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    pub fn set_cell_size_x(&mut self, size: f64) {
        self.0[1] = size;
    }

    /// The vertical cell size (negative for north-up rasters)
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    pub fn set_cell_size_y(&mut self, size: f64) {
        self.0[5] = size;
    }

    /// The two rotation/shear coefficients.
    pub fn shear(&self) -> (f64, f64) {
        (self.0[2], self.0[4])
    }

    /// Returns the coefficients of the transformation.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// True when origin and shear terms are identical and only the cell sizes may differ.
    pub fn same_origin_and_shear(&self, other: &GeoTransform) -> bool {
        self.0[0] == other.0[0] && self.0[3] == other.0[3] && self.0[2] == other.0[2] && self.0[4] == other.0[4]
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(topleft: ({}, {}), pixel_width: {}, pixel_height: {})",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_corner() {
        let gt = GeoTransform::north_up(100.0, 200.0, 10.0);
        assert_eq!(gt.apply(0.0, 0.0), (100.0, 200.0));
        assert_eq!(gt.apply(5.0, 4.0), (150.0, 160.0));
    }

    #[test]
    fn origin_and_shear_comparison() {
        let a = GeoTransform::new([0.0, 10.0, 0.0, 0.0, 0.0, -10.0]);
        let b = GeoTransform::new([0.0, 5.0, 0.0, 0.0, 0.0, -5.0]);
        let c = GeoTransform::new([1.0, 10.0, 0.0, 0.0, 0.0, -10.0]);
        assert!(a.same_origin_and_shear(&b));
        assert!(!a.same_origin_and_shear(&c));
    }
}
