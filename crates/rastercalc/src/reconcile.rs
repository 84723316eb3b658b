use crate::{Error, GeoTransform, RasterSize, Result, SourceProperties};

/// Maximum allowed far-corner deviation between sources, as a fraction of the
/// reference cell size.
pub const EXTENT_RTOL: f64 = 1e-3;

/// The authoritative output raster geometry, obtained by folding all sources.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceGrid {
    pub size: RasterSize,
    pub geo_transform: Option<GeoTransform>,
    pub projection: Option<String>,
}

impl ReferenceGrid {
    /// Seeds the grid from the first source in the set.
    pub fn from_source(props: &SourceProperties) -> Self {
        ReferenceGrid {
            size: props.size,
            geo_transform: props.geo_transform,
            projection: props.projection.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReconcileOptions {
    pub check_crs: bool,
    pub check_extent: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            check_crs: true,
            check_extent: true,
        }
    }
}

/// Folds one source into the reference grid.
///
/// Sources are folded in input order and each source is validated against the
/// grid as it stands at that moment. A finer-resolution source refines the
/// grid for every source that comes after it, not for the ones already
/// folded, so the fold order is observable in which pairs get compared.
pub fn reconcile(mut grid: ReferenceGrid, props: &SourceProperties, options: &ReconcileOptions) -> Result<ReferenceGrid> {
    if !options.check_extent {
        // Without georeferencing the only consistency signal is the pixel dimensions.
        if props.size != grid.size {
            return Err(Error::DimensionMismatch {
                size1: (grid.size.cols, grid.size.rows),
                size2: (props.size.cols, props.size.rows),
            });
        }
    } else {
        let src_gt = props.geo_transform.unwrap_or_default();
        let ref_gt = grid.geo_transform.unwrap_or_default();

        if !ref_gt.same_origin_and_shear(&src_gt) {
            return Err(Error::ExtentMismatch(format!(
                "origin {:?} does not match reference origin {:?}",
                src_gt.origin(),
                ref_gt.origin()
            )));
        }

        let resolutions_differ =
            ref_gt.cell_size_x() != src_gt.cell_size_x() || ref_gt.cell_size_y() != src_gt.cell_size_y();

        if resolutions_differ || grid.size != props.size {
            let (ref_x, ref_y) = ref_gt.apply(grid.size.cols as f64, grid.size.rows as f64);
            let (src_x, src_y) = src_gt.apply(props.size.cols as f64, props.size.rows as f64);
            let tol_x = EXTENT_RTOL * ref_gt.cell_size_x().abs();
            let tol_y = EXTENT_RTOL * ref_gt.cell_size_y().abs();

            if (ref_x - src_x).abs() > tol_x || (ref_y - src_y).abs() > tol_y {
                return Err(Error::ExtentMismatch(format!(
                    "far corner ({src_x}, {src_y}) does not match reference far corner ({ref_x}, {ref_y})"
                )));
            }
        }

        // A finer source refines the grid to the greatest common divisor of
        // both resolutions, scaling the pixel dimensions accordingly.
        let mut ref_gt = ref_gt;
        if props.size.cols > grid.size.cols {
            let res = ref_gt.cell_size_x();
            let divisor = float_gcd(res, src_gt.cell_size_x());
            if divisor == 0.0 {
                return Err(Error::NoCommonResolution(format!(
                    "{res} and {} along the x axis",
                    src_gt.cell_size_x()
                )));
            }

            grid.size.cols = (grid.size.cols as f64 * (res.abs() / divisor)).round() as usize;
            ref_gt.set_cell_size_x(divisor.copysign(res));
        }

        if props.size.rows > grid.size.rows {
            let res = ref_gt.cell_size_y();
            let divisor = float_gcd(res, src_gt.cell_size_y());
            if divisor == 0.0 {
                return Err(Error::NoCommonResolution(format!(
                    "{res} and {} along the y axis",
                    src_gt.cell_size_y()
                )));
            }

            grid.size.rows = (grid.size.rows as f64 * (res.abs() / divisor)).round() as usize;
            ref_gt.set_cell_size_y(divisor.copysign(res));
        }

        grid.geo_transform = Some(ref_gt);
    }

    if options.check_crs
        && let (Some(reference), Some(source)) = (&grid.projection, &props.projection)
        && reference != source
    {
        // Compared by value: equivalent but differently encoded definitions do not match.
        return Err(Error::SpatialReferenceMismatch);
    }

    log::debug!("Reference grid after folding source: {:?} {}", grid.geo_transform, grid.size);

    Ok(grid)
}

/// Greatest common divisor of two cell sizes.
///
/// Euclid on the magnitudes with a relative cutoff. Returns 0.0 when either
/// input is zero or when the only common divisor would refine the grid beyond
/// any reasonable factor (incompatible resolutions, e.g. an irrational ratio).
fn float_gcd(a: f64, b: f64) -> f64 {
    const MAX_REFINEMENT: f64 = 1e7;

    let (orig_a, orig_b) = (a.abs(), b.abs());
    let (mut a, mut b) = (orig_a, orig_b);
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }

    let eps = 1e-10 * a.max(b);
    while b > eps {
        (a, b) = (b, a % b);
    }

    if a <= eps || orig_a.max(orig_b) / a > MAX_REFINEMENT {
        return 0.0;
    }

    a
}
