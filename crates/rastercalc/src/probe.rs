use crate::{GeoTransform, RasterDataType, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RasterSize {
    pub rows: usize,
    pub cols: usize,
}

impl RasterSize {
    pub fn new(rows: usize, cols: usize) -> Self {
        RasterSize { rows, cols }
    }
}

impl std::fmt::Display for RasterSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Metadata of one source dataset, read once when the source is opened.
#[derive(Clone, Debug, Default)]
pub struct SourceProperties {
    pub band_count: usize,
    pub size: RasterSize,
    /// Only populated when extent checking is enabled, reading it is not free on all drivers.
    pub geo_transform: Option<GeoTransform>,
    pub projection: Option<String>,
    /// Per-band nodata, only set when the driver reports one.
    pub band_nodata: Vec<Option<f64>>,
    /// The shared data type of all bands, `None` when the bands disagree.
    pub uniform_data_type: Option<RasterDataType>,
}

impl SourceProperties {
    /// Nodata value of the given 1-based band, if the driver reported one.
    pub fn nodata_for_band(&self, band: usize) -> Option<f64> {
        self.band_nodata.get(band - 1).copied().flatten()
    }
}

/// Boundary to the dataset-opening service.
///
/// The pipeline only needs the metadata of each source, never its pixels, so
/// the collaborator is reduced to a single probe call. Tests provide fake
/// implementations, the `gdal` feature provides the real one.
pub trait DatasetProvider {
    fn probe(&self, locator: &str, read_geo_transform: bool) -> Result<SourceProperties>;
}

#[cfg(feature = "gdal")]
pub use self::gdal_provider::GdalDatasetProvider;

#[cfg(feature = "gdal")]
mod gdal_provider {
    use super::{DatasetProvider, RasterSize, SourceProperties};
    use crate::{Error, GeoTransform, RasterDataType, Result};

    /// Opens each source read-only through GDAL and extracts its metadata.
    pub struct GdalDatasetProvider;

    impl DatasetProvider for GdalDatasetProvider {
        fn probe(&self, locator: &str, read_geo_transform: bool) -> Result<SourceProperties> {
            let ds = gdal::Dataset::open(locator).map_err(|err| {
                log::debug!("Opening '{locator}' failed: {err}");
                Error::SourceOpenFailure(locator.to_string())
            })?;

            let (cols, rows) = ds.raster_size();
            let band_count = ds.raster_count();

            let geo_transform = if read_geo_transform {
                // Drivers without georeferencing fall back to the identity transform.
                Some(GeoTransform::new(
                    ds.geo_transform().unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
                ))
            } else {
                None
            };

            let projection = match ds.projection() {
                wkt if wkt.is_empty() => None,
                wkt => Some(wkt),
            };

            let mut band_nodata = Vec::with_capacity(band_count);
            let mut uniform_data_type: Option<RasterDataType> = None;
            let mut mixed_data_types = false;
            for band_index in 1..=band_count {
                let band = ds.rasterband(band_index)?;
                band_nodata.push(band.no_data_value());

                let data_type = convert_data_type(band.band_type());
                match (uniform_data_type, data_type) {
                    (None, dt) if !mixed_data_types && band_index == 1 => uniform_data_type = dt,
                    (Some(current), Some(dt)) if current == dt => {}
                    _ => {
                        uniform_data_type = None;
                        mixed_data_types = true;
                    }
                }
            }

            Ok(SourceProperties {
                band_count,
                size: RasterSize::new(rows, cols),
                geo_transform,
                projection,
                band_nodata,
                uniform_data_type,
            })
        }
    }

    fn convert_data_type(data_type: gdal::raster::GdalDataType) -> Option<RasterDataType> {
        use gdal::raster::GdalDataType;

        match data_type {
            GdalDataType::UInt8 => Some(RasterDataType::Byte),
            GdalDataType::Int8 => Some(RasterDataType::Int8),
            GdalDataType::UInt16 => Some(RasterDataType::UInt16),
            GdalDataType::Int16 => Some(RasterDataType::Int16),
            GdalDataType::UInt32 => Some(RasterDataType::UInt32),
            GdalDataType::Int32 => Some(RasterDataType::Int32),
            GdalDataType::UInt64 => Some(RasterDataType::UInt64),
            GdalDataType::Int64 => Some(RasterDataType::Int64),
            GdalDataType::Float32 => Some(RasterDataType::Float32),
            GdalDataType::Float64 => Some(RasterDataType::Float64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodata_band_lookup() {
        let props = SourceProperties {
            band_count: 3,
            band_nodata: vec![None, Some(255.0), None],
            ..Default::default()
        };

        assert_eq!(props.nodata_for_band(1), None);
        assert_eq!(props.nodata_for_band(2), Some(255.0));
        assert_eq!(props.nodata_for_band(3), None);
        assert_eq!(props.nodata_for_band(4), None);
    }
}
