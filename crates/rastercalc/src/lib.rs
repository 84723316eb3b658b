#![warn(clippy::unwrap_used)]

//! Compiles named raster sources plus per-pixel expressions into a derived-band
//! virtual dataset description that is evaluated lazily by the expression engine.

pub type Result<T = ()> = std::result::Result<T, Error>;

mod datatype;
mod error;
mod expression;
mod geotransform;
mod graph;
mod pipeline;
mod probe;
mod reconcile;
mod rewrite;
mod sourceset;
mod vrtdoc;

#[doc(inline)]
pub use datatype::RasterDataType;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use expression::{Dialect, PixelFunction};
#[doc(inline)]
pub use geotransform::GeoTransform;
#[doc(inline)]
pub use graph::{
    BandInputRef, BandOptions, DerivedBandNode, FunctionBinding, GraphAssembler, NoDataPolicy, SourceWindow,
    VirtualDataset,
};
#[doc(inline)]
pub use pipeline::{build_virtual_dataset, CalcOptions, ExpressionValidator};
#[doc(inline)]
pub use probe::{DatasetProvider, RasterSize, SourceProperties};
#[cfg(feature = "gdal")]
pub use probe::GdalDatasetProvider;
#[doc(inline)]
pub use reconcile::{ReconcileOptions, ReferenceGrid, EXTENT_RTOL};
#[doc(inline)]
pub use rewrite::ExpandedExpression;
#[doc(inline)]
pub use sourceset::{parse_sources, SourceSet};
#[doc(inline)]
pub use vrtdoc::render_document;
