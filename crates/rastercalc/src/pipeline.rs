use std::collections::BTreeMap;

use crate::{
    expression::ingest_expression,
    graph::{BandOptions, GraphAssembler, NoDataPolicy},
    reconcile::{reconcile, ReconcileOptions},
    rewrite::expand_expression,
    DatasetProvider, DerivedBandNode, Dialect, Error, PixelFunction, RasterDataType, ReferenceGrid, Result,
    SourceProperties, VirtualDataset,
};

/// Options of one raster-algebra pipeline run.
#[derive(Clone, Debug)]
pub struct CalcOptions {
    pub expressions: Vec<String>,
    pub dialect: Dialect,
    /// Map each multiband source/expression pair to a single output band.
    pub flatten: bool,
    pub nodata: NoDataPolicy,
    pub data_type: Option<RasterDataType>,
    pub check_crs: bool,
    pub check_extent: bool,
    pub propagate_nodata: bool,
    /// Trial-evaluate every band against a synthetic stand-in before committing.
    pub check_expression: bool,
}

impl Default for CalcOptions {
    fn default() -> Self {
        CalcOptions {
            expressions: Vec::new(),
            dialect: Dialect::default(),
            flatten: false,
            nodata: NoDataPolicy::Auto,
            data_type: None,
            check_crs: true,
            check_extent: true,
            propagate_nodata: false,
            check_expression: true,
        }
    }
}

/// Collaborator that trial-evaluates a derived band against a synthetic
/// single-pixel dataset, catching function or argument errors before the
/// full output is committed.
pub trait ExpressionValidator {
    fn validate(&self, band: &DerivedBandNode, grid: &ReferenceGrid) -> Result<()>;
}

/// Compiles named sources plus expressions into a virtual dataset description.
///
/// The run is a single synchronous pass: parse the input tokens, probe each
/// source exactly once, fold all sources into the reference grid in name
/// order, then expand every expression and assemble its derived bands. The
/// first hard error aborts the whole run.
pub fn build_virtual_dataset(
    tokens: &[String],
    options: &CalcOptions,
    provider: &dyn DatasetProvider,
    validator: Option<&dyn ExpressionValidator>,
) -> Result<VirtualDataset> {
    if options.expressions.is_empty() {
        return Err(Error::InvalidArgument("At least one expression is required".to_string()));
    }

    if tokens.is_empty() {
        return Err(Error::InvalidArgument("At least one input source is required".to_string()));
    }

    if options.propagate_nodata && !matches!(options.nodata, NoDataPolicy::Value(_)) {
        return Err(Error::InvalidArgument(
            "Propagating nodata requires an explicit nodata value".to_string(),
        ));
    }

    let sources = crate::parse_sources(tokens, options.dialect != Dialect::Builtin)?;

    let mut properties: BTreeMap<String, SourceProperties> = BTreeMap::new();
    for (name, locator) in &sources {
        let props = provider.probe(locator, options.check_extent)?;
        log::debug!("Source '{name}' ({locator}): {} bands, {}", props.band_count, props.size);
        properties.insert(name.clone(), props.clone());
    }

    let reconcile_options = ReconcileOptions {
        check_crs: options.check_crs,
        check_extent: options.check_extent,
    };

    let mut grid = {
        let first = properties.values().next().ok_or_else(|| {
            Error::InvalidArgument("At least one input source is required".to_string())
        })?;
        ReferenceGrid::from_source(first)
    };

    for props in properties.values().skip(1) {
        grid = reconcile(grid, props, &reconcile_options)?;
    }

    let assembler = GraphAssembler {
        sources: &sources,
        properties: &properties,
        grid: &grid,
        options: BandOptions {
            data_type: options.data_type,
            nodata: options.nodata,
            flatten: options.flatten,
            propagate_nodata: options.propagate_nodata,
            single_pixel: false,
        },
    };

    let mut bands = Vec::new();
    for raw in &options.expressions {
        let function = ingest_expression(raw, options.dialect)?;

        let (expanded, output_band_count) = match &function {
            PixelFunction::Formula { text, .. } => {
                let expanded = expand_expression(text, &properties, options.flatten)?;
                let count = expanded.output_band_count;
                (Some(expanded), count)
            }
            PixelFunction::Builtin { .. } => (None, builtin_output_band_count(&properties, options.flatten)?),
        };

        for output_band in 1..=output_band_count {
            bands.push(assembler.build_band(&function, expanded.as_ref(), output_band)?);
        }
    }

    if options.check_expression && let Some(validator) = validator {
        trial_evaluate(&grid, &bands, validator)?;
    }

    Ok(VirtualDataset { grid, bands })
}

/// Output band count of a builtin expression: one band when flattening,
/// otherwise one output band per input band, with single-band sources
/// broadcasting into every output band.
fn builtin_output_band_count(properties: &BTreeMap<String, SourceProperties>, flatten: bool) -> Result<usize> {
    if flatten {
        return Ok(1);
    }

    let mut count = 1usize;
    for (name, props) in properties {
        if props.band_count > 1 {
            if count == 1 {
                count = props.band_count;
            } else if props.band_count != count {
                return Err(Error::IncompatibleBandCounts {
                    source_name: name.clone(),
                    actual: props.band_count,
                    expected: count,
                });
            }
        }
    }

    Ok(count)
}

/// Rebuilds each band as a single-pixel stand-in (no pixel windows) and hands
/// it to the validation collaborator.
fn trial_evaluate(
    grid: &ReferenceGrid,
    bands: &[DerivedBandNode],
    validator: &dyn ExpressionValidator,
) -> Result {
    for (index, band) in bands.iter().enumerate() {
        let probe_band = DerivedBandNode {
            inputs: band
                .inputs
                .iter()
                .map(|input| crate::BandInputRef {
                    src_window: None,
                    dst_window: None,
                    ..input.clone()
                })
                .collect(),
            ..band.clone()
        };

        validator.validate(&probe_band, grid).map_err(|err| match err {
            Error::ExpressionValidationFailure(message) => Error::ExpressionValidationFailure(message),
            other => Error::ExpressionValidationFailure(format!("output band {}: {other}", index + 1)),
        })?;
    }

    Ok(())
}
