use std::collections::BTreeMap;

use crate::{
    expression::{builtin_accepts_argument, builtin_arguments_suffix, builtin_preserves_data_type},
    Dialect, Error, ExpandedExpression, PixelFunction, RasterDataType, ReferenceGrid, Result, SourceProperties,
    SourceSet,
};

/// Pixel rectangle of a band input, in source or destination raster space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceWindow {
    pub x_off: usize,
    pub y_off: usize,
    pub cols: usize,
    pub rows: usize,
}

impl SourceWindow {
    pub fn full(cols: usize, rows: usize) -> Self {
        SourceWindow {
            x_off: 0,
            y_off: 0,
            cols,
            rows,
        }
    }
}

/// One contributing source band of a derived output band.
#[derive(Clone, Debug, PartialEq)]
pub struct BandInputRef {
    pub locator: String,
    /// The variable spelling this input answers to in the expression, e.g. `A[2]`.
    pub variable: String,
    pub band: usize,
    pub nodata: Option<f64>,
    /// Omitted for the single-pixel validation stand-in.
    pub src_window: Option<SourceWindow>,
    pub dst_window: Option<SourceWindow>,
}

/// The computation bound to a derived output band.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBinding {
    /// Builtin function, stored by name without a dialect tag.
    Builtin { name: String, arguments: Vec<(String, String)> },
    /// Expression text tagged with its dialect.
    Formula {
        dialect: Dialect,
        expression: String,
        arguments: Vec<(String, String)>,
    },
}

/// One lazily evaluated output band of the virtual dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedBandNode {
    pub data_type: RasterDataType,
    pub nodata: Option<f64>,
    pub inputs: Vec<BandInputRef>,
    pub function: FunctionBinding,
}

/// The complete virtual dataset description: the reconciled output geometry
/// plus the ordered derived-band computation graph.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualDataset {
    pub grid: ReferenceGrid,
    pub bands: Vec<DerivedBandNode>,
}

/// Output nodata policy for the derived bands.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum NoDataPolicy {
    /// Adopt the first contributing source band's nodata value, if any.
    #[default]
    Auto,
    /// No output nodata value.
    Disabled,
    /// Explicit user-supplied value.
    Value(f64),
}

impl NoDataPolicy {
    /// Parses the user-facing nodata option: `none` or an empty string
    /// disable the nodata value, anything else must parse as a float in full.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(NoDataPolicy::Disabled);
        }

        trimmed
            .parse::<f64>()
            .map(NoDataPolicy::Value)
            .map_err(|_| Error::InvalidNoDataValue(text.to_string()))
    }
}

/// Per-band assembly options, shared across all expressions of one run.
#[derive(Clone, Debug, Default)]
pub struct BandOptions {
    pub data_type: Option<RasterDataType>,
    pub nodata: NoDataPolicy,
    pub flatten: bool,
    pub propagate_nodata: bool,
    /// Build against a synthetic 1x1 stand-in: no source/destination windows.
    pub single_pixel: bool,
}

/// Assembles derived-band nodes from expanded expressions and source metadata.
pub struct GraphAssembler<'a> {
    pub sources: &'a SourceSet,
    pub properties: &'a BTreeMap<String, SourceProperties>,
    pub grid: &'a ReferenceGrid,
    pub options: BandOptions,
}

impl GraphAssembler<'_> {
    /// Builds the node for one output band of one expression.
    ///
    /// `expanded` carries the per-output-band rewritten texts for formula
    /// dialects and is not used for builtins.
    pub fn build_band(
        &self,
        function: &PixelFunction,
        expanded: Option<&ExpandedExpression>,
        output_band: usize,
    ) -> Result<DerivedBandNode> {
        let data_type = self.resolve_data_type(function);
        let inputs = self.collect_inputs(function, expanded, output_band);

        let nodata = match self.options.nodata {
            NoDataPolicy::Value(value) => Some(value),
            NoDataPolicy::Disabled => None,
            NoDataPolicy::Auto => {
                // First contributing band with a nodata value wins, in source map order.
                let auto = inputs.iter().find_map(|input| input.nodata);
                if let Some(value) = auto
                    && !data_type.can_represent(value)
                {
                    return Err(Error::NoDataNotRepresentable { value, data_type });
                }
                auto
            }
        };

        let function = self.bind_function(function, expanded, output_band)?;

        Ok(DerivedBandNode {
            data_type,
            nodata,
            inputs,
            function,
        })
    }

    fn resolve_data_type(&self, function: &PixelFunction) -> RasterDataType {
        if let Some(data_type) = self.options.data_type {
            return data_type;
        }

        // Value-preserving builtins keep the source type when all sources agree on one.
        if let PixelFunction::Builtin { name, .. } = function
            && builtin_preserves_data_type(name)
            && let Some(first) = self.properties.values().next().and_then(|p| p.uniform_data_type)
            && self.properties.values().all(|p| p.uniform_data_type == Some(first))
        {
            return first;
        }

        RasterDataType::Float64
    }

    fn collect_inputs(
        &self,
        function: &PixelFunction,
        expanded: Option<&ExpandedExpression>,
        output_band: usize,
    ) -> Vec<BandInputRef> {
        let mut inputs = Vec::new();

        for (name, props) in self.properties {
            for band in 1..=props.band_count {
                if !self.band_participates(function, expanded, name, props, band, output_band) {
                    continue;
                }

                let (src_window, dst_window) = if self.options.single_pixel {
                    (None, None)
                } else {
                    (
                        Some(SourceWindow::full(props.size.cols, props.size.rows)),
                        Some(SourceWindow::full(self.grid.size.cols, self.grid.size.rows)),
                    )
                };

                inputs.push(BandInputRef {
                    locator: self.sources[name].clone(),
                    variable: format!("{name}[{band}]"),
                    band,
                    nodata: props.nodata_for_band(band),
                    src_window,
                    dst_window,
                });
            }
        }

        inputs
    }

    fn band_participates(
        &self,
        function: &PixelFunction,
        expanded: Option<&ExpandedExpression>,
        name: &str,
        props: &SourceProperties,
        input_band: usize,
        output_band: usize,
    ) -> bool {
        match function {
            PixelFunction::Builtin { .. } => {
                if self.options.flatten {
                    // All input bands of all sources feed the single output band.
                    true
                } else if props.band_count >= 2 {
                    input_band == output_band
                } else {
                    true
                }
            }
            PixelFunction::Formula { .. } => match expanded {
                Some(expanded) => {
                    crate::rewrite::contains_band_reference(&expanded.per_band_text[output_band - 1], name, input_band)
                }
                None => false,
            },
        }
    }

    fn bind_function(
        &self,
        function: &PixelFunction,
        expanded: Option<&ExpandedExpression>,
        output_band: usize,
    ) -> Result<FunctionBinding> {
        match function {
            PixelFunction::Builtin { name, arguments } => {
                let mut arguments = arguments.clone();
                if self.options.propagate_nodata && !arguments.iter().any(|(key, _)| key == "propagateNoData") {
                    if !builtin_accepts_argument(name, "propagateNoData") {
                        return Err(Error::UnrecognizedBuiltinArgument {
                            function: name.clone(),
                            argument: "propagateNoData".to_string(),
                            valid: builtin_arguments_suffix(name),
                        });
                    }

                    arguments.push(("propagateNoData".to_string(), "1".to_string()));
                }

                Ok(FunctionBinding::Builtin {
                    name: name.clone(),
                    arguments,
                })
            }
            PixelFunction::Formula { dialect, text } => {
                let expression = expanded
                    .map(|e| e.per_band_text[output_band - 1].clone())
                    .unwrap_or_else(|| text.clone());

                let mut arguments = Vec::new();
                if self.options.propagate_nodata {
                    arguments.push(("propagateNoData".to_string(), "1".to_string()));
                }

                Ok(FunctionBinding::Formula {
                    dialect: *dialect,
                    expression,
                    arguments,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoTransform, RasterSize};

    fn props(band_count: usize, nodata: &[Option<f64>], data_type: Option<RasterDataType>) -> SourceProperties {
        SourceProperties {
            band_count,
            size: RasterSize::new(10, 10),
            geo_transform: Some(GeoTransform::north_up(0.0, 0.0, 10.0)),
            projection: None,
            band_nodata: nodata.to_vec(),
            uniform_data_type: data_type,
        }
    }

    fn grid() -> ReferenceGrid {
        ReferenceGrid {
            size: RasterSize::new(10, 10),
            geo_transform: Some(GeoTransform::north_up(0.0, 0.0, 10.0)),
            projection: None,
        }
    }

    fn two_sources() -> (SourceSet, BTreeMap<String, SourceProperties>) {
        let sources: SourceSet = [
            ("A".to_string(), "gridA.tif".to_string()),
            ("B".to_string(), "gridB.tif".to_string()),
        ]
        .into_iter()
        .collect();

        let properties: BTreeMap<String, SourceProperties> = [
            ("A".to_string(), props(2, &[None, None], Some(RasterDataType::Byte))),
            ("B".to_string(), props(1, &[Some(-1.0)], Some(RasterDataType::Byte))),
        ]
        .into_iter()
        .collect();

        (sources, properties)
    }

    #[test]
    fn nodata_auto_selects_first_contributing_value() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions::default(),
        };

        let function = PixelFunction::Formula {
            dialect: Dialect::Muparser,
            text: "A+B".to_string(),
        };
        let expanded = ExpandedExpression {
            source_text: "A+B".to_string(),
            output_band_count: 2,
            per_band_text: vec!["A[1]+B[1]".to_string(), "A[2]+B[1]".to_string()],
        };

        // A has no nodata on any band, so B's -1 is picked up.
        let node = assembler.build_band(&function, Some(&expanded), 1).expect("band 1");
        assert_eq!(node.nodata, Some(-1.0));
        assert_eq!(node.data_type, RasterDataType::Float64);
    }

    #[test]
    fn formula_inputs_follow_the_rewritten_text() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions::default(),
        };

        let function = PixelFunction::Formula {
            dialect: Dialect::Muparser,
            text: "A+B".to_string(),
        };
        let expanded = ExpandedExpression {
            source_text: "A+B".to_string(),
            output_band_count: 2,
            per_band_text: vec!["A[1]+B[1]".to_string(), "A[2]+B[1]".to_string()],
        };

        let node = assembler.build_band(&function, Some(&expanded), 2).expect("band 2");
        let variables: Vec<&str> = node.inputs.iter().map(|i| i.variable.as_str()).collect();
        assert_eq!(variables, vec!["A[2]", "B[1]"]);
        assert_eq!(node.inputs[0].src_window, Some(SourceWindow::full(10, 10)));
        assert_eq!(node.inputs[0].dst_window, Some(SourceWindow::full(10, 10)));
    }

    #[test]
    fn builtin_flatten_wires_all_bands() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                flatten: true,
                ..Default::default()
            },
        };

        let function = PixelFunction::Builtin {
            name: "sum".to_string(),
            arguments: Vec::new(),
        };

        let node = assembler.build_band(&function, None, 1).expect("single output band");
        assert_eq!(node.inputs.len(), 3);
        assert!(matches!(&node.function, FunctionBinding::Builtin { name, .. } if name == "sum"));
    }

    #[test]
    fn builtin_per_band_wiring_matches_band_index() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                // max adopts the Byte source type, where B's -1 nodata would not fit.
                nodata: NoDataPolicy::Disabled,
                ..Default::default()
            },
        };

        let function = PixelFunction::Builtin {
            name: "max".to_string(),
            arguments: Vec::new(),
        };

        // A (2 bands) contributes its matching band, single-band B contributes everywhere.
        let node = assembler.build_band(&function, None, 2).expect("band 2");
        let variables: Vec<&str> = node.inputs.iter().map(|i| i.variable.as_str()).collect();
        assert_eq!(variables, vec!["A[2]", "B[1]"]);
    }

    #[test]
    fn value_preserving_builtin_adopts_uniform_source_type() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                nodata: NoDataPolicy::Disabled,
                ..Default::default()
            },
        };

        let max = PixelFunction::Builtin {
            name: "max".to_string(),
            arguments: Vec::new(),
        };
        let node = assembler.build_band(&max, None, 1).expect("band");
        assert_eq!(node.data_type, RasterDataType::Byte);

        // sum is not value preserving, even with uniform source types.
        let sum = PixelFunction::Builtin {
            name: "sum".to_string(),
            arguments: Vec::new(),
        };
        let node = assembler.build_band(&sum, None, 1).expect("band");
        assert_eq!(node.data_type, RasterDataType::Float64);
    }

    #[test]
    fn auto_nodata_must_be_representable() {
        let (sources, mut properties) = two_sources();
        properties.get_mut("B").expect("B exists").band_nodata = vec![Some(-1.0)];

        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                data_type: Some(RasterDataType::Byte),
                ..Default::default()
            },
        };

        let function = PixelFunction::Formula {
            dialect: Dialect::Muparser,
            text: "A+B".to_string(),
        };
        let expanded = ExpandedExpression {
            source_text: "A+B".to_string(),
            output_band_count: 1,
            per_band_text: vec!["A[1]+B[1]".to_string()],
        };

        assert!(matches!(
            assembler.build_band(&function, Some(&expanded), 1),
            Err(Error::NoDataNotRepresentable {
                value,
                data_type: RasterDataType::Byte
            }) if value == -1.0
        ));
    }

    #[test]
    fn propagate_nodata_is_injected() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                nodata: NoDataPolicy::Value(-9999.0),
                propagate_nodata: true,
                ..Default::default()
            },
        };

        let function = PixelFunction::Formula {
            dialect: Dialect::Muparser,
            text: "A[1]".to_string(),
        };
        let expanded = ExpandedExpression {
            source_text: "A[1]".to_string(),
            output_band_count: 1,
            per_band_text: vec!["A[1]".to_string()],
        };

        let node = assembler.build_band(&function, Some(&expanded), 1).expect("band");
        match &node.function {
            FunctionBinding::Formula { arguments, .. } => {
                assert!(arguments.contains(&("propagateNoData".to_string(), "1".to_string())));
            }
            other => panic!("expected formula binding, got {other:?}"),
        }

        // mode does not accept propagateNoData.
        let mode = PixelFunction::Builtin {
            name: "mode".to_string(),
            arguments: Vec::new(),
        };
        assert!(matches!(
            assembler.build_band(&mode, None, 1),
            Err(Error::UnrecognizedBuiltinArgument { .. })
        ));
    }

    #[test]
    fn single_pixel_rendition_has_no_windows() {
        let (sources, properties) = two_sources();
        let reference = grid();
        let assembler = GraphAssembler {
            sources: &sources,
            properties: &properties,
            grid: &reference,
            options: BandOptions {
                single_pixel: true,
                nodata: NoDataPolicy::Disabled,
                ..Default::default()
            },
        };

        let function = PixelFunction::Builtin {
            name: "min".to_string(),
            arguments: Vec::new(),
        };
        let node = assembler.build_band(&function, None, 1).expect("band");
        assert!(node.inputs.iter().all(|i| i.src_window.is_none() && i.dst_window.is_none()));
    }

    #[test]
    fn nodata_policy_parsing() {
        assert_eq!(NoDataPolicy::parse("none").ok(), Some(NoDataPolicy::Disabled));
        assert_eq!(NoDataPolicy::parse("NONE").ok(), Some(NoDataPolicy::Disabled));
        assert_eq!(NoDataPolicy::parse("").ok(), Some(NoDataPolicy::Disabled));
        assert_eq!(NoDataPolicy::parse("-1.5").ok(), Some(NoDataPolicy::Value(-1.5)));
        assert_eq!(NoDataPolicy::parse("255").ok(), Some(NoDataPolicy::Value(255.0)));
        assert!(matches!(NoDataPolicy::parse("255abc"), Err(Error::InvalidNoDataValue(_))));
        assert!(matches!(NoDataPolicy::parse("12 34"), Err(Error::InvalidNoDataValue(_))));
    }
}
