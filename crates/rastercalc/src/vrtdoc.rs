use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::{BandInputRef, Error, FunctionBinding, Result, SourceWindow, VirtualDataset};

fn xml_error(err: xml::writer::Error) -> Error {
    Error::Runtime(format!("XML write error: {err}"))
}

/// Serializes the virtual dataset description to its VRT XML document.
///
/// Every output band becomes a `VRTRasterBand` with subclass
/// `VRTDerivedRasterBand`: the inputs are listed as simple sources and the
/// computation as a pixel function. Builtins map directly onto a named pixel
/// function; formulas go through the generic `expression` function with the
/// dialect and rewritten text as arguments.
pub fn render_document(dataset: &VirtualDataset) -> Result<String> {
    let mut buffer = Vec::new();
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(false)
        .create_writer(&mut buffer);

    let cols = dataset.grid.size.cols.to_string();
    let rows = dataset.grid.size.rows.to_string();
    writer
        .write(XmlEvent::start_element("VRTDataset").attr("rasterXSize", &cols).attr("rasterYSize", &rows))
        .map_err(xml_error)?;

    if let Some(projection) = &dataset.grid.projection {
        write_text_element(&mut writer, "SRS", projection)?;
    }

    if let Some(gt) = &dataset.grid.geo_transform {
        let text = gt.coefficients().map(|c| c.to_string()).join(", ");
        write_text_element(&mut writer, "GeoTransform", &text)?;
    }

    for (index, band) in dataset.bands.iter().enumerate() {
        let band_number = (index + 1).to_string();
        writer
            .write(
                XmlEvent::start_element("VRTRasterBand")
                    .attr("dataType", band.data_type.to_str())
                    .attr("band", &band_number)
                    .attr("subClass", "VRTDerivedRasterBand"),
            )
            .map_err(xml_error)?;

        if let Some(nodata) = band.nodata {
            write_text_element(&mut writer, "NoDataValue", &nodata.to_string())?;
        }

        write_pixel_function(&mut writer, &band.function)?;

        for input in &band.inputs {
            write_simple_source(&mut writer, input)?;
        }

        writer.write(XmlEvent::end_element()).map_err(xml_error)?;
    }

    writer.write(XmlEvent::end_element()).map_err(xml_error)?;

    String::from_utf8(buffer).map_err(|err| Error::Runtime(format!("Invalid VRT document encoding: {err}")))
}

fn write_pixel_function<W: std::io::Write>(writer: &mut EventWriter<W>, function: &FunctionBinding) -> Result {
    let (name, arguments) = match function {
        FunctionBinding::Builtin { name, arguments } => (name.clone(), arguments.clone()),
        FunctionBinding::Formula {
            dialect,
            expression,
            arguments,
        } => {
            let mut arguments = arguments.clone();
            arguments.insert(0, ("expression".to_string(), expression.clone()));
            arguments.insert(1, ("dialect".to_string(), dialect.to_string()));
            ("expression".to_string(), arguments)
        }
    };

    write_text_element(writer, "PixelFunctionType", &name)?;

    if !arguments.is_empty() {
        let mut element = XmlEvent::start_element("PixelFunctionArguments");
        for (key, value) in &arguments {
            element = element.attr(key.as_str(), value.as_str());
        }

        writer.write(element).map_err(xml_error)?;
        writer.write(XmlEvent::end_element()).map_err(xml_error)?;
    }

    Ok(())
}

fn write_simple_source<W: std::io::Write>(writer: &mut EventWriter<W>, input: &BandInputRef) -> Result {
    writer
        .write(XmlEvent::start_element("SimpleSource").attr("name", &input.variable))
        .map_err(xml_error)?;

    writer
        .write(XmlEvent::start_element("SourceFilename").attr("relativeToVRT", "0"))
        .map_err(xml_error)?;
    writer.write(XmlEvent::characters(&input.locator)).map_err(xml_error)?;
    writer.write(XmlEvent::end_element()).map_err(xml_error)?;

    write_text_element(writer, "SourceBand", &input.band.to_string())?;

    if let Some(nodata) = input.nodata {
        write_text_element(writer, "NODATA", &nodata.to_string())?;
    }

    if let Some(window) = &input.src_window {
        write_rect(writer, "SrcRect", window)?;
    }

    if let Some(window) = &input.dst_window {
        write_rect(writer, "DstRect", window)?;
    }

    writer.write(XmlEvent::end_element()).map_err(xml_error)?;
    Ok(())
}

fn write_rect<W: std::io::Write>(writer: &mut EventWriter<W>, name: &str, window: &SourceWindow) -> Result {
    let x_off = window.x_off.to_string();
    let y_off = window.y_off.to_string();
    let x_size = window.cols.to_string();
    let y_size = window.rows.to_string();

    writer
        .write(
            XmlEvent::start_element(name)
                .attr("xOff", &x_off)
                .attr("yOff", &y_off)
                .attr("xSize", &x_size)
                .attr("ySize", &y_size),
        )
        .map_err(xml_error)?;
    writer.write(XmlEvent::end_element()).map_err(xml_error)?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(writer: &mut EventWriter<W>, name: &str, text: &str) -> Result {
    writer.write(XmlEvent::start_element(name)).map_err(xml_error)?;
    writer.write(XmlEvent::characters(text)).map_err(xml_error)?;
    writer.write(XmlEvent::end_element()).map_err(xml_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DerivedBandNode, Dialect, GeoTransform, RasterDataType, RasterSize, ReferenceGrid, SourceWindow,
        VirtualDataset,
    };

    fn formula_band() -> DerivedBandNode {
        DerivedBandNode {
            data_type: RasterDataType::Float64,
            nodata: Some(-1.0),
            inputs: vec![
                BandInputRef {
                    locator: "gridA.tif".to_string(),
                    variable: "A[1]".to_string(),
                    band: 1,
                    nodata: None,
                    src_window: Some(SourceWindow::full(10, 10)),
                    dst_window: Some(SourceWindow::full(10, 10)),
                },
                BandInputRef {
                    locator: "gridB.tif".to_string(),
                    variable: "B[1]".to_string(),
                    band: 1,
                    nodata: Some(-1.0),
                    src_window: Some(SourceWindow::full(10, 10)),
                    dst_window: Some(SourceWindow::full(10, 10)),
                },
            ],
            function: FunctionBinding::Formula {
                dialect: Dialect::Muparser,
                expression: "A[1]+B[1]".to_string(),
                arguments: Vec::new(),
            },
        }
    }

    fn dataset(bands: Vec<DerivedBandNode>) -> VirtualDataset {
        VirtualDataset {
            grid: ReferenceGrid {
                size: RasterSize::new(10, 10),
                geo_transform: Some(GeoTransform::north_up(0.0, 0.0, 10.0)),
                projection: Some("EPSG:31370".to_string()),
            },
            bands,
        }
    }

    #[test]
    fn formula_band_document() {
        let doc = render_document(&dataset(vec![formula_band()])).expect("valid document");

        assert!(doc.contains(r#"<VRTDataset rasterXSize="10" rasterYSize="10">"#));
        assert!(doc.contains("<SRS>EPSG:31370</SRS>"));
        assert!(doc.contains("<GeoTransform>0, 10, 0, 0, 0, -10</GeoTransform>"));
        assert!(doc.contains(r#"dataType="Float64""#));
        assert!(doc.contains(r#"subClass="VRTDerivedRasterBand""#));
        assert!(doc.contains("<NoDataValue>-1</NoDataValue>"));
        assert!(doc.contains("<PixelFunctionType>expression</PixelFunctionType>"));
        assert!(doc.contains(r#"expression="A[1]+B[1]""#));
        assert!(doc.contains(r#"<SimpleSource name="A[1]">"#));
        assert!(doc.contains("<SourceFilename relativeToVRT=\"0\">gridA.tif</SourceFilename>"));
        assert!(doc.contains("<NODATA>-1</NODATA>"));
        assert!(doc.contains(r#"<SrcRect xOff="0" yOff="0" xSize="10" ySize="10" />"#));
        // The expression binding is always tagged with its dialect name.
        assert!(doc.contains(r#"dialect="muparser""#));
    }

    #[test]
    fn builtin_band_maps_to_named_pixel_function() {
        let band = DerivedBandNode {
            function: FunctionBinding::Builtin {
                name: "sum".to_string(),
                arguments: vec![("propagateNoData".to_string(), "1".to_string())],
            },
            ..formula_band()
        };

        let doc = render_document(&dataset(vec![band])).expect("valid document");

        assert!(doc.contains("<PixelFunctionType>sum</PixelFunctionType>"));
        assert!(doc.contains(r#"<PixelFunctionArguments propagateNoData="1" />"#));
        assert!(!doc.contains("expression"));
    }

    #[test]
    fn geotransform_is_omitted_without_georeferencing() {
        let mut ds = dataset(vec![formula_band()]);
        ds.grid.geo_transform = None;
        ds.grid.projection = None;

        let doc = render_document(&ds).expect("valid document");
        assert!(!doc.contains("GeoTransform"));
        assert!(!doc.contains("SRS"));
    }

    #[test]
    fn expression_text_is_escaped() {
        let band = DerivedBandNode {
            function: FunctionBinding::Formula {
                dialect: Dialect::Muparser,
                expression: "A[1] < B[1] ? A[1] : B[1]".to_string(),
                arguments: Vec::new(),
            },
            ..formula_band()
        };

        let doc = render_document(&dataset(vec![band])).expect("valid document");
        assert!(doc.contains("&lt;"));
        assert!(!doc.contains("<B[1]"));
    }

    #[test]
    fn bands_are_numbered_in_order() {
        let doc = render_document(&dataset(vec![formula_band(), formula_band()])).expect("valid document");
        assert!(doc.contains(r#"band="1""#));
        assert!(doc.contains(r#"band="2""#));
    }
}
