use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use rastercalc::{
    build_virtual_dataset, CalcOptions, Dialect, GdalDatasetProvider, NoDataPolicy, RasterDataType, Result,
};

#[derive(Parser, Debug)]
#[clap(name = "calccli", about = "Combine rasters with per-pixel expressions into a virtual dataset")]
struct Opt {
    /// Input rasters as NAME=PATH pairs or bare paths. A token starting with
    /// `@` names a file with one input per line.
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<String>,

    /// Expression to evaluate, repeatable. Each expression appends its output bands.
    #[arg(long = "calc", short = 'c', required = true, value_name = "EXPRESSION")]
    expressions: Vec<String>,

    #[arg(long = "dialect", default_value = "muparser", value_name = "muparser|builtin")]
    dialect: Dialect,

    /// Collapse multiband aggregates into a single output band.
    #[arg(long = "flatten")]
    flatten: bool,

    /// Output nodata value, or `none` to disable nodata.
    #[arg(long = "nodata", value_name = "VALUE")]
    nodata: Option<String>,

    /// Output data type, e.g. Byte or Float32. Defaults to Float64.
    #[arg(long = "type", value_name = "TYPE")]
    data_type: Option<RasterDataType>,

    #[arg(long = "no-check-crs", help = "Skip the spatial reference consistency check")]
    no_check_crs: bool,

    #[arg(long = "no-check-extent", help = "Skip the extent checks, only compare pixel dimensions")]
    no_check_extent: bool,

    /// Output nodata wherever any input pixel is nodata. Requires --nodata.
    #[arg(long = "propagate-nodata")]
    propagate_nodata: bool,

    #[arg(long = "no-check-expression", hide = true)]
    no_check_expression: bool,

    /// Output path for the VRT document, `-` writes to stdout.
    #[arg(long = "output", short = 'o', default_value = "-")]
    output: PathBuf,
}

/// Expands `@file` tokens into the lines of the named file.
fn expand_input_tokens(inputs: &[String]) -> Result<Vec<String>> {
    let mut tokens = Vec::with_capacity(inputs.len());
    for input in inputs {
        if let Some(list_path) = input.strip_prefix('@') {
            let contents = std::fs::read_to_string(list_path)?;
            tokens.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from));
        } else {
            tokens.push(input.clone());
        }
    }

    Ok(tokens)
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let nodata = match &opt.nodata {
        Some(value) => NoDataPolicy::parse(value)?,
        None => NoDataPolicy::Auto,
    };

    let options = CalcOptions {
        expressions: opt.expressions,
        dialect: opt.dialect,
        flatten: opt.flatten,
        nodata,
        data_type: opt.data_type,
        check_crs: !opt.no_check_crs,
        check_extent: !opt.no_check_extent,
        propagate_nodata: opt.propagate_nodata,
        check_expression: !opt.no_check_expression,
    };

    let tokens = expand_input_tokens(&opt.inputs)?;
    let dataset = build_virtual_dataset(&tokens, &options, &GdalDatasetProvider, None)?;
    let document = rastercalc::render_document(&dataset)?;

    if opt.output.as_os_str() == "-" {
        std::io::stdout().write_all(document.as_bytes())?;
    } else {
        std::fs::write(&opt.output, document)?;
        log::info!("Wrote {} band virtual dataset to {}", dataset.bands.len(), opt.output.display());
    }

    Ok(())
}
