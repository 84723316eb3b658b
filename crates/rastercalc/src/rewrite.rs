use std::collections::BTreeMap;

use itertools::Itertools;

use crate::{Error, Result, SourceProperties};

/// Aggregate functions whose argument lists take a flattened per-band expansion.
const AGGREGATE_FUNCTIONS: [&str; 4] = ["avg", "sum", "min", "max"];

/// One user expression after band expansion against all sources.
#[derive(Clone, Debug)]
pub struct ExpandedExpression {
    pub source_text: String,
    pub output_band_count: usize,
    /// The rewritten expression per output band; the substituted default band
    /// index differs per output band, so the texts can too.
    pub per_band_text: Vec<String>,
}

fn is_identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Rewrites every complete, unindexed occurrence of `variable` to `variable[band]`.
///
/// An occurrence qualifies when it is not preceded by an identifier character
/// and not followed by an identifier character, `[` (already indexed) or `(`
/// (function call, not a variable). Returns the rewritten text and whether
/// anything changed. The scan builds a fresh output buffer from copied spans,
/// advancing past each rewritten occurrence, so an inserted index is never
/// rescanned.
pub fn set_band_indices(expression: &str, variable: &str, band: usize) -> (String, bool) {
    let bytes = expression.as_bytes();
    let mut out = String::with_capacity(expression.len() + 8);
    let mut changed = false;
    let mut pos = 0;

    while let Some(offset) = expression[pos..].find(variable) {
        let start = pos + offset;
        let end = start + variable.len();
        out.push_str(&expression[pos..start]);
        out.push_str(variable);

        let preceded_by_identifier = start > 0 && is_identifier_char(bytes[start - 1]);
        let qualifies = !preceded_by_identifier
            && match bytes.get(end) {
                None => true,
                Some(&c) => !is_identifier_char(c) && c != b'[' && c != b'(',
            };

        if qualifies {
            out.push('[');
            out.push_str(&band.to_string());
            out.push(']');
            changed = true;
        }

        pos = end;
    }

    out.push_str(&expression[pos..]);
    (out, changed)
}

/// Expands every qualifying unindexed occurrence of `variable` inside an
/// aggregate argument list into the comma-joined list of all its bands:
/// `sum(X)` becomes `sum(X[1],X[2],X[3])`. Occurrences outside aggregate
/// argument lists are left alone.
pub fn flatten_aggregate_arguments(expression: &str, variable: &str, band_count: usize) -> String {
    let bytes = expression.as_bytes();
    let mut out = String::with_capacity(expression.len() + band_count * (variable.len() + 4));
    let mut pos = 0;

    while let Some(offset) = expression[pos..].find(variable) {
        let start = pos + offset;
        let end = start + variable.len();
        out.push_str(&expression[pos..start]);

        let preceded_by_identifier = start > 0 && is_identifier_char(bytes[start - 1]);
        let qualifies = !preceded_by_identifier
            && match bytes.get(end) {
                None => true,
                Some(&c) => !is_identifier_char(c) && c != b'[' && c != b'(',
            };

        if qualifies && in_aggregate_argument_list(expression, start) {
            out.push_str(&(1..=band_count).map(|band| format!("{variable}[{band}]")).join(","));
        } else {
            out.push_str(variable);
        }

        pos = end;
    }

    out.push_str(&expression[pos..]);
    out
}

/// Whether the given position sits inside the argument list of an aggregate
/// function call. Scans backward through a balanced run of identifier, comma,
/// dot and bracket characters to the opening `(`, then checks the three
/// characters in front of it against the aggregate names, case-insensitively.
fn in_aggregate_argument_list(expression: &str, occurrence: usize) -> bool {
    let bytes = expression.as_bytes();
    let mut depth = 0i32;
    let mut pos = occurrence;

    while pos > 0 {
        let c = bytes[pos - 1];
        match c {
            b'(' if depth == 0 => {
                let open = pos - 1;
                if open < 3 {
                    return false;
                }

                // Not a char boundary means non-ASCII text in front of the `(`, so no aggregate name.
                let Some(name) = expression.get(open - 3..open) else {
                    return false;
                };
                if !AGGREGATE_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name)) {
                    return false;
                }

                // The name itself has to be a complete token ("mysum(" is not an aggregate).
                return open == 3 || !is_identifier_char(bytes[open - 4]);
            }
            b'(' => return false,
            b']' => depth += 1,
            b'[' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            c if is_identifier_char(c) || matches!(c, b',' | b'.' | b' ') => {}
            _ => return false,
        }

        pos -= 1;
    }

    false
}

/// Whether the rewritten expression references the given band of `variable`.
pub fn contains_band_reference(expression: &str, variable: &str, band: usize) -> bool {
    let needle = format!("{variable}[{band}]");
    let bytes = expression.as_bytes();
    let mut pos = 0;

    while let Some(offset) = expression[pos..].find(&needle) {
        let start = pos + offset;
        if start == 0 || !is_identifier_char(bytes[start - 1]) {
            return true;
        }

        pos = start + 1;
    }

    false
}

/// Expands one expression against all sources: determines the implied output
/// band count and produces the rewritten text per output band.
///
/// A variable used whole (without an explicit band index) broadcasts per band.
/// The first source doing so raises the output band count to its band count;
/// every other broadcasting source then has to bring exactly 1 or exactly
/// that many bands.
pub fn expand_expression(
    expression: &str,
    sources: &BTreeMap<String, SourceProperties>,
    flatten: bool,
) -> Result<ExpandedExpression> {
    let mut output_band_count = 1usize;

    for (name, props) in sources {
        let text = if flatten {
            flatten_aggregate_arguments(expression, name, props.band_count)
        } else {
            expression.to_string()
        };

        let (_, applied_per_band) = set_band_indices(&text, name, 1);
        if applied_per_band {
            if output_band_count == 1 {
                output_band_count = props.band_count.max(1);
            } else if props.band_count != 1 && props.band_count != output_band_count {
                return Err(Error::IncompatibleBandCounts {
                    source_name: name.clone(),
                    actual: props.band_count,
                    expected: output_band_count,
                });
            }
        }
    }

    let mut per_band_text = Vec::with_capacity(output_band_count);
    for band in 1..=output_band_count {
        let mut text = expression.to_string();
        for (name, props) in sources {
            if flatten {
                text = flatten_aggregate_arguments(&text, name, props.band_count);
            }
            (text, _) = set_band_indices(&text, name, props.band_count.min(band).max(1));
        }

        log::debug!("Output band {band}: {text}");
        per_band_text.push(text);
    }

    Ok(ExpandedExpression {
        source_text: expression.to_string(),
        output_band_count,
        per_band_text,
    })
}
