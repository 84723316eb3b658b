use std::collections::BTreeMap;

use crate::{Error, Result};

/// Named raster inputs for one pipeline run, keyed by source name.
///
/// A `BTreeMap` is used on purpose: nodata auto-selection and band wiring
/// depend on the iteration order, which has to be lexicographic by name.
pub type SourceSet = BTreeMap<String, String>;

/// Parses `NAME=DSN` input tokens into a name -> locator map.
///
/// Tokens without a name are only allowed when `require_names` is false or a
/// single input is provided; they receive the synthetic names `X`, `X1`, ...
/// A locator wrapped in `[...]` is rewritten into a streamed nested-pipeline
/// connection string instead of being treated as a literal path.
pub fn parse_sources(tokens: &[String], require_names: bool) -> Result<SourceSet> {
    let mut sources = SourceSet::new();

    for (index, token) in tokens.iter().enumerate() {
        let (name, locator) = match token.split_once('=') {
            Some((name, locator)) => {
                validate_source_name(name, token)?;
                (name.to_string(), locator.to_string())
            }
            None => {
                if require_names && tokens.len() > 1 {
                    return Err(Error::MissingSourceName(token.clone()));
                }

                let name = if index == 0 { "X".to_string() } else { format!("X{index}") };
                (name, token.clone())
            }
        };

        let locator = rewrite_inline_pipeline(&locator);
        log::debug!("Input source '{name}': {locator}");

        if sources.insert(name.clone(), locator).is_some() {
            return Err(Error::DuplicateSourceName(name));
        }
    }

    Ok(sources)
}

fn validate_source_name(name: &str, token: &str) -> Result {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(Error::MissingSourceName(token.to_string())),
    };

    // Names starting with an underscore are reserved for the expression
    // engine's builtin constants, digits would be ambiguous with band indices.
    if !first.is_ascii_alphabetic() {
        return Err(Error::IllegalIdentifier {
            name: name.to_string(),
            character: first,
        });
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::IllegalIdentifier {
                name: name.to_string(),
                character: c,
            });
        }
    }

    Ok(())
}

/// Rewrites a bracket-delimited inline pipeline (`[gdal raster ...]`) into the
/// connection string understood by the streamed-pipeline driver.
fn rewrite_inline_pipeline(locator: &str) -> String {
    let Some(inner) = locator.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) else {
        return locator.to_string();
    };

    let mut escaped = String::with_capacity(inner.len());
    for c in inner.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }

    format!("{{\"type\":\"gdal_streamed_alg\",\"command_line\":\"{escaped}\"}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn named_inputs() {
        let sources = parse_sources(&tokens(&["A=a.tif", "B=b.tif"]), true).expect("valid input");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources["A"], "a.tif");
        assert_eq!(sources["B"], "b.tif");
    }

    #[test]
    fn valid_identifiers_are_accepted() {
        for name in ["A", "abc", "A1", "snake_case_2", "Z9_"] {
            let token = format!("{name}=in.tif");
            assert!(parse_sources(&[token], true).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        for (name, bad_char) in [("1a", '1'), ("_x", '_'), ("a-b", '-'), ("a b", ' '), ("é", 'é')] {
            let token = format!("{name}=in.tif");
            match parse_sources(&[token], true) {
                Err(Error::IllegalIdentifier { character, .. }) => assert_eq!(character, bad_char),
                other => panic!("expected IllegalIdentifier for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn single_anonymous_input_gets_default_name() {
        let sources = parse_sources(&tokens(&["input.tif"]), true).expect("valid input");
        assert_eq!(sources["X"], "input.tif");
    }

    #[test]
    fn multiple_anonymous_inputs_require_names() {
        assert!(matches!(
            parse_sources(&tokens(&["a.tif", "b.tif"]), true),
            Err(Error::MissingSourceName(token)) if token == "a.tif"
        ));
    }

    #[test]
    fn anonymous_inputs_are_numbered_when_names_are_not_required() {
        let sources = parse_sources(&tokens(&["a.tif", "b.tif", "c.tif"]), false).expect("valid input");
        assert_eq!(sources["X"], "a.tif");
        assert_eq!(sources["X1"], "b.tif");
        assert_eq!(sources["X2"], "c.tif");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(matches!(
            parse_sources(&tokens(&["A=a.tif", "A=b.tif"]), true),
            Err(Error::DuplicateSourceName(name)) if name == "A"
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            parse_sources(&tokens(&["=a.tif"]), true),
            Err(Error::MissingSourceName(_))
        ));
    }

    #[test]
    fn inline_pipeline_is_rewritten() {
        let sources = parse_sources(&tokens(&[r#"A=[gdal raster reproject "my file.tif"]"#]), true).expect("valid input");
        assert_eq!(
            sources["A"],
            r#"{"type":"gdal_streamed_alg","command_line":"gdal raster reproject \"my file.tif\""}"#
        );
    }

    #[test]
    fn backslashes_are_escaped_in_inline_pipelines() {
        let sources = parse_sources(&tokens(&[r"A=[gdal raster info c:\data\in.tif]"]), true).expect("valid input");
        assert_eq!(
            sources["A"],
            r#"{"type":"gdal_streamed_alg","command_line":"gdal raster info c:\\data\\in.tif"}"#
        );
    }
}
