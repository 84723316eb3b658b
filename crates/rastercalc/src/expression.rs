use crate::{Error, Result};

/// Expression dialects understood by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Scalar formula text, handed to the muparser-backed engine untouched.
    #[default]
    Muparser,
    /// One of the builtin per-pixel aggregate functions.
    Builtin,
}

impl Dialect {
    pub fn to_str(&self) -> &'static str {
        match self {
            Dialect::Muparser => "muparser",
            Dialect::Builtin => "builtin",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "muparser" => Ok(Dialect::Muparser),
            "builtin" => Ok(Dialect::Builtin),
            _ => Err(Error::InvalidArgument(format!("Unknown expression dialect: {s}"))),
        }
    }
}

/// The computation bound to an expression, decided once at ingestion time.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelFunction {
    /// A builtin function with validated keyword arguments.
    Builtin { name: String, arguments: Vec<(String, String)> },
    /// Formula text for an expression engine, tagged with its dialect name.
    Formula { dialect: Dialect, text: String },
}

struct BuiltinFunction {
    name: &'static str,
    arguments: &'static [&'static str],
    /// Whether the function passes source values through unchanged, so the
    /// output can adopt the sources' data type instead of defaulting to Float64.
    preserves_data_type: bool,
}

const BUILTIN_FUNCTIONS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "min",
        arguments: &["propagateNoData"],
        preserves_data_type: true,
    },
    BuiltinFunction {
        name: "max",
        arguments: &["propagateNoData"],
        preserves_data_type: true,
    },
    BuiltinFunction {
        name: "mean",
        arguments: &["propagateNoData"],
        preserves_data_type: false,
    },
    BuiltinFunction {
        name: "median",
        arguments: &[],
        preserves_data_type: false,
    },
    BuiltinFunction {
        name: "mode",
        arguments: &[],
        preserves_data_type: true,
    },
    BuiltinFunction {
        name: "stddev",
        arguments: &[],
        preserves_data_type: false,
    },
    BuiltinFunction {
        name: "sum",
        arguments: &["k", "propagateNoData"],
        preserves_data_type: false,
    },
];

fn builtin_by_name(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTIN_FUNCTIONS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

fn valid_arguments_suffix(function: &BuiltinFunction) -> String {
    if function.arguments.is_empty() {
        String::new()
    } else {
        format!(" (valid arguments: {})", function.arguments.join(", "))
    }
}

/// Whether a builtin function's output band may adopt the uniform source data type.
pub fn builtin_preserves_data_type(name: &str) -> bool {
    builtin_by_name(name).is_some_and(|f| f.preserves_data_type)
}

/// Whether a builtin function accepts the given keyword argument.
pub fn builtin_accepts_argument(name: &str, argument: &str) -> bool {
    builtin_by_name(name).is_some_and(|f| f.arguments.contains(&argument))
}

/// Preformatted valid-argument listing for error messages, empty when the
/// function takes no arguments or does not exist.
pub(crate) fn builtin_arguments_suffix(name: &str) -> String {
    builtin_by_name(name).map(valid_arguments_suffix).unwrap_or_default()
}

/// Turns one raw `--calc` value into its pixel-function binding.
///
/// Formula dialects pass the text through untouched; the grammar belongs to
/// the expression engine. The builtin dialect accepts a bare function name or
/// a call with keyword arguments (`sum(k=2)`), validated against the registry.
pub fn ingest_expression(raw: &str, dialect: Dialect) -> Result<PixelFunction> {
    match dialect {
        Dialect::Muparser => Ok(PixelFunction::Formula {
            dialect,
            text: raw.to_string(),
        }),
        Dialect::Builtin => parse_builtin_call(raw),
    }
}

fn parse_builtin_call(raw: &str) -> Result<PixelFunction> {
    let raw = raw.trim();
    let (name, argument_list) = match raw.split_once('(') {
        Some((name, rest)) => {
            let Some(arguments) = rest.strip_suffix(')') else {
                return Err(Error::InvalidArgument(format!("Unterminated argument list in '{raw}'")));
            };
            (name.trim(), Some(arguments))
        }
        None => (raw, None),
    };

    let Some(function) = builtin_by_name(name) else {
        return Err(Error::UnknownBuiltinFunction(name.to_string()));
    };

    let mut arguments = Vec::new();
    if let Some(argument_list) = argument_list {
        for part in argument_list.split(',').filter(|p| !p.trim().is_empty()) {
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (part.trim(), ""),
            };

            if !function.arguments.contains(&key) {
                return Err(Error::UnrecognizedBuiltinArgument {
                    function: function.name.to_string(),
                    argument: key.to_string(),
                    valid: valid_arguments_suffix(function),
                });
            }

            arguments.push((key.to_string(), value.to_string()));
        }
    }

    Ok(PixelFunction::Builtin {
        name: function.name.to_string(),
        arguments,
    })
}
