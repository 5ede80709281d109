use std::path::{Path, PathBuf};

use json::JsonValue;
use log::info;

use crate::{
    datatypes::{ModelMetadata, SourceTerm},
    error::{HeatError, Result},
};

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
fn load_input_file(input_file: &Path) -> Result<JsonValue> {
    let file_string =
        std::fs::read_to_string(input_file).map_err(|source| HeatError::FileNotFound {
            path: input_file.to_path_buf(),
            source,
        })?;

    json::parse(&file_string)
        .map_err(|err| HeatError::Input(format!("error in input file json: {err}")))
}

fn required_f64(json: &JsonValue, section: &str, key: &str) -> Result<f64> {
    json[key].as_f64().ok_or_else(|| {
        HeatError::Input(format!("{section} is missing numeric field '{key}'"))
    })
}

/// Reads the `source` section of the input file.
fn parse_source(source_json: &JsonValue) -> Result<SourceTerm> {
    if source_json.is_null() {
        return Ok(SourceTerm::default());
    }

    match source_json["type"].as_str() {
        Some("constant") => Ok(SourceTerm::Constant(required_f64(
            source_json,
            "constant source",
            "value",
        )?)),
        Some("quadratic") => Ok(SourceTerm::Quadratic {
            a: required_f64(source_json, "quadratic source", "a")?,
            b: required_f64(source_json, "quadratic source", "b")?,
        }),
        Some(other) => Err(HeatError::Input(format!(
            "unknown source type '{other}', expected 'constant' or 'quadratic'"
        ))),
        None => Err(HeatError::Input(
            "source section is missing its 'type' field".to_owned(),
        )),
    }
}

/// Parses Model Metadata from the input json
///
/// # Arguments
/// * `input_json`: The input file as a JsonValue object
pub fn parse_input_metadata(input_json: &JsonValue) -> Result<ModelMetadata> {
    if !input_json.is_object() {
        return Err(HeatError::Input("input json must be an object".to_owned()));
    }

    let source = parse_source(&input_json["source"])?;

    let output = match &input_json["output"] {
        JsonValue::Null => None,
        value => Some(
            value
                .as_str()
                .map(PathBuf::from)
                .ok_or_else(|| HeatError::Input("output must be a string path".to_owned()))?,
        ),
    };

    Ok(ModelMetadata { source, output })
}

/// Loads the run settings, falling back to a zero source when no input file
/// is given.
pub fn run(input_file: Option<&Path>) -> Result<ModelMetadata> {
    let metadata = match input_file {
        Some(path) => parse_input_metadata(&load_input_file(path)?)?,
        None => ModelMetadata {
            source: SourceTerm::default(),
            output: None,
        },
    };

    info!("using source term {:?}", metadata.source);

    Ok(metadata)
}
