//! Reading input records from CSV, JSON and JSON lines files.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use reach_lib::Fields;
use serde::Deserialize;
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, VariantNames};

/// Supported input file formats
#[derive(
    Debug, Deserialize, Clone, Copy, Display, EnumIter, EnumString, VariantNames, PartialEq, Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub(crate) enum InputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// A JSON array of objects
    Json,
    /// One JSON object per line
    #[strum(to_string = "jsonl", serialize = "ndjson")]
    Jsonl,
}

impl InputFormat {
    /// Derive the format from the file extension of `path`
    fn from_path(path: &Path) -> Result<Self> {
        if path == Path::new("-") {
            return Ok(Self::Jsonl);
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            Some("jsonl" | "ndjson") => Ok(Self::Jsonl),
            _ => bail!(
                "Cannot determine the format of `{}`; use `--input-format` with one of: {}",
                path.display(),
                Self::VARIANTS.join(", ")
            ),
        }
    }
}

/// Read all records of `path` (`-` for stdin) in file order.
///
/// Empty CSV cells and JSON `null`s become null fields. Other JSON values
/// are sent as their textual representation.
pub(crate) fn read_records(path: &Path, format: Option<InputFormat>) -> Result<Vec<Fields>> {
    let format = match format {
        Some(format) => format,
        None => InputFormat::from_path(path)?,
    };
    let reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(path)
                .with_context(|| format!("Cannot open input file `{}`", path.display()))?,
        )
    };
    parse_records(reader, format)
        .with_context(|| format!("Cannot read records from `{}`", path.display()))
}

fn parse_records<R: Read>(reader: R, format: InputFormat) -> Result<Vec<Fields>> {
    match format {
        InputFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(reader);
            let headers = reader.headers()?.clone();
            reader
                .records()
                .map(|row| -> Result<Fields> {
                    let row = row?;
                    Ok(headers
                        .iter()
                        .zip(row.iter())
                        .map(|(name, value)| {
                            (name.to_string(), (!value.is_empty()).then(|| value.to_string()))
                        })
                        .collect())
                })
                .collect()
        }
        InputFormat::Json => {
            let objects: Vec<Map<String, Value>> = serde_json::from_reader(reader)
                .context("Expected a JSON array of objects")?;
            Ok(objects.into_iter().map(object_to_fields).collect())
        }
        InputFormat::Jsonl => {
            let mut records = Vec::new();
            for (number, line) in BufReader::new(reader).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let object: Map<String, Value> = serde_json::from_str(&line)
                    .with_context(|| format!("Expected a JSON object on line {}", number + 1))?;
                records.push(object_to_fields(object));
            }
            Ok(records)
        }
    }
}

fn object_to_fields(object: Map<String, Value>) -> Fields {
    object
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            };
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use reach_lib::Fields;
    use test_utils::fixtures_path;

    use super::{parse_records, read_records, InputFormat};

    fn fields(pairs: &[(&str, Option<&str>)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            InputFormat::from_path(Path::new("in.CSV")).unwrap(),
            InputFormat::Csv
        );
        assert_eq!(
            InputFormat::from_path(Path::new("in.ndjson")).unwrap(),
            InputFormat::Jsonl
        );
        assert_eq!(
            InputFormat::from_path(Path::new("-")).unwrap(),
            InputFormat::Jsonl
        );
        assert!(InputFormat::from_path(Path::new("records.txt")).is_err());
        assert_eq!("JSON".parse::<InputFormat>().unwrap(), InputFormat::Json);
    }

    #[test]
    fn test_csv_fixture() {
        let records = read_records(&fixtures_path!().join("records.csv"), None).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1],
            fields(&[
                ("first", Some("Jane")),
                ("last", Some("Roe")),
                ("city", None),
                ("state", Some("WA")),
                ("zip", Some("98101")),
            ])
        );
        assert_eq!(records[2]["zip"], None);
    }

    #[test]
    fn test_jsonl_fixture() {
        let records = read_records(&fixtures_path!().join("records.jsonl"), None).unwrap();
        assert_eq!(
            records,
            vec![
                fields(&[
                    ("first", Some("John")),
                    ("last", Some("Doe")),
                    ("zip", Some("10001")),
                ]),
                fields(&[("first", Some("Jane")), ("last", Some("Roe")), ("city", None)]),
                fields(&[("email", Some("max@example.com"))]),
            ]
        );
    }

    #[test]
    fn test_json_array() {
        let input = r#"[{"email": "a@example.com", "vip": true}, {"phone": null}]"#;
        let records = parse_records(input.as_bytes(), InputFormat::Json).unwrap();
        assert_eq!(
            records,
            vec![
                fields(&[("email", Some("a@example.com")), ("vip", Some("true"))]),
                fields(&[("phone", None)]),
            ]
        );
    }

    #[test]
    fn test_invalid_jsonl_names_line() {
        let input = "{\"first\": \"John\"}\n\nnot json\n";
        let err = parse_records(input.as_bytes(), InputFormat::Jsonl).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_records(Path::new("does-not-exist.csv"), None).unwrap_err();
        assert!(err.to_string().contains("does-not-exist.csv"));
    }
}
