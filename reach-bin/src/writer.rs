//! Writing outcomes to standard output or a file.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use reach_lib::Outcome;
use serde::Deserialize;
use strum::{Display, EnumIter, EnumString, VariantNames};

/// The different formatter modes
#[derive(
    Debug,
    Deserialize,
    Default,
    Clone,
    Copy,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    PartialEq,
    Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutputFormat {
    /// One JSON document per record and line
    #[default]
    Jsonl,
    /// One human-readable line per record
    Compact,
}

trait OutcomeWriter {
    fn write(&self, outcome: &Outcome, out: &mut dyn Write) -> Result<()>;
}

struct Jsonl;

impl OutcomeWriter for Jsonl {
    fn write(&self, outcome: &Outcome, out: &mut dyn Write) -> Result<()> {
        let line = serde_json::to_string(outcome).context("Cannot format outcome as JSON")?;
        writeln!(out, "{line}")?;
        Ok(())
    }
}

struct Compact;

impl OutcomeWriter for Compact {
    fn write(&self, outcome: &Outcome, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{outcome}")?;
        if let Some(description) = &outcome.error_description {
            writeln!(out, "    {description}")?;
        }
        Ok(())
    }
}

fn get_writer(format: OutputFormat) -> Box<dyn OutcomeWriter> {
    match format {
        OutputFormat::Jsonl => Box::new(Jsonl),
        OutputFormat::Compact => Box::new(Compact),
    }
}

/// Write `outcomes` in the given format to `path`, or to stdout if there is none
pub(crate) fn write_outcomes(
    outcomes: &[Outcome],
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<()> {
    let mut out: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Cannot create output file `{}`", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write_to(outcomes, format, &mut out)?;
    out.flush()?;
    Ok(())
}

fn write_to(outcomes: &[Outcome], format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    let writer = get_writer(format);
    for outcome in outcomes {
        writer.write(outcome, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use reach_lib::{Failure, Outcome};

    use super::{write_outcomes, write_to, OutputFormat};

    fn outcomes() -> Vec<Outcome> {
        let matched = Outcome {
            success: true,
            match_found: true,
            http_status: Some(200),
            reason_phrase: Some("OK".to_string()),
            parsed_body: Some(serde_json::json!({"versium": {"results": [{"phone": "555"}]}})),
            attempts: 1,
            ..Outcome::new(0)
        };
        let failed = Outcome {
            http_status: Some(404),
            reason_phrase: Some("Not Found".to_string()),
            error_description: Some("Unsuccessful url fetch: Not Found".to_string()),
            failure: Some(Failure::Terminal),
            attempts: 1,
            ..Outcome::new(1)
        };
        vec![matched, failed]
    }

    fn render(format: OutputFormat) -> String {
        let mut buf = Vec::new();
        write_to(&outcomes(), format, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_names() {
        assert_eq!("COMPACT".parse::<OutputFormat>().unwrap(), OutputFormat::Compact);
        assert_eq!(OutputFormat::default().to_string(), "jsonl");
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_jsonl_one_document_per_line() {
        let output = render(OutputFormat::Jsonl);
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["index"], 0);
        assert_eq!(lines[0]["match_found"], true);
        assert_eq!(lines[1]["index"], 1);
        assert_eq!(lines[1]["failure"], "terminal");
        assert_eq!(lines[1]["http_status"], 404);
    }

    #[test]
    fn test_compact() {
        let output = render(OutputFormat::Compact);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("✔ [200] record #0"));
        assert!(lines[1].starts_with("✗ [404] record #1"));
        assert_eq!(lines[2], "    Unsuccessful url fetch: Not Found");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        write_outcomes(&outcomes(), OutputFormat::Jsonl, Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
