use std::io::{self, Write};

use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

/// Write the report to stdout and the summary line, if any, to stderr.
pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &result.data, format, pretty)?;
    out.flush()?;

    if let Some(line) = &result.summary_line {
        eprintln!("{line}");
    }
    Ok(())
}

pub fn write_report(
    out: &mut impl Write,
    data: &Value,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(data)?
            } else {
                serde_json::to_string(data)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => write_table(out, data)?,
    }
    Ok(())
}

/// Scalars as aligned `key : value` lines; arrays of objects as column tables.
fn write_table(out: &mut impl Write, data: &Value) -> Result<(), CliError> {
    match data {
        Value::Object(fields) => {
            let mut scalars = Vec::new();
            flatten_scalars("", fields, &mut scalars);
            let width = scalars.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in &scalars {
                writeln!(out, "{key:<width$} : {value}")?;
            }

            for (key, value) in fields {
                if let Value::Array(rows) = value {
                    writeln!(out, "{key}:")?;
                    write_rows(out, rows)?;
                }
            }
        }
        Value::Array(rows) => write_rows(out, rows)?,
        scalar => writeln!(out, "{}", cell(scalar))?,
    }
    Ok(())
}

fn flatten_scalars(prefix: &str, fields: &Map<String, Value>, sink: &mut Vec<(String, String)>) {
    for (key, value) in fields {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_scalars(&name, nested, sink),
            Value::Array(_) => {}
            scalar => sink.push((name, cell(scalar))),
        }
    }
}

fn write_rows(out: &mut impl Write, rows: &[Value]) -> Result<(), CliError> {
    if rows.is_empty() {
        writeln!(out, "  (none)")?;
        return Ok(());
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(fields) = row {
            for (key, value) in fields {
                if !value.is_object() && !value.is_array() && !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(*column).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].len())
                .chain(std::iter::once(column.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(column, width)| format!("{column:<width$}"))
        .collect();
    writeln!(out, "  {}", header.join("  ").trim_end())?;
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect();
        writeln!(out, "  {}", line.join("  ").trim_end())?;
    }
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn table(data: &Value) -> String {
        let mut sink = Vec::<u8>::new();
        write_report(&mut sink, data, OutputFormat::Table, false).expect("render");
        String::from_utf8(sink).expect("utf8")
    }

    #[test]
    fn table_aligns_scalars_and_flattens_nested_objects() {
        let text = table(&json!({
            "cutoff": "2026-10-12",
            "dry_run": false,
            "integrity": { "ok": true },
        }));

        assert!(text.contains("cutoff       : 2026-10-12"), "{text}");
        assert!(text.contains("integrity.ok : true"), "{text}");
    }

    #[test]
    fn table_renders_item_lists_as_columns() {
        let text = table(&json!({
            "failed": 1,
            "items": [
                { "action": "compress", "outcome": "succeeded", "path": "/d/a.db" },
                { "action": "compress", "outcome": "failed", "path": "/d/b.db", "error_kind": "IntegrityError" },
            ],
        }));

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "failed : 1");
        assert_eq!(lines[1], "items:");
        assert!(lines[2].contains("action") && lines[2].contains("error_kind"));
        assert!(lines[4].contains("IntegrityError"));
    }

    #[test]
    fn empty_lists_are_marked() {
        let text = table(&json!({ "partitions": [] }));
        assert_eq!(text, "partitions:\n  (none)\n");
    }

    #[test]
    fn json_is_compact_unless_pretty() {
        let mut sink = Vec::<u8>::new();
        write_report(&mut sink, &json!({ "a": 1 }), OutputFormat::Json, false).expect("render");
        assert_eq!(sink, b"{\"a\":1}\n");
    }
}
