//! sheetflow CLI - evaluate and inspect JSON workbooks

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sheetflow::prelude::*;
use sheetflow::{denormalize, normalize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetflow")]
#[command(author, version, about = "Spreadsheet formula evaluation tool")]
struct Cli {
    /// Number and argument separators for formulas and raw content
    #[arg(long, value_enum, global = true, default_value = "en-us")]
    locale: LocaleArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LocaleArg {
    EnUs,
    DeDe,
    FrFr,
}

impl From<LocaleArg> for Locale {
    fn from(arg: LocaleArg) -> Self {
        match arg {
            LocaleArg::EnUs => Locale::en_us(),
            LocaleArg::DeDe => Locale::de_de(),
            LocaleArg::FrFr => Locale::fr_fr(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a workbook and print every non-empty value
    Eval {
        /// Input workbook (JSON)
        input: PathBuf,

        /// Only this sheet (by name)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Only this cell (A1 address)
        #[arg(short, long)]
        cell: Option<String>,
    },

    /// Export evaluated values of a sheet as CSV
    #[command(alias = "csv")]
    ToCsv {
        /// Input workbook (JSON)
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sheet to export (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Field delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,
    },

    /// Show information about a workbook
    Info {
        /// Input workbook (JSON)
        input: PathBuf,
    },

    /// Print the canonical form of a formula and its extracted literals
    Normalize {
        /// Formula text, starting with '='
        formula: String,
    },

    /// Move the relative references of a formula
    Translate {
        /// Formula text, starting with '='
        formula: String,

        /// Columns to move by (negative moves left)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        cols: i64,

        /// Rows to move by (negative moves up)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        rows: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig {
        locale: cli.locale.into(),
        ..Default::default()
    };

    let text = match cli.command {
        Commands::Eval { input, sheet, cell } => {
            eval_workbook(&input, config, sheet.as_deref(), cell.as_deref())?
        }
        Commands::ToCsv {
            input,
            output,
            sheet,
            delimiter,
        } => {
            let csv = to_csv(&input, config, sheet.as_deref(), delimiter)?;
            if let Some(output_path) = output {
                std::fs::write(&output_path, &csv)
                    .with_context(|| format!("Failed to write '{}'", output_path.display()))?;
                eprintln!("Wrote {} rows to '{}'", csv.lines().count(), output_path.display());
                return Ok(());
            }
            csv
        }
        Commands::Info { input } => show_info(&input, config)?,
        Commands::Normalize { formula } => normalize_formula(&formula, &config.locale)?,
        Commands::Translate { formula, cols, rows } => {
            let sheet = Spreadsheet::with_config(config);
            let translated = sheet
                .translate_formula(sheet.first_sheet(), cols, rows, &formula)
                .with_context(|| format!("Failed to translate '{}'", formula))?;
            format!("{}\n", translated)
        }
    };

    io::stdout()
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    Ok(())
}

fn open(input: &Path, config: EngineConfig) -> Result<Spreadsheet> {
    Spreadsheet::open(input, config).with_context(|| format!("Failed to open '{}'", input.display()))
}

fn find_sheet(spreadsheet: &Spreadsheet, name: Option<&str>) -> Result<SheetId> {
    match name {
        Some(name) => spreadsheet
            .sheet_id(name)
            .with_context(|| format!("Sheet '{}' not found", name)),
        None => Ok(spreadsheet.first_sheet()),
    }
}

/// `Sheet!A1<TAB>value` lines, or the bare value with `--cell`
fn eval_workbook(
    input: &Path,
    config: EngineConfig,
    sheet: Option<&str>,
    cell: Option<&str>,
) -> Result<String> {
    let spreadsheet = open(input, config)?;
    if let Some(address) = cell {
        let id = find_sheet(&spreadsheet, sheet)?;
        let value = spreadsheet
            .evaluated_cell(id, address)
            .with_context(|| format!("Invalid cell address '{}'", address))?;
        return Ok(format!("{}\n", value));
    }

    let stats = spreadsheet.evaluate_all();
    eprintln!(
        "Calculated {} formulas ({} errors, {} circular)",
        stats.cells_calculated, stats.errors, stats.circular_references
    );

    let only = sheet.map(|name| find_sheet(&spreadsheet, Some(name))).transpose()?;
    let mut out = String::new();
    for ws in spreadsheet.workbook().worksheets() {
        if only.map_or(false, |id| id != ws.id()) {
            continue;
        }
        let Some(zone) = used_extent(&spreadsheet, ws.id()) else {
            continue;
        };
        for row in zone.top..=zone.bottom {
            for col in zone.left..=zone.right {
                let pos = CellPosition { row, col };
                let value = spreadsheet.evaluated_at(ws.id(), pos);
                if value != EvaluatedCell::Empty {
                    out.push_str(&format!("{}!{}\t{}\n", ws.name(), pos.to_a1_string(), value));
                }
            }
        }
    }
    Ok(out)
}

/// Used cells of a sheet, grown to cover spilled results
fn used_extent(spreadsheet: &Spreadsheet, sheet: SheetId) -> Option<Zone> {
    let ws = spreadsheet.workbook().worksheet(sheet)?;
    let zone = ws.used_zone()?;
    let (cols, rows) = ws.dimensions();
    let filled = |row: u32, col: u32| {
        spreadsheet.evaluated_at(sheet, CellPosition { row, col }) != EvaluatedCell::Empty
    };
    let mut right = zone.right;
    let mut bottom = zone.bottom;
    for (pos, _) in ws.cells() {
        // Spills only extend right and down from their anchor
        while right + 1 < cols && filled(pos.row, right + 1) {
            right += 1;
        }
        while bottom + 1 < rows && filled(bottom + 1, pos.col) {
            bottom += 1;
        }
    }
    Some(Zone {
        left: zone.left,
        right,
        top: zone.top,
        bottom,
    })
}

fn to_csv(input: &Path, config: EngineConfig, sheet: Option<&str>, delimiter: char) -> Result<String> {
    let spreadsheet = open(input, config)?;
    let id = find_sheet(&spreadsheet, sheet)?;

    let zone = match used_extent(&spreadsheet, id) {
        Some(zone) => zone,
        None => {
            eprintln!("Warning: Sheet appears to be empty");
            return Ok(String::new());
        }
    };

    let mut csv_output = String::new();
    for row in 0..=zone.bottom {
        let fields: Vec<String> = (0..=zone.right)
            .map(|col| {
                let value = spreadsheet.evaluated_at(id, CellPosition { row, col });
                csv_field(&value.to_string(), delimiter)
            })
            .collect();
        csv_output.push_str(&fields.join(&delimiter.to_string()));
        csv_output.push('\n');
    }
    Ok(csv_output)
}

/// Quote a field if necessary
fn csv_field(text: &str, delimiter: char) -> String {
    if text.contains(delimiter) || text.contains('"') || text.contains('\n') || text.contains('\r')
    {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn show_info(input: &Path, config: EngineConfig) -> Result<String> {
    let spreadsheet = open(input, config)?;
    let workbook = spreadsheet.workbook();

    let mut out = format!("File: {}\nSheets: {}\n", input.display(), workbook.sheet_count());
    for ws in workbook.worksheets() {
        let formula_count = ws.cells().filter(|(_, cell)| cell.is_formula()).count();
        out.push_str(&format!("\n  Sheet {}: \"{}\"\n", ws.id().0, ws.name()));
        match ws.used_zone() {
            Some(zone) => out.push_str(&format!(
                "    Used range: {}:{}\n",
                zone.top_left().to_a1_string(),
                zone.bottom_right().to_a1_string()
            )),
            None => out.push_str("    Used range: empty\n"),
        }
        out.push_str(&format!("    Formulas: {}\n", formula_count));
    }

    let engine = spreadsheet.engine();
    out.push_str(&format!(
        "\nDistinct formulas: {} of {}\n",
        engine.compiled_count(),
        engine.formula_count()
    ));
    Ok(out)
}

fn normalize_formula(formula: &str, locale: &Locale) -> Result<String> {
    if !formula.starts_with('=') {
        bail!("A formula must start with '=': {}", formula);
    }
    let normalized =
        normalize(formula, locale).with_context(|| format!("Failed to parse '{}'", formula))?;
    let canonical = denormalize(&normalized.text, &normalized.dependencies)?;

    let deps = &normalized.dependencies;
    let mut out = format!("{}\n", normalized.text);
    out.push_str(&format!("canonical:  {}\n", canonical));
    out.push_str(&format!("references: {}\n", deps.references.join(" ")));
    out.push_str(&format!("strings:    {}\n", deps.strings.join(" ")));
    out.push_str(&format!("numbers:    {}\n", deps.numbers.join(" ")));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const WORKBOOK: &str = r#"{
      "sheets": [
        {
          "name": "Main",
          "cells": {
            "A1": { "content": "2" },
            "A2": { "content": "=A1*21" },
            "B1": { "content": "=SEQUENCE(1,2)" }
          }
        },
        { "name": "Notes", "cells": { "A1": { "content": "hello, world" } } }
      ]
    }"#;

    fn write_workbook(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("book.json");
        std::fs::write(&path, WORKBOOK).unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_eval_single_cell() {
        let dir = TempDir::new().unwrap();
        let path = write_workbook(&dir);
        let out = eval_workbook(&path, EngineConfig::default(), None, Some("A2")).unwrap();
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_eval_sheet_lists_spilled_values() {
        let dir = TempDir::new().unwrap();
        let path = write_workbook(&dir);
        let out = eval_workbook(&path, EngineConfig::default(), Some("main"), None).unwrap();
        assert_eq!(out, "Main!A1\t2\nMain!B1\t1\nMain!C1\t2\nMain!A2\t42\n");
    }

    #[test]
    fn test_unknown_sheet() {
        let dir = TempDir::new().unwrap();
        let path = write_workbook(&dir);
        assert!(eval_workbook(&path, EngineConfig::default(), Some("Nope"), None).is_err());
        assert!(open(&dir.path().join("missing.json"), EngineConfig::default()).is_err());
    }

    #[test]
    fn test_csv_quotes_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_workbook(&dir);
        let csv = to_csv(&path, EngineConfig::default(), Some("Notes"), ',').unwrap();
        assert_eq!(csv, "\"hello, world\"\n");
        assert_eq!(csv_field("a\"b", ';'), "\"a\"\"b\"");
    }

    #[test]
    fn test_info_counts_formulas() {
        let dir = TempDir::new().unwrap();
        let path = write_workbook(&dir);
        let info = show_info(&path, EngineConfig::default()).unwrap();
        assert!(info.contains("Sheets: 2"));
        assert!(info.contains("Used range: A1:B2"));
        assert!(info.contains("Formulas: 2"));
    }

    #[test]
    fn test_normalize_with_locale() {
        let out = normalize_formula("=ROUND(A1;2,5)", &LocaleArg::DeDe.into()).unwrap();
        assert!(out.starts_with("=ROUND(|0|,|N0|)\n"));
        assert!(out.contains("canonical:  =ROUND(A1,2.5)\n"));
        assert!(normalize_formula("ROUND(A1)", &Locale::default()).is_err());
    }
}
