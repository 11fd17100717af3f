//! Tests for the JSON interchange format

use pretty_assertions::assert_eq;
use sheetflow::prelude::*;
use sheetflow::WorkbookData;
use tempfile::TempDir;

const BUDGET: &str = r#"{
  "sheets": [
    {
      "name": "Budget",
      "cells": {
        "A1": { "content": "1200" },
        "A2": { "content": "800" },
        "A3": { "content": "=SUM(A1:A2)" },
        "B1": { "content": "=Rates!A1*A3" }
      }
    },
    {
      "name": "Rates",
      "cells": {
        "A1": { "content": "10%" }
      }
    }
  ]
}"#;

#[test]
fn test_from_json_evaluates() {
    let s = Spreadsheet::from_json(BUDGET, EngineConfig::default()).unwrap();
    let budget = s.sheet_id("Budget").unwrap();
    assert_eq!(
        s.evaluated_cell(budget, "A3").unwrap(),
        EvaluatedCell::Number(2000.0, None)
    );
    let b1 = s.evaluated_cell(budget, "B1").unwrap();
    assert!(matches!(b1, EvaluatedCell::Number(n, _) if (n - 200.0).abs() < 1e-9));
    assert_eq!(b1.format(), Some("0%"));
}

#[test]
fn test_json_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("budget.json");

    let mut s = Spreadsheet::from_json(BUDGET, EngineConfig::default()).unwrap();
    let budget = s.sheet_id("Budget").unwrap();
    s.insert_rows(budget, 0, 1).unwrap();
    s.save(&path).unwrap();

    let reopened = Spreadsheet::open(&path, EngineConfig::default()).unwrap();
    let budget = reopened.sheet_id("Budget").unwrap();
    assert_eq!(reopened.content(budget, "A4").unwrap(), Some("=SUM(A2:A3)"));
    assert_eq!(
        reopened.evaluated_cell(budget, "A4").unwrap(),
        EvaluatedCell::Number(2000.0, None)
    );

    let before: WorkbookData = serde_json::from_str(&s.to_json().unwrap()).unwrap();
    let after: WorkbookData = serde_json::from_str(&reopened.to_json().unwrap()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_invalid_json_is_an_error() {
    assert!(matches!(
        Spreadsheet::from_json("{ not json", EngineConfig::default()),
        Err(Error::Json(_))
    ));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Spreadsheet::open(dir.path().join("missing.json"), EngineConfig::default()),
        Err(Error::Io(_))
    ));
}
