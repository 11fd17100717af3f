//! Tests for formula evaluation through a spreadsheet

use pretty_assertions::assert_eq;
use sheetflow::prelude::*;

fn number(n: f64) -> EvaluatedCell {
    EvaluatedCell::Number(n, None)
}

fn text(s: &str) -> EvaluatedCell {
    EvaluatedCell::Text(s.into(), None)
}

/// A single sheet filled from `(address, content)` pairs
fn filled(cells: &[(&str, &str)]) -> (Spreadsheet, SheetId) {
    let mut s = Spreadsheet::new();
    let id = s.first_sheet();
    for (address, content) in cells {
        s.set_content(id, address, content).unwrap();
    }
    (s, id)
}

/// Test basic formula evaluation without cell references
#[test]
fn test_evaluate_simple_formulas() {
    let (s, id) = filled(&[
        ("A1", "=1+2*3"),
        ("A2", "=\"Hello \"&\"World\""),
        ("A3", "=5>3"),
        ("A4", "=SUM(1,2,3,4,5)"),
    ]);
    assert_eq!(s.evaluated_cell(id, "A1").unwrap(), number(7.0));
    assert_eq!(s.evaluated_cell(id, "A2").unwrap(), text("Hello World"));
    assert_eq!(
        s.evaluated_cell(id, "A3").unwrap(),
        EvaluatedCell::Boolean(true, None)
    );
    assert_eq!(s.evaluated_cell(id, "A4").unwrap(), number(15.0));
}

/// Test IF function
#[test]
fn test_evaluate_if() {
    let (s, id) = filled(&[
        ("A1", "=IF(1>0,\"Yes\",\"No\")"),
        ("A2", "=IF(1<0,\"Yes\",\"No\")"),
        ("A3", "=IF(FALSE, 1/0, 2)"),
    ]);
    assert_eq!(s.evaluated_cell(id, "A1").unwrap(), text("Yes"));
    assert_eq!(s.evaluated_cell(id, "A2").unwrap(), text("No"));
    assert_eq!(s.evaluated_cell(id, "A3").unwrap(), number(2.0));
}

/// Test formula evaluation with cell references
#[test]
fn test_evaluate_with_cell_references() {
    let (mut s, id) = filled(&[
        ("A1", "10"),
        ("A2", "20"),
        ("A3", "30"),
        ("B1", "5"),
        ("C1", "=A1+B1"),
        ("C2", "=SUM(A1:A3)"),
        ("C3", "=C1*C2"),
    ]);
    assert_eq!(s.evaluated_cell(id, "C1").unwrap(), number(15.0));
    assert_eq!(s.evaluated_cell(id, "C2").unwrap(), number(60.0));
    assert_eq!(s.evaluated_cell(id, "C3").unwrap(), number(900.0));

    s.set_content(id, "A1", "40").unwrap();
    assert_eq!(s.evaluated_cell(id, "C3").unwrap(), number(45.0 * 90.0));
}

/// Test references to another sheet
#[test]
fn test_evaluate_cross_sheet() {
    let mut s = Spreadsheet::new();
    let main = s.first_sheet();
    let data = s.add_sheet("Data").unwrap();
    s.set_content(data, "B2", "7").unwrap();
    s.set_content(main, "A1", "=Data!B2*6").unwrap();
    s.set_content(main, "A2", "=data!B2").unwrap();
    assert_eq!(s.evaluated_cell(main, "A1").unwrap(), number(42.0));
    assert_eq!(s.evaluated_cell(main, "A2").unwrap(), number(7.0));
    assert_eq!(s.sheet_id("DATA"), Some(data));
}

/// Test that errors are values and only some functions absorb them
#[test]
fn test_errors_are_values() {
    let (s, id) = filled(&[
        ("A1", "=1/0"),
        ("A2", "=A1+1"),
        ("A3", "=IFERROR(A1, \"fallback\")"),
        ("A4", "=NOSUCHFUNCTION(1)"),
        ("A5", "=SUM(1,"),
        ("A6", "=NA()"),
        ("A7", "=IFNA(A6, 0)"),
    ]);
    assert_eq!(
        s.evaluated_cell(id, "A1").unwrap().error_kind(),
        Some(ErrorKind::DivisionByZero)
    );
    assert_eq!(
        s.evaluated_cell(id, "A2").unwrap().error_kind(),
        Some(ErrorKind::DivisionByZero)
    );
    assert_eq!(s.evaluated_cell(id, "A3").unwrap(), text("fallback"));
    assert_eq!(
        s.evaluated_cell(id, "A4").unwrap().error_kind(),
        Some(ErrorKind::BadExpression)
    );
    assert_eq!(
        s.evaluated_cell(id, "A5").unwrap().error_kind(),
        Some(ErrorKind::BadExpression)
    );
    assert_eq!(
        s.evaluated_cell(id, "A6").unwrap().error_kind(),
        Some(ErrorKind::NotAvailable)
    );
    assert_eq!(s.evaluated_cell(id, "A7").unwrap(), number(0.0));
}

/// Test lookups over a small table
#[test]
fn test_lookup_functions() {
    let (s, id) = filled(&[
        ("A1", "apple"),
        ("B1", "3"),
        ("A2", "pear"),
        ("B2", "5"),
        ("C1", "=VLOOKUP(\"pear\", A1:B2, 2, FALSE)"),
        ("C2", "=MATCH(\"apple\", A1:A2, 0)"),
        ("C3", "=INDEX(A1:B2, 2, 1)"),
    ]);
    assert_eq!(s.evaluated_cell(id, "C1").unwrap(), number(5.0));
    assert_eq!(s.evaluated_cell(id, "C2").unwrap(), number(1.0));
    assert_eq!(s.evaluated_cell(id, "C3").unwrap(), text("pear"));
}

/// Test spilled results and the cells they cover
#[test]
fn test_spill_results() {
    let (mut s, id) = filled(&[("A1", "=SEQUENCE(3)"), ("B1", "=SUM(A1:A3)")]);
    assert_eq!(s.evaluated_cell(id, "A3").unwrap(), number(3.0));
    assert_eq!(s.evaluated_cell(id, "B1").unwrap(), number(6.0));

    s.set_content(id, "A2", "blocker").unwrap();
    assert_eq!(
        s.evaluated_cell(id, "A1").unwrap().error_kind(),
        Some(ErrorKind::GenericEvaluationError)
    );
    assert_eq!(s.evaluated_cell(id, "A3").unwrap(), EvaluatedCell::Empty);

    s.set_content(id, "A2", "").unwrap();
    assert_eq!(s.evaluated_cell(id, "A2").unwrap(), number(2.0));
}

/// Test number formats flowing through formulas
#[test]
fn test_format_propagation() {
    let (mut s, id) = filled(&[("A1", "25%"), ("A2", "=A1*2")]);
    assert_eq!(
        s.evaluated_cell(id, "A2").unwrap(),
        EvaluatedCell::Number(0.5, Some("0%".into()))
    );

    s.set_content(id, "A1", "0.25").unwrap();
    assert_eq!(s.evaluated_cell(id, "A2").unwrap(), number(0.5));
}

/// Test that evaluation statistics count what was computed
#[test]
fn test_evaluate_all() {
    let (s, id) = filled(&[("A1", "1"), ("A2", "=A1+1"), ("A3", "=A3"), ("A4", "=A2*2")]);
    let stats = s.evaluate_all();
    assert_eq!(stats.formula_count, 3);
    assert_eq!(stats.cells_calculated, 3);
    assert_eq!(stats.circular_references, 1);
    assert_eq!(s.evaluated_cell(id, "A4").unwrap(), number(4.0));
    assert_eq!(s.evaluate_all().cells_calculated, 0);
}
