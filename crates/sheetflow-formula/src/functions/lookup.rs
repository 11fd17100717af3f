//! Lookup and reference functions

use super::operators::compare_values;
use super::{
    ArgSpec, ArgType, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry, Vectorize,
};
use crate::value::{EvalError, EvalResult, Evaluated, FormattedValue, Matrix, Value};
use std::cmp::Ordering;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add(
        FunctionDef::new("VLOOKUP", "Vertical lookup", fn_vlookup)
            .arg(ArgSpec::any("search_key"))
            .arg(ArgSpec::matrix("range"))
            .arg(ArgSpec::number("index"))
            .arg(ArgSpec::new("is_sorted", &[ArgType::Boolean]).optional().describe("Defaults to TRUE"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("HLOOKUP", "Horizontal lookup", fn_hlookup)
            .arg(ArgSpec::any("search_key"))
            .arg(ArgSpec::matrix("range"))
            .arg(ArgSpec::number("index"))
            .arg(ArgSpec::new("is_sorted", &[ArgType::Boolean]).optional().describe("Defaults to TRUE"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("MATCH", "Position of an item in a range that matches a value", fn_match)
            .arg(ArgSpec::any("search_key"))
            .arg(ArgSpec::matrix("range"))
            .arg(ArgSpec::number("search_type").optional().describe("1, 0 or -1, defaults to 1"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("INDEX", "The content of a cell, specified by row and column offset", fn_index)
            .arg(ArgSpec::matrix("reference"))
            .arg(ArgSpec::number("row").optional())
            .arg(ArgSpec::number("column").optional())
            .format(FormatRule::None)
            .returns_matrix(),
    );
    for (name, description, f) in [
        ("ROW", "Row number of a specified cell", fn_row as LookupFn),
        ("COLUMN", "Column number of a specified cell", fn_column),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::reference("cell_reference").optional())
                .format(FormatRule::None),
        );
    }
    for (name, description, f) in [
        ("ROWS", "Number of rows in a range", fn_rows as LookupFn),
        ("COLUMNS", "Number of columns in a range", fn_columns),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::matrix("range"))
                .format(FormatRule::None),
        );
    }
    registry.add(
        FunctionDef::new("CHOOSE", "An element from a list of choices based on index", fn_choose)
            .arg(ArgSpec::number("index"))
            .arg(
                ArgSpec::any("choice")
                    .accept_errors()
                    .vectorize(Vectorize::WithCondition)
                    .repeating(),
            )
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("TRANSPOSE", "Transposes the rows and columns of a range", fn_transpose)
            .arg(ArgSpec::range("range"))
            .format(FormatRule::None)
            .returns_matrix(),
    );
    registry.add(
        FunctionDef::new("SEQUENCE", "A grid of sequential numbers", fn_sequence)
            .arg(ArgSpec::number("rows"))
            .arg(ArgSpec::number("columns").optional())
            .arg(ArgSpec::number("start").optional())
            .arg(ArgSpec::number("step").optional())
            .returns_matrix(),
    );
}

type LookupFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

fn not_found(function: &str, key: &Value) -> EvalError {
    EvalError::not_available(format!(
        "Did not find value '{}' in {} evaluation.",
        key, function
    ))
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Index of the entry equal to `key`, case-insensitive for text
fn find_exact<'v>(key: &Value, entries: impl Iterator<Item = &'v FormattedValue>) -> Option<usize> {
    for (i, entry) in entries.enumerate() {
        if same_kind(key, &entry.value)
            && compare_values(key, &entry.value).map_or(false, |o| o == Ordering::Equal)
        {
            return Some(i);
        }
    }
    None
}

/// Index of the last entry not past `key` in data sorted by `order`
///
/// Entries of another type than the key are skipped.
fn find_sorted<'v>(
    key: &Value,
    entries: impl Iterator<Item = &'v FormattedValue>,
    order: Ordering,
) -> Option<usize> {
    let mut found = None;
    for (i, entry) in entries.enumerate() {
        if !same_kind(key, &entry.value) {
            continue;
        }
        match compare_values(&entry.value, key) {
            Ok(Ordering::Equal) => found = Some(i),
            Ok(o) if o == order => found = Some(i),
            Ok(_) => break,
            Err(_) => continue,
        }
    }
    found
}

fn lookup_index(args: &Args<'_>, len: usize) -> EvalResult<usize> {
    let index = args.number(2)?.trunc();
    if index < 1.0 || index as usize > len {
        return Err(EvalError::generic(format!(
            "Index ({}) should be between 1 and {}.",
            index, len
        )));
    }
    Ok(index as usize - 1)
}

/// VLOOKUP function
pub fn fn_vlookup(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let key = args.value(0)?.value;
    let range = args.matrix(1)?;
    let col = lookup_index(args, range.cols())?;
    let first_column = range.column(0);
    let row = if args.boolean_or(3, true)? {
        find_sorted(&key, first_column, Ordering::Less)
    } else {
        find_exact(&key, first_column)
    }
    .ok_or_else(|| not_found("VLOOKUP", &key))?;
    Ok(Evaluated::Scalar(range.get(row, col).cloned().unwrap_or_default()))
}

/// HLOOKUP function
pub fn fn_hlookup(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let key = args.value(0)?.value;
    let range = args.matrix(1)?;
    let row = lookup_index(args, range.rows())?;
    let first_row = range.row(0).iter();
    let col = if args.boolean_or(3, true)? {
        find_sorted(&key, first_row, Ordering::Less)
    } else {
        find_exact(&key, first_row)
    }
    .ok_or_else(|| not_found("HLOOKUP", &key))?;
    Ok(Evaluated::Scalar(range.get(row, col).cloned().unwrap_or_default()))
}

/// MATCH function
pub fn fn_match(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let key = args.value(0)?.value;
    let range = args.matrix(1)?;
    if range.rows() != 1 && range.cols() != 1 {
        return Err(EvalError::generic(
            "MATCH range must be a single row or a single column.",
        ));
    }
    let search_type = args.number_or(2, 1.0)?;
    let found = if search_type == 0.0 {
        find_exact(&key, range.iter())
    } else if search_type > 0.0 {
        find_sorted(&key, range.iter(), Ordering::Less)
    } else {
        find_sorted(&key, range.iter(), Ordering::Greater)
    };
    let index = found.ok_or_else(|| not_found("MATCH", &key))?;
    Ok(Evaluated::number((index + 1) as f64))
}

/// INDEX function
///
/// A row or column of 0 selects the whole column or row.
pub fn fn_index(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let range = args.matrix(0)?;
    let row = args.number_or(1, 0.0)?.trunc();
    let col = args.number_or(2, 0.0)?.trunc();
    if row < 0.0 || col < 0.0 || row as usize > range.rows() || col as usize > range.cols() {
        return Err(EvalError::raise(
            sheetflow_core::ErrorKind::InvalidReference,
            "Index out of range.",
        ));
    }
    let (row, col) = (row as usize, col as usize);
    let rows: Vec<usize> = if row == 0 { (0..range.rows()).collect() } else { vec![row - 1] };
    let cols: Vec<usize> = if col == 0 { (0..range.cols()).collect() } else { vec![col - 1] };

    let data = rows
        .iter()
        .flat_map(|r| cols.iter().map(move |c| (*r, *c)))
        .map(|(r, c)| range.get(r, c).cloned().unwrap_or_default())
        .collect();
    let selected = Matrix::new(rows.len(), cols.len(), data);
    if selected.is_single() {
        Ok(Evaluated::Scalar(selected.into_values().remove(0)))
    } else {
        Ok(Evaluated::Matrix(selected))
    }
}

/// Top-left corner of the referenced zone, or the calling cell
fn anchor(args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<(u32, u32)> {
    if args.has(0) {
        args.matrix(0)?;
        if let Some(origin) = args.origin(0)? {
            return Ok((origin.zone.left, origin.zone.top));
        }
    }
    let pos = ctx.position();
    Ok((pos.col, pos.row))
}

/// ROW function
pub fn fn_row(args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let (_, row) = anchor(args, ctx)?;
    Ok(Evaluated::number(f64::from(row) + 1.0))
}

/// COLUMN function
pub fn fn_column(args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let (col, _) = anchor(args, ctx)?;
    Ok(Evaluated::number(f64::from(col) + 1.0))
}

/// ROWS function
pub fn fn_rows(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.matrix(0)?.rows() as f64))
}

/// COLUMNS function
pub fn fn_columns(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.matrix(0)?.cols() as f64))
}

/// CHOOSE function
pub fn fn_choose(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let index = args.number(0)?.trunc();
    let choices = args.len() - 1;
    if index < 1.0 || index as usize > choices {
        return Err(EvalError::generic(format!(
            "Index for CHOOSE is invalid. Valid values are between 1 and {} inclusive.",
            choices
        )));
    }
    args.evaluated(index as usize).cloned()
}

/// TRANSPOSE function
pub fn fn_transpose(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut transposed = args.matrix(0)?.transpose();
    transposed.origin = None;
    Ok(Evaluated::Matrix(transposed))
}

/// SEQUENCE function
pub fn fn_sequence(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let rows = args.number(0)?.trunc();
    let cols = args.number_or(1, 1.0)?.trunc();
    let start = args.number_or(2, 1.0)?;
    let step = args.number_or(3, 1.0)?;
    if rows < 1.0 || cols < 1.0 {
        return Err(EvalError::generic(
            "SEQUENCE rows and columns must be greater than or equal to 1.",
        ));
    }
    if rows * cols > 1_000_000.0 {
        return Err(EvalError::generic("SEQUENCE result is too large."));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let data = (0..rows * cols)
        .map(|i| Value::Number(start + step * i as f64).into())
        .collect();
    Ok(Evaluated::Matrix(Matrix::new(rows, cols, data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(values: &[Value]) -> Vec<FormattedValue> {
        values.iter().cloned().map(FormattedValue::from).collect()
    }

    #[test]
    fn test_find_sorted_takes_last_not_greater() {
        let data = column(&[
            Value::Number(1.0),
            Value::Number(3.0),
            Value::Text("x".into()),
            Value::Number(5.0),
        ]);
        assert_eq!(find_sorted(&Value::Number(4.0), data.iter(), Ordering::Less), Some(1));
        assert_eq!(find_sorted(&Value::Number(5.0), data.iter(), Ordering::Less), Some(3));
        assert_eq!(find_sorted(&Value::Number(0.5), data.iter(), Ordering::Less), None);
    }

    #[test]
    fn test_find_exact_is_type_strict() {
        let data = column(&[Value::Text("1".into()), Value::Text("Apple".into()), Value::Number(1.0)]);
        assert_eq!(find_exact(&Value::Number(1.0), data.iter()), Some(2));
        assert_eq!(find_exact(&Value::Text("apple".into()), data.iter()), Some(1));
        assert_eq!(find_exact(&Value::Boolean(true), data.iter()), None);
    }
}
