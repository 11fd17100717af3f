//! Operators as functions
//!
//! The evaluator dispatches every operator of a formula to one of these
//! registry entries, so operators broadcast and propagate formats exactly
//! like any other function.

use super::{finite, ArgSpec, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry};
use crate::value::{EvalError, EvalResult, Evaluated, Value};
use std::cmp::Ordering;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let binary = |name: &str, description: &str, f: fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>| {
        FunctionDef::new(name, description, f)
            .arg(ArgSpec::any("value1"))
            .arg(ArgSpec::any("value2"))
    };

    registry.add(binary("ADD", "Sum of two numbers", fn_add));
    registry.add(binary("MINUS", "Difference of two numbers", fn_minus));
    registry.add(binary("MULTIPLY", "Product of two numbers", fn_multiply));
    registry.add(binary("DIVIDE", "One number divided by another", fn_divide));
    registry.add(binary("POWER", "A number raised to a power", fn_power));

    registry.add(binary("EQ", "Equal", fn_eq).format(FormatRule::None));
    registry.add(binary("NE", "Not equal", fn_ne).format(FormatRule::None));
    registry.add(binary("LT", "Strictly less than", fn_lt).format(FormatRule::None));
    registry.add(binary("LTE", "Less than or equal", fn_lte).format(FormatRule::None));
    registry.add(binary("GT", "Strictly greater than", fn_gt).format(FormatRule::None));
    registry.add(binary("GTE", "Greater than or equal", fn_gte).format(FormatRule::None));

    registry.add(binary("CONCAT_OP", "Concatenation of two values", fn_concat).format(FormatRule::None));

    registry.add(
        FunctionDef::new("UMINUS", "A number with the sign reversed", fn_uminus)
            .arg(ArgSpec::number("value")),
    );
    registry.add(
        FunctionDef::new("UPLUS", "A value unchanged", fn_uplus).arg(ArgSpec::any("value")),
    );
    registry.add(
        FunctionDef::new("UNARY.PERCENT", "A number divided by 100", fn_percent)
            .arg(ArgSpec::number("percentage")),
    );
}

fn fn_add(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(args.number(0)? + args.number(1)?)
}

fn fn_minus(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(args.number(0)? - args.number(1)?)
}

fn fn_multiply(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(args.number(0)? * args.number(1)?)
}

fn fn_divide(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let dividend = args.number(0)?;
    let divisor = args.number(1)?;
    if divisor == 0.0 {
        return Err(EvalError::div_zero());
    }
    finite(dividend / divisor)
}

pub(crate) fn fn_power(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let base = args.number(0)?;
    let exponent = args.number(1)?;
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::div_zero());
    }
    finite(base.powf(exponent))
}

fn fn_uminus(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(-args.number(0)?))
}

fn fn_uplus(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::Scalar(args.value(0)?))
}

fn fn_percent(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.number(0)? / 100.0))
}

fn fn_concat(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::text(args.text(0)? + &args.text(1)?))
}

/// Spreadsheet ordering of two values
///
/// Empty compares as the zero value of the other side's type. Across types,
/// numbers sort before text and text before booleans. Text compares
/// case-insensitively.
pub(crate) fn compare_values(a: &Value, b: &Value) -> EvalResult<Ordering> {
    a.raise_error()?;
    b.raise_error()?;

    let a = empty_as(a, b);
    let b = empty_as(b, &a);
    let rank = |v: &Value| match v {
        Value::Number(_) | Value::Empty => 0,
        Value::Text(_) => 1,
        Value::Boolean(_) => 2,
        Value::Error(_) => 3,
    };

    Ok(match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Empty, Value::Empty) => Ordering::Equal,
        _ => rank(&a).cmp(&rank(&b)),
    })
}

fn empty_as(v: &Value, other: &Value) -> Value {
    match (v, other) {
        (Value::Empty, Value::Number(_)) => Value::Number(0.0),
        (Value::Empty, Value::Text(_)) => Value::Text(String::new()),
        (Value::Empty, Value::Boolean(_)) => Value::Boolean(false),
        _ => v.clone(),
    }
}

fn compare(args: &Args<'_>, test: impl Fn(Ordering) -> bool) -> EvalResult<Evaluated> {
    let a = args.value(0)?.value;
    let b = args.value(1)?.value;
    Ok(Evaluated::boolean(test(compare_values(&a, &b)?)))
}

fn fn_eq(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o == Ordering::Equal)
}

fn fn_ne(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o != Ordering::Equal)
}

fn fn_lt(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o == Ordering::Less)
}

fn fn_lte(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o != Ordering::Greater)
}

fn fn_gt(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o == Ordering::Greater)
}

fn fn_gte(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    compare(args, |o| o != Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compare_across_types() {
        let n = |x: f64| Value::Number(x);
        let t = |s: &str| Value::Text(s.into());
        assert_eq!(compare_values(&n(1.0), &n(2.0)), Ok(Ordering::Less));
        assert_eq!(compare_values(&t("abc"), &t("ABC")), Ok(Ordering::Equal));
        assert_eq!(compare_values(&n(100.0), &t("a")), Ok(Ordering::Less));
        assert_eq!(compare_values(&t("z"), &Value::Boolean(false)), Ok(Ordering::Less));
        assert_eq!(compare_values(&Value::Empty, &n(0.0)), Ok(Ordering::Equal));
        assert_eq!(compare_values(&Value::Empty, &t("")), Ok(Ordering::Equal));
        assert_eq!(compare_values(&t(""), &Value::Empty), Ok(Ordering::Equal));
        assert_eq!(
            compare_values(&Value::Boolean(false), &Value::Empty),
            Ok(Ordering::Equal)
        );
    }
}
