//! Logical functions
//!
//! Branches of the conditionals are lazy: a branch that is not taken is
//! never evaluated, so `IF(TRUE, 1, 1/0)` is `1`.

use super::{ArgSpec, ArgType, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry, Vectorize};
use crate::value::{EvalError, EvalResult, Evaluated, FormattedValue, Value};
use sheetflow_core::ErrorKind;

fn branch(name: &str) -> ArgSpec {
    ArgSpec::any(name)
        .accept_errors()
        .vectorize(Vectorize::WithCondition)
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add(
        FunctionDef::new("IF", "Returns a value depending on a logical expression", fn_if)
            .arg(ArgSpec::new("logical_expression", &[ArgType::Boolean]))
            .arg(branch("value_if_true"))
            .arg(branch("value_if_false").optional().describe("Defaults to FALSE"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("IFS", "Value of the first true condition", fn_ifs)
            .arg(ArgSpec::new("condition", &[ArgType::Boolean]).repeating())
            .arg(branch("value").repeating())
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("IFERROR", "A value, or a fallback when it is an error", fn_iferror)
            .arg(ArgSpec::any("value").accept_errors())
            .arg(branch("value_if_error").optional())
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("IFNA", "A value, or a fallback when it is #N/A", fn_ifna)
            .arg(ArgSpec::any("value").accept_errors())
            .arg(branch("value_if_error").optional())
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("SWITCH", "Value of the first case equal to an expression", fn_switch)
            .arg(ArgSpec::any("expression"))
            .arg(branch("case").repeating())
            .arg(branch("value").optional().repeating())
            .format(FormatRule::None),
    );

    for (name, description, f) in [
        ("AND", "Whether all values are true", fn_and as LogicalFn),
        ("OR", "Whether any value is true", fn_or),
        ("XOR", "Whether an odd number of values are true", fn_xor),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::range("logical_expression1"))
                .arg(ArgSpec::range("logical_expression2").optional().repeating())
                .format(FormatRule::None),
        );
    }
    registry.add(
        FunctionDef::new("NOT", "Opposite of a logical value", fn_not)
            .arg(ArgSpec::new("logical_expression", &[ArgType::Boolean]))
            .format(FormatRule::None),
    );
    registry.add(FunctionDef::new("TRUE", "The logical value TRUE", |_, _| Ok(Evaluated::boolean(true))));
    registry.add(FunctionDef::new("FALSE", "The logical value FALSE", |_, _| Ok(Evaluated::boolean(false))));
}

type LogicalFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

/// Branch `i` as given, errors included
fn pick(args: &Args<'_>, i: usize) -> EvalResult<Evaluated> {
    args.evaluated(i).cloned()
}

/// IF function
pub fn fn_if(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    if args.boolean(0)? {
        pick(args, 1)
    } else if args.has(2) {
        pick(args, 2)
    } else {
        Ok(Evaluated::boolean(false))
    }
}

/// IFS function
pub fn fn_ifs(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    for i in (0..args.len()).step_by(2) {
        if args.boolean(i)? {
            return pick(args, i + 1);
        }
    }
    Err(EvalError::not_available("No match."))
}

fn fallback(args: &Args<'_>, i: usize) -> EvalResult<Evaluated> {
    if args.has(i) {
        pick(args, i)
    } else {
        Ok(Evaluated::Scalar(FormattedValue::empty()))
    }
}

/// IFERROR function
pub fn fn_iferror(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.value(0)?;
    if value.value.is_error() {
        fallback(args, 1)
    } else {
        Ok(Evaluated::Scalar(value))
    }
}

/// IFNA function
pub fn fn_ifna(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.value(0)?;
    match value.value.as_error() {
        Some(err) if err.kind == ErrorKind::NotAvailable => fallback(args, 1),
        _ => Ok(Evaluated::Scalar(value)),
    }
}

/// SWITCH function
pub fn fn_switch(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    if args.len() < 3 {
        return Err(EvalError::bad_expression(format!(
            "Invalid number of arguments for the SWITCH function. Expected 3 minimum, but got {} instead.",
            args.len()
        )));
    }
    let expression = args.value(0)?.value;
    let pairs_end = args.len() - (args.len() - 1) % 2;
    for i in (1..pairs_end).step_by(2) {
        let case = args.value(i)?.value;
        case.raise_error()?;
        if super::operators::compare_values(&expression, &case)? == std::cmp::Ordering::Equal {
            return pick(args, i + 1);
        }
    }
    if pairs_end < args.len() {
        return pick(args, pairs_end);
    }
    Err(EvalError::not_available("No default value and no case matched."))
}

/// Truth values an aggregate sees: scalars are coerced, inside ranges
/// only booleans and numbers count
fn truth_values(args: &Args<'_>) -> EvalResult<Vec<bool>> {
    let mut values = Vec::new();
    for i in 0..args.len() {
        match args.evaluated(i)? {
            Evaluated::Scalar(v) => match &v.value {
                Value::Empty => {}
                other => values.push(other.to_bool()?),
            },
            Evaluated::Matrix(m) => {
                for v in m.iter() {
                    match &v.value {
                        Value::Boolean(b) => values.push(*b),
                        Value::Number(n) => values.push(*n != 0.0),
                        Value::Error(err) => return Err(EvalError::Raised(err.clone())),
                        _ => {}
                    }
                }
            }
        }
    }
    if values.is_empty() {
        return Err(EvalError::generic(format!(
            "{} has no valid input data.",
            args.function()
        )));
    }
    Ok(values)
}

/// AND function
pub fn fn_and(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::boolean(truth_values(args)?.iter().all(|b| *b)))
}

/// OR function
pub fn fn_or(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::boolean(truth_values(args)?.iter().any(|b| *b)))
}

/// XOR function
pub fn fn_xor(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let trues = truth_values(args)?.iter().filter(|b| **b).count();
    Ok(Evaluated::boolean(trues % 2 == 1))
}

/// NOT function
pub fn fn_not(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::boolean(!args.boolean(0)?))
}
