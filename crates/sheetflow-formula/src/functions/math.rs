//! Math functions

use super::criteria::CriteriaMatcher;
use super::{
    collect_numbers, finite, for_each_number, numbers_of, ArgSpec, Args, FormatRule, FunctionContext,
    FunctionDef, FunctionRegistry,
};
use crate::value::{EvalError, EvalResult, Evaluated, Value};
use rand::Rng;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add(
        FunctionDef::new("SUM", "Sum of a series of numbers and/or cells", fn_sum)
            .arg(ArgSpec::range("value1").describe("The first number or range to add together"))
            .arg(ArgSpec::range("value2").optional().repeating()),
    );
    registry.add(
        FunctionDef::new("PRODUCT", "Result of multiplying a series of numbers together", fn_product)
            .arg(ArgSpec::range("factor1"))
            .arg(ArgSpec::range("factor2").optional().repeating()),
    );
    registry.add(
        FunctionDef::new("ABS", "Absolute value of a number", fn_abs).arg(ArgSpec::number("value")),
    );

    for (name, description, f) in [
        ("ROUND", "Rounds a number, halves away from zero", fn_round as MathFn),
        ("ROUNDUP", "Rounds a number away from zero", fn_roundup),
        ("ROUNDDOWN", "Rounds a number toward zero", fn_rounddown),
        ("TRUNC", "Truncates a number to a number of places", fn_rounddown),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::number("value"))
                .arg(ArgSpec::number("places").optional().describe("Defaults to 0")),
        );
    }

    for (name, description, f) in [
        ("INT", "Rounds a number down to the nearest integer", fn_int as MathFn),
        ("SQRT", "Positive square root of a positive number", fn_sqrt),
        ("EXP", "Euler's number e raised to a power", fn_exp),
        ("LN", "Logarithm of a number, base e", fn_ln),
        ("LOG10", "Logarithm of a number, base 10", fn_log10),
        ("SIGN", "Sign of a number: -1, 0 or 1", fn_sign),
    ] {
        registry.add(FunctionDef::new(name, description, f).arg(ArgSpec::number("value")));
    }
    registry.add(
        FunctionDef::new("MOD", "Remainder of a division", fn_mod)
            .arg(ArgSpec::number("dividend"))
            .arg(ArgSpec::number("divisor")),
    );
    registry.add(
        FunctionDef::new("LOG", "Logarithm of a number given a base", fn_log)
            .arg(ArgSpec::number("value"))
            .arg(ArgSpec::number("base").optional().describe("Defaults to 10")),
    );
    registry.add(FunctionDef::new("PI", "The number pi", fn_pi));

    registry.add(
        FunctionDef::new("SUMIF", "Conditional sum across a range", fn_sumif)
            .arg(ArgSpec::matrix("criteria_range"))
            .arg(ArgSpec::any("criterion"))
            .arg(ArgSpec::matrix("sum_range").optional())
            .format(FormatRule::ArgumentOr(2, 0)),
    );
    registry.add(
        FunctionDef::new("SUMPRODUCT", "Sum of the products of matching entries", fn_sumproduct)
            .arg(ArgSpec::range("range1"))
            .arg(ArgSpec::range("range2").optional().repeating()),
    );
    registry.add(
        FunctionDef::new("PERCENTOF", "Share of a subset in a whole", fn_percentof)
            .arg(ArgSpec::range("data_subset"))
            .arg(ArgSpec::range("data_all"))
            .format(FormatRule::Fixed("0.00%".to_string())),
    );

    registry.add(
        FunctionDef::new("RAND", "Random number between 0 inclusive and 1 exclusive", fn_rand)
            .format(FormatRule::None)
            .volatile(),
    );
    registry.add(
        FunctionDef::new("RANDBETWEEN", "Random integer between two values, inclusive", fn_randbetween)
            .arg(ArgSpec::number("low"))
            .arg(ArgSpec::number("high"))
            .format(FormatRule::None)
            .volatile(),
    );
}

type MathFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

/// SUM function
pub fn fn_sum(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut sum = 0.0;
    for_each_number(args, 0, |n| sum += n)?;
    finite(sum)
}

/// PRODUCT function
pub fn fn_product(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let numbers = collect_numbers(args, 0)?;
    if numbers.is_empty() {
        return Ok(Evaluated::number(0.0));
    }
    finite(numbers.iter().product())
}

/// ABS function
pub fn fn_abs(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.number(0)?.abs()))
}

fn places(args: &Args<'_>) -> EvalResult<i32> {
    Ok(args.number_or(1, 0.0)?.trunc().clamp(-308.0, 308.0) as i32)
}

fn scaled(value: f64, places: i32, op: impl Fn(f64) -> f64) -> f64 {
    let factor = 10f64.powi(places);
    op(value * factor) / factor
}

/// ROUND function
pub fn fn_round(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    // f64::round already rounds halves away from zero
    finite(scaled(value, places(args)?, f64::round))
}

/// ROUNDUP function
pub fn fn_roundup(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    finite(scaled(value, places(args)?, |x| x.abs().ceil().copysign(x)))
}

/// ROUNDDOWN and TRUNC
pub fn fn_rounddown(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    finite(scaled(value, places(args)?, f64::trunc))
}

/// INT function
pub fn fn_int(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.number(0)?.floor()))
}

/// MOD function, result has the sign of the divisor
pub fn fn_mod(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let dividend = args.number(0)?;
    let divisor = args.number(1)?;
    if divisor == 0.0 {
        return Err(EvalError::div_zero());
    }
    finite(dividend - divisor * (dividend / divisor).floor())
}

/// SQRT function
pub fn fn_sqrt(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    if value < 0.0 {
        return Err(EvalError::generic(format!(
            "The value ({}) must be positive or null",
            value
        )));
    }
    Ok(Evaluated::number(value.sqrt()))
}

/// EXP function
pub fn fn_exp(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(args.number(0)?.exp())
}

fn positive(value: f64) -> EvalResult<f64> {
    if value <= 0.0 {
        Err(EvalError::generic(format!(
            "The value ({}) must be strictly positive",
            value
        )))
    } else {
        Ok(value)
    }
}

/// LN function
pub fn fn_ln(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(positive(args.number(0)?)?.ln()))
}

/// LOG10 function
pub fn fn_log10(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(positive(args.number(0)?)?.log10()))
}

/// LOG function
pub fn fn_log(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = positive(args.number(0)?)?;
    let base = positive(args.number_or(1, 10.0)?)?;
    if base == 1.0 {
        return Err(EvalError::div_zero());
    }
    finite(value.ln() / base.ln())
}

/// PI function
pub fn fn_pi(_args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(std::f64::consts::PI))
}

/// SIGN function
pub fn fn_sign(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    Ok(Evaluated::number(if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }))
}

/// SUMIF function
pub fn fn_sumif(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let range = args.matrix(0)?;
    let matcher = CriteriaMatcher::new(&args.value(1)?.value);
    let sum_range = if args.has(2) { Some(args.matrix(2)?) } else { None };

    let mut sum = 0.0;
    for row in 0..range.rows() {
        for col in 0..range.cols() {
            let Some(tested) = range.get(row, col) else {
                continue;
            };
            if !matcher.matches(&tested.value) {
                continue;
            }
            let summed = match &sum_range {
                Some(values) => values.get(row, col).map(|v| &v.value),
                None => Some(&tested.value),
            };
            match summed {
                Some(Value::Number(n)) => sum += n,
                Some(Value::Error(err)) => return Err(EvalError::Raised(err.clone())),
                _ => {}
            }
        }
    }
    finite(sum)
}

/// SUMPRODUCT function
pub fn fn_sumproduct(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let matrices = (0..args.len())
        .map(|i| args.matrix(i))
        .collect::<EvalResult<Vec<_>>>()?;
    let Some(first) = matrices.first() else {
        return Ok(Evaluated::number(0.0));
    };
    let (rows, cols) = (first.rows(), first.cols());
    if matrices.iter().any(|m| m.rows() != rows || m.cols() != cols) {
        return Err(EvalError::generic(
            "SUMPRODUCT has mismatched range sizes",
        ));
    }

    let mut sum = 0.0;
    for row in 0..rows {
        for col in 0..cols {
            let mut product = 1.0;
            for m in &matrices {
                match m.get(row, col).map(|v| &v.value) {
                    Some(Value::Number(n)) => product *= n,
                    Some(Value::Error(err)) => return Err(EvalError::Raised(err.clone())),
                    _ => product = 0.0,
                }
            }
            sum += product;
        }
    }
    finite(sum)
}

/// PERCENTOF function
pub fn fn_percentof(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut part = 0.0;
    numbers_of(args, 0, |n| part += n)?;
    let mut whole = 0.0;
    numbers_of(args, 1, |n| whole += n)?;
    if whole == 0.0 {
        return Err(EvalError::div_zero());
    }
    finite(part / whole)
}

/// RAND function
pub fn fn_rand(_args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(rand::thread_rng().gen::<f64>()))
}

/// RANDBETWEEN function
pub fn fn_randbetween(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let low = args.number(0)?.ceil();
    let high = args.number(1)?.floor();
    if low > high {
        return Err(EvalError::generic(format!(
            "The high value ({}) must be greater than or equal to the low value ({})",
            high, low
        )));
    }
    let n = rand::thread_rng().gen_range(low as i64..=high as i64);
    Ok(Evaluated::number(n as f64))
}
