//! Statistical functions

use super::criteria::CriteriaMatcher;
use super::{
    collect_numbers, finite, numbers_of, ArgSpec, ArgType, Args, FormatRule, FunctionContext, FunctionDef,
    FunctionRegistry,
};
use crate::value::{EvalError, EvalResult, Evaluated, Value};

type StatFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let aggregates: [(&str, &str, StatFn, FormatRule); 8] = [
        ("AVERAGE", "Numerical average value in a dataset", fn_average, FormatRule::FirstNonEmpty),
        ("MIN", "Minimum value in a numeric dataset", fn_min, FormatRule::FirstNonEmpty),
        ("MAX", "Maximum value in a numeric dataset", fn_max, FormatRule::FirstNonEmpty),
        ("MEDIAN", "Median value in a numeric dataset", fn_median, FormatRule::FirstNonEmpty),
        ("COUNT", "The number of numeric values in a dataset", fn_count, FormatRule::None),
        ("COUNTA", "The number of values in a dataset", fn_counta, FormatRule::None),
        ("STDEV", "Standard deviation of a sample", fn_stdev, FormatRule::FirstNonEmpty),
        ("VAR", "Variance of a sample", fn_var, FormatRule::None),
    ];
    for (name, description, f, format) in aggregates {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::range("value1"))
                .arg(ArgSpec::range("value2").optional().repeating())
                .format(format),
        );
    }

    registry.add(
        FunctionDef::new("COUNTBLANK", "Number of empty cells in a range", fn_countblank)
            .arg(ArgSpec::matrix("range"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("COUNTIF", "A conditional count across a range", fn_countif)
            .arg(ArgSpec::matrix("range"))
            .arg(ArgSpec::any("criterion"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("AVERAGEIF", "Average of a range depending on criteria", fn_averageif)
            .arg(ArgSpec::matrix("criteria_range"))
            .arg(ArgSpec::any("criterion"))
            .arg(ArgSpec::matrix("average_range").optional())
            .format(FormatRule::ArgumentOr(2, 0)),
    );
    for (name, description, f) in [
        ("LARGE", "Nth largest element from a data set", fn_large as StatFn),
        ("SMALL", "Nth smallest element in a data set", fn_small),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::range("data"))
                .arg(ArgSpec::number("n"))
                .format(FormatRule::Argument(0)),
        );
    }
    registry.add(
        FunctionDef::new("RANK", "Rank of a value in a data set", fn_rank)
            .arg(ArgSpec::number("value"))
            .arg(ArgSpec::range("data"))
            .arg(ArgSpec::new("is_ascending", &[ArgType::Boolean]).optional())
            .format(FormatRule::None),
    );
}

fn no_data(args: &Args<'_>) -> EvalError {
    EvalError::raise(
        sheetflow_core::ErrorKind::DivisionByZero,
        format!(
            "Evaluation of function {} caused a divide by zero error.",
            args.function()
        ),
    )
}

/// AVERAGE function
pub fn fn_average(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let numbers = collect_numbers(args, 0)?;
    if numbers.is_empty() {
        return Err(no_data(args));
    }
    finite(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

/// MIN function, 0 without numbers
pub fn fn_min(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let numbers = collect_numbers(args, 0)?;
    Ok(Evaluated::number(
        numbers.into_iter().reduce(f64::min).unwrap_or(0.0),
    ))
}

/// MAX function, 0 without numbers
pub fn fn_max(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let numbers = collect_numbers(args, 0)?;
    Ok(Evaluated::number(
        numbers.into_iter().reduce(f64::max).unwrap_or(0.0),
    ))
}

fn sorted(mut numbers: Vec<f64>) -> Vec<f64> {
    numbers.sort_by(|a, b| a.total_cmp(b));
    numbers
}

/// MEDIAN function
pub fn fn_median(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let numbers = sorted(collect_numbers(args, 0)?);
    let n = numbers.len();
    if n == 0 {
        return Err(EvalError::generic("MEDIAN has no valid input data."));
    }
    let median = if n % 2 == 1 {
        numbers[n / 2]
    } else {
        (numbers[n / 2 - 1] + numbers[n / 2]) / 2.0
    };
    Ok(Evaluated::number(median))
}

/// COUNT function
///
/// Scalar arguments count when they read as numbers; inside ranges only
/// numbers count.
pub fn fn_count(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut count = 0usize;
    for i in 0..args.len() {
        match args.evaluated(i)? {
            Evaluated::Scalar(v) => {
                if !v.value.is_empty() && !v.value.is_error() && v.value.to_number().is_ok() {
                    count += 1;
                }
            }
            Evaluated::Matrix(m) => {
                count += m.iter().filter(|v| matches!(v.value, Value::Number(_))).count();
            }
        }
    }
    Ok(Evaluated::number(count as f64))
}

/// COUNTA function, errors included
pub fn fn_counta(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut count = 0usize;
    for i in 0..args.len() {
        match args.evaluated(i)? {
            Evaluated::Scalar(v) => count += usize::from(!v.value.is_empty()),
            Evaluated::Matrix(m) => count += m.iter().filter(|v| !v.value.is_empty()).count(),
        }
    }
    Ok(Evaluated::number(count as f64))
}

/// COUNTBLANK function
pub fn fn_countblank(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let range = args.matrix(0)?;
    let count = range
        .iter()
        .filter(|v| match &v.value {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        })
        .count();
    Ok(Evaluated::number(count as f64))
}

/// COUNTIF function
pub fn fn_countif(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let range = args.matrix(0)?;
    let matcher = CriteriaMatcher::new(&args.value(1)?.value);
    let count = range.iter().filter(|v| matcher.matches(&v.value)).count();
    Ok(Evaluated::number(count as f64))
}

/// AVERAGEIF function
pub fn fn_averageif(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let range = args.matrix(0)?;
    let matcher = CriteriaMatcher::new(&args.value(1)?.value);
    let averaged = if args.has(2) { Some(args.matrix(2)?) } else { None };

    let (mut sum, mut count) = (0.0, 0usize);
    for row in 0..range.rows() {
        for col in 0..range.cols() {
            let Some(tested) = range.get(row, col) else {
                continue;
            };
            if !matcher.matches(&tested.value) {
                continue;
            }
            let value = match &averaged {
                Some(values) => values.get(row, col).map(|v| &v.value),
                None => Some(&tested.value),
            };
            match value {
                Some(Value::Number(n)) => {
                    sum += n;
                    count += 1;
                }
                Some(Value::Error(err)) => return Err(EvalError::Raised(err.clone())),
                _ => {}
            }
        }
    }
    if count == 0 {
        return Err(no_data(args));
    }
    finite(sum / count as f64)
}

fn nth(args: &Args<'_>, descending: bool) -> EvalResult<Evaluated> {
    let mut data = Vec::new();
    numbers_of(args, 0, |n| data.push(n))?;
    let data = sorted(data);
    let n = args.number(1)?.ceil();
    if n < 1.0 || n as usize > data.len() {
        return Err(EvalError::generic(format!(
            "Function {} parameter 2 value ({}) is out of range.",
            args.function(),
            n
        )));
    }
    let index = n as usize - 1;
    Ok(Evaluated::number(if descending {
        data[data.len() - 1 - index]
    } else {
        data[index]
    }))
}

/// LARGE function
pub fn fn_large(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    nth(args, true)
}

/// SMALL function
pub fn fn_small(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    nth(args, false)
}

/// RANK function, 1 is the largest unless ascending
pub fn fn_rank(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.number(0)?;
    let mut data = Vec::new();
    numbers_of(args, 1, |n| data.push(n))?;
    let ascending = args.boolean_or(2, false)?;

    if !data.contains(&value) {
        return Err(EvalError::not_available(format!(
            "Value ({}) not found in the data",
            value
        )));
    }
    let before = data
        .iter()
        .filter(|x| if ascending { **x < value } else { **x > value })
        .count();
    Ok(Evaluated::number((before + 1) as f64))
}

fn variance(args: &Args<'_>) -> EvalResult<f64> {
    let numbers = collect_numbers(args, 0)?;
    if numbers.len() < 2 {
        return Err(no_data(args));
    }
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;
    Ok(numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
}

/// STDEV function
pub fn fn_stdev(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(variance(args)?.sqrt())
}

/// VAR function
pub fn fn_var(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    finite(variance(args)?)
}
