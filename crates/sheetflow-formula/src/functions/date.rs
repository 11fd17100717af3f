//! Date functions
//!
//! Dates are serial numbers counting days from 1899-12-30, with the time
//! of day as the fractional part.

use super::{finite, ArgSpec, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry};
use crate::inference::{date_to_serial, serial_to_date};
use crate::value::{EvalError, EvalResult, Evaluated};
use chrono::{Datelike, Duration, Local, NaiveDate, Timelike};

const DATE_FORMAT: &str = "mm/dd/yyyy";
const DATE_TIME_FORMAT: &str = "mm/dd/yyyy hh:mm:ss";

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add(
        FunctionDef::new("DATE", "Converts a year, month, and day into a date", fn_date)
            .arg(ArgSpec::number("year"))
            .arg(ArgSpec::number("month"))
            .arg(ArgSpec::number("day"))
            .format(FormatRule::Fixed(DATE_FORMAT.to_string())),
    );
    for (name, description, f) in [
        ("YEAR", "Year specified by a given date", fn_year as DateFn),
        ("MONTH", "Month of the year a specific date falls in", fn_month),
        ("DAY", "Day of the month that a specific date falls on", fn_day),
    ] {
        registry.add(
            FunctionDef::new(name, description, f)
                .arg(ArgSpec::number("date"))
                .format(FormatRule::None),
        );
    }
    registry.add(
        FunctionDef::new("DAYS", "Number of days between two dates", fn_days)
            .arg(ArgSpec::number("end_date"))
            .arg(ArgSpec::number("start_date"))
            .format(FormatRule::None),
    );
    registry.add(
        FunctionDef::new("TODAY", "Current date as a date value", fn_today)
            .format(FormatRule::Fixed(DATE_FORMAT.to_string()))
            .volatile(),
    );
    registry.add(
        FunctionDef::new("NOW", "Current date and time as a date value", fn_now)
            .format(FormatRule::Fixed(DATE_TIME_FORMAT.to_string()))
            .volatile(),
    );
}

type DateFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

fn to_date(serial: f64) -> EvalResult<NaiveDate> {
    serial_to_date(serial).ok_or_else(|| {
        EvalError::generic(format!("The date ({}) is out of range.", serial))
    })
}

/// DATE function
///
/// Years below 1900 are offset from 1900; months and days outside their
/// usual range roll over.
pub fn fn_date(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let mut year = args.number(0)?.trunc() as i64;
    let month = args.number(1)?.trunc() as i64;
    let day = args.number(2)?.trunc() as i64;
    if (0..1900).contains(&year) {
        year += 1900;
    }

    let year = year + (month - 1).div_euclid(12);
    let month = (month - 1).rem_euclid(12) + 1;
    let date = i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month as u32, 1))
        .and_then(|first| first.checked_add_signed(Duration::try_days(day - 1)?))
        .ok_or_else(|| EvalError::generic("The function DATE result is out of range."))?;

    let serial = date_to_serial(date);
    if serial < 0.0 {
        return Err(EvalError::generic(
            "The function DATE result must be greater than or equal to 01/01/1900.",
        ));
    }
    finite(serial)
}

/// YEAR function
pub fn fn_year(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(f64::from(to_date(args.number(0)?)?.year())))
}

/// MONTH function
pub fn fn_month(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(f64::from(to_date(args.number(0)?)?.month())))
}

/// DAY function
pub fn fn_day(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(f64::from(to_date(args.number(0)?)?.day())))
}

/// DAYS function
pub fn fn_days(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let end = to_date(args.number(0)?)?;
    let start = to_date(args.number(1)?)?;
    Ok(Evaluated::number((end - start).num_days() as f64))
}

/// TODAY function
pub fn fn_today(_args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(date_to_serial(Local::now().date_naive())))
}

/// NOW function
pub fn fn_now(_args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let now = Local::now().naive_local();
    let fraction = f64::from(now.time().num_seconds_from_midnight()) / 86_400.0;
    Ok(Evaluated::number(date_to_serial(now.date()) + fraction))
}
