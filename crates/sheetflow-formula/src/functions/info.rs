//! Information functions

use super::{ArgSpec, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry};
use crate::value::{EvalError, EvalResult, Evaluated, Value};
use sheetflow_core::ErrorKind;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let predicates: [(&str, &str, fn(&Value) -> bool); 7] = [
        ("ISERROR", "Whether a value is an error", |v| v.is_error()),
        ("ISERR", "Whether a value is an error other than #N/A", |v| {
            v.as_error().map_or(false, |e| e.kind != ErrorKind::NotAvailable)
        }),
        ("ISNA", "Whether a value is the #N/A error", |v| {
            v.as_error().map_or(false, |e| e.kind == ErrorKind::NotAvailable)
        }),
        ("ISBLANK", "Whether a referenced cell is empty", Value::is_empty),
        ("ISNUMBER", "Whether a value is a number", |v| matches!(v, Value::Number(_))),
        ("ISTEXT", "Whether a value is text", |v| matches!(v, Value::Text(_))),
        ("ISLOGICAL", "Whether a value is TRUE or FALSE", |v| matches!(v, Value::Boolean(_))),
    ];
    for (name, description, test) in predicates {
        registry.add(
            FunctionDef::new(name, description, move |args: &Args<'_>, _ctx: &FunctionContext<'_>| {
                Ok(Evaluated::boolean(test(&args.value(0)?.value)))
            })
            .arg(ArgSpec::any("value").accept_errors())
            .format(FormatRule::None),
        );
    }

    registry.add(FunctionDef::new("NA", "The #N/A error", fn_na));
}

/// NA function
pub fn fn_na(_args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Err(EvalError::not_available("Value not available"))
}
