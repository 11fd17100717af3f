//! Text functions
//!
//! Positions and lengths count characters, not bytes.

use super::criteria::wildcard_source;
use super::{ArgSpec, ArgType, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry};
use crate::config::Locale;
use crate::inference::parse_locale_number;
use crate::value::{EvalError, EvalResult, Evaluated, Value};
use regex::Regex;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let text_fn = |name: &str, description: &str, f: TextFn| {
        FunctionDef::new(name, description, f).format(FormatRule::None)
    };

    registry.add(text_fn("LEN", "Length of a string", fn_len).arg(ArgSpec::text("text")));
    registry.add(
        text_fn("LEFT", "Substring from the beginning of a string", fn_left)
            .arg(ArgSpec::text("text"))
            .arg(ArgSpec::number("number_of_characters").optional()),
    );
    registry.add(
        text_fn("RIGHT", "Substring from the end of a string", fn_right)
            .arg(ArgSpec::text("text"))
            .arg(ArgSpec::number("number_of_characters").optional()),
    );
    registry.add(
        text_fn("MID", "A segment of a string", fn_mid)
            .arg(ArgSpec::text("text"))
            .arg(ArgSpec::number("starting_at"))
            .arg(ArgSpec::number("extract_length")),
    );
    registry.add(text_fn("UPPER", "Converts a string to uppercase", fn_upper).arg(ArgSpec::text("text")));
    registry.add(text_fn("LOWER", "Converts a string to lowercase", fn_lower).arg(ArgSpec::text("text")));
    registry.add(
        text_fn("TRIM", "Removes leading, trailing and repeated spaces", fn_trim)
            .arg(ArgSpec::text("text")),
    );
    for name in ["CONCAT", "CONCATENATE"] {
        registry.add(
            text_fn(name, "Appends strings to one another", fn_concatenate)
                .arg(ArgSpec::range("string1"))
                .arg(ArgSpec::range("string2").optional().repeating()),
        );
    }
    registry.add(
        text_fn("SUBSTITUTE", "Replaces existing text with new text in a string", fn_substitute)
            .arg(ArgSpec::text("text_to_search"))
            .arg(ArgSpec::text("search_for"))
            .arg(ArgSpec::text("replace_with"))
            .arg(ArgSpec::number("occurrence_number").optional()),
    );
    registry.add(
        text_fn("REPT", "Text repeated a number of times", fn_rept)
            .arg(ArgSpec::text("text_to_repeat"))
            .arg(ArgSpec::number("number_of_repetitions")),
    );
    for (name, description, f) in [
        ("FIND", "First position of a string, case-sensitive", fn_find as TextFn),
        ("SEARCH", "First position of a pattern, case-insensitive", fn_search),
    ] {
        registry.add(
            text_fn(name, description, f)
                .arg(ArgSpec::text("search_for"))
                .arg(ArgSpec::text("text_to_search"))
                .arg(ArgSpec::number("starting_at").optional()),
        );
    }
    registry.add(
        text_fn("EXACT", "Whether two strings are identical", fn_exact)
            .arg(ArgSpec::text("string1"))
            .arg(ArgSpec::text("string2")),
    );
    registry.add(
        text_fn("TEXTJOIN", "Joins texts with a delimiter", fn_textjoin)
            .arg(ArgSpec::text("delimiter"))
            .arg(ArgSpec::new("ignore_empty", &[ArgType::Boolean]))
            .arg(ArgSpec::range("text1"))
            .arg(ArgSpec::range("text2").optional().repeating()),
    );
    registry.add(
        FunctionDef::new("VALUE", "Converts a string to a number", fn_value)
            .arg(ArgSpec::any("value")),
    );
}

type TextFn = fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated>;

fn count(args: &Args<'_>, i: usize, default: f64, what: &str) -> EvalResult<usize> {
    let n = args.number_or(i, default)?;
    if n < 0.0 {
        return Err(EvalError::generic(format!(
            "The {} ({}) must be positive or null.",
            what, n
        )));
    }
    Ok(n.trunc().min(usize::MAX as f64) as usize)
}

/// LEN function
pub fn fn_len(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::number(args.text(0)?.chars().count() as f64))
}

/// LEFT function
pub fn fn_left(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let n = count(args, 1, 1.0, "number_of_characters")?;
    Ok(Evaluated::text(args.text(0)?.chars().take(n).collect::<String>()))
}

/// RIGHT function
pub fn fn_right(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let n = count(args, 1, 1.0, "number_of_characters")?;
    let text = args.text(0)?;
    let skip = text.chars().count().saturating_sub(n);
    Ok(Evaluated::text(text.chars().skip(skip).collect::<String>()))
}

/// MID function
pub fn fn_mid(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let text = args.text(0)?;
    let start = args.number(1)?.trunc();
    if start < 1.0 {
        return Err(EvalError::generic(format!(
            "The starting_at argument ({}) must be greater than or equal to 1.",
            start
        )));
    }
    let len = count(args, 2, 0.0, "extract_length")?;
    Ok(Evaluated::text(
        text.chars()
            .skip(start as usize - 1)
            .take(len)
            .collect::<String>(),
    ))
}

/// UPPER function
pub fn fn_upper(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::text(args.text(0)?.to_uppercase()))
}

/// LOWER function
pub fn fn_lower(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::text(args.text(0)?.to_lowercase()))
}

/// TRIM function
pub fn fn_trim(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let text = args.text(0)?;
    Ok(Evaluated::text(
        text.split(' ')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    ))
}

/// Every text of arguments `from..`, ranges flattened row by row
fn texts(args: &Args<'_>, from: usize, skip_empty: bool) -> EvalResult<Vec<String>> {
    let mut texts = Vec::new();
    for i in from..args.len() {
        let matrix = args.matrix(i)?;
        for v in matrix.iter() {
            let text = v.value.to_text()?;
            if !(skip_empty && text.is_empty()) {
                texts.push(text);
            }
        }
    }
    Ok(texts)
}

/// CONCAT and CONCATENATE
pub fn fn_concatenate(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::text(texts(args, 0, false)?.concat()))
}

/// TEXTJOIN function
pub fn fn_textjoin(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let delimiter = args.text(0)?;
    let ignore_empty = args.boolean(1)?;
    Ok(Evaluated::text(texts(args, 2, ignore_empty)?.join(&delimiter)))
}

/// SUBSTITUTE function
pub fn fn_substitute(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let text = args.text(0)?;
    let search = args.text(1)?;
    let replacement = args.text(2)?;
    if search.is_empty() {
        return Ok(Evaluated::text(text));
    }
    if !args.has(3) {
        return Ok(Evaluated::text(text.replace(&search, &replacement)));
    }

    let occurrence = args.number(3)?.trunc();
    if occurrence < 1.0 {
        return Err(EvalError::generic(format!(
            "The occurrence_number argument ({}) must be greater than or equal to 1.",
            occurrence
        )));
    }
    let result = match text.match_indices(&search).nth(occurrence as usize - 1) {
        Some((at, _)) => format!("{}{}{}", &text[..at], replacement, &text[at + search.len()..]),
        None => text,
    };
    Ok(Evaluated::text(result))
}

/// REPT function
pub fn fn_rept(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let text = args.text(0)?;
    let times = count(args, 1, 0.0, "number_of_repetitions")?;
    if text.len().saturating_mul(times) > 32_767 {
        return Err(EvalError::generic("REPT result is too long"));
    }
    Ok(Evaluated::text(text.repeat(times)))
}

/// Character index to start searching at, checked against the text
fn start_index(args: &Args<'_>, text: &str) -> EvalResult<usize> {
    let start = args.number_or(2, 1.0)?.trunc();
    let len = text.chars().count();
    if start < 1.0 || start as usize > len.max(1) {
        return Err(EvalError::generic(format!(
            "The starting_at ({}) must be between 1 and {}.",
            start,
            len.max(1)
        )));
    }
    Ok(start as usize - 1)
}

fn not_found(search: &str, text: &str) -> EvalError {
    EvalError::generic(format!("In {}, \"{}\" was not found.", text, search))
}

/// FIND function
pub fn fn_find(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let search = args.text(0)?;
    let text = args.text(1)?;
    let start = start_index(args, &text)?;
    let tail: String = text.chars().skip(start).collect();
    match tail.find(&search) {
        Some(byte) => Ok(Evaluated::number(
            (start + tail[..byte].chars().count() + 1) as f64,
        )),
        None => Err(not_found(&search, &text)),
    }
}

/// SEARCH function, `*` and `?` are wildcards
pub fn fn_search(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let search = args.text(0)?;
    let text = args.text(1)?;
    let start = start_index(args, &text)?;
    let tail: String = text.chars().skip(start).collect();

    let pattern = Regex::new(&format!("(?is){}", wildcard_source(&search)))
        .map_err(|_| not_found(&search, &text))?;
    match pattern.find(&tail) {
        Some(m) => Ok(Evaluated::number(
            (start + tail[..m.start()].chars().count() + 1) as f64,
        )),
        None => Err(not_found(&search, &text)),
    }
}

/// EXACT function
pub fn fn_exact(args: &Args<'_>, _ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    Ok(Evaluated::boolean(args.text(0)? == args.text(1)?))
}

/// VALUE function
pub fn fn_value(args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
    let value = args.value(0)?;
    match &value.value {
        Value::Number(_) => Ok(Evaluated::Scalar(value)),
        Value::Empty => Ok(Evaluated::number(0.0)),
        Value::Boolean(_) => Err(EvalError::generic(
            "VALUE parameter cannot be a boolean",
        )),
        Value::Text(text) => {
            let trimmed = text.trim();
            match parse_locale_number(trimmed, ctx.locale())
                .or_else(|| parse_locale_number(trimmed, &Locale::en_us()))
            {
                Some((n, _, _)) => Ok(Evaluated::number(n)),
                None => Value::Text(text.clone()).to_number().map(Evaluated::number),
            }
        }
        Value::Error(err) => Err(EvalError::Raised(err.clone())),
    }
}
