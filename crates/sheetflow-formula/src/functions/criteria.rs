//! Criteria of SUMIF, COUNTIF and AVERAGEIF
//!
//! A criterion is a value, or text starting with a comparison operator:
//! `5`, `"apple"`, `">=10"`, `"<>"`, `"a*e"`. Text criteria compare
//! case-insensitively; `*` and `?` are wildcards under `=` and `<>`, and
//! `~` escapes them.

use crate::value::{parse_number, Value};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug)]
enum Operand {
    Number(f64),
    Boolean(bool),
    Text { lowered: String, pattern: Option<Regex> },
    Empty,
    /// An error criterion, matches nothing
    Never,
}

/// Compiled criterion, tested against many cells
#[derive(Debug)]
pub struct CriteriaMatcher {
    operator: Operator,
    operand: Operand,
}

impl CriteriaMatcher {
    pub fn new(criterion: &Value) -> Self {
        match criterion {
            Value::Number(n) => Self::equal(Operand::Number(*n)),
            Value::Boolean(b) => Self::equal(Operand::Boolean(*b)),
            Value::Empty => Self::equal(Operand::Empty),
            Value::Error(_) => Self::equal(Operand::Never),
            Value::Text(text) => Self::parse(text),
        }
    }

    fn equal(operand: Operand) -> Self {
        Self {
            operator: Operator::Equal,
            operand,
        }
    }

    fn parse(text: &str) -> Self {
        let (operator, rest) = [
            (">=", Operator::GreaterEqual),
            ("<=", Operator::LessEqual),
            ("<>", Operator::NotEqual),
            (">", Operator::Greater),
            ("<", Operator::Less),
            ("=", Operator::Equal),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((Operator::Equal, text));

        let operand = if rest.is_empty() {
            Operand::Empty
        } else if let Some(n) = parse_number(rest) {
            Operand::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            Operand::Boolean(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            Operand::Boolean(false)
        } else {
            let pattern = matches!(operator, Operator::Equal | Operator::NotEqual)
                .then(|| wildcard_regex(rest))
                .flatten();
            Operand::Text {
                lowered: rest.to_lowercase(),
                pattern,
            }
        };
        Self { operator, operand }
    }

    /// Whether a cell value satisfies the criterion
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_error() {
            return false;
        }
        let hit = match (&self.operand, value) {
            (Operand::Never, _) => return false,
            (Operand::Empty, v) => match self.operator {
                Operator::Equal | Operator::NotEqual => {
                    v.is_empty() || matches!(v, Value::Text(s) if s.is_empty())
                }
                _ => return false,
            },
            (Operand::Number(n), Value::Number(x)) => return self.compare(x.partial_cmp(n)),
            (Operand::Boolean(b), Value::Boolean(x)) => return self.compare(Some(x.cmp(b))),
            (Operand::Text { lowered, pattern }, Value::Text(s)) => match pattern {
                Some(re) => re.is_match(s),
                None => return self.compare(Some(s.to_lowercase().cmp(lowered))),
            },
            _ => false,
        };
        match self.operator {
            Operator::Equal => hit,
            Operator::NotEqual => !hit,
            _ => false,
        }
    }

    fn compare(&self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        let Some(ordering) = ordering else {
            return false;
        };
        match self.operator {
            Operator::Equal => ordering == Equal,
            Operator::NotEqual => ordering != Equal,
            Operator::Less => ordering == Less,
            Operator::LessEqual => ordering != Greater,
            Operator::Greater => ordering == Greater,
            Operator::GreaterEqual => ordering != Less,
        }
    }
}

/// Regex source of a wildcard pattern, unanchored
pub(crate) fn wildcard_source(pattern: &str) -> String {
    let mut source = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            '~' => match chars.next() {
                Some(escaped) => source.push_str(&regex::escape(&escaped.to_string())),
                None => source.push('~'),
            },
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source
}

/// Case-insensitive regex matching a whole text against a wildcard pattern
pub(crate) fn wildcard_regex(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?is)^{}$", wildcard_source(pattern))).ok()
}
