//! Values of cells that hold no formula
//!
//! Raw content is read as a boolean, a number (with thousands separators and
//! an optional `%`), a date or date-time, and otherwise as text. Percentages
//! and dates carry the format they were typed in.

use crate::config::Locale;
use crate::value::{FormattedValue, Value};
use chrono::{NaiveDate, NaiveTime, Timelike};
use lazy_regex::regex;

/// Day zero of date serials
pub(crate) fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Serial number of a calendar date
pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// Calendar date of a serial number (time part ignored)
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    // 9999-12-31
    if !serial.is_finite() || !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    epoch().checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

fn time_fraction(time: NaiveTime) -> f64 {
    time.num_seconds_from_midnight() as f64 / 86_400.0
}

/// Value of raw cell content
///
/// `explicit_format` (the cell's own number format) replaces any inferred
/// one.
pub fn infer_value(content: &str, explicit_format: Option<&str>, locale: &Locale) -> FormattedValue {
    let mut inferred = infer(content, locale);
    if let Some(format) = explicit_format {
        if matches!(inferred.value, Value::Number(_)) {
            inferred.format = Some(format.to_string());
        }
    }
    inferred
}

fn infer(content: &str, locale: &Locale) -> FormattedValue {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return if content.is_empty() {
            FormattedValue::empty()
        } else {
            Value::Text(content.to_string()).into()
        };
    }

    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Value::Boolean(true).into();
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Value::Boolean(false).into();
    }

    if let Some(v) = infer_number(trimmed, locale) {
        return v;
    }
    if let Some(v) = infer_date(trimmed) {
        return v;
    }

    Value::Text(content.to_string()).into()
}

/// Parse a locale number like `-1,234.5` or `12.5%`
pub fn parse_locale_number(text: &str, locale: &Locale) -> Option<(f64, bool, usize)> {
    let (body, percent) = match text.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (text, false),
    };

    let mut canonical = String::with_capacity(body.len());
    let mut decimals = 0usize;
    let mut seen_decimal = false;
    let mut digits_since_group: Option<usize> = None;
    let mut digit_count = 0usize;
    for (i, c) in body.chars().enumerate() {
        if c.is_ascii_digit() {
            canonical.push(c);
            digit_count += 1;
            if seen_decimal {
                decimals += 1;
            } else if let Some(n) = digits_since_group.as_mut() {
                *n += 1;
            }
        } else if (c == '-' || c == '+') && i == 0 {
            canonical.push(c);
        } else if c == locale.decimal_separator && !seen_decimal {
            if digits_since_group.map_or(false, |n| n != 3) {
                return None;
            }
            seen_decimal = true;
            canonical.push('.');
        } else if c == locale.thousands_separator && !seen_decimal && digit_count > 0 {
            if digits_since_group.map_or(false, |n| n != 3) {
                return None;
            }
            digits_since_group = Some(0);
        } else if (c == 'e' || c == 'E') && digit_count > 0 && digits_since_group.is_none() {
            // Exponent: hand the rest to the float parser
            canonical.push('e');
            canonical.push_str(&body[body.char_indices().nth(i + 1)?.0..]);
            break;
        } else {
            return None;
        }
    }
    if digit_count == 0 || digits_since_group.map_or(false, |n| n != 3 && !seen_decimal) {
        return None;
    }
    let n: f64 = canonical.parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some((if percent { n / 100.0 } else { n }, percent, decimals))
}

fn infer_number(text: &str, locale: &Locale) -> Option<FormattedValue> {
    let (n, percent, decimals) = parse_locale_number(text, locale)?;
    let format = percent.then(|| {
        if decimals == 0 {
            "0%".to_string()
        } else {
            format!("0.{}%", "0".repeat(decimals))
        }
    });
    Some(FormattedValue::with_format(Value::Number(n), format))
}

fn infer_date(text: &str) -> Option<FormattedValue> {
    let iso = regex!(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[ T](\d{1,2}):(\d{2})(?::(\d{2}))?)?$");
    let us = regex!(r"^(\d{1,2})/(\d{1,2})/(\d{4})(?: (\d{1,2}):(\d{2})(?::(\d{2}))?)?$");
    let time_only = regex!(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?$");

    let num = |caps: &regex::Captures<'_>, i: usize| -> Option<u32> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };

    let (date, time, date_format) = if let Some(caps) = iso.captures(text) {
        let date = NaiveDate::from_ymd_opt(num(&caps, 1)? as i32, num(&caps, 2)?, num(&caps, 3)?)?;
        let time = caps
            .get(4)
            .map(|_| NaiveTime::from_hms_opt(num(&caps, 4)?, num(&caps, 5)?, num(&caps, 6)?))
            .map_or(Some(None), |t| t.map(Some))?;
        (Some(date), time, "yyyy-mm-dd")
    } else if let Some(caps) = us.captures(text) {
        let date = NaiveDate::from_ymd_opt(num(&caps, 3)? as i32, num(&caps, 1)?, num(&caps, 2)?)?;
        let time = caps
            .get(4)
            .map(|_| NaiveTime::from_hms_opt(num(&caps, 4)?, num(&caps, 5)?, num(&caps, 6)?))
            .map_or(Some(None), |t| t.map(Some))?;
        (Some(date), time, "mm/dd/yyyy")
    } else if let Some(caps) = time_only.captures(text) {
        let time = NaiveTime::from_hms_opt(num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)?)?;
        (None, Some(time), "")
    } else {
        return None;
    };

    let mut serial = date.map_or(0.0, date_to_serial);
    let mut format = date_format.to_string();
    if let Some(time) = time {
        serial += time_fraction(time);
        if !format.is_empty() {
            format.push(' ');
        }
        format.push_str(if time.second() == 0 { "hh:mm" } else { "hh:mm:ss" });
    }
    Some(FormattedValue::with_format(Value::Number(serial), Some(format)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn infer_en(s: &str) -> FormattedValue {
        infer_value(s, None, &Locale::en_us())
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(infer_en(""), FormattedValue::empty());
        assert_eq!(infer_en("true").value, Value::Boolean(true));
        assert_eq!(infer_en("42").value, Value::Number(42.0));
        assert_eq!(infer_en("-1.5e3").value, Value::Number(-1500.0));
        assert_eq!(infer_en("hello").value, Value::Text("hello".into()));
        assert_eq!(infer_en("#REF").value, Value::Text("#REF".into()));
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(infer_en("1,234,567.5").value, Value::Number(1_234_567.5));
        assert_eq!(infer_en("12,34").value, Value::Text("12,34".into()));

        let de = Locale::de_de();
        assert_eq!(
            infer_value("1.234,5", None, &de).value,
            Value::Number(1234.5)
        );
    }

    #[test]
    fn test_percent() {
        let v = infer_en("15%");
        assert_eq!(v.value, Value::Number(0.15));
        assert_eq!(v.format.as_deref(), Some("0%"));
        assert_eq!(infer_en("2.50%").format.as_deref(), Some("0.00%"));
    }

    #[test]
    fn test_dates() {
        let v = infer_en("2024-01-15");
        assert_eq!(v.value, Value::Number(45306.0));
        assert_eq!(v.format.as_deref(), Some("yyyy-mm-dd"));

        let v = infer_en("01/15/2024 12:00");
        assert_eq!(v.value, Value::Number(45306.5));
        assert_eq!(v.format.as_deref(), Some("mm/dd/yyyy hh:mm"));

        assert_eq!(infer_en("2024-02-30").value, Value::Text("2024-02-30".into()));
    }

    #[test]
    fn test_explicit_format_wins() {
        let v = infer_value("0.25", Some("0.0%"), &Locale::en_us());
        assert_eq!(v.format.as_deref(), Some("0.0%"));
        let v = infer_value("text", Some("0.0%"), &Locale::en_us());
        assert_eq!(v.format, None);
    }

    #[test]
    fn test_serial_round_trip() {
        let date = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap();
        assert_eq!(date_to_serial(date), 61.0);
        assert_eq!(serial_to_date(61.0), Some(date));
        assert_eq!(serial_to_date(-1.0), None);
    }
}
