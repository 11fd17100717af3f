//! Formula tokenizer
//!
//! Splits formula text (without the leading `=`) into tokens. Two dialects
//! are read:
//! - user text, with locale separators, where `|` is not allowed
//! - canonical text, with `.`/`,` separators and `|i|`, `|Si|`, `|Ni|`
//!   placeholders
//!
//! A whole reference, including its sheet qualifier and range part
//! (`'My sheet'!$A$1:B2`), is a single token.

use crate::config::Locale;
use crate::error::{FormulaError, FormulaResult};
use sheetflow_core::ErrorKind;

/// Marker text of a reference that no longer points anywhere
pub const INVALID_REFERENCE: &str = "#REF";

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Numeric literal, `.` as decimal separator
    Number(String),
    /// String literal, unescaped
    String(String),
    Boolean(bool),
    Error(ErrorKind),

    /// Cell or range reference, possibly sheet-qualified, or `#REF`
    Reference(String),
    /// Function name; the next token is `(`
    Function(String),

    // Placeholders of canonical text
    ReferencePlaceholder(usize),
    StringPlaceholder(usize),
    NumberPlaceholder(usize),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Delimiters
    Comma,
    LeftParen,
    RightParen,
}

/// Tokenize user-typed formula text
pub fn tokenize(input: &str, locale: &Locale) -> FormulaResult<Vec<Token>> {
    Tokenizer::new(input, locale, false).run()
}

/// Tokenize canonical formula text
pub fn tokenize_canonical(input: &str) -> FormulaResult<Vec<Token>> {
    Tokenizer::new(input, &Locale::en_us(), true).run()
}

/// Write tokens back as text, using the locale's separators
pub fn render(tokens: &[Token], locale: &Locale) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Number(n) => {
                if locale.decimal_separator == '.' {
                    out.push_str(n);
                } else {
                    out.extend(n.chars().map(|c| {
                        if c == '.' {
                            locale.decimal_separator
                        } else {
                            c
                        }
                    }));
                }
            }
            Token::String(s) => {
                out.push('"');
                out.push_str(&s.replace('"', "\"\""));
                out.push('"');
            }
            Token::Boolean(true) => out.push_str("TRUE"),
            Token::Boolean(false) => out.push_str("FALSE"),
            Token::Error(kind) => out.push_str(kind.as_str()),
            Token::Reference(r) => out.push_str(r),
            Token::Function(name) => out.push_str(&name.to_ascii_uppercase()),
            Token::ReferencePlaceholder(i) => out.push_str(&format!("|{}|", i)),
            Token::StringPlaceholder(i) => out.push_str(&format!("|S{}|", i)),
            Token::NumberPlaceholder(i) => out.push_str(&format!("|N{}|", i)),
            Token::Plus => out.push('+'),
            Token::Minus => out.push('-'),
            Token::Star => out.push('*'),
            Token::Slash => out.push('/'),
            Token::Caret => out.push('^'),
            Token::Percent => out.push('%'),
            Token::Ampersand => out.push('&'),
            Token::Equal => out.push('='),
            Token::NotEqual => out.push_str("<>"),
            Token::LessThan => out.push('<'),
            Token::LessEqual => out.push_str("<="),
            Token::GreaterThan => out.push('>'),
            Token::GreaterEqual => out.push_str(">="),
            Token::Comma => out.push(locale.argument_separator),
            Token::LeftParen => out.push('('),
            Token::RightParen => out.push(')'),
        }
    }
    out
}

/// Uppercase the cell part of a reference, keeping the sheet part as written
pub fn canonical_reference(text: &str) -> String {
    match text.rfind('!') {
        Some(bang) => format!("{}{}", &text[..=bang], text[bang + 1..].to_ascii_uppercase()),
        None => text.to_ascii_uppercase(),
    }
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    locale: &'a Locale,
    canonical: bool,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str, locale: &'a Locale, canonical: bool) -> Self {
        Self {
            input,
            pos: 0,
            locale,
            canonical,
        }
    }

    fn run(mut self) -> FormulaResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return Ok(tokens);
            }
            tokens.push(self.scan_token()?);
        }
    }

    fn scan_token(&mut self) -> FormulaResult<Token> {
        let Some(c) = self.peek_char() else {
            return Err(FormulaError::parse("unexpected end of formula"));
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '&' => Some(Token::Ampersand),
            '=' => Some(Token::Equal),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        if c == '<' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Token::LessEqual);
            } else if self.peek_char() == Some('>') {
                self.advance();
                return Ok(Token::NotEqual);
            }
            return Ok(Token::LessThan);
        }

        if c == '>' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Token::GreaterEqual);
            }
            return Ok(Token::GreaterThan);
        }

        if c == self.argument_separator() {
            self.advance();
            return Ok(Token::Comma);
        }

        if c == '"' {
            return self.scan_string();
        }

        if c == '|' && self.canonical {
            return self.scan_placeholder();
        }

        if c.is_ascii_digit()
            || (c == self.decimal_separator()
                && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if c == '#' {
            return self.scan_error();
        }

        if c == '\'' {
            return self.scan_quoted_sheet_reference();
        }

        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            return self.scan_identifier_or_ref();
        }

        Err(FormulaError::parse(format!("unexpected character '{}'", c)))
    }

    fn argument_separator(&self) -> char {
        if self.canonical {
            ','
        } else {
            self.locale.argument_separator
        }
    }

    fn decimal_separator(&self) -> char {
        if self.canonical {
            '.'
        } else {
            self.locale.decimal_separator
        }
    }

    /// Thousands separator accepted inside number literals
    ///
    /// Only when it cannot be read as another token.
    fn thousands_separator(&self) -> Option<char> {
        let sep = self.locale.thousands_separator;
        let usable = !self.canonical
            && !sep.is_whitespace()
            && sep != self.locale.argument_separator
            && sep != self.locale.decimal_separator;
        usable.then_some(sep)
    }

    fn scan_string(&mut self) -> FormulaResult<Token> {
        self.advance();

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    if self.peek_char_at(1) == Some('"') {
                        s.push('"');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        return Ok(Token::String(s));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => return Err(FormulaError::parse("unterminated string literal")),
            }
        }
    }

    fn scan_placeholder(&mut self) -> FormulaResult<Token> {
        let input = self.input;
        self.advance();
        let start = self.pos;
        while self.peek_char().map_or(false, |c| c != '|') {
            self.advance();
        }
        if self.is_at_end() {
            return Err(FormulaError::parse("unterminated placeholder"));
        }
        let body = &input[start..self.pos];
        self.advance();

        let invalid = || FormulaError::parse(format!("invalid placeholder '|{}|'", body));
        let (ctor, digits): (fn(usize) -> Token, &str) = match body.as_bytes().first() {
            Some(b'S') => (Token::StringPlaceholder, &body[1..]),
            Some(b'N') => (Token::NumberPlaceholder, &body[1..]),
            _ => (Token::ReferencePlaceholder, body),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse().map(ctor).map_err(|_| invalid())
    }

    fn scan_number(&mut self) -> FormulaResult<Token> {
        let mut text = String::new();
        let decimal = self.decimal_separator();
        let thousands = self.thousands_separator();
        loop {
            while let Some(c) = self.peek_char().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                self.advance();
            }
            // A separator only groups when exactly three digits follow
            let grouped = !text.is_empty()
                && thousands.is_some()
                && self.peek_char() == thousands
                && (1..=3).all(|i| self.peek_char_at(i).map_or(false, |c| c.is_ascii_digit()))
                && !self.peek_char_at(4).map_or(false, |c| c.is_ascii_digit());
            if !grouped {
                break;
            }
            self.advance();
        }

        if self.peek_char() == Some(decimal) {
            self.advance();
            let mut fraction = String::new();
            while let Some(c) = self.peek_char().filter(|c| c.is_ascii_digit()) {
                fraction.push(c);
                self.advance();
            }
            if text.is_empty() {
                text.push('0');
            }
            if !fraction.is_empty() {
                text.push('.');
                text.push_str(&fraction);
            }
        }

        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            let next = self.peek_char_at(1);
            let signed = matches!(next, Some('+') | Some('-'));
            let digit_at = if signed { 2 } else { 1 };
            if self
                .peek_char_at(digit_at)
                .map_or(false, |c| c.is_ascii_digit())
            {
                text.push('e');
                self.advance();
                if signed {
                    if let Some(sign) = next {
                        text.push(sign);
                    }
                    self.advance();
                }
                while let Some(c) = self.peek_char().filter(|c| c.is_ascii_digit()) {
                    text.push(c);
                    self.advance();
                }
            }
        }

        if self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        {
            return Err(FormulaError::parse(format!(
                "invalid number near '{}'",
                &self.input[self.pos..]
            )));
        }

        Ok(Token::Number(text))
    }

    fn scan_error(&mut self) -> FormulaResult<Token> {
        let rest = &self.input[self.pos..];
        let upper: String = rest.chars().take(10).collect::<String>().to_ascii_uppercase();

        // "#REF!" is accepted on input
        for tag in ["#REF!", INVALID_REFERENCE] {
            if upper.starts_with(tag) {
                self.pos += tag.len();
                return Ok(Token::Reference(INVALID_REFERENCE.to_string()));
            }
        }
        for kind in ErrorKind::ALL {
            let tag = kind.as_str();
            if upper.starts_with(tag) {
                self.pos += tag.len();
                return Ok(Token::Error(kind));
            }
        }
        Err(FormulaError::parse(format!(
            "unknown error literal near '{}'",
            rest
        )))
    }

    fn scan_quoted_sheet_reference(&mut self) -> FormulaResult<Token> {
        let input = self.input;
        let start = self.pos;
        self.advance();
        loop {
            match self.peek_char() {
                Some('\'') => {
                    if self.peek_char_at(1) == Some('\'') {
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(_) => self.advance(),
                None => return Err(FormulaError::parse("unterminated sheet name")),
            }
        }
        if self.peek_char() != Some('!') {
            return Err(FormulaError::parse("expected '!' after sheet name"));
        }
        self.advance();
        let sheet = &input[start..self.pos];
        let cells = self.scan_cell_range()?;
        Ok(Token::Reference(format!("{}{}", sheet, cells)))
    }

    fn scan_identifier_or_ref(&mut self) -> FormulaResult<Token> {
        let input = self.input;
        let start = self.pos;
        self.scan_word();
        let text = &input[start..self.pos];

        // Sheet qualifier
        if self.peek_char() == Some('!') {
            if text.contains('$') {
                return Err(FormulaError::parse(format!("invalid sheet name '{}'", text)));
            }
            self.advance();
            let cells = self.scan_cell_range()?;
            return Ok(Token::Reference(format!("{}!{}", text, cells)));
        }

        // Function call (LOG10( is a function, not a cell)
        if self.peek_char() == Some('(') {
            if text.contains('$') {
                return Err(FormulaError::parse(format!("invalid function name '{}'", text)));
            }
            return Ok(Token::Function(text.to_string()));
        }

        let upper = text.to_ascii_uppercase();
        if upper == "TRUE" {
            return Ok(Token::Boolean(true));
        }
        if upper == "FALSE" {
            return Ok(Token::Boolean(false));
        }

        if is_cell_reference(text) {
            let mut reference = text.to_string();
            if self.peek_char() == Some(':') {
                self.advance();
                let end_start = self.pos;
                self.scan_word();
                let end = &input[end_start..self.pos];
                if !is_cell_reference(end) {
                    return Err(FormulaError::parse(format!(
                        "invalid range '{}:{}'",
                        text, end
                    )));
                }
                reference.push(':');
                reference.push_str(end);
            }
            return Ok(Token::Reference(reference));
        }

        Err(FormulaError::parse(format!("unknown name '{}'", text)))
    }

    /// Cell or `cell:cell` after a sheet qualifier
    fn scan_cell_range(&mut self) -> FormulaResult<String> {
        let input = self.input;
        let start = self.pos;
        self.scan_word();
        let first = &input[start..self.pos];
        if !is_cell_reference(first) {
            return Err(FormulaError::parse(format!(
                "invalid cell reference '{}'",
                first
            )));
        }
        if self.peek_char() == Some(':') {
            self.advance();
            let end_start = self.pos;
            self.scan_word();
            let end = &input[end_start..self.pos];
            if !is_cell_reference(end) {
                return Err(FormulaError::parse(format!("invalid range end '{}'", end)));
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn scan_word(&mut self) {
        while self.peek_char().map_or(false, |c| {
            c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
        }) {
            self.advance();
        }
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

/// `[$]letters[$]digits`, e.g. `A1`, `$b$20`
pub fn is_cell_reference(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;

    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let letter_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == letter_start || i - letter_start > 3 {
        return false;
    }
    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let digit_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digit_start || bytes[digit_start] == b'0' {
        return false;
    }
    i == bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(s: &str) -> Vec<Token> {
        tokenize(s, &Locale::default()).unwrap()
    }

    #[test]
    fn test_references_are_single_tokens() {
        assert_eq!(
            toks("SUM(a1:B$2, Sheet2!C3, 'My sheet'!$D$4:E5)"),
            vec![
                Token::Function("SUM".into()),
                Token::LeftParen,
                Token::Reference("a1:B$2".into()),
                Token::Comma,
                Token::Reference("Sheet2!C3".into()),
                Token::Comma,
                Token::Reference("'My sheet'!$D$4:E5".into()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn test_function_vs_cell() {
        assert_eq!(toks("LOG10(1)")[0], Token::Function("LOG10".into()));
        assert_eq!(toks("LOG10")[0], Token::Reference("LOG10".into()));
        assert_eq!(toks("true")[0], Token::Boolean(true));
        assert!(tokenize("FOO", &Locale::default()).is_err());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(toks("1.50")[0], Token::Number("1.50".into()));
        assert_eq!(toks(".5")[0], Token::Number("0.5".into()));
        assert_eq!(toks("2e-3")[0], Token::Number("2e-3".into()));
        assert_eq!(toks("10%"), vec![Token::Number("10".into()), Token::Percent]);
    }

    #[test]
    fn test_locale_separators() {
        let tokens = tokenize("ROUND(1,25;1)", &Locale::de_de()).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Function("ROUND".into()),
                Token::LeftParen,
                Token::Number("1.25".into()),
                Token::Comma,
                Token::Number("1".into()),
                Token::RightParen,
            ]
        );
        assert_eq!(render(&tokens, &Locale::de_de()), "ROUND(1,25;1)");
        assert_eq!(render(&tokens, &Locale::en_us()), "ROUND(1.25,1)");
    }

    #[test]
    fn test_thousands_separator_in_numbers() {
        let tokens = tokenize("1.234,5*2", &Locale::de_de()).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Number("1234.5".into()), Token::Star, Token::Number("2".into())]
        );
        assert_eq!(render(&tokens, &Locale::en_us()), "1234.5*2");
        assert_eq!(
            tokenize("1.234.567", &Locale::de_de()).unwrap(),
            vec![Token::Number("1234567".into())]
        );
        // Not a group of three digits
        assert!(tokenize("1.23", &Locale::de_de()).is_err());
        // Same character as the argument separator
        assert_eq!(
            toks("SUM(1,234)"),
            vec![
                Token::Function("SUM".into()),
                Token::LeftParen,
                Token::Number("1".into()),
                Token::Comma,
                Token::Number("234".into()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn test_strings_and_errors() {
        assert_eq!(toks("\"a\"\"b\"")[0], Token::String("a\"b".into()));
        assert!(tokenize("\"abc", &Locale::default()).is_err());
        assert_eq!(toks("#N/A")[0], Token::Error(ErrorKind::NotAvailable));
        assert_eq!(toks("#DIV/0!")[0], Token::Error(ErrorKind::DivisionByZero));
        assert_eq!(toks("#REF")[0], Token::Reference("#REF".into()));
        assert_eq!(toks("#ref!")[0], Token::Reference("#REF".into()));
    }

    #[test]
    fn test_placeholders_only_in_canonical_text() {
        assert!(tokenize("|0|", &Locale::default()).is_err());
        assert_eq!(
            tokenize_canonical("|0|+|S1|&|N2|").unwrap(),
            vec![
                Token::ReferencePlaceholder(0),
                Token::Plus,
                Token::StringPlaceholder(1),
                Token::Ampersand,
                Token::NumberPlaceholder(2),
            ]
        );
        assert!(tokenize_canonical("|X|").is_err());
    }

    #[test]
    fn test_cell_reference_shape() {
        assert!(is_cell_reference("A1"));
        assert!(is_cell_reference("$XFD$1048576"));
        assert!(!is_cell_reference("A0"));
        assert!(!is_cell_reference("ABCD1"));
        assert!(!is_cell_reference("A1B"));
    }

    #[test]
    fn test_canonical_reference() {
        assert_eq!(canonical_reference("a1:b2"), "A1:B2");
        assert_eq!(canonical_reference("'my sheet'!$c$3"), "'my sheet'!$C$3");
    }
}
