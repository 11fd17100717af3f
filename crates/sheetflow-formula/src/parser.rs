//! Formula parser
//!
//! A recursive descent parser over canonical formula text with proper
//! operator precedence.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::tokenizer::{tokenize_canonical, Token};

/// Parse canonical formula text (`=SUM(|0|,|N0|)`) into an AST
pub fn parse_formula(formula: &str) -> FormulaResult<Expr> {
    let body = formula
        .trim()
        .strip_prefix('=')
        .ok_or_else(|| FormulaError::parse("Formula must start with '='"))?;
    let tokens = tokenize_canonical(body)?;
    parse_tokens(&tokens)
}

/// Parse canonical tokens into an AST
pub fn parse_tokens(tokens: &[Token]) -> FormulaResult<Expr> {
    let mut parser = FormulaParser { tokens, pos: 0 };
    if tokens.is_empty() {
        return Err(FormulaError::parse("empty formula"));
    }
    let expr = parser.parse_expression()?;

    if let Some(token) = parser.current_token() {
        return Err(FormulaError::parse(match token {
            Token::RightParen => "unbalanced parentheses".to_string(),
            other => format!("unexpected token {:?} after expression", other),
        }));
    }

    Ok(expr)
}

struct FormulaParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> FormulaParser<'a> {
    fn current_token(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        match self.current_token() {
            Some(token) if token == expected => {
                self.consume();
                Ok(())
            }
            Some(token) => Err(FormulaError::parse(format!(
                "expected {:?}, got {:?}",
                expected, token
            ))),
            None if *expected == Token::RightParen => {
                Err(FormulaError::parse("unbalanced parentheses"))
            }
            None => Err(FormulaError::parse(format!(
                "expected {:?}, got end of formula",
                expected
            ))),
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^
    // 6. Unary: -, +
    // 7. Postfix: %
    // 8. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current_token() {
                Some(Token::Equal) => BinaryOperator::Equal,
                Some(Token::NotEqual) => BinaryOperator::NotEqual,
                Some(Token::LessThan) => BinaryOperator::LessThan,
                Some(Token::LessEqual) => BinaryOperator::LessEqual,
                Some(Token::GreaterThan) => BinaryOperator::GreaterThan,
                Some(Token::GreaterEqual) => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume();
            let right = self.parse_concatenation()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_additive()?;

        while matches!(self.current_token(), Some(Token::Ampersand)) {
            self.consume();
            let right = self.parse_additive()?;
            left = binary(BinaryOperator::Concat, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.current_token() {
                Some(Token::Star) => BinaryOperator::Multiply,
                Some(Token::Slash) => BinaryOperator::Divide,
                _ => break,
            };

            self.consume();
            let right = self.parse_exponent()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> FormulaResult<Expr> {
        let left = self.parse_unary()?;

        if matches!(self.current_token(), Some(Token::Caret)) {
            self.consume();
            let right = self.parse_exponent()?; // Right associative
            return Ok(binary(BinaryOperator::Power, left, right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.current_token() {
            Some(Token::Minus) => Some(UnaryOperator::Negate),
            Some(Token::Plus) => Some(UnaryOperator::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }

        let mut expr = self.parse_primary()?;

        while matches!(self.current_token(), Some(Token::Percent)) {
            self.consume();
            expr = Expr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let Some(token) = self.consume() else {
            return Err(FormulaError::parse("unexpected end of formula"));
        };

        match token {
            Token::NumberPlaceholder(i) => Ok(Expr::Number(*i)),
            Token::StringPlaceholder(i) => Ok(Expr::String(*i)),
            Token::ReferencePlaceholder(i) => Ok(Expr::Reference(*i)),
            Token::Boolean(b) => Ok(Expr::Boolean(*b)),
            Token::Error(kind) => Ok(Expr::Error(*kind)),

            Token::LeftParen => {
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::Function(name) => self.parse_function_call(name),

            Token::Number(_) | Token::String(_) | Token::Reference(_) => Err(
                FormulaError::parse("literal in canonical text; normalize the formula first"),
            ),

            Token::RightParen => Err(FormulaError::parse("unbalanced parentheses")),

            other => Err(FormulaError::parse(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_function_call(&mut self, name: &str) -> FormulaResult<Expr> {
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();

        if !matches!(self.current_token(), Some(Token::RightParen)) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token(), Some(Token::Comma)) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        Ok(Expr::Function {
            name: name.to_ascii_uppercase(),
            args,
        })
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::ErrorKind;

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_formula("=|N0|").unwrap(), Expr::Number(0));
        assert_eq!(parse_formula("=|S2|").unwrap(), Expr::String(2));
        assert_eq!(parse_formula("=TRUE").unwrap(), Expr::Boolean(true));
        assert_eq!(
            parse_formula("=#N/A").unwrap(),
            Expr::Error(ErrorKind::NotAvailable)
        );
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // Should parse as 1+(2*3)
        let ast = parse_formula("=|N0|+|N1|*|N2|").unwrap();
        if let Expr::BinaryOp { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Add);
            assert_eq!(*left, Expr::Number(0));
            assert!(matches!(
                *right,
                Expr::BinaryOp {
                    op: BinaryOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let ast = parse_formula("=|N0|^|N1|^|N2|").unwrap();
        assert_eq!(
            ast,
            binary(
                BinaryOperator::Power,
                Expr::Number(0),
                binary(BinaryOperator::Power, Expr::Number(1), Expr::Number(2))
            )
        );
    }

    #[test]
    fn test_comparison_binds_loosest() {
        let ast = parse_formula("=|0|&|S0|=|S1|").unwrap();
        assert!(matches!(
            ast,
            Expr::BinaryOp {
                op: BinaryOperator::Equal,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_unary_and_percent() {
        let ast = parse_formula("=-|N0|%").unwrap();
        assert_eq!(
            ast,
            Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(Expr::UnaryOp {
                    op: UnaryOperator::Percent,
                    operand: Box::new(Expr::Number(0)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_function() {
        let ast = parse_formula("=if(|0|>|N0|,sum(|1|),|N1|)").unwrap();
        if let Expr::Function { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
            assert!(matches!(&args[1], Expr::Function { name, .. } if name == "SUM"));
        } else {
            panic!("Expected Function");
        }

        let ast = parse_formula("=PI()").unwrap();
        assert_eq!(
            ast,
            Expr::Function {
                name: "PI".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("|N0|").is_err());
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=(|N0|").is_err());
        assert!(parse_formula("=|N0|)").is_err());
        assert!(parse_formula("=|N0|+*|N1|").is_err());
        assert!(parse_formula("=SUM(|0|,)").is_err());
        assert!(parse_formula("=1+2").is_err());
    }
}
