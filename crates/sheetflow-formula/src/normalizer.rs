//! Formula normalization
//!
//! Literal references, strings and numbers are lifted out of a formula into
//! ordered dependency lists and replaced by `|i|`, `|Si|` and `|Ni|`
//! placeholders. Formulas differing only in those literals share one
//! canonical text, and therefore one parsed tree.

use crate::ast::Expr;
use crate::config::Locale;
use crate::error::{FormulaError, FormulaResult};
use crate::parser::parse_tokens;
use crate::tokenizer::{canonical_reference, render, tokenize, tokenize_canonical, Token};
use ahash::AHashMap;
use std::sync::Arc;

/// Literals lifted out of a formula, each class with its own index space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub references: Vec<String>,
    pub strings: Vec<String>,
    pub numbers: Vec<String>,
}

/// Canonical text plus the literals it stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFormula {
    /// Canonical text, starting with `=`
    pub text: String,
    pub dependencies: Dependencies,
}

/// Normalize user formula text (starting with `=`)
///
/// ```
/// use sheetflow_formula::{normalize, Locale};
///
/// let n = normalize("=SUM(a1, A1, \"x\", 2.5)", &Locale::default()).unwrap();
/// assert_eq!(n.text, "=SUM(|0|,|0|,|S0|,|N0|)");
/// assert_eq!(n.dependencies.references, vec!["A1"]);
/// ```
pub fn normalize(formula: &str, locale: &Locale) -> FormulaResult<NormalizedFormula> {
    let body = formula
        .trim_start()
        .strip_prefix('=')
        .ok_or_else(|| FormulaError::parse("Formula must start with '='"))?;

    let mut dependencies = Dependencies::default();
    let tokens = tokenize(body, locale)?
        .into_iter()
        .map(|token| match token {
            Token::Reference(text) => {
                let text = canonical_reference(&text);
                let index = match dependencies.references.iter().position(|r| *r == text) {
                    Some(index) => index,
                    None => {
                        dependencies.references.push(text);
                        dependencies.references.len() - 1
                    }
                };
                Token::ReferencePlaceholder(index)
            }
            Token::String(s) => {
                dependencies.strings.push(s);
                Token::StringPlaceholder(dependencies.strings.len() - 1)
            }
            Token::Number(n) => {
                dependencies.numbers.push(n);
                Token::NumberPlaceholder(dependencies.numbers.len() - 1)
            }
            Token::Function(name) => Token::Function(name.to_ascii_uppercase()),
            other => other,
        })
        .collect::<Vec<_>>();

    Ok(NormalizedFormula {
        text: format!("={}", render(&tokens, &Locale::en_us())),
        dependencies,
    })
}

/// Substitute dependencies back into canonical text, canonical separators
pub fn denormalize(text: &str, dependencies: &Dependencies) -> FormulaResult<String> {
    denormalize_with(text, dependencies, &Locale::en_us())
}

/// Substitute dependencies back into canonical text
///
/// Placeholders are replaced in a single pass over the tokens, so a
/// substituted string that looks like a placeholder is never expanded again.
pub fn denormalize_with(
    text: &str,
    dependencies: &Dependencies,
    locale: &Locale,
) -> FormulaResult<String> {
    let body = text
        .strip_prefix('=')
        .ok_or_else(|| FormulaError::parse("Formula must start with '='"))?;

    let missing = |kind: &str, i: usize| FormulaError::parse(format!("no {} for placeholder {}", kind, i));
    let tokens = tokenize_canonical(body)?
        .into_iter()
        .map(|token| match token {
            Token::ReferencePlaceholder(i) => dependencies
                .references
                .get(i)
                .map(|r| Token::Reference(r.clone()))
                .ok_or_else(|| missing("reference", i)),
            Token::StringPlaceholder(i) => dependencies
                .strings
                .get(i)
                .map(|s| Token::String(s.clone()))
                .ok_or_else(|| missing("string", i)),
            Token::NumberPlaceholder(i) => dependencies
                .numbers
                .get(i)
                .map(|n| Token::Number(n.clone()))
                .ok_or_else(|| missing("number", i)),
            other => Ok(other),
        })
        .collect::<FormulaResult<Vec<_>>>()?;

    Ok(format!("={}", render(&tokens, locale)))
}

/// A parsed canonical formula, shared by every cell with the same shape
#[derive(Debug)]
pub struct CompiledFormula {
    text: String,
    ast: Expr,
    reference_count: usize,
}

impl CompiledFormula {
    /// Parse canonical text
    pub fn compile(text: &str) -> FormulaResult<Self> {
        let body = text
            .strip_prefix('=')
            .ok_or_else(|| FormulaError::parse("Formula must start with '='"))?;
        let tokens = tokenize_canonical(body)?;
        let ast = parse_tokens(&tokens)?;
        let mut reference_count = 0;
        ast.for_each_reference(&mut |i| reference_count = reference_count.max(i + 1));
        Ok(Self {
            text: text.to_string(),
            ast,
            reference_count,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Number of reference slots the tree reads
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }
}

/// Compiled formulas keyed by canonical text
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: AHashMap<String, Arc<CompiledFormula>>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled form of a canonical text, parsed on first use
    pub fn get_or_compile(&mut self, text: &str) -> FormulaResult<Arc<CompiledFormula>> {
        if let Some(compiled) = self.entries.get(text) {
            return Ok(Arc::clone(compiled));
        }
        log::debug!("compiling {}", text);
        let compiled = Arc::new(CompiledFormula::compile(text)?);
        self.entries.insert(text.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
