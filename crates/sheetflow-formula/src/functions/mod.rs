//! Function registry and the calling convention of built-in and custom
//! functions
//!
//! Every function, operators included, is a [`FunctionDef`]: argument
//! metadata plus a compute callback. The evaluator checks arity, decides
//! which arguments broadcast over matrices, and hands the callback lazily
//! evaluated [`Args`].

pub mod criteria;
pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod operators;
pub mod statistical;
pub mod text;

use crate::config::{EngineConfig, Locale};
use crate::error::RegistryError;
use crate::references::RangeReference;
use crate::value::{EvalError, EvalResult, Evaluated, FormattedValue, Matrix, Value};
use ahash::AHashMap;
use lazy_regex::regex_is_match;
use once_cell::unsync::OnceCell;
use sheetflow_core::{CellPosition, CellStore, SheetId};
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Compute callback of a function
pub type ComputeFn =
    Arc<dyn Fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated> + Send + Sync>;

/// Kinds of value an argument is documented to take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Any,
    Number,
    Text,
    Boolean,
    Range,
    Reference,
}

/// Whether an argument position broadcasts over a multi-cell matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vectorize {
    /// The argument is passed whole
    Never,
    /// The function runs once per element of the argument
    Always,
    /// Broadcasts only when an `Always` position broadcasts (branches of
    /// conditionals); passed whole and lazily otherwise
    WithCondition,
}

/// Declaration of one argument position
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub description: String,
    pub accepted_types: Vec<ArgType>,
    /// Must be written as a reference
    pub is_range: bool,
    /// Receives matrices whole
    pub accept_matrix: bool,
    /// A scalar here is a `#BAD_EXPR`
    pub accept_matrix_only: bool,
    pub optional: bool,
    /// Trailing repeating positions may be given any number of times
    pub repeating: bool,
    /// Error values are handed to the function instead of being raised
    pub accept_errors: bool,
    pub vectorize: Vectorize,
}

impl ArgSpec {
    /// A scalar argument, broadcast over matrices
    pub fn new(name: impl Into<String>, accepted_types: &[ArgType]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            accepted_types: accepted_types.to_vec(),
            is_range: false,
            accept_matrix: false,
            accept_matrix_only: false,
            optional: false,
            repeating: false,
            accept_errors: false,
            vectorize: Vectorize::Always,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, &[ArgType::Number])
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, &[ArgType::Text])
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, &[ArgType::Any])
    }

    /// Takes a matrix or a scalar, whole
    pub fn range(name: impl Into<String>) -> Self {
        Self::new(name, &[ArgType::Any, ArgType::Range]).accept_matrix()
    }

    /// Takes a matrix only, whole
    pub fn matrix(name: impl Into<String>) -> Self {
        let mut spec = Self::new(name, &[ArgType::Range]).accept_matrix();
        spec.accept_matrix_only = true;
        spec
    }

    /// Takes a reference only, like `ROW(A1)`
    pub fn reference(name: impl Into<String>) -> Self {
        let mut spec = Self::matrix(name);
        spec.accepted_types = vec![ArgType::Reference];
        spec.is_range = true;
        spec
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn accept_matrix(mut self) -> Self {
        self.accept_matrix = true;
        self.vectorize = Vectorize::Never;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeating = true;
        self
    }

    pub fn accept_errors(mut self) -> Self {
        self.accept_errors = true;
        self
    }

    pub fn vectorize(mut self, vectorize: Vectorize) -> Self {
        self.vectorize = vectorize;
        self
    }
}

/// Where a numeric result takes its display format from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatRule {
    /// First argument that carries a format
    FirstNonEmpty,
    /// A given argument position
    Argument(usize),
    /// A given argument position, or the second one when it is left out
    ArgumentOr(usize, usize),
    /// Always this format
    Fixed(String),
    /// No format
    None,
}

/// A named function with its argument declarations
#[derive(Clone)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub format: FormatRule,
    /// Result changes without any input changing (RAND, TODAY)
    pub volatile: bool,
    /// May produce a multi-cell result from scalar arguments
    pub returns_matrix: bool,
    compute: ComputeFn,
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("format", &self.format)
            .field("volatile", &self.volatile)
            .finish()
    }
}

impl FunctionDef {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Args<'_>, &FunctionContext<'_>) -> EvalResult<Evaluated> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
            format: FormatRule::FirstNonEmpty,
            volatile: false,
            returns_matrix: false,
            compute: Arc::new(compute),
        }
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    pub fn format(mut self, rule: FormatRule) -> Self {
        self.format = rule;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn returns_matrix(mut self) -> Self {
        self.returns_matrix = true;
        self
    }

    fn first_repeating(&self) -> Option<usize> {
        self.args.iter().position(|a| a.repeating)
    }

    /// Declaration governing argument `i` of a call
    pub fn arg_spec(&self, i: usize) -> Option<&ArgSpec> {
        if let Some(spec) = self.args.get(i) {
            return Some(spec);
        }
        let first = self.first_repeating()?;
        let group = self.args.len() - first;
        self.args.get(first + (i - first) % group)
    }

    pub fn min_args(&self) -> usize {
        self.args.iter().filter(|a| !a.optional).count()
    }

    pub fn max_args(&self) -> Option<usize> {
        match self.first_repeating() {
            Some(_) => None,
            None => Some(self.args.len()),
        }
    }

    /// Check the number of arguments of a call
    pub fn check_arity(&self, count: usize) -> EvalResult<()> {
        let min = self.min_args();
        if count < min {
            return Err(EvalError::bad_expression(format!(
                "Invalid number of arguments for the {} function. Expected {} minimum, but got {} instead.",
                self.name, min, count
            )));
        }
        if let Some(max) = self.max_args() {
            if count > max {
                return Err(EvalError::bad_expression(format!(
                    "Invalid number of arguments for the {} function. Expected {} maximum, but got {} instead.",
                    self.name, max, count
                )));
            }
        }
        if let Some(first) = self.first_repeating() {
            let group = self.args.len() - first;
            let all_required = self.args[first..].iter().all(|a| !a.optional);
            if group > 1 && all_required && count > first && (count - first) % group != 0 {
                return Err(EvalError::bad_expression(format!(
                    "Invalid number of arguments for the {} function. Expected arguments in groups of {}.",
                    self.name, group
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn compute(&self, args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
        (self.compute)(args, ctx)
    }
}

/// Whether `name` may be registered
///
/// ```
/// use sheetflow_formula::functions::is_valid_function_name;
///
/// assert!(is_valid_function_name("TEST_FUNCTION"));
/// assert!(is_valid_function_name("STDEV.S"));
/// assert!(!is_valid_function_name("TEST*FUNCTION"));
/// ```
pub fn is_valid_function_name(name: &str) -> bool {
    regex_is_match!(r"^[A-Za-z_][A-Za-z0-9_.]*$", name)
}

/// Function registry, owned by one engine
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        operators::register(&mut registry);
        math::register(&mut registry);
        logical::register(&mut registry);
        info::register(&mut registry);
        text::register(&mut registry);
        statistical::register(&mut registry);
        lookup::register(&mut registry);
        date::register(&mut registry);

        registry
    }

    /// A registry without any function
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register a function
    ///
    /// Fails on a malformed name, or when the name is taken and
    /// `overwrite` is false.
    pub fn register(&mut self, mut def: FunctionDef, overwrite: bool) -> Result<(), RegistryError> {
        if !is_valid_function_name(&def.name) {
            return Err(RegistryError::InvalidName(def.name));
        }
        let key = def.name.to_ascii_uppercase();
        if !overwrite && self.functions.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        def.name = key.clone();
        self.functions.insert(key, def);
        Ok(())
    }

    /// Remove a function
    pub fn remove(&mut self, name: &str) -> Result<FunctionDef, RegistryError> {
        self.functions
            .remove(&name.to_ascii_uppercase())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Names of all functions, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub(crate) fn add(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_ascii_uppercase(), def);
    }
}

/// Deferred evaluation of one argument
pub(crate) type Thunk<'a> = Box<dyn Fn() -> EvalResult<Evaluated> + 'a>;

/// An argument evaluated at most once, on first read
pub(crate) struct LazyArg<'a> {
    cell: OnceCell<EvalResult<Evaluated>>,
    thunk: Option<Thunk<'a>>,
    is_reference: bool,
}

impl<'a> LazyArg<'a> {
    pub(crate) fn new(thunk: Thunk<'a>, is_reference: bool) -> Self {
        Self {
            cell: OnceCell::new(),
            thunk: Some(thunk),
            is_reference,
        }
    }

    pub(crate) fn ready(value: Evaluated) -> Self {
        Self {
            cell: OnceCell::with_value(Ok(value)),
            thunk: None,
            is_reference: false,
        }
    }

    pub(crate) fn get(&self) -> &EvalResult<Evaluated> {
        self.cell.get_or_init(|| match &self.thunk {
            Some(thunk) => thunk(),
            None => Ok(Evaluated::Scalar(FormattedValue::empty())),
        })
    }

    /// The value if it was already read
    pub(crate) fn peek(&self) -> Option<&EvalResult<Evaluated>> {
        self.cell.get()
    }
}

/// Arguments of one function call
pub struct Args<'a> {
    function: &'a str,
    specs: Vec<&'a ArgSpec>,
    items: Vec<Rc<LazyArg<'a>>>,
}

impl<'a> Args<'a> {
    pub(crate) fn new(function: &'a str, specs: Vec<&'a ArgSpec>, items: Vec<Rc<LazyArg<'a>>>) -> Self {
        Self {
            function,
            specs,
            items,
        }
    }

    /// Name of the called function
    pub fn function(&self) -> &str {
        self.function
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether argument `i` was given
    pub fn has(&self, i: usize) -> bool {
        i < self.items.len()
    }

    fn spec_name(&self, i: usize) -> &str {
        self.specs.get(i).map_or("?", |s| s.name.as_str())
    }

    fn missing(&self, i: usize) -> EvalError {
        EvalError::bad_expression(format!(
            "Missing argument {} of the {} function",
            i + 1,
            self.function
        ))
    }

    /// Argument `i` as evaluated, matrices included, errors not raised
    pub fn evaluated(&self, i: usize) -> EvalResult<&Evaluated> {
        let item = self.items.get(i).ok_or_else(|| self.missing(i))?;
        match item.get() {
            Ok(evaluated) => Ok(evaluated),
            Err(err) => Err(err.clone()),
        }
    }

    /// Argument `i` as a single value
    ///
    /// Error values are raised unless the position accepts errors; a
    /// multi-cell matrix is a `#BAD_EXPR`.
    pub fn value(&self, i: usize) -> EvalResult<FormattedValue> {
        let value = match self.evaluated(i)? {
            Evaluated::Scalar(v) => v.clone(),
            Evaluated::Matrix(m) if m.is_single() => m.get(0, 0).cloned().unwrap_or_default(),
            Evaluated::Matrix(_) => {
                return Err(EvalError::bad_expression(format!(
                    "Function {} expects a single value for the parameter '{}', but got a range",
                    self.function,
                    self.spec_name(i)
                )))
            }
        };
        let accept_errors = self.specs.get(i).map_or(false, |s| s.accept_errors);
        match &value.value {
            Value::Error(err) if !accept_errors => Err(EvalError::Raised(err.clone())),
            _ => Ok(value),
        }
    }

    pub fn number(&self, i: usize) -> EvalResult<f64> {
        self.value(i)?.value.to_number()
    }

    /// Argument `i` as a number, `default` when not given
    pub fn number_or(&self, i: usize, default: f64) -> EvalResult<f64> {
        if self.has(i) {
            self.number(i)
        } else {
            Ok(default)
        }
    }

    pub fn text(&self, i: usize) -> EvalResult<String> {
        self.value(i)?.value.to_text()
    }

    pub fn boolean(&self, i: usize) -> EvalResult<bool> {
        self.value(i)?.value.to_bool()
    }

    pub fn boolean_or(&self, i: usize, default: bool) -> EvalResult<bool> {
        if self.has(i) {
            self.boolean(i)
        } else {
            Ok(default)
        }
    }

    /// Argument `i` as a matrix; a scalar becomes a 1x1 matrix unless the
    /// position only accepts matrices
    pub fn matrix(&self, i: usize) -> EvalResult<Cow<'_, Matrix>> {
        let spec = self.specs.get(i);
        if spec.map_or(false, |s| s.is_range) && !self.is_reference(i) {
            return Err(EvalError::bad_expression(format!(
                "Function {} expects the parameter '{}' to be a reference to a cell or range",
                self.function,
                self.spec_name(i)
            )));
        }
        match self.evaluated(i)? {
            Evaluated::Matrix(m) => Ok(Cow::Borrowed(m)),
            Evaluated::Scalar(_) if spec.map_or(false, |s| s.accept_matrix_only) => {
                Err(EvalError::bad_expression(format!(
                    "Function {} expects the parameter '{}' to be a range, not a single value",
                    self.function,
                    self.spec_name(i)
                )))
            }
            Evaluated::Scalar(v) => Ok(Cow::Owned(Matrix::scalar(v.clone()))),
        }
    }

    /// Whether argument `i` is written as a reference
    pub fn is_reference(&self, i: usize) -> bool {
        self.items.get(i).map_or(false, |item| item.is_reference)
    }

    /// Where argument `i` was read from, when it is a reference
    pub fn origin(&self, i: usize) -> EvalResult<Option<RangeReference>> {
        match self.evaluated(i)? {
            Evaluated::Matrix(m) => Ok(m.origin),
            Evaluated::Scalar(_) => Ok(None),
        }
    }

    /// Format of argument `i`, without forcing its evaluation
    pub fn format(&self, i: usize) -> Option<String> {
        match self.items.get(i)?.peek()? {
            Ok(evaluated) => evaluated.format().map(str::to_string),
            Err(_) => None,
        }
    }
}

/// Read-only view of the surroundings of a call
pub struct FunctionContext<'a> {
    pub(crate) sheet: SheetId,
    pub(crate) position: CellPosition,
    pub(crate) store: &'a dyn CellStore,
    pub(crate) config: &'a EngineConfig,
    pub(crate) custom: &'a AHashMap<String, String>,
}

impl<'a> FunctionContext<'a> {
    /// Sheet of the cell being evaluated
    pub fn sheet(&self) -> SheetId {
        self.sheet
    }

    /// Position of the cell being evaluated
    pub fn position(&self) -> CellPosition {
        self.position
    }

    pub fn store(&self) -> &dyn CellStore {
        self.store
    }

    pub fn locale(&self) -> &Locale {
        &self.config.locale
    }

    pub fn sheet_name(&self) -> Option<&str> {
        self.store.sheet_name(self.sheet)
    }

    /// Value supplied by the host
    pub fn custom_value(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }
}

// === Helpers shared by function bodies ===

/// Feed every number an aggregate sees to `f`
///
/// Scalar arguments are coerced (text must read as a number). Inside
/// ranges only numbers count; an error cell is raised.
pub(crate) fn for_each_number(
    args: &Args<'_>,
    from: usize,
    mut f: impl FnMut(f64),
) -> EvalResult<()> {
    for i in from..args.len() {
        numbers_of(args, i, &mut f)?;
    }
    Ok(())
}

/// Numbers of argument `i` alone, read like [`for_each_number`]
pub(crate) fn numbers_of(args: &Args<'_>, i: usize, mut f: impl FnMut(f64)) -> EvalResult<()> {
    match args.evaluated(i)? {
        Evaluated::Scalar(v) => match &v.value {
            Value::Empty => {}
            other => f(other.to_number()?),
        },
        Evaluated::Matrix(m) => {
            for v in m.iter() {
                match &v.value {
                    Value::Number(n) => f(*n),
                    Value::Error(err) => return Err(EvalError::Raised(err.clone())),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Every number an aggregate sees, in order
pub(crate) fn collect_numbers(args: &Args<'_>, from: usize) -> EvalResult<Vec<f64>> {
    let mut numbers = Vec::new();
    for_each_number(args, from, |n| numbers.push(n))?;
    Ok(numbers)
}

/// Fail with `#ERROR` unless the number is finite
pub(crate) fn finite(n: f64) -> EvalResult<Evaluated> {
    if n.is_finite() {
        Ok(Evaluated::number(n))
    } else {
        Err(EvalError::generic("The result is not a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use pretty_assertions::assert_eq;

    fn noop() -> FunctionDef {
        FunctionDef::new("TEST_FUNCTION", "test", |_, _| Ok(Evaluated::number(1.0)))
    }

    #[test]
    fn test_register_validates_name() {
        let mut registry = FunctionRegistry::empty();
        let mut bad = noop();
        bad.name = "TEST*FUNCTION".into();
        assert_eq!(
            registry.register(bad, false),
            Err(RegistryError::InvalidName("TEST*FUNCTION".into()))
        );
        assert!(registry.register(noop(), false).is_ok());
        assert!(registry.contains("test_function"));

        for name in ["", "1ABC", "A B", "A-B", "A(B"] {
            let mut def = noop();
            def.name = name.into();
            assert!(registry.register(def, false).is_err(), "{name}");
        }
    }

    #[test]
    fn test_register_overwrite() {
        let mut registry = FunctionRegistry::empty();
        registry.register(noop(), false).unwrap();
        assert_eq!(
            registry.register(noop(), false),
            Err(RegistryError::AlreadyRegistered("TEST_FUNCTION".into()))
        );
        assert!(registry.register(noop(), true).is_ok());

        assert!(registry.remove("Test_Function").is_ok());
        assert!(matches!(
            registry.remove("TEST_FUNCTION"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_builtins_present() {
        let registry = FunctionRegistry::new();
        for name in ["SUM", "IF", "IFERROR", "VLOOKUP", "ADD", "UNARY.PERCENT", "PERCENTOF"] {
            assert!(registry.contains(name), "{name}");
        }
    }

    #[test]
    fn test_arity_with_repeating_groups() {
        let def = FunctionDef::new("PAIRS", "", |_, _| Ok(Evaluated::number(0.0)))
            .arg(ArgSpec::any("condition").repeating())
            .arg(ArgSpec::any("value").repeating());
        assert!(def.check_arity(2).is_ok());
        assert!(def.check_arity(4).is_ok());
        assert!(def.check_arity(3).is_err());
        assert!(def.check_arity(1).is_err());
        assert_eq!(def.arg_spec(5).map(|s| s.name.as_str()), Some("value"));

        let sum = FunctionDef::new("S", "", |_, _| Ok(Evaluated::number(0.0)))
            .arg(ArgSpec::number("value1"))
            .arg(ArgSpec::number("value2").optional().repeating());
        assert!(sum.check_arity(1).is_ok());
        assert!(sum.check_arity(7).is_ok());
        assert!(sum.check_arity(0).is_err());
        assert_eq!(sum.arg_spec(6).map(|s| s.name.as_str()), Some("value2"));
    }

    #[test]
    fn test_arity_fixed() {
        let def = FunctionDef::new("ROUNDISH", "", |_, _| Ok(Evaluated::number(0.0)))
            .arg(ArgSpec::number("value"))
            .arg(ArgSpec::number("places").optional());
        assert_eq!((def.min_args(), def.max_args()), (1, Some(2)));
        assert!(def.check_arity(3).is_err());
    }

    #[test]
    fn test_default_vectorization() {
        assert_eq!(ArgSpec::number("x").vectorize, Vectorize::Always);
        assert_eq!(ArgSpec::range("r").vectorize, Vectorize::Never);
        let r = ArgSpec::reference("r");
        assert!(r.is_range && r.accept_matrix_only);
    }

    #[test]
    fn test_lazy_arg_evaluates_once() {
        use std::cell::Cell;
        let calls = Cell::new(0);
        let arg = LazyArg::new(
            Box::new(|| {
                calls.set(calls.get() + 1);
                Ok(Evaluated::number(2.0))
            }),
            false,
        );
        assert!(arg.peek().is_none());
        let spec = ArgSpec::number("x");
        let args = Args::new("T", vec![&spec], vec![Rc::new(arg)]);
        assert_eq!(args.number(0), Ok(2.0));
        assert_eq!(args.number(0), Ok(2.0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_errors_raised_unless_accepted() {
        let err = Evaluated::value(Value::error(sheetflow_core::ErrorKind::NotAvailable, "x"));
        let plain = ArgSpec::any("x");
        let catching = ArgSpec::any("x").accept_errors();
        let args = Args::new(
            "T",
            vec![&plain, &catching],
            vec![Rc::new(LazyArg::ready(err.clone())), Rc::new(LazyArg::ready(err))],
        );
        assert!(args.value(0).is_err());
        assert!(args.value(1).unwrap().value.is_error());
    }

    #[test]
    fn test_matrix_only_rejects_scalar() {
        let spec = ArgSpec::matrix("range");
        let args = Args::new("T", vec![&spec], vec![Rc::new(LazyArg::ready(Evaluated::number(1.0)))]);
        assert!(matches!(
            args.matrix(0),
            Err(EvalError::Raised(e)) if e.kind == sheetflow_core::ErrorKind::BadExpression
        ));
    }
}
