//! Formula evaluation
//!
//! Cells are evaluated on demand, depth first, and memoized until the engine
//! invalidates them. A cell found in progress while evaluating signals a
//! cycle: every frame on the stack becomes `#CYCLE`, and the signal passes
//! through error-catching functions. Every other failure is a value.

use crate::ast::Expr;
use crate::config::EngineConfig;
use crate::dependency::CellKey;
use crate::error::FormulaError;
use crate::functions::{
    Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry, LazyArg, Vectorize,
};
use crate::inference::infer_value;
use crate::normalizer::{CompiledFormula, Dependencies};
use crate::references::{InvalidReference, RangeReference};
use crate::value::{
    CellError, EvalError, EvalResult, Evaluated, EvaluatedCell, FormattedValue, Matrix, Value,
};
use ahash::AHashMap;
use log::{trace, warn};
use sheetflow_core::{CellPosition, CellStore, ErrorKind, Zone};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

/// Engine-side view of a formula cell
#[derive(Debug)]
pub(crate) enum FormulaCell {
    Compiled {
        compiled: Arc<CompiledFormula>,
        dependencies: Dependencies,
        numbers: Vec<f64>,
        /// One entry per reference placeholder
        resolved: Vec<Result<RangeReference, InvalidReference>>,
        /// Can produce a multi-cell result
        may_spill: bool,
        /// Calls a volatile function
        volatile: bool,
    },
    /// Content starting with `=` that does not parse
    Invalid { raw: String, error: FormulaError },
}

impl FormulaCell {
    pub(crate) fn may_spill(&self) -> bool {
        matches!(self, FormulaCell::Compiled { may_spill: true, .. })
    }

    pub(crate) fn is_volatile(&self) -> bool {
        matches!(self, FormulaCell::Compiled { volatile: true, .. })
    }
}

/// Whether a tree calls a volatile function
pub(crate) fn tree_is_volatile(expr: &Expr, registry: &FunctionRegistry) -> bool {
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            tree_is_volatile(left, registry) || tree_is_volatile(right, registry)
        }
        Expr::UnaryOp { operand, .. } => tree_is_volatile(operand, registry),
        Expr::Function { name, args } => {
            registry.get(name).map_or(false, |def| def.volatile)
                || args.iter().any(|arg| tree_is_volatile(arg, registry))
        }
        _ => false,
    }
}

/// Whether a tree can evaluate to a multi-cell matrix at top level
pub(crate) fn tree_may_spill(
    expr: &Expr,
    resolved: &[Result<RangeReference, InvalidReference>],
    registry: &FunctionRegistry,
) -> bool {
    match expr {
        Expr::Reference(i) => matches!(resolved.get(*i), Some(Ok(r)) if !r.is_single_cell()),
        Expr::BinaryOp { left, right, .. } => {
            tree_may_spill(left, resolved, registry) || tree_may_spill(right, resolved, registry)
        }
        Expr::UnaryOp { operand, .. } => tree_may_spill(operand, resolved, registry),
        Expr::Function { name, args } => {
            let Some(def) = registry.get(name) else {
                return false;
            };
            // Only broadcasting positions pass a matrix through
            def.returns_matrix
                || args.iter().enumerate().any(|(i, arg)| {
                    def.arg_spec(i).map_or(false, |spec| spec.vectorize != Vectorize::Never)
                        && tree_may_spill(arg, resolved, registry)
                })
        }
        _ => false,
    }
}

#[derive(Debug, Clone)]
enum CellState {
    InProgress,
    Cycle,
    Done(Evaluated),
}

/// Memoized results and spill bookkeeping, shared across evaluations
#[derive(Debug, Default)]
pub(crate) struct EvalState {
    memo: RefCell<AHashMap<CellKey, CellState>>,
    /// Anchor -> zone its result fills
    spills: RefCell<AHashMap<CellKey, Zone>>,
    /// Filled cell -> anchor
    spilled: RefCell<AHashMap<CellKey, CellKey>>,
    /// Anchor -> zone it could not fill
    blocked: RefCell<AHashMap<CellKey, Zone>>,
    /// Nesting of pending-anchor probes
    probe_depth: Cell<usize>,
    /// Cells marked as cycles while probing
    probe_cycles: RefCell<Vec<CellKey>>,
}

impl EvalState {
    pub(crate) fn clear(&self) {
        self.memo.borrow_mut().clear();
        self.spills.borrow_mut().clear();
        self.spilled.borrow_mut().clear();
        self.blocked.borrow_mut().clear();
        self.probe_cycles.borrow_mut().clear();
    }

    fn mark_cycle(&self, key: CellKey) {
        self.memo.borrow_mut().insert(key, CellState::Cycle);
        if self.probe_depth.get() > 0 {
            self.probe_cycles.borrow_mut().push(key);
        }
    }

    /// Forget the result of one cell, and its spill if it is an anchor
    pub(crate) fn forget(&self, key: &CellKey) {
        self.memo.borrow_mut().remove(key);
        self.blocked.borrow_mut().remove(key);
        if let Some(zone) = self.spills.borrow_mut().remove(key) {
            let mut spilled = self.spilled.borrow_mut();
            for pos in zone.positions() {
                spilled.remove(&CellKey::new(key.sheet, pos));
            }
        }
    }

    pub(crate) fn is_evaluated(&self, key: &CellKey) -> bool {
        matches!(self.memo.borrow().get(key), Some(CellState::Done(_) | CellState::Cycle))
    }

    /// Anchor whose result fills `key`
    pub(crate) fn spill_anchor(&self, key: &CellKey) -> Option<CellKey> {
        self.spilled.borrow().get(key).copied()
    }

    /// Anchors that filled, or tried to fill, a zone covering `key`
    pub(crate) fn anchors_covering(&self, key: &CellKey) -> Vec<CellKey> {
        let pos = key.position();
        let covering = |map: &AHashMap<CellKey, Zone>| -> Vec<CellKey> {
            map.iter()
                .filter(|(anchor, zone)| anchor.sheet == key.sheet && zone.contains(pos))
                .map(|(anchor, _)| *anchor)
                .collect()
        };
        let mut anchors = covering(&self.spills.borrow());
        anchors.extend(covering(&self.blocked.borrow()));
        anchors
    }
}

/// One evaluation pass over a store
pub(crate) struct Evaluator<'a> {
    pub(crate) store: &'a dyn CellStore,
    pub(crate) registry: &'a FunctionRegistry,
    pub(crate) config: &'a EngineConfig,
    pub(crate) cells: &'a AHashMap<CellKey, FormulaCell>,
    pub(crate) state: &'a EvalState,
    pub(crate) custom: &'a AHashMap<String, String>,
    /// Formula cells that may spill, probed when an empty cell is read
    pub(crate) spill_candidates: &'a [CellKey],
}

/// What a formula tree is evaluated against
struct Frame<'f> {
    key: CellKey,
    dependencies: &'f Dependencies,
    numbers: &'f [f64],
    resolved: &'f [Result<RangeReference, InvalidReference>],
}

impl<'a> Evaluator<'a> {
    /// Value of a cell as the host sees it
    pub(crate) fn evaluate(&self, key: CellKey) -> EvaluatedCell {
        match self.evaluate_cell(key) {
            Ok(value) => value.into(),
            Err(EvalError::Cycle) => EvaluatedCell::Error(
                ErrorKind::CircularDependency,
                ErrorKind::CircularDependency.default_message().to_string(),
            ),
            Err(EvalError::Raised(err)) => EvaluatedCell::Error(err.kind, err.message),
        }
    }

    /// Value of a cell; `Err` only for cycles
    pub(crate) fn evaluate_cell(&self, key: CellKey) -> EvalResult<FormattedValue> {
        let memoized = self.state.memo.borrow().get(&key).cloned();
        match memoized {
            Some(CellState::InProgress) | Some(CellState::Cycle) => return Err(EvalError::Cycle),
            Some(CellState::Done(evaluated)) => return Ok(evaluated.first()),
            None => {}
        }

        match self.cells.get(&key) {
            Some(FormulaCell::Compiled {
                compiled,
                dependencies,
                numbers,
                resolved,
                ..
            }) => {
                trace!("evaluating {:?}", key);
                self.state.memo.borrow_mut().insert(key, CellState::InProgress);
                let frame = Frame {
                    key,
                    dependencies,
                    numbers,
                    resolved,
                };
                let evaluated = match self.eval_expr(compiled.ast(), &frame) {
                    Ok(evaluated) => self.place(key, evaluated),
                    Err(EvalError::Raised(err)) => Evaluated::value(Value::Error(err)),
                    Err(EvalError::Cycle) => {
                        self.state.mark_cycle(key);
                        return Err(EvalError::Cycle);
                    }
                };
                let value = evaluated.first();
                self.state
                    .memo
                    .borrow_mut()
                    .insert(key, CellState::Done(evaluated));
                Ok(value)
            }
            Some(FormulaCell::Invalid { error, .. }) => {
                let value = FormattedValue::error(error.kind(), error.to_string());
                self.state
                    .memo
                    .borrow_mut()
                    .insert(key, CellState::Done(Evaluated::Scalar(value.clone())));
                Ok(value)
            }
            None => match self.store.cell_content(key.sheet, key.position()) {
                Some(content) => {
                    let format = self.store.cell_format(key.sheet, key.position());
                    let value = infer_value(content, format, &self.config.locale);
                    self.state
                        .memo
                        .borrow_mut()
                        .insert(key, CellState::Done(Evaluated::Scalar(value.clone())));
                    Ok(value)
                }
                None => self.empty_cell(key),
            },
        }
    }

    /// An empty cell is either filled by a spill or empty
    fn empty_cell(&self, key: CellKey) -> EvalResult<FormattedValue> {
        if let Some(value) = self.spilled_value(&key) {
            return Ok(value);
        }

        // Anchors not evaluated yet may still spill here
        let pending: Vec<CellKey> = self
            .spill_candidates
            .iter()
            .filter(|anchor| {
                anchor.sheet == key.sheet
                    && anchor.col <= key.col
                    && anchor.row <= key.row
                    && **anchor != key
                    && !self.state.memo.borrow().contains_key(anchor)
            })
            .copied()
            .collect();
        if pending.is_empty() {
            return Ok(FormattedValue::empty());
        }
        for anchor in pending {
            self.probe(anchor);
        }
        Ok(self.spilled_value(&key).unwrap_or_default())
    }

    /// Evaluate a pending anchor so its spill is known
    ///
    /// Reaching a cell still in progress is not a cycle of the anchor: it
    /// leaves the anchor unspilled for now, and every cell marked as a
    /// cycle on the way is forgotten so it is evaluated again later.
    fn probe(&self, anchor: CellKey) {
        let mark = self.state.probe_cycles.borrow().len();
        self.state.probe_depth.set(self.state.probe_depth.get() + 1);
        let result = self.evaluate_cell(anchor);
        self.state.probe_depth.set(self.state.probe_depth.get() - 1);

        let marked: Vec<CellKey> = self.state.probe_cycles.borrow_mut().drain(mark..).collect();
        if result.is_err() {
            trace!("probing {:?} reached a cell in progress", anchor);
            let mut memo = self.state.memo.borrow_mut();
            for key in marked {
                if matches!(memo.get(&key), Some(CellState::Cycle)) {
                    memo.remove(&key);
                }
            }
        }
    }

    fn spilled_value(&self, key: &CellKey) -> Option<FormattedValue> {
        let anchor = self.state.spill_anchor(key)?;
        let memo = self.state.memo.borrow();
        match memo.get(&anchor)? {
            CellState::Done(evaluated) => Some(evaluated.element(
                (key.row - anchor.row) as usize,
                (key.col - anchor.col) as usize,
            )),
            _ => None,
        }
    }

    /// Spill a multi-cell result from its anchor, or fail with `#ERROR`
    fn place(&self, anchor: CellKey, evaluated: Evaluated) -> Evaluated {
        let matrix = match evaluated {
            Evaluated::Matrix(m) if m.is_single() => {
                return Evaluated::Scalar(m.get(0, 0).cloned().unwrap_or_default())
            }
            Evaluated::Matrix(m) => m,
            scalar => return scalar,
        };

        let origin = anchor.position();
        let (cols, rows) = (matrix.cols() as u32, matrix.rows() as u32);
        let (sheet_cols, sheet_rows) = self.store.sheet_dimensions(anchor.sheet).unwrap_or((0, 0));
        if origin.col + cols > sheet_cols.min(self.config.limits.max_cols)
            || origin.row + rows > sheet_rows.min(self.config.limits.max_rows)
        {
            return Evaluated::value(Value::error(
                ErrorKind::GenericEvaluationError,
                "Result couldn't be automatically expanded. Please insert more columns and rows.",
            ));
        }

        let zone = Zone::with_size(origin, cols, rows);
        let blocked = zone.positions().filter(|pos| *pos != origin).any(|pos| {
            let key = CellKey::new(anchor.sheet, pos);
            self.store.cell_content(anchor.sheet, pos).is_some()
                || self
                    .state
                    .spill_anchor(&key)
                    .map_or(false, |other| other != anchor)
        });
        if blocked {
            self.state.blocked.borrow_mut().insert(anchor, zone);
            return Evaluated::value(Value::error(
                ErrorKind::GenericEvaluationError,
                "Array result was not expanded because it would overwrite data.",
            ));
        }

        self.state.spills.borrow_mut().insert(anchor, zone);
        let mut spilled = self.state.spilled.borrow_mut();
        for pos in zone.positions().filter(|pos| *pos != origin) {
            spilled.insert(CellKey::new(anchor.sheet, pos), anchor);
        }
        let mut matrix = matrix;
        matrix.origin = None;
        Evaluated::Matrix(matrix)
    }

    fn eval_expr(&self, expr: &Expr, frame: &Frame<'_>) -> EvalResult<Evaluated> {
        match expr {
            Expr::Number(i) => frame
                .numbers
                .get(*i)
                .map(|n| Evaluated::number(*n))
                .ok_or_else(|| EvalError::bad_expression("Invalid formula")),
            Expr::String(i) => frame
                .dependencies
                .strings
                .get(*i)
                .map(|s| Evaluated::text(s.clone()))
                .ok_or_else(|| EvalError::bad_expression("Invalid formula")),
            Expr::Boolean(b) => Ok(Evaluated::boolean(*b)),
            Expr::Error(kind) => Ok(Evaluated::value(Value::error(*kind, kind.default_message()))),
            Expr::Reference(i) => match frame.resolved.get(*i) {
                Some(Ok(reference)) => self.read_reference(reference),
                _ => Ok(Evaluated::value(Value::error(
                    ErrorKind::InvalidReference,
                    "Invalid reference",
                ))),
            },
            Expr::BinaryOp { op, left, right } => {
                self.call_function(op.function_name(), &[left.as_ref(), right.as_ref()], frame)
            }
            Expr::UnaryOp { op, operand } => {
                self.call_function(op.function_name(), &[operand.as_ref()], frame)
            }
            Expr::Function { name, args } => {
                let args: Vec<&Expr> = args.iter().collect();
                self.call_function(name, &args, frame)
            }
        }
    }

    /// Values of a referenced zone, as a matrix remembering its origin
    fn read_reference(&self, reference: &RangeReference) -> EvalResult<Evaluated> {
        let zone = reference.zone;
        let sheet = reference.sheet_id;
        let (sheet_cols, sheet_rows) = self.store.sheet_dimensions(sheet).unwrap_or((0, 0));

        let mut data = Vec::with_capacity((zone.width() * zone.height()) as usize);
        for row in zone.top..=zone.bottom {
            for col in zone.left..=zone.right {
                if col >= sheet_cols || row >= sheet_rows {
                    data.push(FormattedValue::empty());
                    continue;
                }
                let key = CellKey::new(sheet, CellPosition::new(col, row));
                data.push(self.evaluate_cell(key)?);
            }
        }
        let mut matrix = Matrix::new(zone.height() as usize, zone.width() as usize, data);
        matrix.origin = Some(*reference);
        Ok(Evaluated::Matrix(matrix))
    }

    fn call_function(&self, name: &str, exprs: &[&Expr], frame: &Frame<'_>) -> EvalResult<Evaluated> {
        let Some(def) = self.registry.get(name) else {
            return Ok(Evaluated::value(Value::error(
                ErrorKind::BadExpression,
                format!("Invalid formula: unknown function {}", name),
            )));
        };
        if let Err(err) = def.check_arity(exprs.len()) {
            return raised_to_value(err);
        }

        let specs: Vec<_> = (0..exprs.len()).filter_map(|i| def.arg_spec(i)).collect();
        let items: Vec<Rc<LazyArg<'_>>> = exprs
            .iter()
            .map(|expr| {
                let expr: &Expr = expr;
                Rc::new(LazyArg::new(
                    Box::new(move || self.eval_expr(expr, frame)),
                    matches!(expr, Expr::Reference(_)),
                ))
            })
            .collect();

        // Scalar positions handed a multi-cell matrix run once per element
        let mut broadcast = vec![false; items.len()];
        for (i, spec) in specs.iter().enumerate() {
            if spec.vectorize == Vectorize::Always {
                broadcast[i] = is_multi(&items[i])?;
            }
        }
        if broadcast.iter().any(|b| *b) {
            for (i, spec) in specs.iter().enumerate() {
                if spec.vectorize == Vectorize::WithCondition {
                    broadcast[i] = is_multi(&items[i])?;
                }
            }
        }

        let ctx = FunctionContext {
            sheet: frame.key.sheet,
            position: frame.key.position(),
            store: self.store,
            config: self.config,
            custom: self.custom,
        };

        if !broadcast.iter().any(|b| *b) {
            let args = Args::new(&def.name, specs, items);
            return self.invoke(def, &args, &ctx);
        }

        let multis: Vec<Option<&Evaluated>> = items
            .iter()
            .zip(&broadcast)
            .map(|(item, b)| match (b, item.get()) {
                (true, Ok(evaluated)) => Some(evaluated),
                _ => None,
            })
            .collect();
        let rows = multis.iter().flatten().filter_map(|e| e.as_multi()).map(Matrix::rows).max().unwrap_or(1);
        let cols = multis.iter().flatten().filter_map(|e| e.as_multi()).map(Matrix::cols).max().unwrap_or(1);

        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let cell_items = items
                    .iter()
                    .zip(&multis)
                    .map(|(item, multi)| match multi {
                        Some(evaluated) => {
                            Rc::new(LazyArg::ready(Evaluated::Scalar(evaluated.element(row, col))))
                        }
                        None => Rc::clone(item),
                    })
                    .collect();
                let args = Args::new(&def.name, specs.clone(), cell_items);
                data.push(self.invoke(def, &args, &ctx)?.first());
            }
        }
        Ok(Evaluated::Matrix(Matrix::new(rows, cols, data)))
    }

    /// Run a compute callback; raised errors and panics become error values
    fn invoke(&self, def: &FunctionDef, args: &Args<'_>, ctx: &FunctionContext<'_>) -> EvalResult<Evaluated> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| def.compute(args, ctx)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("function {} panicked: {}", def.name, message);
                return Ok(Evaluated::value(Value::error(
                    ErrorKind::GenericEvaluationError,
                    format!("Function {} failed: {}", def.name, message),
                )));
            }
        };
        match result {
            Ok(evaluated) => Ok(with_format(def, args, evaluated)),
            Err(err) => raised_to_value(err),
        }
    }
}

fn raised_to_value(err: EvalError) -> EvalResult<Evaluated> {
    match err {
        EvalError::Raised(CellError { kind, message }) => {
            Ok(Evaluated::value(Value::error(kind, message)))
        }
        EvalError::Cycle => Err(EvalError::Cycle),
    }
}

fn is_multi(item: &LazyArg<'_>) -> EvalResult<bool> {
    match item.get() {
        Ok(evaluated) => Ok(evaluated.as_multi().is_some()),
        Err(EvalError::Cycle) => Err(EvalError::Cycle),
        Err(EvalError::Raised(_)) => Ok(false),
    }
}

/// Give unformatted numbers of a result the format its function declares
fn with_format(def: &FunctionDef, args: &Args<'_>, evaluated: Evaluated) -> Evaluated {
    let format = match &def.format {
        FormatRule::FirstNonEmpty => (0..args.len()).find_map(|i| args.format(i)),
        FormatRule::Argument(i) => args.format(*i),
        FormatRule::ArgumentOr(i, _) if args.has(*i) => args.format(*i),
        FormatRule::ArgumentOr(_, fallback) => args.format(*fallback),
        FormatRule::Fixed(format) => Some(format.clone()),
        FormatRule::None => None,
    };
    let Some(format) = format else {
        return evaluated;
    };
    let apply = |mut v: FormattedValue| {
        if v.format.is_none() && matches!(v.value, Value::Number(_)) {
            v.format = Some(format.clone());
        }
        v
    };
    match evaluated {
        Evaluated::Scalar(v) => Evaluated::Scalar(apply(v)),
        Evaluated::Matrix(m) => {
            let (rows, cols, origin) = (m.rows(), m.cols(), m.origin);
            let mut matrix = Matrix::new(rows, cols, m.into_values().into_iter().map(apply).collect());
            matrix.origin = origin;
            Evaluated::Matrix(matrix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use pretty_assertions::assert_eq;
    use sheetflow_core::{SheetId, Workbook};

    fn sheet(cells: &[(&str, &str)]) -> (Workbook, Engine) {
        let mut workbook = Workbook::new();
        let ws = workbook.worksheet_mut(SheetId(1)).unwrap();
        for (address, content) in cells {
            ws.set_content(address, content).unwrap();
        }
        let mut engine = Engine::new();
        engine.load(&workbook);
        (workbook, engine)
    }

    fn value(workbook: &Workbook, engine: &Engine, address: &str) -> EvaluatedCell {
        engine.evaluate(workbook, SheetId(1), CellPosition::parse(address).unwrap())
    }

    fn eval(formula: &str) -> EvaluatedCell {
        let (workbook, engine) = sheet(&[("A1", formula)]);
        value(&workbook, &engine, "A1")
    }

    fn number(n: f64) -> EvaluatedCell {
        EvaluatedCell::Number(n, None)
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("=42"), number(42.0));
        assert_eq!(eval("=\"Hello\""), EvaluatedCell::Text("Hello".into(), None));
        assert_eq!(eval("=TRUE"), EvaluatedCell::Boolean(true, None));
        assert_eq!(eval("=#N/A").error_kind(), Some(ErrorKind::NotAvailable));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2"), number(3.0));
        assert_eq!(eval("=10-3"), number(7.0));
        assert_eq!(eval("=2^10"), number(1024.0));
        assert_eq!(eval("=1+2*3"), number(7.0));
        assert_eq!(eval("=(1+2)*3"), number(9.0));
        assert_eq!(eval("=-2^2"), number(4.0));
        assert_eq!(eval("=2^3^2"), number(512.0));
    }

    #[test]
    fn test_evaluate_unary_and_percent() {
        assert_eq!(eval("=-5"), number(-5.0));
        assert_eq!(eval("=--5"), number(5.0));
        assert_eq!(eval("=50%"), number(0.5));
    }

    #[test]
    fn test_evaluate_comparison_and_concat() {
        assert_eq!(eval("=1<2"), EvaluatedCell::Boolean(true, None));
        assert_eq!(eval("=\"a\"=\"A\""), EvaluatedCell::Boolean(true, None));
        assert_eq!(eval("=\"a\"&1&TRUE"), EvaluatedCell::Text("a1TRUE".into(), None));
    }

    #[test]
    fn test_errors_are_values() {
        assert_eq!(eval("=1/0").error_kind(), Some(ErrorKind::DivisionByZero));
        assert_eq!(eval("=NOPE(1)").error_kind(), Some(ErrorKind::BadExpression));
        assert_eq!(eval("=SUM(").error_kind(), Some(ErrorKind::BadExpression));
        assert_eq!(eval("=ABS(1,2)").error_kind(), Some(ErrorKind::BadExpression));
        assert_eq!(eval("=IFERROR(1/0, 42)"), number(42.0));
    }

    #[test]
    fn test_text_operand_is_error() {
        let (wb, engine) = sheet(&[("A1", "text"), ("B1", "=A1+1"), ("C1", "=IFERROR(A1+1, 42)")]);
        assert_eq!(value(&wb, &engine, "B1").error_kind(), Some(ErrorKind::GenericEvaluationError));
        assert_eq!(value(&wb, &engine, "C1"), number(42.0));
    }

    #[test]
    fn test_lazy_branches() {
        let (wb, engine) = sheet(&[("A1", "=IF(TRUE, 1, B1)"), ("B1", "=A1")]);
        assert_eq!(value(&wb, &engine, "A1"), number(1.0));
        assert_eq!(value(&wb, &engine, "B1"), number(1.0));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        assert_eq!(eval("=A1").error_kind(), Some(ErrorKind::CircularDependency));
        assert_eq!(
            eval("=IFERROR(A1, 0)").error_kind(),
            Some(ErrorKind::CircularDependency)
        );
    }

    #[test]
    fn test_three_cell_cycle_and_dependent() {
        let (wb, engine) = sheet(&[("A1", "=B1"), ("B1", "=C1"), ("C1", "=A1+1"), ("D1", "=A1")]);
        for address in ["A1", "B1", "C1", "D1"] {
            assert_eq!(
                value(&wb, &engine, address).error_kind(),
                Some(ErrorKind::CircularDependency),
                "{address}"
            );
        }
    }

    #[test]
    fn test_format_propagation() {
        let (wb, engine) = sheet(&[("A1", "15%"), ("B1", "=A1*2"), ("C1", "=PERCENTOF(1, 4)"), ("D1", "=A1>0")]);
        assert_eq!(value(&wb, &engine, "B1"), EvaluatedCell::Number(0.3, Some("0%".into())));
        assert_eq!(value(&wb, &engine, "C1"), EvaluatedCell::Number(0.25, Some("0.00%".into())));
        assert_eq!(value(&wb, &engine, "D1"), EvaluatedCell::Boolean(true, None));
    }

    #[test]
    fn test_broadcast_shape() {
        let (wb, engine) = sheet(&[
            ("A1", "1"),
            ("A2", "0"),
            ("A3", "1"),
            ("B1", "=IF(A1:A3, \"yes\", \"no\")"),
        ]);
        assert_eq!(value(&wb, &engine, "B1"), EvaluatedCell::Text("yes".into(), None));
        assert_eq!(value(&wb, &engine, "B2"), EvaluatedCell::Text("no".into(), None));
        assert_eq!(value(&wb, &engine, "B3"), EvaluatedCell::Text("yes".into(), None));
        assert_eq!(value(&wb, &engine, "B4"), EvaluatedCell::Empty);
    }

    #[test]
    fn test_broadcast_narrow_argument_is_empty_outside() {
        let (wb, engine) = sheet(&[
            ("A1", "1"),
            ("A2", "2"),
            ("B1", "10"),
            ("C1", "=A1:A2+B1"),
            ("E1", "=A1:A2*A1:B1"),
        ]);
        assert_eq!(value(&wb, &engine, "C1"), number(11.0));
        assert_eq!(value(&wb, &engine, "C2"), number(12.0));
        // 2x1 times 1x2 fills 2x2; each side is empty outside its extent
        assert_eq!(value(&wb, &engine, "E1"), number(1.0));
        assert_eq!(value(&wb, &engine, "F1"), number(0.0));
        assert_eq!(value(&wb, &engine, "E2"), number(0.0));
        assert_eq!(value(&wb, &engine, "F2"), number(0.0));
    }

    #[test]
    fn test_spill_blocked() {
        let (wb, engine) = sheet(&[("A1", "=SEQUENCE(3)"), ("A3", "x")]);
        assert_eq!(
            value(&wb, &engine, "A1").error_kind(),
            Some(ErrorKind::GenericEvaluationError)
        );
        assert_eq!(value(&wb, &engine, "A2"), EvaluatedCell::Empty);
    }

    #[test]
    fn test_spill_read_before_anchor() {
        let (wb, engine) = sheet(&[("A1", "=SEQUENCE(2, 2)"), ("D1", "=SUM(A1:B2)")]);
        assert_eq!(value(&wb, &engine, "B2"), number(4.0));
        assert_eq!(value(&wb, &engine, "D1"), number(10.0));
    }

    #[test]
    fn test_conditional_sum_format() {
        let (wb, engine) = sheet(&[
            ("A1", "10%"),
            ("A2", "20%"),
            ("C1", "=SUMIF(A1:A2, \">0.15\")"),
            ("C2", "=SUMIF(A1:A2, \">0.15\", B1:B2)"),
            ("C3", "=AVERAGEIF(A1:A2, \">0\")"),
        ]);
        assert_eq!(value(&wb, &engine, "C1").format(), Some("0%"));
        assert_eq!(value(&wb, &engine, "C3").format(), Some("0%"));
        assert_eq!(value(&wb, &engine, "C2"), number(0.0));
    }

    #[test]
    fn test_pending_anchor_reaching_cell_in_progress() {
        let (wb, engine) = sheet(&[("A1", "=SEQUENCE(B5+1)"), ("B5", "=C6")]);
        let b5_first = (value(&wb, &engine, "B5"), value(&wb, &engine, "A1"));
        engine.invalidate_all();
        let a1 = value(&wb, &engine, "A1");
        let b5 = value(&wb, &engine, "B5");

        assert_eq!(b5_first, (EvaluatedCell::Empty, number(1.0)));
        assert_eq!((b5, a1), b5_first);
    }

    #[test]
    fn test_results_do_not_depend_on_evaluation_order() {
        let (wb, mut engine) = sheet(&[
            ("B1", "2"),
            ("A1", "=SEQUENCE(B1+1)"),
            ("C1", "=SUM(A1:A3)"),
            ("C2", "=A2*10"),
            ("D1", "=C2+A3"),
            ("B5", "=C6"),
            ("E1", "=SEQUENCE(1, B5+2)"),
            ("G2", "=F1&\"!\""),
            ("H1", "=H1+1"),
            ("H2", "=H1"),
        ]);
        let addresses = [
            "A1", "A2", "A3", "B1", "B5", "C1", "C2", "C6", "D1", "E1", "F1", "G2", "H1", "H2",
        ];
        engine.recalculate(&wb);
        let expected: Vec<_> = addresses.iter().map(|a| value(&wb, &engine, a)).collect();
        assert_eq!(expected[2], number(3.0));
        assert_eq!(expected[10], number(2.0));

        let mut orders: Vec<Vec<&str>> = (0..addresses.len())
            .map(|shift| {
                let mut order = addresses.to_vec();
                order.rotate_left(shift);
                order
            })
            .collect();
        orders.extend(orders.clone().into_iter().map(|mut o| {
            o.reverse();
            o
        }));
        for order in orders {
            engine.load(&wb);
            for address in &order {
                value(&wb, &engine, address);
            }
            let got: Vec<_> = addresses.iter().map(|a| value(&wb, &engine, a)).collect();
            assert_eq!(got, expected, "order {:?}", order);
        }
    }
}
