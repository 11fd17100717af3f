//! Formula engine
//!
//! Owns everything derived from cell contents: compiled formulas, resolved
//! references, the dependency graph and memoized results. The store is
//! passed in on every call and never written to; after an edit the host
//! tells the engine which cell changed.
//!
//! # Example
//!
//! ```rust
//! use sheetflow_core::{CellPosition, Workbook};
//! use sheetflow_formula::{Engine, EvaluatedCell};
//!
//! let mut workbook = Workbook::new();
//! let id = workbook.first_sheet().unwrap();
//! let sheet = workbook.worksheet_mut(id).unwrap();
//! sheet.set_content("A1", "=B1*2").unwrap();
//! sheet.set_content("B1", "21").unwrap();
//!
//! let mut engine = Engine::new();
//! engine.load(&workbook);
//! assert_eq!(
//!     engine.evaluate(&workbook, id, CellPosition::new(0, 0)),
//!     EvaluatedCell::Number(42.0, None)
//! );
//! ```

use crate::config::EngineConfig;
use crate::dependency::{CellKey, DependencyGraph, Node};
use crate::error::{FormulaError, FormulaResult, RegistryError};
use crate::evaluator::{tree_is_volatile, tree_may_spill, EvalState, Evaluator, FormulaCell};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::normalizer::{denormalize_with, normalize, Dependencies, FormulaCache};
use crate::references::{InvalidReference, RangeReference};
use crate::tokenizer::INVALID_REFERENCE;
use crate::value::EvaluatedCell;
use ahash::AHashMap;
use log::{debug, warn};
use sheetflow_core::{is_formula, CellPosition, CellStore, ErrorKind, SheetId, StructuralChange};

/// Statistics from an evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Formula cells computed by this pass, memoized ones excluded
    pub cells_calculated: usize,
    /// Formula cells on or behind a cycle
    pub circular_references: usize,
    /// Formula cells calling a volatile function
    pub volatile_cells: usize,
    /// Formula cells evaluating to any other error
    pub errors: usize,
}

/// Content rewritten by the engine, to be written back to the store
pub type Rewrite = (SheetId, CellPosition, String);

/// The formula engine
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: FunctionRegistry,
    cache: FormulaCache,
    cells: AHashMap<CellKey, FormulaCell>,
    graph: DependencyGraph,
    state: EvalState,
    custom: AHashMap<String, String>,
    /// Formula cells that may spill, sorted top to bottom
    spill_candidates: Vec<CellKey>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the default configuration and every built-in function
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_registry(config, FunctionRegistry::new())
    }

    pub fn with_registry(config: EngineConfig, registry: FunctionRegistry) -> Self {
        Self {
            config,
            registry,
            cache: FormulaCache::new(),
            cells: AHashMap::new(),
            graph: DependencyGraph::new(),
            state: EvalState::default(),
            custom: AHashMap::new(),
            spill_candidates: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Number of formula cells known to the engine
    pub fn formula_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of distinct compiled formulas
    pub fn compiled_count(&self) -> usize {
        self.cache.len()
    }

    // === Functions and host values ===

    /// Register a function on this engine only
    pub fn register_function(&mut self, def: FunctionDef, overwrite: bool) -> Result<(), RegistryError> {
        self.registry.register(def, overwrite)?;
        self.refresh_flags();
        self.state.clear();
        Ok(())
    }

    pub fn remove_function(&mut self, name: &str) -> Result<FunctionDef, RegistryError> {
        let def = self.registry.remove(name)?;
        self.refresh_flags();
        self.state.clear();
        Ok(def)
    }

    /// Value readable by functions through their context
    pub fn set_custom_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom.insert(key.into(), value.into());
        self.state.clear();
    }

    // === Loading and edits ===

    /// Forget everything and compile every formula of `store`
    pub fn load(&mut self, store: &dyn CellStore) {
        self.cells.clear();
        self.graph.clear();
        self.state.clear();
        for (sheet, pos) in store.formula_cells() {
            let Some(content) = store.cell_content(sheet, pos) else {
                continue;
            };
            let key = CellKey::new(sheet, pos);
            let cell = self.compile_cell(store, key, content);
            self.graph.set_dependencies(key, edges(&cell));
            self.cells.insert(key, cell);
        }
        self.refresh_spill_candidates();
        debug!("loaded {} formula cells, {} distinct", self.cells.len(), self.cache.len());
    }

    /// The content of a cell changed in `store`
    pub fn update_cell(&mut self, store: &dyn CellStore, sheet: SheetId, pos: CellPosition) {
        let key = CellKey::new(sheet, pos);
        let was_spilling = self.cells.get(&key).map_or(false, FormulaCell::may_spill);
        let in_spill_zone = !self.state.anchors_covering(&key).is_empty();

        match store.cell_content(sheet, pos) {
            Some(content) if is_formula(content) => {
                let cell = self.compile_cell(store, key, content);
                self.graph.set_dependencies(key, edges(&cell));
                self.cells.insert(key, cell);
            }
            _ => {
                self.cells.remove(&key);
                self.graph.clear_dependencies(key);
            }
        }
        let now_spilling = self.cells.get(&key).map_or(false, FormulaCell::may_spill);
        if was_spilling || now_spilling {
            self.refresh_spill_candidates();
        }

        // Which empty cells a spill fills is only known after evaluating
        if was_spilling || now_spilling || in_spill_zone {
            debug!("{:?} touches a spill, dropping every result", key);
            self.state.clear();
            return;
        }
        let dirty = self.invalidate(key);
        debug!("{:?} changed, {} cells invalidated", key, dirty);
    }

    /// Forget `key` and everything depending on it
    ///
    /// A spill candidate among them may fill a different zone once
    /// evaluated again, so then every result goes.
    fn invalidate(&self, key: CellKey) -> usize {
        let dirty = self.graph.invalidate(key);
        if dirty
            .iter()
            .any(|cell| self.cells.get(cell).map_or(false, FormulaCell::may_spill))
        {
            debug!("{:?} reaches a spill candidate, dropping every result", key);
            self.state.clear();
            return dirty.len();
        }
        for cell in &dirty {
            self.state.forget(cell);
        }
        dirty.len()
    }

    /// Drop every memoized result
    pub fn invalidate_all(&self) {
        self.state.clear();
    }

    fn compile_cell(&mut self, store: &dyn CellStore, key: CellKey, content: &str) -> FormulaCell {
        let invalid = |error: FormulaError| {
            warn!("formula in {:?} does not parse: {}", key, error);
            FormulaCell::Invalid {
                raw: content.to_string(),
                error,
            }
        };
        let normalized = match normalize(content, &self.config.locale) {
            Ok(normalized) => normalized,
            Err(err) => return invalid(err),
        };
        let compiled = match self.cache.get_or_compile(&normalized.text) {
            Ok(compiled) => compiled,
            Err(err) => return invalid(err),
        };
        let numbers = match parse_numbers(&normalized.dependencies) {
            Ok(numbers) => numbers,
            Err(err) => return invalid(err),
        };
        let resolved = self.resolve_all(store, key.sheet, &normalized.dependencies);
        let may_spill = tree_may_spill(compiled.ast(), &resolved, &self.registry);
        let volatile = tree_is_volatile(compiled.ast(), &self.registry);
        FormulaCell::Compiled {
            compiled,
            dependencies: normalized.dependencies,
            numbers,
            resolved,
            may_spill,
            volatile,
        }
    }

    fn resolve_all(
        &self,
        store: &dyn CellStore,
        sheet: SheetId,
        dependencies: &Dependencies,
    ) -> Vec<Result<RangeReference, InvalidReference>> {
        dependencies
            .references
            .iter()
            .map(|text| RangeReference::resolve(text, sheet, store, self.config.limits))
            .collect()
    }

    /// Recompute flags that depend on the registry
    fn refresh_flags(&mut self) {
        for cell in self.cells.values_mut() {
            if let FormulaCell::Compiled {
                compiled,
                resolved,
                may_spill,
                volatile,
                ..
            } = cell
            {
                *may_spill = tree_may_spill(compiled.ast(), resolved, &self.registry);
                *volatile = tree_is_volatile(compiled.ast(), &self.registry);
            }
        }
        self.refresh_spill_candidates();
    }

    fn refresh_spill_candidates(&mut self) {
        self.spill_candidates = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.may_spill())
            .map(|(key, _)| *key)
            .collect();
        self.spill_candidates.sort_unstable();
    }

    // === Evaluation ===

    fn evaluator<'a>(&'a self, store: &'a dyn CellStore) -> Evaluator<'a> {
        Evaluator {
            store,
            registry: &self.registry,
            config: &self.config,
            cells: &self.cells,
            state: &self.state,
            custom: &self.custom,
            spill_candidates: &self.spill_candidates,
        }
    }

    /// Value of a cell
    pub fn evaluate(&self, store: &dyn CellStore, sheet: SheetId, pos: CellPosition) -> EvaluatedCell {
        self.evaluator(store).evaluate(CellKey::new(sheet, pos))
    }

    /// Evaluate every formula cell
    pub fn evaluate_all(&self, store: &dyn CellStore) -> CalculationStats {
        let mut keys: Vec<CellKey> = self.cells.keys().copied().collect();
        keys.sort_unstable();

        let evaluator = self.evaluator(store);
        let mut stats = CalculationStats {
            formula_count: keys.len(),
            ..Default::default()
        };
        for key in keys {
            if !self.state.is_evaluated(&key) {
                stats.cells_calculated += 1;
            }
            if self.cells.get(&key).map_or(false, FormulaCell::is_volatile) {
                stats.volatile_cells += 1;
            }
            match evaluator.evaluate(key).error_kind() {
                Some(ErrorKind::CircularDependency) => stats.circular_references += 1,
                Some(_) => stats.errors += 1,
                None => {}
            }
        }
        debug!("evaluated all: {:?}", stats);
        stats
    }

    /// Drop every result, then evaluate every formula cell
    pub fn recalculate(&self, store: &dyn CellStore) -> CalculationStats {
        self.state.clear();
        self.evaluate_all(store)
    }

    /// Forget results of volatile cells and their dependents
    pub fn invalidate_volatile(&self) {
        let volatile: Vec<CellKey> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.is_volatile())
            .map(|(key, _)| *key)
            .collect();
        for key in volatile {
            self.invalidate(key);
        }
    }

    // === Dependency services ===

    /// What a formula cell reads
    pub fn precedents(&self, sheet: SheetId, pos: CellPosition) -> Vec<Node> {
        self.graph.dependencies(CellKey::new(sheet, pos)).to_vec()
    }

    /// Formula cells reading a cell directly, through ranges included
    pub fn dependents(&self, sheet: SheetId, pos: CellPosition) -> Vec<CellKey> {
        let mut dependents = self.graph.dependents(CellKey::new(sheet, pos));
        dependents.sort_unstable();
        dependents
    }

    // === Text services ===

    /// Formula text of a cell with references as they currently read
    ///
    /// Sheet renames show up here before the stored text is rewritten.
    pub fn cell_text(&self, store: &dyn CellStore, sheet: SheetId, pos: CellPosition) -> Option<String> {
        let key = CellKey::new(sheet, pos);
        match self.cells.get(&key) {
            Some(FormulaCell::Compiled {
                compiled,
                dependencies,
                resolved,
                ..
            }) => {
                let live = live_dependencies(dependencies, resolved, |r| r.to_text(sheet, store));
                denormalize_with(compiled.text(), &live, &self.config.locale).ok()
            }
            Some(FormulaCell::Invalid { raw, .. }) => Some(raw.clone()),
            None => store.cell_content(sheet, pos).map(str::to_string),
        }
    }

    /// Move the relative references of `formula` by `(d_col, d_row)`
    ///
    /// References leaving the grid become `#REF`. Text that is not a formula
    /// comes back unchanged.
    pub fn translate_formula(
        &self,
        store: &dyn CellStore,
        sheet: SheetId,
        d_col: i64,
        d_row: i64,
        formula: &str,
    ) -> FormulaResult<String> {
        if !is_formula(formula) {
            return Ok(formula.to_string());
        }
        let mut normalized = normalize(formula, &self.config.locale)?;
        for text in normalized.dependencies.references.iter_mut() {
            let Ok(reference) = RangeReference::resolve(text, sheet, store, self.config.limits) else {
                continue;
            };
            *text = match reference.translate(d_col, d_row, self.config.limits) {
                Ok(moved) => moved.to_text(sheet, store),
                Err(_) => INVALID_REFERENCE.to_string(),
            };
        }
        denormalize_with(&normalized.text, &normalized.dependencies, &self.config.locale)
    }

    /// Content of `from` as it reads when copied to `to`
    pub fn translate_cell(
        &self,
        store: &dyn CellStore,
        sheet: SheetId,
        from: CellPosition,
        to: CellPosition,
    ) -> FormulaResult<Option<String>> {
        let Some(content) = self.cell_text(store, sheet, from) else {
            return Ok(None);
        };
        let d_col = to.col as i64 - from.col as i64;
        let d_row = to.row as i64 - from.row as i64;
        self.translate_formula(store, sheet, d_col, d_row, &content).map(Some)
    }

    // === Structural edits ===

    /// Follow a column/row insertion or deletion
    ///
    /// Called with the store as it was before the change. Formula cells
    /// move with their lines and references follow the cells they point
    /// at; references whose every cell was deleted become `#REF`. Returns
    /// the new content of every formula whose text changed, at its new
    /// position.
    pub fn apply_structural_change(&mut self, store: &dyn CellStore, change: &StructuralChange) -> Vec<Rewrite> {
        let cells = std::mem::take(&mut self.cells);
        let mut rewrites = Vec::new();

        for (key, cell) in cells {
            let Some(pos) = change.map_position(key.sheet, key.position()) else {
                continue;
            };
            let new_key = CellKey::new(key.sheet, pos);
            let cell = match cell {
                FormulaCell::Compiled {
                    compiled,
                    mut dependencies,
                    numbers,
                    resolved,
                    may_spill,
                    volatile,
                } => {
                    let mut changed = false;
                    let resolved: Vec<_> = resolved
                        .into_iter()
                        .zip(dependencies.references.iter_mut())
                        .map(|(reference, text)| {
                            let reference = match reference {
                                Ok(reference) => reference,
                                Err(err) => return Err(err),
                            };
                            let adjusted = reference.adjust(change);
                            let new_text = match &adjusted {
                                Ok(r) => r.to_text(key.sheet, store),
                                Err(_) => INVALID_REFERENCE.to_string(),
                            };
                            if *text != new_text {
                                *text = new_text;
                                changed = true;
                            }
                            adjusted
                        })
                        .collect();
                    if changed {
                        match denormalize_with(compiled.text(), &dependencies, &self.config.locale) {
                            Ok(text) => rewrites.push((key.sheet, pos, text)),
                            Err(err) => warn!("cannot rewrite formula of {:?}: {}", key, err),
                        }
                    }
                    FormulaCell::Compiled {
                        compiled,
                        dependencies,
                        numbers,
                        resolved,
                        may_spill,
                        volatile,
                    }
                }
                invalid => invalid,
            };
            self.cells.insert(new_key, cell);
        }

        self.graph.remap(
            |cell| {
                change
                    .map_position(cell.sheet, cell.position())
                    .map(|pos| CellKey::new(cell.sheet, pos))
            },
            |sheet, zone| change.map_zone(sheet, zone),
        );
        self.refresh_flags();
        self.state.clear();
        debug!("{:?}: {} formulas rewritten", change, rewrites.len());
        rewrites.sort_by_key(|(sheet, pos, _)| (*sheet, pos.row, pos.col));
        rewrites
    }

    /// Follow a sheet rename, with `store` already renamed
    ///
    /// References keep pointing at the same sheet; returns formulas whose
    /// text names it.
    pub fn rename_sheet(&mut self, store: &dyn CellStore) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();
        for (key, cell) in self.cells.iter_mut() {
            let FormulaCell::Compiled {
                compiled,
                dependencies,
                resolved,
                ..
            } = cell
            else {
                continue;
            };
            let live = live_dependencies(dependencies, resolved, |r| r.to_text(key.sheet, store));
            if live == *dependencies {
                continue;
            }
            *dependencies = live;
            if let Ok(text) = denormalize_with(compiled.text(), dependencies, &self.config.locale) {
                rewrites.push((key.sheet, key.position(), text));
            }
        }
        self.state.clear();
        rewrites.sort_by_key(|(sheet, pos, _)| (*sheet, pos.row, pos.col));
        rewrites
    }

    /// Follow a sheet removal, with `store` already without the sheet
    ///
    /// References to it keep their text and read as `#REF` until a sheet
    /// with that name appears again.
    pub fn remove_sheet(&mut self, store: &dyn CellStore, sheet: SheetId) {
        self.cells.retain(|key, _| key.sheet != sheet);
        self.graph.remove_sheet(sheet);
        self.refresh_references(store);
    }

    /// Resolve every reference again, after sheets were added or removed
    pub fn refresh_references(&mut self, store: &dyn CellStore) {
        let keys: Vec<CellKey> = self.cells.keys().copied().collect();
        for key in keys {
            let Some(FormulaCell::Compiled { dependencies, .. }) = self.cells.get(&key) else {
                continue;
            };
            let fresh = self.resolve_all(store, key.sheet, dependencies);
            if let Some(FormulaCell::Compiled { resolved, .. }) = self.cells.get_mut(&key) {
                *resolved = fresh;
            }
            if let Some(cell) = self.cells.get(&key) {
                self.graph.set_dependencies(key, edges(cell));
            }
        }
        self.refresh_flags();
        self.state.clear();
    }
}

/// Graph edges of a formula cell
fn edges(cell: &FormulaCell) -> Vec<Node> {
    match cell {
        FormulaCell::Compiled { resolved, .. } => resolved
            .iter()
            .flatten()
            .map(|r| Node::from_zone(r.sheet_id, r.zone))
            .collect(),
        FormulaCell::Invalid { .. } => Vec::new(),
    }
}

fn parse_numbers(dependencies: &Dependencies) -> FormulaResult<Vec<f64>> {
    dependencies
        .numbers
        .iter()
        .map(|n| {
            n.parse::<f64>()
                .map_err(|_| FormulaError::Parse(format!("Invalid number: {}", n)))
        })
        .collect()
}

/// Dependencies with every valid reference rendered again
fn live_dependencies(
    dependencies: &Dependencies,
    resolved: &[Result<RangeReference, InvalidReference>],
    render: impl Fn(&RangeReference) -> String,
) -> Dependencies {
    let mut live = dependencies.clone();
    for (text, reference) in live.references.iter_mut().zip(resolved) {
        if let Ok(reference) = reference {
            *text = render(reference);
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::{Workbook, Worksheet};

    fn at(address: &str) -> CellPosition {
        CellPosition::parse(address).unwrap()
    }

    struct Fixture {
        workbook: Workbook,
        engine: Engine,
        sheet: SheetId,
    }

    impl Fixture {
        fn new(cells: &[(&str, &str)]) -> Self {
            let mut workbook = Workbook::new();
            let sheet = workbook.first_sheet().unwrap();
            for (address, content) in cells {
                workbook.worksheet_mut(sheet).unwrap().set_content(address, content).unwrap();
            }
            let mut engine = Engine::new();
            engine.load(&workbook);
            Self { workbook, engine, sheet }
        }

        fn ws(&mut self) -> &mut Worksheet {
            self.workbook.worksheet_mut(self.sheet).unwrap()
        }

        fn set(&mut self, address: &str, content: &str) {
            self.ws().set_content(address, content).unwrap();
            self.engine.update_cell(&self.workbook, self.sheet, at(address));
        }

        fn get(&self, address: &str) -> EvaluatedCell {
            self.engine.evaluate(&self.workbook, self.sheet, at(address))
        }

        fn text(&self, address: &str) -> Option<String> {
            self.engine.cell_text(&self.workbook, self.sheet, at(address))
        }

        fn change(&mut self, change: StructuralChange) {
            let rewrites = self.engine.apply_structural_change(&self.workbook, &change);
            self.workbook.apply_structural_change(&change).unwrap();
            for (sheet, pos, text) in rewrites {
                self.workbook.worksheet_mut(sheet).unwrap().set_content_at(pos, &text);
            }
        }
    }

    fn number(n: f64) -> EvaluatedCell {
        EvaluatedCell::Number(n, None)
    }

    #[test]
    fn test_update_invalidates_dependents() {
        let mut f = Fixture::new(&[("A1", "1"), ("B1", "=A1*2"), ("C1", "=SUM(A1:B1)")]);
        assert_eq!(f.get("C1"), number(3.0));
        f.set("A1", "5");
        assert_eq!(f.get("B1"), number(10.0));
        assert_eq!(f.get("C1"), number(15.0));
    }

    #[test]
    fn test_breaking_cycle_heals() {
        let mut f = Fixture::new(&[("A1", "=B1"), ("B1", "=C1"), ("C1", "=A1")]);
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::CircularDependency));
        f.set("C1", "7");
        assert_eq!(f.get("A1"), number(7.0));
        assert_eq!(f.get("B1"), number(7.0));
    }

    #[test]
    fn test_idempotent_evaluation() {
        let f = Fixture::new(&[("A1", "10%"), ("B1", "=A1+1")]);
        let first = f.get("B1");
        f.engine.invalidate_all();
        assert_eq!(f.get("B1"), first);
        assert_eq!(first.format(), Some("0%"));
    }

    #[test]
    fn test_evaluate_all_stats() {
        let f = Fixture::new(&[
            ("A1", "=1+1"),
            ("A2", "=A2"),
            ("A3", "=1/0"),
            ("A4", "=RAND()"),
            ("A5", "=SUM("),
        ]);
        let stats = f.engine.evaluate_all(&f.workbook);
        assert_eq!(
            stats,
            CalculationStats {
                formula_count: 5,
                cells_calculated: 5,
                circular_references: 1,
                volatile_cells: 1,
                errors: 2,
            }
        );
        assert_eq!(f.engine.evaluate_all(&f.workbook).cells_calculated, 0);
        assert_eq!(f.engine.recalculate(&f.workbook).cells_calculated, 5);
    }

    #[test]
    fn test_shared_compiled_formulas() {
        let f = Fixture::new(&[("A1", "=B1+1"), ("A2", "=B2+1"), ("A3", "=B3 + 2")]);
        assert_eq!(f.engine.formula_count(), 3);
        assert_eq!(f.engine.compiled_count(), 1);
    }

    #[test]
    fn test_translate_formula() {
        let f = Fixture::new(&[]);
        let translate = |dc, dr, formula| f.engine.translate_formula(&f.workbook, f.sheet, dc, dr, formula).unwrap();
        assert_eq!(translate(1, 1, "=A1"), "=B2");
        assert_eq!(translate(-4, 0, "=B2"), "=#REF");
        assert_eq!(translate(2, 3, "=SUM($A$1:A2, \"A1\")"), "=SUM($A$1:C5,\"A1\")");
        assert_eq!(translate(1, 1, "plain"), "plain");
    }

    #[test]
    fn test_translate_cell() {
        let f = Fixture::new(&[("B2", "=A1*$C$1")]);
        assert_eq!(
            f.engine.translate_cell(&f.workbook, f.sheet, at("B2"), at("C4")).unwrap(),
            Some("=B3*$C$1".to_string())
        );
    }

    #[test]
    fn test_delete_columns_rewrites_references() {
        let mut f = Fixture::new(&[("A1", "=SUM(C1,D1)"), ("D1", "4")]);
        f.change(StructuralChange::DeleteColumns {
            sheet: f.sheet,
            start: 1,
            count: 2,
        });
        assert_eq!(f.text("A1").as_deref(), Some("=SUM(#REF,B1)"));
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::InvalidReference));
    }

    #[test]
    fn test_insert_rows_moves_formulas() {
        let mut f = Fixture::new(&[("A1", "1"), ("A2", "2"), ("A3", "=SUM(A1:A2)")]);
        assert_eq!(f.get("A3"), number(3.0));
        f.change(StructuralChange::InsertRows {
            sheet: f.sheet,
            before: 1,
            count: 1,
        });
        assert_eq!(f.text("A4").as_deref(), Some("=SUM(A1:A3)"));
        assert_eq!(f.get("A4"), number(3.0));
        f.set("A2", "10");
        assert_eq!(f.get("A4"), number(13.0));
    }

    #[test]
    fn test_delete_rows_narrowing_a_range_stops_spilling() {
        let mut f = Fixture::new(&[("A1", "1"), ("A2", "2"), ("C1", "=A1:A2*2"), ("D1", "=SUM(A1:A2)")]);
        assert_eq!(f.engine.spill_candidates, vec![CellKey::new(f.sheet, at("C1"))]);
        assert_eq!(f.get("C2"), number(4.0));

        f.change(StructuralChange::DeleteRows {
            sheet: f.sheet,
            start: 1,
            count: 1,
        });
        assert!(f.engine.spill_candidates.is_empty());
        assert_eq!(f.get("C1"), number(2.0));
        assert_eq!(f.get("C2"), EvaluatedCell::Empty);
        assert_eq!(f.get("D1"), number(1.0));
    }

    #[test]
    fn test_spill_invalidation() {
        let mut f = Fixture::new(&[("A1", "=SEQUENCE(3)"), ("B1", "=SUM(A2:A3)")]);
        assert_eq!(f.get("B1"), number(5.0));
        f.set("A3", "x");
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::GenericEvaluationError));
        assert_eq!(f.get("B1"), number(0.0));
        f.set("A3", "");
        assert_eq!(f.get("B1"), number(5.0));
    }

    #[test]
    fn test_spill_growing_after_upstream_edit() {
        let mut f = Fixture::new(&[("B1", "2"), ("A1", "=SEQUENCE(B1)"), ("C1", "=A3")]);
        assert_eq!(f.get("C1"), EvaluatedCell::Empty);
        f.set("B1", "3");
        assert_eq!(f.get("A3"), number(3.0));
        assert_eq!(f.get("C1"), number(3.0));

        f.set("B1", "1");
        assert_eq!(f.get("C1"), EvaluatedCell::Empty);
    }

    #[test]
    fn test_scalar_anchor_starting_to_spill() {
        let mut f = Fixture::new(&[("B2", "1"), ("D1", "=SEQUENCE(B2)"), ("E1", "=D2*5")]);
        assert_eq!(f.get("D1"), number(1.0));
        assert_eq!(f.get("E1"), number(0.0));
        f.set("B2", "2");
        assert_eq!(f.get("E1"), number(10.0));
    }

    #[test]
    fn test_sheet_rename_and_remove() {
        let mut f = Fixture::new(&[]);
        let other = f.workbook.add_worksheet_with_name("Data").unwrap();
        f.workbook.worksheet_mut(other).unwrap().set_content("A1", "3").unwrap();
        f.engine.refresh_references(&f.workbook);
        f.set("A1", "=Data!A1*2");
        assert_eq!(f.get("A1"), number(6.0));

        f.workbook.rename_worksheet(other, "Inputs 2024").unwrap();
        let rewrites = f.engine.rename_sheet(&f.workbook);
        assert_eq!(rewrites, vec![(f.sheet, at("A1"), "='Inputs 2024'!A1*2".to_string())]);
        assert_eq!(f.get("A1"), number(6.0));
        for (sheet, pos, text) in rewrites {
            f.workbook.worksheet_mut(sheet).unwrap().set_content_at(pos, &text);
        }

        f.workbook.remove_worksheet(other).unwrap();
        f.engine.remove_sheet(&f.workbook, other);
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::InvalidReference));
        assert_eq!(f.text("A1").as_deref(), Some("='Inputs 2024'!A1*2"));
    }

    #[test]
    fn test_custom_functions_are_per_engine() {
        let mut f = Fixture::new(&[("A1", "=DOUBLE(21)")]);
        let double = FunctionDef::new("DOUBLE", "Twice a number", |args, _| {
            Ok(crate::value::Evaluated::number(args.number(0)? * 2.0))
        })
        .arg(crate::functions::ArgSpec::number("value"));
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::BadExpression));
        f.engine.register_function(double, false).unwrap();
        assert_eq!(f.get("A1"), number(42.0));

        let mut other = Engine::new();
        other.load(&f.workbook);
        assert_eq!(
            other.evaluate(&f.workbook, f.sheet, at("A1")).error_kind(),
            Some(ErrorKind::BadExpression)
        );
    }

    #[test]
    fn test_panicking_function_is_an_error() {
        let mut f = Fixture::new(&[("A1", "=BOOM()"), ("B1", "=IFERROR(A1, 1)")]);
        f.engine
            .register_function(FunctionDef::new("BOOM", "", |_, _| panic!("boom")), false)
            .unwrap();
        assert_eq!(f.get("A1").error_kind(), Some(ErrorKind::GenericEvaluationError));
        assert_eq!(f.get("B1"), number(1.0));
    }

    #[test]
    fn test_custom_value_in_context() {
        let mut f = Fixture::new(&[("A1", "=HOST()")]);
        f.engine
            .register_function(
                FunctionDef::new("HOST", "", |_, ctx| {
                    Ok(crate::value::Evaluated::text(ctx.custom_value("user").unwrap_or("?")))
                }),
                false,
            )
            .unwrap();
        f.engine.set_custom_value("user", "ada");
        assert_eq!(f.get("A1"), EvaluatedCell::Text("ada".into(), None));
    }
}
