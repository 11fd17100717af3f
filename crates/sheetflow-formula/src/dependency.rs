//! Dependency tracking for formula cells
//!
//! Edges go from a formula cell to every cell or range it reads. Ranges are
//! kept as single nodes so `SUM(A1:A10000)` costs one edge, and the reverse
//! lookup finds them by containment.

use ahash::{AHashMap, AHashSet};
use sheetflow_core::{CellPosition, SheetId, Zone};

/// Unique key for a cell (sheet id + position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: SheetId,
    pub row: u32,
    pub col: u32,
}

impl CellKey {
    pub fn new(sheet: SheetId, pos: CellPosition) -> Self {
        Self {
            sheet,
            row: pos.row,
            col: pos.col,
        }
    }

    pub fn position(&self) -> CellPosition {
        CellPosition::new(self.col, self.row)
    }
}

/// A multi-cell zone read as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub sheet: SheetId,
    pub zone: Zone,
}

/// Something a formula reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Cell(CellKey),
    Range(RangeKey),
}

impl Node {
    /// Node for a zone: a cell when it covers one position
    pub fn from_zone(sheet: SheetId, zone: Zone) -> Self {
        if zone.is_single_cell() {
            Node::Cell(CellKey::new(sheet, zone.top_left()))
        } else {
            Node::Range(RangeKey { sheet, zone })
        }
    }

    pub fn sheet(&self) -> SheetId {
        match self {
            Node::Cell(key) => key.sheet,
            Node::Range(key) => key.sheet,
        }
    }
}

/// Dependency graph for formula cells
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Formula cell -> what it reads
    precedents: AHashMap<CellKey, Vec<Node>>,
    /// Cell -> formula cells reading it directly
    cell_dependents: AHashMap<CellKey, AHashSet<CellKey>>,
    /// Range -> formula cells reading it
    range_dependents: AHashMap<SheetId, AHashMap<Zone, AHashSet<CellKey>>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything `cell` reads
    pub fn set_dependencies(&mut self, cell: CellKey, nodes: Vec<Node>) {
        self.clear_dependencies(cell);
        if nodes.is_empty() {
            return;
        }
        for node in &nodes {
            match node {
                Node::Cell(key) => {
                    self.cell_dependents.entry(*key).or_default().insert(cell);
                }
                Node::Range(range) => {
                    self.range_dependents
                        .entry(range.sheet)
                        .or_default()
                        .entry(range.zone)
                        .or_default()
                        .insert(cell);
                }
            }
        }
        self.precedents.insert(cell, nodes);
    }

    /// Drop every edge leaving `cell`
    pub fn clear_dependencies(&mut self, cell: CellKey) {
        let Some(nodes) = self.precedents.remove(&cell) else {
            return;
        };
        for node in nodes {
            match node {
                Node::Cell(key) => {
                    if let Some(set) = self.cell_dependents.get_mut(&key) {
                        set.remove(&cell);
                        if set.is_empty() {
                            self.cell_dependents.remove(&key);
                        }
                    }
                }
                Node::Range(range) => {
                    if let Some(zones) = self.range_dependents.get_mut(&range.sheet) {
                        if let Some(set) = zones.get_mut(&range.zone) {
                            set.remove(&cell);
                            if set.is_empty() {
                                zones.remove(&range.zone);
                            }
                        }
                    }
                }
            }
        }
    }

    /// What `cell` reads
    pub fn dependencies(&self, cell: CellKey) -> &[Node] {
        self.precedents.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Formula cells reading `cell`, directly or through a range
    pub fn dependents(&self, cell: CellKey) -> Vec<CellKey> {
        let mut out: Vec<CellKey> = self
            .cell_dependents
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
            .collect();
        if let Some(zones) = self.range_dependents.get(&cell.sheet) {
            for (zone, set) in zones {
                if zone.contains(cell.position()) {
                    out.extend(set.iter().copied());
                }
            }
        }
        out
    }

    /// `cell` and everything transitively depending on it
    pub fn invalidate(&self, cell: CellKey) -> AHashSet<CellKey> {
        let mut dirty = AHashSet::new();
        let mut worklist = vec![cell];
        while let Some(key) = worklist.pop() {
            if dirty.insert(key) {
                worklist.extend(self.dependents(key));
            }
        }
        dirty
    }

    /// Rewrite keys after columns/rows moved
    ///
    /// `map_cell` gives the new key of a cell or `None` when it was deleted;
    /// `map_zone` does the same for ranges. Edges to deleted nodes are
    /// dropped, every other edge is kept.
    pub fn remap(
        &mut self,
        map_cell: impl Fn(CellKey) -> Option<CellKey>,
        map_zone: impl Fn(SheetId, Zone) -> Option<Zone>,
    ) {
        let precedents = std::mem::take(&mut self.precedents);
        self.cell_dependents.clear();
        self.range_dependents.clear();

        let mut moved = 0usize;
        for (cell, nodes) in precedents {
            let Some(new_cell) = map_cell(cell) else {
                continue;
            };
            if new_cell != cell {
                moved += 1;
            }
            let nodes = nodes
                .into_iter()
                .filter_map(|node| match node {
                    Node::Cell(key) => map_cell(key).map(Node::Cell),
                    Node::Range(range) => {
                        map_zone(range.sheet, range.zone).map(|zone| Node::from_zone(range.sheet, zone))
                    }
                })
                .collect();
            self.set_dependencies(new_cell, nodes);
        }
        log::debug!("dependency graph remapped, {} formula cells moved", moved);
    }

    /// Forget a sheet's formula cells and every edge into it
    pub fn remove_sheet(&mut self, sheet: SheetId) {
        let cells: Vec<CellKey> = self
            .precedents
            .keys()
            .filter(|key| key.sheet == sheet)
            .copied()
            .collect();
        for cell in cells {
            self.clear_dependencies(cell);
        }
        let readers: Vec<(CellKey, Vec<Node>)> = self
            .precedents
            .iter()
            .filter(|(_, nodes)| nodes.iter().any(|node| node.sheet() == sheet))
            .map(|(cell, nodes)| {
                (
                    *cell,
                    nodes.iter().filter(|node| node.sheet() != sheet).copied().collect(),
                )
            })
            .collect();
        for (cell, nodes) in readers {
            self.set_dependencies(cell, nodes);
        }
    }

    /// Number of formula cells with dependencies
    pub fn len(&self) -> usize {
        self.precedents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.precedents.clear();
        self.cell_dependents.clear();
        self.range_dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::StructuralChange;

    const S: SheetId = SheetId(1);

    fn key(a1: &str) -> CellKey {
        CellKey::new(S, CellPosition::parse(a1).unwrap())
    }

    fn range(a1: &str) -> Node {
        Node::from_zone(S, a1.parse().unwrap())
    }

    fn sorted(mut keys: Vec<CellKey>) -> Vec<CellKey> {
        keys.sort();
        keys
    }

    #[test]
    fn test_set_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(key("C1"), vec![Node::Cell(key("A1")), range("B1:B3")]);

        assert_eq!(graph.dependencies(key("C1")).len(), 2);
        assert_eq!(graph.dependents(key("A1")), vec![key("C1")]);
        assert_eq!(graph.dependents(key("B2")), vec![key("C1")]);
        assert!(graph.dependents(key("B4")).is_empty());

        // Replacing drops the old edges
        graph.set_dependencies(key("C1"), vec![Node::Cell(key("D1"))]);
        assert!(graph.dependents(key("A1")).is_empty());
        assert!(graph.dependents(key("B2")).is_empty());
        assert_eq!(graph.dependents(key("D1")), vec![key("C1")]);
    }

    #[test]
    fn test_invalidate_is_transitive() {
        let mut graph = DependencyGraph::new();
        // A1 <- B1 <- C1 <- D1, E1 reads A2:A5 only
        graph.set_dependencies(key("B1"), vec![Node::Cell(key("A1"))]);
        graph.set_dependencies(key("C1"), vec![Node::Cell(key("B1"))]);
        graph.set_dependencies(key("D1"), vec![range("C1:C2")]);
        graph.set_dependencies(key("E1"), vec![range("A2:A5")]);

        let mut dirty: Vec<CellKey> = graph.invalidate(key("A1")).into_iter().collect();
        dirty.sort();
        assert_eq!(dirty, sorted(vec![key("A1"), key("B1"), key("C1"), key("D1")]));
    }

    #[test]
    fn test_invalidate_terminates_on_cycles() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(key("A1"), vec![Node::Cell(key("B1"))]);
        graph.set_dependencies(key("B1"), vec![Node::Cell(key("C1"))]);
        graph.set_dependencies(key("C1"), vec![Node::Cell(key("A1"))]);

        assert_eq!(graph.invalidate(key("A1")).len(), 3);
    }

    #[test]
    fn test_remap_keeps_valid_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(key("A1"), vec![Node::Cell(key("C1")), Node::Cell(key("D1"))]);
        graph.set_dependencies(key("E5"), vec![range("B1:D1")]);

        let change = StructuralChange::DeleteColumns {
            sheet: S,
            start: 1,
            count: 2,
        };
        graph.remap(
            |k| change.map_position(k.sheet, k.position()).map(|p| CellKey::new(k.sheet, p)),
            |sheet, zone| change.map_zone(sheet, zone),
        );

        // C1 was deleted, D1 is now B1
        assert_eq!(graph.dependencies(key("A1")), &[Node::Cell(key("B1"))]);
        // E5 is now C5 and its range narrowed to a single cell
        assert_eq!(graph.dependencies(key("C5")), &[Node::Cell(key("B1"))]);
        assert!(graph.dependencies(key("E5")).is_empty());
    }

    #[test]
    fn test_remove_sheet() {
        let other = SheetId(2);
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(
            key("A1"),
            vec![
                Node::Cell(CellKey::new(other, CellPosition::new(0, 0))),
                Node::Cell(key("B1")),
            ],
        );
        graph.set_dependencies(
            CellKey::new(other, CellPosition::new(1, 1)),
            vec![Node::Cell(key("A1"))],
        );

        graph.remove_sheet(other);
        assert_eq!(graph.dependencies(key("A1")), &[Node::Cell(key("B1"))]);
        assert!(graph.dependents(key("A1")).is_empty());
        assert_eq!(graph.len(), 1);
    }
}
