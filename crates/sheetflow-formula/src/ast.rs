//! Formula Abstract Syntax Tree types
//!
//! Trees are built from canonical text, so literal leaves hold indices into
//! the per-cell dependency lists instead of values. One tree serves every
//! cell whose formula has the same shape.

use sheetflow_core::ErrorKind;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // === Literals ===
    /// Index into the numbers list
    Number(usize),
    /// Index into the strings list
    String(usize),
    Boolean(bool),
    Error(ErrorKind),

    // === References ===
    /// Index into the references list
    Reference(usize),

    // === Operators ===
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },

    // === Function call ===
    Function { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Visit every reference index, in tree order
    pub fn for_each_reference(&self, f: &mut impl FnMut(usize)) {
        match self {
            Expr::Reference(i) => f(*i),
            Expr::BinaryOp { left, right, .. } => {
                left.for_each_reference(f);
                right.for_each_reference(f);
            }
            Expr::UnaryOp { operand, .. } => operand.for_each_reference(f),
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.for_each_reference(f);
                }
            }
            _ => {}
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    /// Registry function implementing the operator
    pub fn function_name(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "ADD",
            BinaryOperator::Subtract => "MINUS",
            BinaryOperator::Multiply => "MULTIPLY",
            BinaryOperator::Divide => "DIVIDE",
            BinaryOperator::Power => "POWER",
            BinaryOperator::Equal => "EQ",
            BinaryOperator::NotEqual => "NE",
            BinaryOperator::LessThan => "LT",
            BinaryOperator::LessEqual => "LTE",
            BinaryOperator::GreaterThan => "GT",
            BinaryOperator::GreaterEqual => "GTE",
            BinaryOperator::Concat => "CONCAT_OP",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Percent,
}

impl UnaryOperator {
    /// Registry function implementing the operator
    pub fn function_name(&self) -> &'static str {
        match self {
            UnaryOperator::Negate => "UMINUS",
            UnaryOperator::Plus => "UPLUS",
            UnaryOperator::Percent => "UNARY.PERCENT",
        }
    }
}
