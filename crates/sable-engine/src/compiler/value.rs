//! Compile-time values.
//!
//! A [`Val`] is what every expression entry point takes and returns: a typed
//! handle to wherever the value currently lives — a literal not yet
//! materialized, a stack slot, a global, a struct member, or one of the
//! callable references. Literals stay literals as long as possible so
//! constant folding happens before any instruction is emitted.

use crate::bytecode::{Word, MAX_STACK_INDEX, NPOS};
use crate::interner::Symbol;
use crate::types::{ClassRef, PrototypeId};

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison operators. Greater-than forms compile to their less-than
/// mirror with swapped operands; there are no GT/GE instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
    Not,
}

/// Assignment forms. Compound forms lower to the binary op then a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    pub(crate) fn bin_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinOp::Add),
            AssignOp::SubAssign => Some(BinOp::Sub),
            AssignOp::MulAssign => Some(BinOp::Mul),
            AssignOp::DivAssign => Some(BinOp::Div),
        }
    }
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Numeric width rank for promotion: bool < int < double.
fn rank(lit: &Literal) -> Option<u8> {
    match lit {
        Literal::Bool(_) => Some(0),
        Literal::Int(_) => Some(1),
        Literal::Double(_) => Some(2),
        Literal::String(_) => None,
    }
}

impl Literal {
    pub fn is_true(&self) -> bool {
        match self {
            Literal::Bool(b) => *b,
            Literal::Int(i) => *i != 0,
            Literal::Double(d) => *d != 0.0,
            Literal::String(s) => !s.is_empty(),
        }
    }

    pub fn to_bool(&self) -> bool {
        self.is_true()
    }

    pub fn to_int(&self) -> i64 {
        match self {
            Literal::Bool(b) => *b as i64,
            Literal::Int(i) => *i,
            Literal::Double(d) => *d as i64,
            Literal::String(s) => s.trim().parse().unwrap_or(0),
        }
    }

    pub fn to_double(&self) -> f64 {
        match self {
            Literal::Bool(b) => *b as i64 as f64,
            Literal::Int(i) => *i as f64,
            Literal::Double(d) => *d,
            Literal::String(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Double(d) => d.to_string(),
            Literal::String(s) => s.clone(),
        }
    }

    /// Promote to the wider of the two numeric widths. `None` when either
    /// side is a string.
    fn promote_pair(a: &Literal, b: &Literal) -> Option<(Literal, Literal)> {
        let w = rank(a)?.max(rank(b)?).max(1); // bool arithmetic is int arithmetic
        let widen = |l: &Literal| match w {
            1 => Literal::Int(l.to_int()),
            _ => Literal::Double(l.to_double()),
        };
        Some((widen(a), widen(b)))
    }

    /// Fold a binary arithmetic op. `None` when folding is not possible
    /// (mixed string operands, or division by a zero literal — the latter
    /// is left for the executor to report at the faulting site).
    pub fn arith(op: BinOp, a: &Literal, b: &Literal) -> Option<Literal> {
        if let (Literal::String(x), Literal::String(y)) = (a, b) {
            return match op {
                BinOp::Add => Some(Literal::String(format!("{x}{y}"))),
                _ => None,
            };
        }
        match Literal::promote_pair(a, b)? {
            (Literal::Int(x), Literal::Int(y)) => match op {
                BinOp::Add => Some(Literal::Int(x.wrapping_add(y))),
                BinOp::Sub => Some(Literal::Int(x.wrapping_sub(y))),
                BinOp::Mul => Some(Literal::Int(x.wrapping_mul(y))),
                BinOp::Div => {
                    if y == 0 {
                        None
                    } else {
                        Some(Literal::Int(x.wrapping_div(y)))
                    }
                }
            },
            (Literal::Double(x), Literal::Double(y)) => Some(Literal::Double(match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => x / y,
            })),
            _ => None,
        }
    }

    /// Fold a comparison between two literals.
    pub fn compare(op: CmpOp, a: &Literal, b: &Literal) -> Option<bool> {
        if let (Literal::String(x), Literal::String(y)) = (a, b) {
            return Some(match op {
                CmpOp::Eq => x == y,
                CmpOp::Ne => x != y,
                CmpOp::Lt => x < y,
                CmpOp::Le => x <= y,
                CmpOp::Gt => x > y,
                CmpOp::Ge => x >= y,
            });
        }
        let (a, b) = Literal::promote_pair(a, b)?;
        let (x, y) = (a.to_double(), b.to_double());
        Some(match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        })
    }

    /// Fold a unary op.
    pub fn unary(op: UnOp, v: &Literal) -> Option<Literal> {
        match op {
            UnOp::Not => Some(Literal::Bool(!v.is_true())),
            UnOp::Plus => match v {
                Literal::String(_) => None,
                other => Some(other.clone()),
            },
            UnOp::Minus => match v {
                Literal::Int(i) => Some(Literal::Int(i.wrapping_neg())),
                Literal::Double(d) => Some(Literal::Double(-d)),
                Literal::Bool(b) => Some(Literal::Int(-(*b as i64))),
                Literal::String(_) => None,
            },
        }
    }
}

/// An initializer-list element; `key` is present in `{k : v}` lists.
#[derive(Debug, Clone)]
pub(crate) struct InitEntry {
    pub key: Option<Val>,
    pub value: Val,
}

/// Where a value currently lives.
#[derive(Debug, Clone)]
pub(crate) enum ValKind {
    /// Error-recovery placeholder; flows through without emitting.
    Invalid,
    /// An unfolded literal, not yet materialized.
    Literal(Literal),
    /// The `null` literal; materializes as CREATE_NULL_VAR of its type.
    Null,
    /// A stack slot. Temporaries are released at statement end.
    Slot { index: u32, temp: bool },
    /// Constant-pool entry used directly as an operand word.
    PoolRef(u32),
    /// Result of a void call; operand is NPOS.
    Discard,
    /// A global (or host-injected read-only) variable.
    Global { name: Symbol, read_only_fn: bool },
    /// A function-local static slot.
    Static { index: u32 },
    /// Struct member access. `typed` distinguishes `.` (declared type) from
    /// `->` (dynamic, Var-typed result).
    StructMember {
        base: Box<Val>,
        member: Symbol,
        typed: bool,
    },
    /// `obj.Method`, overload resolved at the call site.
    MethodRef { base: Box<Val>, method: Symbol },
    /// `Type.Method` for a static method.
    StaticMethodRef { class: ClassRef, method: Symbol },
    /// A script function; `base` is set for struct-scripts.
    ScriptRef {
        name: Symbol,
        proto: PrototypeId,
        base: Option<Box<Val>>,
    },
    /// A `{...}` initializer list awaiting realization into a container.
    InitList(Vec<InitEntry>),
}

/// A typed compile-time value handle.
#[derive(Debug, Clone)]
pub struct Val {
    pub(crate) kind: ValKind,
    pub(crate) ty: Option<ClassRef>,
}

impl Val {
    pub(crate) fn invalid() -> Val {
        Val {
            kind: ValKind::Invalid,
            ty: None,
        }
    }

    pub(crate) fn literal(lit: Literal, ty: ClassRef) -> Val {
        Val {
            kind: ValKind::Literal(lit),
            ty: Some(ty),
        }
    }

    pub(crate) fn local(index: u32, ty: ClassRef) -> Val {
        Val {
            kind: ValKind::Slot { index, temp: false },
            ty: Some(ty),
        }
    }

    pub(crate) fn temp(index: u32, ty: ClassRef) -> Val {
        Val {
            kind: ValKind::Slot { index, temp: true },
            ty: Some(ty),
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.kind, ValKind::Invalid)
    }

    /// The value's class, when known.
    pub fn class(&self) -> Option<&ClassRef> {
        self.ty.as_ref()
    }

    pub(crate) fn literal_value(&self) -> Option<&Literal> {
        match &self.kind {
            ValKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Slot index when the value lives on the stack.
    pub(crate) fn stack_slot(&self) -> Option<u32> {
        match self.kind {
            ValKind::Slot { index, .. } => Some(index),
            _ => None,
        }
    }

    pub(crate) fn is_temp_slot(&self) -> bool {
        matches!(self.kind, ValKind::Slot { temp: true, .. })
    }

    /// Operand word for a value that has been materialized (stack slot,
    /// direct pool reference, or the void sentinel).
    pub(crate) fn operand(&self) -> Option<Word> {
        match self.kind {
            ValKind::Slot { index, .. } => Some(index),
            ValKind::PoolRef(pool) => Some(MAX_STACK_INDEX + pool),
            ValKind::Discard => Some(NPOS),
            _ => None,
        }
    }

    /// Same location, different static type.
    pub(crate) fn retyped(mut self, ty: ClassRef) -> Val {
        self.ty = Some(ty);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_never_truncates() {
        // int + double folds as double.
        let r = Literal::arith(BinOp::Add, &Literal::Int(1), &Literal::Double(2.5)).unwrap();
        assert_eq!(r, Literal::Double(3.5));
        // double / int stays double.
        let r = Literal::arith(BinOp::Div, &Literal::Double(7.0), &Literal::Int(2)).unwrap();
        assert_eq!(r, Literal::Double(3.5));
    }

    #[test]
    fn int_arithmetic_stays_int() {
        let r = Literal::arith(BinOp::Add, &Literal::Int(2), &Literal::Int(3)).unwrap();
        assert_eq!(r, Literal::Int(5));
        let r = Literal::arith(BinOp::Div, &Literal::Int(7), &Literal::Int(2)).unwrap();
        assert_eq!(r, Literal::Int(3));
    }

    #[test]
    fn bool_arithmetic_promotes_to_int() {
        let r = Literal::arith(BinOp::Add, &Literal::Bool(true), &Literal::Bool(true)).unwrap();
        assert_eq!(r, Literal::Int(2));
    }

    #[test]
    fn division_by_zero_literal_does_not_fold() {
        assert!(Literal::arith(BinOp::Div, &Literal::Int(1), &Literal::Int(0)).is_none());
    }

    #[test]
    fn string_concatenation_folds() {
        let r = Literal::arith(
            BinOp::Add,
            &Literal::String("ab".into()),
            &Literal::String("cd".into()),
        )
        .unwrap();
        assert_eq!(r, Literal::String("abcd".into()));
    }

    #[test]
    fn comparisons_fold_with_promotion() {
        assert_eq!(
            Literal::compare(CmpOp::Lt, &Literal::Int(1), &Literal::Double(1.5)),
            Some(true)
        );
        assert_eq!(
            Literal::compare(CmpOp::Ge, &Literal::Int(2), &Literal::Int(2)),
            Some(true)
        );
        assert_eq!(
            Literal::compare(
                CmpOp::Eq,
                &Literal::String("a".into()),
                &Literal::String("b".into())
            ),
            Some(false)
        );
    }

    #[test]
    fn unary_folds() {
        assert_eq!(
            Literal::unary(UnOp::Minus, &Literal::Int(4)),
            Some(Literal::Int(-4))
        );
        assert_eq!(
            Literal::unary(UnOp::Not, &Literal::Int(0)),
            Some(Literal::Bool(true))
        );
        assert_eq!(
            Literal::unary(UnOp::Plus, &Literal::Double(2.0)),
            Some(Literal::Double(2.0))
        );
    }
}
