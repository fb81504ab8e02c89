//! The invariants a frontend emits to drive unification (§4.6). `ExprId` identifies one
//! position in the function graph whose type is being solved for (an argument, a return
//! value, a struct field — whatever the frontend is building a signature out of).

use std::fmt;

use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A function the [`Invariant::Generator`] variant may call once partial solutions
/// exist, to inject further invariants it couldn't have known about up front (e.g. a
/// struct literal function that only knows its field count once its own type is partly
/// resolved). Returning `None` means "nothing new yet, but don't give up on me."
pub trait Generator: Send {
    fn generate(&mut self, partial: &crate::solver::PartialSolution) -> Option<Vec<Invariant>>;
}

pub enum Invariant {
    /// `expr` must have exactly this type.
    Equals(ExprId, Type),
    /// `a` and `b` must have the same (possibly still unknown) type.
    Equality(ExprId, ExprId),
    /// Every expr in the list must share the same type.
    EqualityList(Vec<ExprId>),
    /// `list` unifies with `List(elem)`.
    ListWrap(ExprId, ExprId),
    /// `map` unifies with `Map(key, val)`.
    MapWrap(ExprId, ExprId, ExprId),
    /// `strct` unifies with `Struct{fields}`.
    StructWrap(ExprId, Vec<(String, ExprId)>),
    /// `func` unifies with `Func(args, ret)`.
    FuncWrap(ExprId, Vec<ExprId>, ExprId),
    /// `result` is whatever `func` returns when called with `args`; fires once `func`
    /// resolves to a concrete `Func` type.
    Call(ExprId, ExprId, Vec<ExprId>),
    /// `expr` accepts any concrete type — satisfied as soon as *something* resolves it,
    /// and otherwise the last invariant tried during the combinatorial fallback pass.
    Any(ExprId),
    /// `expr` is exactly the type of this literal value.
    Value(ExprId, mgmt_resource::Value),
    /// May inject further invariants once enough of the solution is known; retried every
    /// sweep until it returns `None` twice in a row ("fires at most once while inactive").
    Generator(ExprId, Box<dyn Generator>),
}

impl fmt::Debug for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invariant::Equals(e, t) => write!(f, "Equals({e}, {t})"),
            Invariant::Equality(a, b) => write!(f, "Equality({a}, {b})"),
            Invariant::EqualityList(xs) => write!(f, "EqualityList({xs:?})"),
            Invariant::ListWrap(l, e) => write!(f, "ListWrap({l}, {e})"),
            Invariant::MapWrap(m, k, v) => write!(f, "MapWrap({m}, {k}, {v})"),
            Invariant::StructWrap(s, fields) => write!(f, "StructWrap({s}, {fields:?})"),
            Invariant::FuncWrap(fun, args, ret) => write!(f, "FuncWrap({fun}, {args:?}, {ret})"),
            Invariant::Call(res, fun, args) => write!(f, "Call({res}, {fun}, {args:?})"),
            Invariant::Any(e) => write!(f, "Any({e})"),
            Invariant::Value(e, v) => write!(f, "Value({e}, {v})"),
            Invariant::Generator(e, _) => write!(f, "Generator({e})"),
        }
    }
}
