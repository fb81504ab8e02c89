//! The sweep solver (§4.6): applies trivial equalities, then wrap-partials, then regular
//! equalities, then generators, repeating until a full sweep makes no progress; falls
//! back to a bounded combinatorial search over `Any`-only exprs if anything is still
//! unresolved.

use std::collections::BTreeMap;

use fnv::FnvHashMap;

use crate::invariant::{ExprId, Invariant};
use crate::types::Type;

const MAX_COMBINATORIAL_DEPTH: usize = 8;
/// The order primitive guesses are tried in during the combinatorial fallback; composite
/// types are never guessed this way; they're always only reached via wrap invariants.
const GUESS_ORDER: [Type; 5] = [Type::Unit, Type::Bool, Type::Int, Type::Float, Type::Str];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UnifyError {
    #[error("expr {0} has conflicting types: {1} vs {2}")]
    Conflict(ExprId, String, String),
    #[error("unification is ambiguous: {0} unresolved expr(s) remain after exhausting all invariants")]
    Ambiguous(usize),
    #[error("unification is inconsistent: no combination of guesses for the remaining exprs satisfies every invariant")]
    Inconsistent,
}

/// Disjoint-set-union over `ExprId`, used so `Equality`/`EqualityList` can merge two
/// not-yet-typed exprs into one unification class without immediately committing to a type.
struct Dsu {
    parent: FnvHashMap<ExprId, ExprId>,
}

impl Dsu {
    fn new() -> Self {
        Dsu {
            parent: FnvHashMap::default(),
        }
    }

    /// Path-compressing find, used internally by the solver while it's mutating state.
    fn find_mut(&mut self, x: ExprId) -> ExprId {
        let p = *self.parent.entry(x).or_insert(x);
        if p == x {
            return x;
        }
        let root = self.find_mut(p);
        self.parent.insert(x, root);
        root
    }

    /// Read-only find (no path compression), for callers that only hold `&self`.
    fn find(&self, x: ExprId) -> ExprId {
        let mut cur = x;
        loop {
            match self.parent.get(&cur) {
                Some(&p) if p != cur => cur = p,
                _ => return cur,
            }
        }
    }

    fn union(&mut self, a: ExprId, b: ExprId) -> bool {
        let ra = self.find_mut(a);
        let rb = self.find_mut(b);
        if ra == rb {
            return false;
        }
        self.parent.insert(ra, rb);
        true
    }
}

/// A read-only view of the solver's progress so far, handed to [`crate::invariant::Generator`]s.
pub struct PartialSolution<'a> {
    dsu: &'a Dsu,
    resolved: &'a FnvHashMap<ExprId, Type>,
}

impl PartialSolution<'_> {
    pub fn type_of(&self, expr: ExprId) -> Option<&Type> {
        let root = self.dsu.find(expr);
        self.resolved.get(&root)
    }
}

pub struct Solver {
    dsu: Dsu,
    resolved: FnvHashMap<ExprId, Type>,
    invariants: Vec<Invariant>,
    all_exprs: Vec<ExprId>,
}

impl Solver {
    pub fn new() -> Self {
        Solver {
            dsu: Dsu::new(),
            resolved: FnvHashMap::default(),
            invariants: Vec::new(),
            all_exprs: Vec::new(),
        }
    }

    pub fn add(&mut self, invariant: Invariant) {
        for e in exprs_of(&invariant) {
            self.all_exprs.push(e);
        }
        self.invariants.push(invariant);
    }

    /// Runs the sweep loop to completion and returns a total mapping, or an error if some
    /// expr remains unsolved even after the combinatorial fallback.
    pub fn solve(mut self) -> Result<BTreeMap<ExprId, Type>, UnifyError> {
        loop {
            let progress = self.sweep()?;
            if !progress {
                break;
            }
        }
        if self.unresolved_count() > 0 {
            self.combinatorial_fallback(MAX_COMBINATORIAL_DEPTH)?;
        }
        if self.unresolved_count() > 0 {
            return Err(UnifyError::Ambiguous(self.unresolved_count()));
        }
        let mut out = BTreeMap::new();
        for e in self.all_exprs.clone() {
            let root = self.dsu.find_mut(e);
            if let Some(ty) = self.resolved.get(&root) {
                out.insert(e, ty.clone());
            }
        }
        Ok(out)
    }

    fn unresolved_count(&mut self) -> usize {
        let exprs = self.all_exprs.clone();
        exprs.into_iter().filter(|e| self.lookup(*e).is_none()).count()
    }

    fn lookup(&mut self, e: ExprId) -> Option<Type> {
        let root = self.dsu.find_mut(e);
        self.resolved.get(&root).cloned()
    }

    fn resolve(&mut self, e: ExprId, ty: Type) -> Result<bool, UnifyError> {
        let root = self.dsu.find_mut(e);
        match self.resolved.get(&root) {
            Some(existing) if *existing == ty => Ok(false),
            Some(existing) => Err(UnifyError::Conflict(e, existing.to_string(), ty.to_string())),
            None => {
                self.resolved.insert(root, ty);
                Ok(true)
            }
        }
    }

    fn union(&mut self, a: ExprId, b: ExprId) -> Result<bool, UnifyError> {
        let ta = self.lookup(a);
        let tb = self.lookup(b);
        let changed = self.dsu.union(a, b);
        match (ta, tb) {
            (Some(x), Some(y)) if x != y => return Err(UnifyError::Conflict(a, x.to_string(), y.to_string())),
            (Some(x), None) | (None, Some(x)) => {
                let root = self.dsu.find_mut(a);
                self.resolved.insert(root, x);
                return Ok(true);
            }
            _ => {}
        }
        Ok(changed)
    }

    /// One pass over every invariant. Returns whether anything changed.
    fn sweep(&mut self) -> Result<bool, UnifyError> {
        let mut changed = false;
        let invariants = std::mem::take(&mut self.invariants);
        let mut keep = Vec::with_capacity(invariants.len());
        let mut spawned = Vec::new();
        for invariant in invariants {
            match invariant {
                Invariant::Equals(e, ref ty) => {
                    changed |= self.resolve(e, ty.clone())?;
                    keep.push(invariant);
                }
                Invariant::Value(e, ref v) => {
                    changed |= self.resolve(e, crate::types::value_literal_type(v))?;
                    keep.push(invariant);
                }
                Invariant::Equality(a, b) => {
                    changed |= self.union(a, b)?;
                    keep.push(invariant);
                }
                Invariant::EqualityList(ref xs) => {
                    for pair in xs.windows(2) {
                        changed |= self.union(pair[0], pair[1])?;
                    }
                    keep.push(invariant);
                }
                Invariant::ListWrap(list, elem) => {
                    changed |= self.apply_list_wrap(list, elem)?;
                    keep.push(Invariant::ListWrap(list, elem));
                }
                Invariant::MapWrap(map, key, val) => {
                    changed |= self.apply_map_wrap(map, key, val)?;
                    keep.push(Invariant::MapWrap(map, key, val));
                }
                Invariant::StructWrap(ref strct, ref fields) => {
                    changed |= self.apply_struct_wrap(*strct, fields)?;
                    keep.push(invariant);
                }
                Invariant::FuncWrap(ref func, ref args, ret) => {
                    changed |= self.apply_func_wrap(*func, args, ret)?;
                    keep.push(invariant);
                }
                Invariant::Call(result, func, ref args) => {
                    changed |= self.apply_call(result, func, args)?;
                    keep.push(Invariant::Call(result, func, args.clone()));
                }
                Invariant::Any(_) => {
                    keep.push(invariant);
                }
                Invariant::Generator(e, mut gen) => {
                    let partial = PartialSolution {
                        dsu: &self.dsu,
                        resolved: &self.resolved,
                    };
                    if let Some(new_invariants) = gen.generate(&partial) {
                        changed = true;
                        for inv in new_invariants {
                            for x in exprs_of(&inv) {
                                self.all_exprs.push(x);
                            }
                            spawned.push(inv);
                        }
                        // Retained: a generator may fire again on a later sweep once
                        // more of the solution is known.
                        keep.push(Invariant::Generator(e, gen));
                    } else {
                        keep.push(Invariant::Generator(e, gen));
                    }
                }
            }
        }
        keep.extend(spawned);
        self.invariants = keep;
        Ok(changed)
    }

    fn apply_list_wrap(&mut self, list: ExprId, elem: ExprId) -> Result<bool, UnifyError> {
        let mut changed = false;
        if let Some(Type::List(inner)) = self.lookup(list) {
            changed |= self.resolve(elem, *inner)?;
        }
        if let Some(elem_ty) = self.lookup(elem) {
            changed |= self.resolve(list, Type::List(Box::new(elem_ty)))?;
        }
        Ok(changed)
    }

    fn apply_map_wrap(&mut self, map: ExprId, key: ExprId, val: ExprId) -> Result<bool, UnifyError> {
        let mut changed = false;
        if let Some(Type::Map(k, v)) = self.lookup(map) {
            changed |= self.resolve(key, *k)?;
            changed |= self.resolve(val, *v)?;
        }
        if let (Some(k), Some(v)) = (self.lookup(key), self.lookup(val)) {
            changed |= self.resolve(map, Type::Map(Box::new(k), Box::new(v)))?;
        }
        Ok(changed)
    }

    fn apply_struct_wrap(&mut self, strct: ExprId, fields: &[(String, ExprId)]) -> Result<bool, UnifyError> {
        let mut changed = false;
        if let Some(Type::Struct(known)) = self.lookup(strct) {
            for (name, expr) in fields {
                if let Some(ty) = known.get(name) {
                    changed |= self.resolve(*expr, ty.clone())?;
                }
            }
        }
        let mut resolved_fields = BTreeMap::new();
        for (name, expr) in fields {
            match self.lookup(*expr) {
                Some(ty) => {
                    resolved_fields.insert(name.clone(), ty);
                }
                None => return Ok(changed),
            }
        }
        changed |= self.resolve(strct, Type::Struct(resolved_fields))?;
        Ok(changed)
    }

    fn apply_func_wrap(&mut self, func: ExprId, args: &[ExprId], ret: ExprId) -> Result<bool, UnifyError> {
        let mut changed = false;
        if let Some(Type::Func(arg_types, ret_type)) = self.lookup(func) {
            if arg_types.len() == args.len() {
                for (a, t) in args.iter().zip(arg_types.iter()) {
                    changed |= self.resolve(*a, t.clone())?;
                }
                changed |= self.resolve(ret, *ret_type)?;
            }
        }
        let mut resolved_args = Vec::with_capacity(args.len());
        for a in args {
            match self.lookup(*a) {
                Some(ty) => resolved_args.push(ty),
                None => return Ok(changed),
            }
        }
        if let Some(ret_ty) = self.lookup(ret) {
            changed |= self.resolve(func, Type::Func(resolved_args, Box::new(ret_ty)))?;
        }
        Ok(changed)
    }

    fn apply_call(&mut self, result: ExprId, func: ExprId, args: &[ExprId]) -> Result<bool, UnifyError> {
        let mut changed = false;
        if let Some(Type::Func(arg_types, ret_type)) = self.lookup(func) {
            if arg_types.len() == args.len() {
                for (a, t) in args.iter().zip(arg_types.iter()) {
                    changed |= self.resolve(*a, t.clone())?;
                }
                changed |= self.resolve(result, *ret_type)?;
            }
        }
        Ok(changed)
    }

    /// Backtracking search over every unresolved expr that is only constrained by `Any`
    /// (or by nothing at all), trying [`GUESS_ORDER`] in turn and re-running the sweep
    /// after each guess. Bounded by `depth` to guarantee termination on pathological
    /// inputs (§4.6's "combinatorial-hazard caveat", resolved in DESIGN.md).
    fn combinatorial_fallback(&mut self, depth: usize) -> Result<(), UnifyError> {
        if depth == 0 {
            return Err(UnifyError::Inconsistent);
        }
        let exprs = self.all_exprs.clone();
        let target = exprs.into_iter().find(|e| self.lookup(*e).is_none());
        let Some(target) = target else { return Ok(()) };

        for guess in GUESS_ORDER.iter() {
            let snapshot_resolved = self.resolved.clone();
            let snapshot_invariants_len = self.invariants.len();
            if self.resolve(target, guess.clone()).is_ok() {
                let mut ok = true;
                loop {
                    match self.sweep() {
                        Ok(false) => break,
                        Ok(true) => continue,
                        Err(_) => {
                            ok = false;
                            break;
                        }
                    }
                }
                if ok && self.combinatorial_fallback(depth - 1).is_ok() {
                    return Ok(());
                }
            }
            self.resolved = snapshot_resolved;
            self.invariants.truncate(snapshot_invariants_len);
        }
        Err(UnifyError::Inconsistent)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

fn exprs_of(invariant: &Invariant) -> Vec<ExprId> {
    match invariant {
        Invariant::Equals(e, _) => vec![*e],
        Invariant::Equality(a, b) => vec![*a, *b],
        Invariant::EqualityList(xs) => xs.clone(),
        Invariant::ListWrap(a, b) => vec![*a, *b],
        Invariant::MapWrap(a, b, c) => vec![*a, *b, *c],
        Invariant::StructWrap(s, fields) => {
            let mut v = vec![*s];
            v.extend(fields.iter().map(|(_, e)| *e));
            v
        }
        Invariant::FuncWrap(f, args, ret) => {
            let mut v = vec![*f, *ret];
            v.extend(args.iter().copied());
            v
        }
        Invariant::Call(result, func, args) => {
            let mut v = vec![*result, *func];
            v.extend(args.iter().copied());
            v
        }
        Invariant::Any(e) => vec![*e],
        Invariant::Value(e, _) => vec![*e],
        Invariant::Generator(e, _) => vec![*e],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariant::Invariant;

    #[test]
    fn resolves_direct_equals() {
        let mut solver = Solver::new();
        let e = ExprId(0);
        solver.add(Invariant::Equals(e, Type::Int));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&e], Type::Int);
    }

    #[test]
    fn equality_propagates_known_type() {
        let mut solver = Solver::new();
        let (a, b) = (ExprId(0), ExprId(1));
        solver.add(Invariant::Equals(a, Type::Str));
        solver.add(Invariant::Equality(a, b));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&b], Type::Str);
    }

    #[test]
    fn list_wrap_infers_element_from_container() {
        let mut solver = Solver::new();
        let (list, elem) = (ExprId(0), ExprId(1));
        solver.add(Invariant::Equals(list, Type::List(Box::new(Type::Int))));
        solver.add(Invariant::ListWrap(list, elem));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&elem], Type::Int);
    }

    #[test]
    fn list_wrap_infers_container_from_element() {
        let mut solver = Solver::new();
        let (list, elem) = (ExprId(0), ExprId(1));
        solver.add(Invariant::Equals(elem, Type::Bool));
        solver.add(Invariant::ListWrap(list, elem));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&list], Type::List(Box::new(Type::Bool)));
    }

    #[test]
    fn conflicting_equals_is_an_error() {
        let mut solver = Solver::new();
        let e = ExprId(0);
        solver.add(Invariant::Equals(e, Type::Int));
        solver.add(Invariant::Equals(e, Type::Str));
        assert!(matches!(solver.solve(), Err(UnifyError::Conflict(..))));
    }

    #[test]
    fn call_resolves_result_from_func_type() {
        let mut solver = Solver::new();
        let (func, arg, result) = (ExprId(0), ExprId(1), ExprId(2));
        solver.add(Invariant::Equals(func, Type::Func(vec![Type::Int], Box::new(Type::Bool))));
        solver.add(Invariant::Call(result, func, vec![arg]));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&arg], Type::Int);
        assert_eq!(solution[&result], Type::Bool);
    }

    #[test]
    fn unconstrained_any_falls_back_to_combinatorial_guess() {
        let mut solver = Solver::new();
        let e = ExprId(0);
        solver.add(Invariant::Any(e));
        let solution = solver.solve().unwrap();
        assert_eq!(solution[&e], Type::Unit);
    }
}
